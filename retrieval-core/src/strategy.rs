use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use common::model::Document;
use common::AppError;
use serde_json::Value;

use crate::dependencies::Dependencies;

/// A single retrieval implementation. Strategies hold no mutable state
/// observable across calls except their own lazily built indices (the
/// keyword index, the parent/child map); everything else comes from
/// `Dependencies`.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn retrieve(
        &self,
        query: &str,
        k: usize,
        params: &Value,
        deps: &Dependencies,
    ) -> Result<Vec<Document>, AppError>;

    async fn add_documents(&self, _docs: Vec<Document>, _deps: &Dependencies) -> Result<(), AppError> {
        Ok(())
    }

    async fn delete_documents(&self, _ids: &[String], _deps: &Dependencies) -> Result<(), AppError> {
        Ok(())
    }

    /// Invalidates any lazily built index so the next `retrieve` rebuilds
    /// it from the document store.
    async fn rebuild_index(&self, _deps: &Dependencies) -> Result<(), AppError> {
        Ok(())
    }
}

/// Closed sum type over the six strategies (spec.md §9 REDESIGN FLAGS:
/// "dynamic strategy registry -> tagged variants"), giving compile-time
/// exhaustiveness everywhere a strategy is matched on. Name-to-variant
/// lookup for the MCP-facing string is handled separately by the factory's
/// registry map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Keyword,
    Vector,
    ParentDoc,
    MultiQuery,
    Rerank,
    Ensemble,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::Keyword,
        StrategyKind::Vector,
        StrategyKind::ParentDoc,
        StrategyKind::MultiQuery,
        StrategyKind::Rerank,
        StrategyKind::Ensemble,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Keyword => "keyword",
            StrategyKind::Vector => "vector",
            StrategyKind::ParentDoc => "parent_doc",
            StrategyKind::MultiQuery => "multi_query",
            StrategyKind::Rerank => "rerank",
            StrategyKind::Ensemble => "ensemble",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "keyword" => Ok(StrategyKind::Keyword),
            "vector" => Ok(StrategyKind::Vector),
            "parent_doc" => Ok(StrategyKind::ParentDoc),
            "multi_query" => Ok(StrategyKind::MultiQuery),
            "rerank" => Ok(StrategyKind::Rerank),
            "ensemble" => Ok(StrategyKind::Ensemble),
            other => Err(AppError::StrategyUnknown {
                name: other.to_owned(),
                known: StrategyKind::ALL.iter().map(|k| k.as_str().to_owned()).collect(),
            }),
        }
    }
}
