pub mod ensemble;
pub mod keyword;
pub mod multi_query;
pub mod parent_doc;
pub mod rerank;
pub mod vector;

pub use ensemble::EnsembleStrategy;
pub use keyword::KeywordStrategy;
pub use multi_query::MultiQueryStrategy;
pub use parent_doc::ParentDocStrategy;
pub use rerank::RerankStrategy;
pub use vector::VectorStrategy;
