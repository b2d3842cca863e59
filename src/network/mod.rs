//! Person network exploration: data sources, the BFS engine, traversal
//! strategies, and the visual encodings applied to the finished graph.

pub mod builder;
pub mod cache;
pub mod curvature;
pub mod explorer;
pub mod importance;
pub mod interpret;
pub mod layout;
pub mod memory;
pub mod model;
pub mod query;
pub mod reciprocal;
pub mod source;
pub mod sqlite;
pub mod strategy;
pub mod traversal;

pub use cache::CachedSource;
pub use explorer::Explorer;
pub use memory::MemorySource;
pub use model::{
    Edge, EdgeRow, GraphDocument, GraphMetrics, Interpretation, Node, NodeKind, PersonId,
    PersonRecord, RelationType,
};
pub use query::{ExploreContext, ExploreQuery, ExploreRequest};
pub use source::NetworkSource;
pub use sqlite::SqliteSource;
pub use strategy::{SharedStrategyConfig, StrategyKind, StrategyOverride, TraversalStrategy};
