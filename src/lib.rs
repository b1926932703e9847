//! Schema-graph query routing over SQLite-backed entity tables.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod bench_utils;
pub mod cache;
pub mod config;
pub mod errors;
pub mod filter;
pub mod graph;
pub mod path;
pub mod record;
pub mod router;
pub mod schema;
pub mod segment;
pub mod storage;
pub mod table;

pub use crate::cache::RequestId;
pub use crate::config::{RouterConfig, StorageKind};
pub use crate::errors::SchemaRouteError;
pub use crate::filter::{Condition, Filter, FilterParams, Lookup};
pub use crate::graph::{SchemaGraph, SchemaNode};
pub use crate::path::{Path, PathFinder, PathHop, SearchState, SearchStrategy};
pub use crate::record::{Record, ResultSet};
pub use crate::router::{QueryRouter, RouteRequest};
pub use crate::schema::{EntityConfig, EntityKind, SchemaDescription};
pub use crate::segment::{ChainSegment, IntermediateSegment, JunctionSide, PathSegmenter, Segment};
pub use crate::storage::{SqliteStore, StorageAdapter};
pub use crate::table::{EntityTable, TableRegistry};
