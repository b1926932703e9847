//! Entry point: resolve "records of `target` related to the `source` records matching
//! these parameters" by finding a path, splitting it into segments and folding them
//! over the filtered source set.

use std::sync::Arc;

use log::{debug, info};

use crate::{
    cache::RequestId,
    config::RouterConfig,
    errors::SchemaRouteError,
    filter::{Filter, FilterParams},
    graph::SchemaGraph,
    path::{Path, PathFinder, SearchStrategy},
    record::ResultSet,
    segment::PathSegmenter,
    table::TableRegistry,
};

const TARGET_SEPARATOR: char = '-';

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRequest {
    pub target: String,
    /// Entity the parameters apply to; `None` means the target itself.
    pub source: Option<String>,
    pub params: FilterParams,
    pub request_id: RequestId,
}

impl RouteRequest {
    pub fn new<T: Into<String>>(target: T) -> Self {
        Self {
            target: target.into(),
            source: None,
            params: FilterParams::new(),
            request_id: RequestId::generate(),
        }
    }

    /// Parses the combined `Target-Source` form; a bare `Target` has no source.
    pub fn parse_target(spec: &str) -> Result<Self, SchemaRouteError> {
        let (target, source) = match spec.split_once(TARGET_SEPARATOR) {
            Some((target, source)) => (target.trim(), Some(source.trim())),
            None => (spec.trim(), None),
        };
        if target.is_empty() || source.is_some_and(str::is_empty) {
            return Err(SchemaRouteError::invalid_input(format!(
                "malformed target {spec:?}, expected Target or Target-Source"
            )));
        }
        let mut request = Self::new(target);
        request.source = source.map(str::to_string);
        Ok(request)
    }

    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: FilterParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.target)
    }
}

pub struct QueryRouter {
    graph: SchemaGraph,
    registry: TableRegistry,
    strategy: SearchStrategy,
}

impl QueryRouter {
    pub fn new(graph: SchemaGraph, registry: TableRegistry, strategy: SearchStrategy) -> Self {
        info!(
            "query router ready: {} schema nodes, {:?} search",
            graph.len(),
            strategy
        );
        Self {
            graph,
            registry,
            strategy,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Result<Self, SchemaRouteError> {
        let description = Arc::new(config.load_schema()?);
        let graph = SchemaGraph::from_description(&description)?;
        let store = config.open_store(description)?;
        Ok(Self::new(graph, TableRegistry::from_store(store), config.search))
    }

    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Cheapest path from `source` to `target`, hops listed target first.
    /// Empty when `target` is unreachable.
    pub fn find_path(&self, source: &str, target: &str) -> Result<Path, SchemaRouteError> {
        PathFinder::new(&self.graph, self.strategy).find(source, target)
    }

    pub fn resolve(&self, request: &RouteRequest) -> Result<ResultSet, SchemaRouteError> {
        let filter = Filter::from_params(&request.params)?;
        let source = request.source_name();
        let target = request.target.as_str();
        let request_id = &request.request_id;

        if source == target {
            return self.registry.get(target)?.filter(&filter, Some(request_id));
        }

        let path = self.find_path(source, target)?;
        if path.is_empty() {
            return Err(SchemaRouteError::no_route(source, target));
        }
        let segments = PathSegmenter::segment(&path);
        debug!(
            "request {request_id}: {path} in {} segment(s)",
            segments.len()
        );

        let mut current = self.registry.get(source)?.filter(&filter, Some(request_id))?;
        for segment in &segments {
            current = segment.execute(&self.registry, &current, request_id)?;
        }
        Ok(current)
    }

    /// Releases every cached result set held for `request`.
    pub fn discard_request(&self, request: &RequestId) {
        self.registry.discard_request(request);
    }
}
