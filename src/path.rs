//! Cheapest-path search between two entity types.
//!
//! The search is best-first over a binary heap ordered by `g + h`, where `g` sums
//! configured neighbour distances and `h` is the height difference to the target
//! ([`SearchStrategy::AStar`]) or zero ([`SearchStrategy::Dijkstra`]). Per-node cost
//! and predecessor are kept in a [`SearchState`] owned by the caller, reset before
//! every run. Frontier ties go to the lower `g`, then to the lexicographically
//! smaller entity name.

use std::{cmp::Ordering, collections::BinaryHeap, fmt, str::FromStr};

use ahash::{AHashMap, AHashSet};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    errors::SchemaRouteError,
    graph::{SchemaGraph, SchemaNode},
};

/// One step of a found path: the entity, the field linking it to the next hop
/// towards the source, and its height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PathHop {
    pub entity_type: String,
    pub foreign_key: Option<String>,
    pub height: u32,
    pub intermediate: bool,
}

/// Hops ordered from the target back to the source. Empty means "no route".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Path {
    hops: Vec<PathHop>,
    distance: u64,
}

impl Path {
    pub fn from_hops(hops: Vec<PathHop>, distance: u64) -> Self {
        Self { hops, distance }
    }

    pub fn hops(&self) -> &[PathHop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn total_distance(&self) -> u64 {
        self.distance
    }

    pub fn target(&self) -> Option<&PathHop> {
        self.hops.first()
    }

    pub fn source(&self) -> Option<&PathHop> {
        self.hops.last()
    }

    pub fn entity_types(&self) -> Vec<&str> {
        self.hops.iter().map(|h| h.entity_type.as_str()).collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.entity_types().join(" <- "))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    #[default]
    AStar,
    Dijkstra,
}

impl SearchStrategy {
    fn estimate(&self, node: &SchemaNode, target: &SchemaNode) -> u64 {
        match self {
            SearchStrategy::AStar => u64::from(node.height().abs_diff(target.height())),
            SearchStrategy::Dijkstra => 0,
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = SchemaRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "astar" | "a*" => Ok(SearchStrategy::AStar),
            "dijkstra" => Ok(SearchStrategy::Dijkstra),
            other => Err(SchemaRouteError::invalid_input(format!(
                "unknown search strategy {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeState<'g> {
    /// Best known distance from the source; `None` is infinity.
    pub cost: Option<u64>,
    pub predecessor: Option<&'g str>,
}

impl<'g> NodeState<'g> {
    const UNVISITED: Self = NodeState {
        cost: None,
        predecessor: None,
    };
}

/// Per-search cost/predecessor table keyed by entity name.
#[derive(Debug, Default)]
pub struct SearchState<'g> {
    entries: AHashMap<&'g str, NodeState<'g>>,
}

impl<'g> SearchState<'g> {
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
        }
    }

    /// Puts every node of `graph` back to infinite cost with no predecessor.
    pub fn reset(&mut self, graph: &'g SchemaGraph) {
        self.entries.clear();
        for node in graph.nodes() {
            self.entries.insert(node.name(), NodeState::UNVISITED);
        }
    }

    pub fn get(&self, name: &str) -> NodeState<'g> {
        self.entries
            .get(name)
            .copied()
            .unwrap_or(NodeState::UNVISITED)
    }

    pub fn cost(&self, name: &str) -> Option<u64> {
        self.get(name).cost
    }

    pub fn predecessor(&self, name: &str) -> Option<&'g str> {
        self.get(name).predecessor
    }

    fn set(&mut self, name: &'g str, cost: u64, predecessor: Option<&'g str>) {
        self.entries.insert(
            name,
            NodeState {
                cost: Some(cost),
                predecessor,
            },
        );
    }
}

#[derive(Debug, PartialEq, Eq)]
struct FrontierEntry<'g> {
    estimate: u64,
    cost: u64,
    node: &'g str,
}

impl Ord for FrontierEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: invert so the cheapest entry pops first.
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.cost.cmp(&self.cost))
            .then_with(|| other.node.cmp(self.node))
    }
}

impl PartialOrd for FrontierEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct PathFinder<'g> {
    graph: &'g SchemaGraph,
    strategy: SearchStrategy,
}

impl<'g> PathFinder<'g> {
    pub fn new(graph: &'g SchemaGraph, strategy: SearchStrategy) -> Self {
        Self { graph, strategy }
    }

    pub fn find(&self, source: &str, target: &str) -> Result<Path, SchemaRouteError> {
        let mut state = SearchState::new();
        self.find_with(&mut state, source, target)
    }

    /// Searches `source -> target` using `state` as scratch space; the state is
    /// reset first, so it can be reused across calls.
    pub fn find_with(
        &self,
        state: &mut SearchState<'g>,
        source: &str,
        target: &str,
    ) -> Result<Path, SchemaRouteError> {
        let source_node = self.graph.get_node(source)?;
        let target_node = self.graph.get_node(target)?;
        state.reset(self.graph);
        state.set(source_node.name(), 0, None);

        let mut frontier = BinaryHeap::new();
        let mut settled: AHashSet<&'g str> = AHashSet::new();
        frontier.push(FrontierEntry {
            estimate: self.strategy.estimate(source_node, target_node),
            cost: 0,
            node: source_node.name(),
        });

        let mut reached = false;
        while let Some(entry) = frontier.pop() {
            if !settled.insert(entry.node) {
                continue;
            }
            if entry.node == target_node.name() {
                reached = true;
                break;
            }
            let current = self.graph.get_node(entry.node)?;
            for name in current.neighbours() {
                if settled.contains(name.as_str()) {
                    continue;
                }
                let Some(distance) = current.neighbour_distance(name) else {
                    continue;
                };
                let tentative = entry.cost + u64::from(distance);
                if state.cost(name).is_some_and(|known| known <= tentative) {
                    continue;
                }
                let neighbour = self.graph.get_node(name)?;
                state.set(neighbour.name(), tentative, Some(current.name()));
                frontier.push(FrontierEntry {
                    estimate: tentative + self.strategy.estimate(neighbour, target_node),
                    cost: tentative,
                    node: neighbour.name(),
                });
            }
        }

        if !reached {
            debug!("no route from {source} to {target}");
            return Ok(Path::default());
        }
        let path = self.reconstruct(state, target_node)?;
        debug!(
            "route {source} -> {target}: {path} (distance {})",
            path.total_distance()
        );
        Ok(path)
    }

    fn reconstruct(
        &self,
        state: &SearchState<'g>,
        target: &'g SchemaNode,
    ) -> Result<Path, SchemaRouteError> {
        let mut hops = Vec::new();
        let mut current = Some(target.name());
        while let Some(name) = current {
            let node = self.graph.get_node(name)?;
            let predecessor = state.predecessor(name);
            hops.push(node.path_data(predecessor));
            current = predecessor;
        }
        Ok(Path::from_hops(hops, state.cost(target.name()).unwrap_or(0)))
    }
}
