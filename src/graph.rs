//! Schema graph: one [`SchemaNode`] per entity type, edges weighted by the configured
//! neighbour distances. The graph is immutable once built; search state lives in
//! [`crate::path::SearchState`], so one graph can serve concurrent searches.

use std::collections::BTreeMap;

use log::{info, warn};

use crate::{
    errors::SchemaRouteError,
    path::PathHop,
    schema::{EntityConfig, EntityKind, SchemaDescription},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaNode {
    name: String,
    height: u32,
    neighbours: Vec<String>,
    distances: BTreeMap<String, u32>,
    foreign_keys: BTreeMap<String, String>,
    kind: EntityKind,
    dependent_table: Option<String>,
}

impl SchemaNode {
    pub fn from_config(name: &str, config: &EntityConfig) -> Self {
        let mut neighbours = Vec::with_capacity(config.neighbours.len());
        let mut distances = BTreeMap::new();
        for neighbour in &config.neighbours {
            if distances
                .insert(neighbour.name.clone(), neighbour.distance)
                .is_none()
            {
                neighbours.push(neighbour.name.clone());
            }
        }
        Self {
            name: name.to_string(),
            height: config.height,
            neighbours,
            distances,
            foreign_keys: config.foreign_keys.clone(),
            kind: config.kind,
            dependent_table: config.dependent_table.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn neighbours(&self) -> &[String] {
        &self.neighbours
    }

    /// Configured edge weight to `neighbour`; `None` means not adjacent (infinite).
    pub fn neighbour_distance(&self, neighbour: &str) -> Option<u32> {
        self.distances.get(neighbour).copied()
    }

    /// Field implementing the relationship towards `neighbour`.
    pub fn foreign_key_to(&self, neighbour: &str) -> Option<&str> {
        self.foreign_keys.get(neighbour).map(String::as_str)
    }

    pub fn is_intermediate(&self) -> bool {
        self.kind == EntityKind::Intermediate
    }

    pub fn dependent_table(&self) -> Option<&str> {
        self.dependent_table.as_deref()
    }

    /// Hop emitted for this node once the search settled on `predecessor`.
    pub fn path_data(&self, predecessor: Option<&str>) -> PathHop {
        PathHop {
            entity_type: self.name.clone(),
            foreign_key: predecessor
                .and_then(|p| self.foreign_key_to(p))
                .map(str::to_string),
            height: self.height,
            intermediate: self.is_intermediate(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SchemaGraph {
    nodes: BTreeMap<String, SchemaNode>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_description(description: &SchemaDescription) -> Result<Self, SchemaRouteError> {
        let mut graph = Self::new();
        for (name, config) in &description.entities {
            graph.add_entity(name, config);
        }
        graph.validate()?;
        info!("schema graph built with {} entity types", graph.len());
        Ok(graph)
    }

    /// Adds a node from its declarative record `{foreign_keys, height, neighbours, type, dependent_table}`.
    pub fn add_node(&mut self, name: &str, config: &serde_json::Value) -> Result<(), SchemaRouteError> {
        let config = EntityConfig::from_value(name, config)?;
        self.add_entity(name, &config);
        Ok(())
    }

    pub fn add_entity(&mut self, name: &str, config: &EntityConfig) {
        self.nodes
            .insert(name.to_string(), SchemaNode::from_config(name, config));
    }

    pub fn get_node(&self, name: &str) -> Result<&SchemaNode, SchemaRouteError> {
        self.nodes
            .get(name)
            .ok_or_else(|| SchemaRouteError::not_found(format!("schema node {name}")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SchemaNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every neighbour must be a node; intermediates must name a dependent table.
    pub fn validate(&self) -> Result<(), SchemaRouteError> {
        for node in self.nodes.values() {
            if let Some(missing) = node.neighbours.iter().find(|n| !self.contains(n)) {
                return Err(SchemaRouteError::schema(format!(
                    "{} lists unknown neighbour {missing}",
                    node.name
                )));
            }
            if !node.is_intermediate() {
                continue;
            }
            match node.dependent_table() {
                None => {
                    return Err(SchemaRouteError::schema(format!(
                        "intermediate {} has no dependent_table",
                        node.name
                    )));
                }
                Some(dependent) if !self.contains(dependent) => {
                    warn!(
                        "intermediate {} depends on {dependent}, which is not in the schema graph",
                        node.name
                    );
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
