//! Splitting a found [`Path`] into executable segments and running them.
//!
//! A chain segment covers consecutive plain entities and resolves in one nested
//! foreign-key filter. An intermediate segment crosses a single polymorphic junction,
//! whose rows carry an owner key plus a `(type, id)` pair instead of a second
//! foreign key.

use log::{debug, warn};

use crate::{
    cache::RequestId,
    errors::SchemaRouteError,
    filter::{Condition, Filter},
    path::{Path, PathHop},
    record::ResultSet,
    schema::PolymorphicFields,
    table::{EntityTable, TableRegistry},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainSegment {
    nodes: Vec<PathHop>,
}

impl ChainSegment {
    /// `nodes` in path order: the entity to return first, the input entity last.
    pub fn new(nodes: Vec<PathHop>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[PathHop] {
        &self.nodes
    }

    /// Foreign-key fields of every node but the last, in order.
    pub fn field_path(&self) -> Result<Vec<String>, SchemaRouteError> {
        let Some((_, leading)) = self.nodes.split_last() else {
            return Ok(Vec::new());
        };
        leading
            .iter()
            .map(|hop| {
                hop.foreign_key.clone().ok_or_else(|| {
                    SchemaRouteError::schema(format!(
                        "{} has no foreign key towards the next hop",
                        hop.entity_type
                    ))
                })
            })
            .collect()
    }

    pub fn filter_for(&self, input: &ResultSet) -> Result<Filter, SchemaRouteError> {
        let path = self.field_path()?;
        Ok(Filter::all().include(Condition::ids_in(&path, &input.ids())))
    }

    pub fn execute(
        &self,
        registry: &TableRegistry,
        input: &ResultSet,
        request: &RequestId,
    ) -> Result<ResultSet, SchemaRouteError> {
        let Some(first) = self.nodes.first() else {
            return Ok(ResultSet::empty(input.entity()));
        };
        let table = registry.get(&first.entity_type)?;
        let filter = self.filter_for(input)?;
        debug!("chain segment on {}: {filter}", first.entity_type);
        table.filter(&filter, Some(request))
    }
}

/// Which side of a junction a neighbouring entity sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JunctionSide {
    /// The neighbour is the junction's dependent table, linked by a plain key.
    Owning,
    /// The neighbour is referenced through the `(type, id)` pair.
    Polymorphic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntermediateSegment {
    predecessor: Option<PathHop>,
    junction: PathHop,
    successor: Option<PathHop>,
}

impl IntermediateSegment {
    /// `predecessor` is the hop on the source side of the junction, `successor`
    /// the hop on the target side.
    pub fn new(predecessor: Option<PathHop>, junction: PathHop, successor: Option<PathHop>) -> Self {
        Self {
            predecessor,
            junction,
            successor,
        }
    }

    pub fn predecessor(&self) -> Option<&PathHop> {
        self.predecessor.as_ref()
    }

    pub fn junction(&self) -> &PathHop {
        &self.junction
    }

    pub fn successor(&self) -> Option<&PathHop> {
        self.successor.as_ref()
    }

    pub fn side_of(junction: &EntityTable, neighbour: &str) -> JunctionSide {
        if junction.dependent_table() == Some(neighbour) {
            JunctionSide::Owning
        } else {
            JunctionSide::Polymorphic
        }
    }

    /// Filter selecting junction rows linked to `input`, the predecessor's rows.
    /// `None` when the junction is the first hop of the path.
    pub fn junction_filter(
        &self,
        registry: &TableRegistry,
        input: &ResultSet,
    ) -> Result<Option<Filter>, SchemaRouteError> {
        let Some(predecessor) = &self.predecessor else {
            return Ok(None);
        };
        let junction = registry.get(&self.junction.entity_type)?;
        let ids = input.ids();
        let filter = match Self::side_of(&junction, &predecessor.entity_type) {
            JunctionSide::Owning => {
                Filter::all().include(Condition::field_in(owner_field(&junction)?, &ids))
            }
            JunctionSide::Polymorphic => {
                let poly = polymorphic(&junction)?;
                let model = registry.get(&predecessor.entity_type)?.discriminator();
                Filter::all()
                    .include(Condition::equals(&poly.type_field, model.into()))
                    .include(Condition::field_in(&poly.id_field, &ids))
            }
        };
        Ok(Some(filter))
    }

    pub fn execute(
        &self,
        registry: &TableRegistry,
        input: &ResultSet,
        request: &RequestId,
    ) -> Result<ResultSet, SchemaRouteError> {
        let junction = registry.get(&self.junction.entity_type)?;
        if self.predecessor.is_none() && self.successor.is_none() {
            warn!(
                "junction {} has neither predecessor nor successor on its path",
                junction.name()
            );
            return Ok(ResultSet::empty(junction.name()));
        }

        let mut current = input.clone();
        // An adjacent junction before this one already hands over our own rows.
        let arrived = input.entity() == junction.name();
        let filter = if arrived {
            None
        } else {
            self.junction_filter(registry, input)?
        };
        match (&self.predecessor, filter) {
            (Some(predecessor), Some(filter)) => {
                registry
                    .get(&predecessor.entity_type)?
                    .store_result(request, input.clone());
                debug!("intermediate segment on {}: {filter}", junction.name());
                current = junction.filter(&filter, Some(request))?;
            }
            _ => junction.store_result(request, input.clone()),
        }

        if let Some(successor) = &self.successor {
            let target = registry.get(&successor.entity_type)?;
            let ids = match Self::side_of(&junction, &successor.entity_type) {
                JunctionSide::Owning => current.values(owner_field(&junction)?),
                JunctionSide::Polymorphic => {
                    let poly = polymorphic(&junction)?;
                    let narrowed = junction.refine(
                        request,
                        &Filter::all()
                            .include(Condition::equals(&poly.type_field, target.discriminator().into())),
                    )?;
                    narrowed.values(&poly.id_field)
                }
            };
            current = target.filter(&Filter::by_ids(&ids), Some(request))?;
        }
        Ok(current)
    }
}

fn owner_field(junction: &EntityTable) -> Result<&str, SchemaRouteError> {
    let dependent = junction.dependent_table().ok_or_else(|| {
        SchemaRouteError::schema(format!("junction {} has no dependent table", junction.name()))
    })?;
    junction.related_field(dependent).ok_or_else(|| {
        SchemaRouteError::schema(format!(
            "junction {} has no foreign key to {dependent}",
            junction.name()
        ))
    })
}

fn polymorphic(junction: &EntityTable) -> Result<&PolymorphicFields, SchemaRouteError> {
    junction.polymorphic_fields().ok_or_else(|| {
        SchemaRouteError::schema(format!("{} is not a junction", junction.name()))
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Chain(ChainSegment),
    Intermediate(IntermediateSegment),
}

impl Segment {
    /// Path hops this segment covers; a junction's neighbours belong to the
    /// adjacent chains, not to the junction segment.
    pub fn nodes(&self) -> Vec<&PathHop> {
        match self {
            Segment::Chain(chain) => chain.nodes().iter().collect(),
            Segment::Intermediate(intermediate) => vec![intermediate.junction()],
        }
    }

    pub fn execute(
        &self,
        registry: &TableRegistry,
        input: &ResultSet,
        request: &RequestId,
    ) -> Result<ResultSet, SchemaRouteError> {
        match self {
            Segment::Chain(chain) => chain.execute(registry, input, request),
            Segment::Intermediate(intermediate) => intermediate.execute(registry, input, request),
        }
    }
}

pub struct PathSegmenter;

impl PathSegmenter {
    /// Splits `path` into segments in execution order: the segment touching the
    /// source comes first. Reversing the list gives the segments in path order.
    pub fn segment(path: &Path) -> Vec<Segment> {
        let hops = path.hops();
        let mut segments = Vec::new();
        let mut chain: Vec<PathHop> = Vec::new();
        for (idx, hop) in hops.iter().enumerate() {
            if !hop.intermediate {
                chain.push(hop.clone());
                continue;
            }
            if !chain.is_empty() {
                segments.push(Segment::Chain(ChainSegment::new(std::mem::take(&mut chain))));
            }
            // Hops run target -> source, so the node we arrive from sits at idx + 1.
            let predecessor = hops.get(idx + 1).cloned();
            let successor = idx.checked_sub(1).and_then(|i| hops.get(i)).cloned();
            segments.push(Segment::Intermediate(IntermediateSegment::new(
                predecessor,
                hop.clone(),
                successor,
            )));
        }
        if !chain.is_empty() {
            segments.push(Segment::Chain(ChainSegment::new(chain)));
        }
        segments.reverse();
        segments
    }
}
