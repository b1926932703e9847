use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::schema::{EntityConfig, EntityKind, NeighbourConfig, SchemaDescription};

const MAX_DISTANCE: u32 = 5;

#[derive(Clone, Debug)]
pub enum SchemaShape {
    /// `E0 - E1 - ... - En`, each entity one level below the previous.
    Line,
    /// Every entity hangs off `E{(i - 1) / fanout}`.
    Tree { fanout: usize },
    /// A tree plus `extra` random cross links.
    Random { fanout: usize, extra: usize },
}

pub fn entity_name(idx: usize) -> String {
    format!("E{idx:04}")
}

/// Builds a valid plain-entity schema of `count` types. Each link is a column on
/// the higher-numbered entity pointing at the lower one; distances are drawn from `seed`.
pub fn generate_schema(shape: SchemaShape, count: usize, seed: u64) -> SchemaDescription {
    assert!(count > 1, "count must exceed 1");
    let mut rng = StdRng::seed_from_u64(seed);
    let mut parents = vec![None; count];
    let mut links = Vec::new();
    for child in 1..count {
        let parent = match shape {
            SchemaShape::Line => child - 1,
            SchemaShape::Tree { fanout } | SchemaShape::Random { fanout, .. } => {
                (child - 1) / fanout.max(1)
            }
        };
        parents[child] = Some(parent);
        links.push((parent, child));
    }
    if let SchemaShape::Random { extra, .. } = shape {
        for _ in 0..extra {
            let a = rng.gen_range(0..count);
            let b = rng.gen_range(0..count);
            let (low, high) = (a.min(b), a.max(b));
            if low != high && !links.contains(&(low, high)) {
                links.push((low, high));
            }
        }
    }

    let mut heights = vec![0u32; count];
    for child in 1..count {
        if let Some(parent) = parents[child] {
            heights[child] = heights[parent] + 1;
        }
    }

    let mut entities: BTreeMap<String, EntityConfig> = (0..count)
        .map(|idx| {
            let config = EntityConfig {
                foreign_keys: BTreeMap::new(),
                height: heights[idx],
                neighbours: Vec::new(),
                kind: EntityKind::Plain,
                dependent_table: None,
                table: None,
                model: None,
                fields: Vec::new(),
                polymorphic: None,
            };
            (entity_name(idx), config)
        })
        .collect();

    for (upper, lower) in links {
        // Never shorter than the height gap, so the A* estimate stays admissible.
        let distance = rng
            .gen_range(1..=MAX_DISTANCE)
            .max(heights[upper].abs_diff(heights[lower]));
        let upper_name = entity_name(upper);
        let lower_name = entity_name(lower);
        let column = upper_name.to_ascii_lowercase();
        if let Some(config) = entities.get_mut(&lower_name) {
            config.foreign_keys.insert(upper_name.clone(), column.clone());
            config.fields.push(column);
            config.neighbours.push(NeighbourConfig {
                name: upper_name.clone(),
                distance,
            });
        }
        if let Some(config) = entities.get_mut(&upper_name) {
            // Reverse relation: named after the child, stored in the child's column.
            config
                .foreign_keys
                .insert(lower_name.clone(), lower_name.to_ascii_lowercase());
            config.neighbours.push(NeighbourConfig {
                name: lower_name,
                distance,
            });
        }
    }
    SchemaDescription { entities }
}
