use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: i64,
    pub fields: Map<String, Value>,
}

impl Record {
    /// Value of `field`; `"id"` reads the record id.
    pub fn get(&self, field: &str) -> Option<Value> {
        if field == crate::schema::ID_FIELD {
            return Some(Value::from(self.id));
        }
        self.fields.get(field).cloned()
    }

    /// Reads `field` as a numeric id (`"id"` itself included).
    pub fn id_of(&self, field: &str) -> Option<i64> {
        if field == crate::schema::ID_FIELD {
            return Some(self.id);
        }
        match self.fields.get(field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Records of one entity type, unique by id and ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    entity: String,
    records: Vec<Record>,
}

impl ResultSet {
    pub fn new<T: Into<String>>(entity: T, mut records: Vec<Record>) -> Self {
        records.sort_by_key(|r| r.id);
        records.dedup_by_key(|r| r.id);
        Self {
            entity: entity.into(),
            records,
        }
    }

    pub fn empty<T: Into<String>>(entity: T) -> Self {
        Self::new(entity, Vec::new())
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn ids(&self) -> Vec<i64> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Distinct ids stored in `field` across the set, sorted.
    pub fn values(&self, field: &str) -> Vec<i64> {
        let mut values: Vec<i64> = self
            .records
            .iter()
            .filter_map(|r| r.id_of(field))
            .collect();
        values.sort_unstable();
        values.dedup();
        values
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(id: i64, owner: i64) -> Record {
        let mut fields = Map::new();
        fields.insert("owner".into(), json!(owner));
        Record { id, fields }
    }

    #[test]
    fn result_set_dedups_and_orders_by_id() {
        let set = ResultSet::new("Thing", vec![record(3, 1), record(1, 2), record(3, 1)]);
        assert_eq!(set.ids(), vec![1, 3]);
        assert_eq!(set.values("owner"), vec![1, 2]);
        assert_eq!(set.values("id"), vec![1, 3]);
    }

    #[test]
    fn get_reads_id_like_id_of() {
        let thing = record(4, 9);
        assert_eq!(thing.get("id"), Some(json!(4)));
        assert_eq!(thing.id_of("id"), Some(4));
        assert_eq!(thing.get("owner"), Some(json!(9)));
        assert_eq!(thing.get("missing"), None);
    }
}
