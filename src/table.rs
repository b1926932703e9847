//! [`EntityTable`] wraps one stored entity type: metadata from the schema description,
//! CRUD and filtering through the shared [`StorageAdapter`], and the per-request
//! result cache segments use to hand result sets to each other.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use serde_json::{Map, Value};

use crate::{
    cache::{RequestId, ResultCache},
    errors::SchemaRouteError,
    filter::{Condition, Filter},
    record::{Record, ResultSet},
    schema::{EntityConfig, EntityKind, PolymorphicFields},
    storage::StorageAdapter,
};

pub struct EntityTable {
    name: String,
    table_name: String,
    model_name: String,
    kind: EntityKind,
    dependent_table: Option<String>,
    foreign_keys: BTreeMap<String, String>,
    field_names: Vec<String>,
    polymorphic: Option<PolymorphicFields>,
    store: Arc<dyn StorageAdapter>,
    results: ResultCache,
}

impl EntityTable {
    pub fn new(name: &str, config: &EntityConfig, store: Arc<dyn StorageAdapter>) -> Self {
        Self {
            name: name.to_string(),
            table_name: config.table_name(name),
            model_name: config.model_name(name),
            kind: config.kind,
            dependent_table: config.dependent_table.clone(),
            foreign_keys: config.foreign_keys.clone(),
            field_names: config.fields.clone(),
            polymorphic: config.polymorphic_fields(),
            store,
            results: ResultCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dependent_table(&self) -> Option<&str> {
        self.dependent_table.as_deref()
    }

    pub fn foreign_keys(&self) -> &BTreeMap<String, String> {
        &self.foreign_keys
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn is_intermediate(&self) -> bool {
        self.kind == EntityKind::Intermediate
    }

    pub fn polymorphic_fields(&self) -> Option<&PolymorphicFields> {
        self.polymorphic.as_ref()
    }

    /// Field on this entity facing `neighbour`.
    pub fn related_field(&self, neighbour: &str) -> Option<&str> {
        self.foreign_keys.get(neighbour).map(String::as_str)
    }

    /// Value junction rows store in their type field when pointing at this entity.
    pub fn discriminator(&self) -> String {
        self.model_name.to_lowercase()
    }

    pub fn create(&self, fields: &Map<String, Value>) -> Result<i64, SchemaRouteError> {
        self.store.insert(&self.name, fields)
    }

    pub fn get(&self, filter: &Filter) -> Result<Option<Record>, SchemaRouteError> {
        let found = self.store.fetch(&self.name, filter)?;
        if found.len() > 1 {
            return Err(SchemaRouteError::multiple_results(format!(
                "{} records of {} match {filter}",
                found.len(),
                self.name
            )));
        }
        Ok(found.into_records().into_iter().next())
    }

    /// Runs `filter` against storage; with a request id the result also replaces
    /// that request's cached set.
    pub fn filter(
        &self,
        filter: &Filter,
        request: Option<&RequestId>,
    ) -> Result<ResultSet, SchemaRouteError> {
        let result = self.store.fetch(&self.name, filter)?;
        if let Some(request) = request {
            self.store_result(request, result.clone());
        }
        Ok(result)
    }

    pub fn all(&self) -> Result<ResultSet, SchemaRouteError> {
        self.filter(&Filter::all(), None)
    }

    pub fn none(&self) -> ResultSet {
        ResultSet::empty(&self.name)
    }

    /// Lowest record matching `filter` under `order_by`; a `-` prefix sorts that
    /// field descending. Ties fall back to the id.
    pub fn first(
        &self,
        filter: &Filter,
        order_by: &[&str],
    ) -> Result<Option<Record>, SchemaRouteError> {
        Ok(self.ordered(filter, order_by)?.into_iter().next())
    }

    /// Highest record matching `filter` under `order_by`.
    pub fn last(
        &self,
        filter: &Filter,
        order_by: &[&str],
    ) -> Result<Option<Record>, SchemaRouteError> {
        Ok(self.ordered(filter, order_by)?.pop())
    }

    fn ordered(&self, filter: &Filter, order_by: &[&str]) -> Result<Vec<Record>, SchemaRouteError> {
        let config = self.store.description().entity(&self.name)?;
        let keys = order_by
            .iter()
            .map(|key| {
                let (field, descending) = match key.strip_prefix('-') {
                    Some(field) => (field, true),
                    None => (*key, false),
                };
                if !config.has_column(field) {
                    return Err(SchemaRouteError::invalid_input(format!(
                        "{} has no field {field} to order by",
                        self.name
                    )));
                }
                Ok((field, descending))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut records = self.store.fetch(&self.name, filter)?.into_records();
        records.sort_by(|a, b| {
            keys.iter()
                .map(|(field, descending)| {
                    let order = compare_values(a.get(field).as_ref(), b.get(field).as_ref());
                    if *descending { order.reverse() } else { order }
                })
                .find(|order| order.is_ne())
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Narrows the request's cached set by `filter`, or filters the whole table
    /// when nothing is cached yet.
    pub fn refine(&self, request: &RequestId, filter: &Filter) -> Result<ResultSet, SchemaRouteError> {
        let scoped = match self.cached(request) {
            Some(current) => filter
                .clone()
                .include(Condition::ids_in(&[], &current.ids())),
            None => filter.clone(),
        };
        self.filter(&scoped, Some(request))
    }

    pub fn update(
        &self,
        filter: &Filter,
        fields: &Map<String, Value>,
        allow_multiple: bool,
    ) -> Result<ResultSet, SchemaRouteError> {
        let ids = self.matching_ids(filter, allow_multiple)?;
        self.store.update(&self.name, &ids, fields)?;
        self.store.fetch(&self.name, &Filter::by_ids(&ids))
    }

    pub fn delete(&self, filter: &Filter, allow_multiple: bool) -> Result<usize, SchemaRouteError> {
        let ids = self.matching_ids(filter, allow_multiple)?;
        self.store.delete(&self.name, &ids)
    }

    pub fn cached(&self, request: &RequestId) -> Option<ResultSet> {
        self.results.get(request)
    }

    pub fn store_result(&self, request: &RequestId, result: ResultSet) {
        self.results.insert(request.clone(), result);
    }

    pub fn discard(&self, request: &RequestId) {
        self.results.remove(request);
    }

    pub fn cached_requests(&self) -> usize {
        self.results.len()
    }

    fn matching_ids(&self, filter: &Filter, allow_multiple: bool) -> Result<Vec<i64>, SchemaRouteError> {
        let matches = self.store.fetch(&self.name, filter)?;
        if matches.is_empty() {
            return Err(SchemaRouteError::not_found(format!(
                "no {} record matches {filter}",
                self.name
            )));
        }
        if matches.len() > 1 && !allow_multiple {
            return Err(SchemaRouteError::multiple_results(format!(
                "{} records of {} match {filter}",
                matches.len(),
                self.name
            )));
        }
        Ok(matches.ids())
    }
}

/// Nulls sort first, then booleans, numbers and strings.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Every declared entity type's [`EntityTable`], built once from the store's schema.
pub struct TableRegistry {
    tables: BTreeMap<String, Arc<EntityTable>>,
    store: Arc<dyn StorageAdapter>,
}

impl TableRegistry {
    pub fn from_store(store: Arc<dyn StorageAdapter>) -> Self {
        let tables = store
            .description()
            .entities
            .iter()
            .map(|(name, config)| {
                let table = EntityTable::new(name, config, Arc::clone(&store));
                (name.clone(), Arc::new(table))
            })
            .collect();
        Self { tables, store }
    }

    pub fn get(&self, name: &str) -> Result<Arc<EntityTable>, SchemaRouteError> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaRouteError::not_found(format!("entity table {name}")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn store(&self) -> &Arc<dyn StorageAdapter> {
        &self.store
    }

    /// Drops every table's cached result set for `request`.
    pub fn discard_request(&self, request: &RequestId) {
        for table in self.tables.values() {
            table.discard(request);
        }
    }
}
