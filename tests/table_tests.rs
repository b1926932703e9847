use std::sync::Arc;

use serde_json::{Map, Value, json};
use schemaroute::{
    Condition, Filter, RequestId, SchemaDescription, SchemaRouteError, SqliteStore, TableRegistry,
    cache::ResultCache, record::ResultSet,
};

const SCHEMA: &str = r#"{
  "entities": {
    "Office": {
      "foreign_keys": {"Employee": "employees"},
      "height": 0,
      "neighbours": [{"name": "Employee", "distance": 1}],
      "type": "plain",
      "model": "Branch",
      "fields": ["name", "area"]
    },
    "Employee": {
      "foreign_keys": {"Office": "office"},
      "height": 1,
      "neighbours": [{"name": "Office", "distance": 1}],
      "type": "plain",
      "fields": ["name", "office", "grade"]
    }
  }
}"#;

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object")
}

fn registry() -> TableRegistry {
    let description = Arc::new(SchemaDescription::from_json_str(SCHEMA).expect("schema"));
    let store = SqliteStore::open_in_memory(description).expect("store");
    TableRegistry::from_store(Arc::new(store))
}

#[test]
fn test_table_metadata_comes_from_schema() {
    let registry = registry();
    let office = registry.get("Office").expect("office");
    assert_eq!(office.name(), "Office");
    assert_eq!(office.table_name(), "office");
    assert_eq!(office.model_name(), "Branch");
    assert_eq!(office.discriminator(), "branch");
    assert_eq!(office.related_field("Employee"), Some("employees"));
    assert!(!office.is_intermediate());
    assert_eq!(office.field_names(), ["name".to_string(), "area".to_string()]);

    let names: Vec<&str> = registry.names().collect();
    assert_eq!(names, vec!["Employee", "Office"]);
}

#[test]
fn test_unknown_table_is_not_found() {
    let registry = registry();
    let err = registry.get("Region").err().expect("missing");
    assert!(matches!(err, SchemaRouteError::NotFound(_)));
}

#[test]
fn test_create_and_get_roundtrip() {
    let registry = registry();
    let office = registry.get("Office").expect("office");
    let id = office
        .create(&fields(json!({ "name": "HQ", "area": "North" })))
        .expect("create");
    let record = office
        .get(&Filter::by_ids(&[id]))
        .expect("get")
        .expect("present");
    assert_eq!(record.id, id);
    assert_eq!(record.get("name"), Some(json!("HQ")));
    assert_eq!(record.get("area"), Some(json!("North")));

    let none = office.get(&Filter::by_ids(&[id + 100])).expect("get");
    assert!(none.is_none());
}

#[test]
fn test_create_rejects_unknown_and_id_fields() {
    let registry = registry();
    let office = registry.get("Office").expect("office");
    let err = office
        .create(&fields(json!({ "name": "HQ", "budget": 3 })))
        .expect_err("unknown field");
    assert!(matches!(err, SchemaRouteError::InvalidInput(_)));
    let err = office
        .create(&fields(json!({ "id": 7 })))
        .expect_err("id");
    assert!(matches!(err, SchemaRouteError::InvalidInput(_)));
}

#[test]
fn test_get_with_several_matches_is_multiple_results() {
    let registry = registry();
    let office = registry.get("Office").expect("office");
    office.create(&fields(json!({ "area": "North" }))).expect("a");
    office.create(&fields(json!({ "area": "North" }))).expect("b");
    let err = office
        .get(&Filter::all().include(Condition::equals("area", json!("North"))))
        .expect_err("two rows");
    assert!(matches!(err, SchemaRouteError::MultipleResults(_)));
}

#[test]
fn test_update_and_delete_respect_cardinality() {
    let registry = registry();
    let employee = registry.get("Employee").expect("employee");
    let ann = employee
        .create(&fields(json!({ "name": "Ann", "grade": 1 })))
        .expect("ann");
    employee
        .create(&fields(json!({ "name": "Bob", "grade": 1 })))
        .expect("bob");
    let grade_one = Filter::all().include(Condition::equals("grade", json!(1)));

    let err = employee
        .update(&grade_one, &fields(json!({ "grade": 2 })), false)
        .expect_err("two rows");
    assert!(matches!(err, SchemaRouteError::MultipleResults(_)));

    let updated = employee
        .update(&grade_one, &fields(json!({ "grade": 2 })), true)
        .expect("update");
    assert_eq!(updated.len(), 2);
    assert!(updated.records().iter().all(|r| r.get("grade") == Some(json!(2))));

    let err = employee
        .update(&grade_one, &fields(json!({ "grade": 3 })), true)
        .expect_err("nothing left");
    assert!(matches!(err, SchemaRouteError::NotFound(_)));

    let removed = employee.delete(&Filter::by_ids(&[ann]), false).expect("delete");
    assert_eq!(removed, 1);
    assert_eq!(employee.all().expect("all").len(), 1);

    let err = employee.delete(&Filter::by_ids(&[ann]), false).expect_err("gone");
    assert!(matches!(err, SchemaRouteError::NotFound(_)));
}

#[test]
fn test_filter_caches_per_request() {
    let registry = registry();
    let office = registry.get("Office").expect("office");
    office.create(&fields(json!({ "area": "North" }))).expect("north");
    office.create(&fields(json!({ "area": "South" }))).expect("south");
    let first = RequestId::new("first");
    let second = RequestId::new("second");

    let north = office
        .filter(
            &Filter::all().include(Condition::equals("area", json!("North"))),
            Some(&first),
        )
        .expect("north");
    let all = office.filter(&Filter::all(), Some(&second)).expect("all");
    office.filter(&Filter::all(), None).expect("uncached");

    assert_eq!(office.cached(&first), Some(north.clone()));
    assert_eq!(office.cached(&second), Some(all));
    assert_eq!(office.cached_requests(), 2);

    let refined = office
        .refine(&second, &Filter::all().include(Condition::equals("area", json!("South"))))
        .expect("refine");
    assert_eq!(refined.ids(), vec![2]);
    assert_eq!(office.cached(&second), Some(refined));

    registry.discard_request(&first);
    assert!(office.cached(&first).is_none());
    assert_eq!(office.cached_requests(), 1);
    assert_eq!(north.ids(), vec![1]);
}

#[test]
fn test_result_cache_keys_are_independent() {
    let cache = ResultCache::new();
    let a = RequestId::new("a");
    assert!(cache.get(&a).is_none());
    cache.insert(a.clone(), ResultSet::empty("Office"));
    cache.insert(RequestId::generate(), ResultSet::empty("Employee"));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&a).map(|r| r.entity().to_string()), Some("Office".into()));
    assert!(cache.remove(&a).is_some());
    assert_eq!(cache.len(), 1);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_generated_request_ids_differ() {
    assert_ne!(RequestId::generate(), RequestId::generate());
    assert_eq!(RequestId::new("req-1").as_str(), "req-1");
    assert_eq!(RequestId::new("req-1").to_string(), "req-1");
}

#[test]
fn test_first_and_last_follow_order_by() {
    let registry = registry();
    let employee = registry.get("Employee").expect("employee");
    for (name, grade) in [("Cid", 2), ("Ann", 3), ("Bob", 2)] {
        employee
            .create(&fields(json!({ "name": name, "grade": grade })))
            .expect("create");
    }
    let everyone = Filter::all();
    let name_of = |record: Option<schemaroute::Record>| {
        record
            .expect("record")
            .get("name")
            .and_then(|v| v.as_str().map(str::to_string))
    };

    let lowest = employee.first(&everyone, &["grade", "name"]).expect("first");
    assert_eq!(name_of(lowest), Some("Bob".into()));
    let highest = employee.last(&everyone, &["grade", "name"]).expect("last");
    assert_eq!(name_of(highest), Some("Ann".into()));
    let newest = employee.first(&everyone, &["-id"]).expect("first by id");
    assert_eq!(name_of(newest), Some("Bob".into()));

    let missing = employee
        .first(&Filter::by_ids(&[99]), &["name"])
        .expect("no match");
    assert!(missing.is_none());
    assert!(employee.none().is_empty());
    assert_eq!(employee.none().entity(), "Employee");

    let err = employee.first(&everyone, &["salary"]).expect_err("unknown field");
    assert!(matches!(err, SchemaRouteError::InvalidInput(_)));
}
