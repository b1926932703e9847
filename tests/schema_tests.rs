use rusqlite::Connection;
use serde_json::json;
use schemaroute::{
    SchemaDescription, SchemaGraph, SchemaRouteError,
    schema::{EntityKind, ensure_tables},
};

const OFFICE_SCHEMA: &str = r#"{
  "entities": {
    "Office": {
      "foreign_keys": {"Employee": "employees"},
      "height": 0,
      "neighbours": [{"name": "Employee", "distance": 1}],
      "type": "plain",
      "fields": ["name", "area"]
    },
    "Employee": {
      "foreign_keys": {"Office": "office"},
      "height": 1,
      "neighbours": [{"name": "Office", "distance": 1}, {"name": "Media", "distance": 1}],
      "type": "plain",
      "table": "staff",
      "fields": ["name", "office"]
    },
    "Media": {
      "foreign_keys": {"Asset": "asset"},
      "height": 2,
      "neighbours": [{"name": "Employee", "distance": 1}],
      "type": "intermediate",
      "dependent_table": "Asset",
      "fields": ["asset", "entity_type", "entity_id"]
    }
  }
}"#;

#[test]
fn test_description_parses_entities_and_defaults() {
    let description = SchemaDescription::from_json_str(OFFICE_SCHEMA).expect("schema");
    let names: Vec<&str> = description.names().collect();
    assert_eq!(names, vec!["Employee", "Media", "Office"]);

    let employee = description.entity("Employee").expect("employee");
    assert_eq!(employee.table_name("Employee"), "staff");
    assert_eq!(employee.model_name("Employee"), "Employee");
    assert_eq!(employee.kind, EntityKind::Plain);
    assert!(employee.polymorphic_fields().is_none());

    let media = description.entity("Media").expect("media");
    assert_eq!(media.table_name("Media"), "media");
    let poly = media.polymorphic_fields().expect("junction fields");
    assert_eq!(poly.type_field, "entity_type");
    assert_eq!(poly.id_field, "entity_id");
}

#[test]
fn test_unknown_entity_is_not_found() {
    let description = SchemaDescription::from_json_str(OFFICE_SCHEMA).expect("schema");
    let err = description.entity("Region").expect_err("unknown");
    assert!(matches!(err, SchemaRouteError::NotFound(_)));
}

#[test]
fn test_missing_height_is_schema_error() {
    let raw = r#"{"entities": {"Office": {"foreign_keys": {}, "neighbours": [], "type": "plain"}}}"#;
    let err = SchemaDescription::from_json_str(raw).expect_err("missing height");
    assert!(matches!(err, SchemaRouteError::SchemaError(_)));
}

#[test]
fn test_unknown_neighbour_is_schema_error() {
    let raw = r#"{"entities": {"Office": {
        "foreign_keys": {}, "height": 0, "type": "plain",
        "neighbours": [{"name": "Region", "distance": 1}]
    }}}"#;
    let err = SchemaDescription::from_json_str(raw).expect_err("unknown neighbour");
    assert!(matches!(err, SchemaRouteError::SchemaError(_)));
}

#[test]
fn test_junction_without_polymorphic_columns_is_schema_error() {
    let raw = r#"{"entities": {"Media": {
        "foreign_keys": {"Asset": "asset"}, "height": 0, "neighbours": [],
        "type": "intermediate", "dependent_table": "Asset", "fields": ["asset"]
    }}}"#;
    let err = SchemaDescription::from_json_str(raw).expect_err("missing columns");
    assert!(matches!(err, SchemaRouteError::SchemaError(_)));
}

#[test]
fn test_foreign_key_without_backing_column_is_schema_error() {
    let raw = r#"{"entities": {
        "Office": {"foreign_keys": {"Employee": "employees"}, "height": 0, "type": "plain",
                   "neighbours": [{"name": "Employee", "distance": 1}]},
        "Employee": {"foreign_keys": {"Office": "office"}, "height": 1, "type": "plain",
                     "neighbours": [{"name": "Office", "distance": 1}]}
    }}"#;
    let err = SchemaDescription::from_json_str(raw).expect_err("no office column");
    assert!(matches!(err, SchemaRouteError::SchemaError(_)));
}

#[test]
fn test_invalid_identifier_is_rejected() {
    let raw = r#"{"entities": {"Office": {
        "foreign_keys": {}, "height": 0, "neighbours": [], "type": "plain",
        "fields": ["name; DROP TABLE office"]
    }}}"#;
    let err = SchemaDescription::from_json_str(raw).expect_err("identifier");
    assert!(matches!(err, SchemaRouteError::SchemaError(_)));
}

#[test]
fn test_ensure_tables_creates_one_table_per_entity() {
    let description = SchemaDescription::from_json_str(OFFICE_SCHEMA).expect("schema");
    let conn = Connection::open_in_memory().expect("in-memory db");
    ensure_tables(&conn, &description).expect("tables");
    ensure_tables(&conn, &description).expect("idempotent");

    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name IN ('office', 'staff', 'media') ORDER BY name")
        .expect("prepare");
    let found: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(found, vec!["media", "office", "staff"]);
}

#[test]
fn test_graph_from_description_keeps_heights_and_distances() {
    let description = SchemaDescription::from_json_str(OFFICE_SCHEMA).expect("schema");
    let graph = SchemaGraph::from_description(&description).expect("graph");
    assert_eq!(graph.len(), 3);

    let employee = graph.get_node("Employee").expect("employee");
    assert_eq!(employee.height(), 1);
    assert_eq!(employee.neighbours(), ["Office".to_string(), "Media".to_string()]);
    assert_eq!(employee.neighbour_distance("Media"), Some(1));
    assert_eq!(employee.neighbour_distance("Employee"), None);
    assert_eq!(employee.foreign_key_to("Office"), Some("office"));

    let media = graph.get_node("Media").expect("media");
    assert!(media.is_intermediate());
    assert_eq!(media.dependent_table(), Some("Asset"));
}

#[test]
fn test_graph_add_node_rejects_malformed_record() {
    let mut graph = SchemaGraph::new();
    let err = graph
        .add_node("Office", &json!({ "height": "zero", "neighbours": [], "type": "plain" }))
        .expect_err("malformed");
    assert!(matches!(err, SchemaRouteError::SchemaError(_)));
    assert!(graph.is_empty());
}

#[test]
fn test_graph_validate_rejects_dangling_neighbour() {
    let mut graph = SchemaGraph::new();
    graph
        .add_node(
            "Office",
            &json!({
                "foreign_keys": {},
                "height": 0,
                "neighbours": [{ "name": "Region", "distance": 2 }],
                "type": "plain"
            }),
        )
        .expect("node");
    let err = graph.validate().expect_err("dangling");
    assert!(matches!(err, SchemaRouteError::SchemaError(_)));
}

#[test]
fn test_graph_validate_rejects_junction_without_dependent() {
    let mut graph = SchemaGraph::new();
    graph
        .add_node(
            "Media",
            &json!({ "foreign_keys": {}, "height": 0, "neighbours": [], "type": "intermediate" }),
        )
        .expect("node");
    let err = graph.validate().expect_err("no dependent");
    assert!(matches!(err, SchemaRouteError::SchemaError(_)));
}

#[test]
fn test_get_unknown_node_is_not_found() {
    let graph = SchemaGraph::new();
    let err = graph.get_node("Office").expect_err("missing");
    assert!(matches!(err, SchemaRouteError::NotFound(_)));
}
