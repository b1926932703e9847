use std::{path::PathBuf, process};

use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};

use schemaroute::{
    FilterParams, QueryRouter, RouteRequest, RouterConfig, SchemaRouteError, SearchStrategy,
    StorageKind,
};

/// Resolve related records across a schema graph of SQLite entity tables
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema description (JSON); falls back to SCHEMAROUTE_SCHEMA
    #[arg(long)]
    schema: Option<PathBuf>,

    /// `memory` or a SQLite database path; falls back to SCHEMAROUTE_DATABASE
    #[arg(long)]
    db: Option<String>,

    /// Path search heuristic: astar or dijkstra
    #[arg(long)]
    search: Option<SearchStrategy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the cheapest path between two entity types
    Path {
        #[arg(long)]
        target: String,
        #[arg(long)]
        source: Option<String>,
    },
    /// Resolve target records related to the source records matching the filters
    Query {
        #[arg(long)]
        target: String,
        #[arg(long)]
        source: Option<String>,
        /// Filters as `field=value` or `field=op:value`
        filters: Vec<String>,
    },
    /// Insert one record and print its id
    Insert {
        #[arg(long)]
        entity: String,
        /// Fields as `field=value`
        fields: Vec<String>,
    },
    /// List entity types with their heights
    Entities,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };
    let router = match QueryRouter::from_config(&config) {
        Ok(router) => router,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    if let Err(err) = run_command(&router, &cli.command) {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn build_config(cli: &Cli) -> Result<RouterConfig, SchemaRouteError> {
    let mut config = RouterConfig::from_env()?;
    if let Some(schema) = &cli.schema {
        config.schema_path = Some(schema.clone());
    }
    if let Some(db) = &cli.db {
        config.storage = StorageKind::parse(db);
    }
    if let Some(search) = cli.search {
        config.search = search;
    }
    Ok(config)
}

fn run_command(router: &QueryRouter, command: &Command) -> Result<(), SchemaRouteError> {
    match command {
        Command::Path { target, source } => {
            let source = source.as_deref().unwrap_or(target);
            let path = router.find_path(source, target)?;
            if path.is_empty() {
                return Err(SchemaRouteError::no_route(source, target.as_str()));
            }
            println!("{path}");
            println!("distance={}", path.total_distance());
            Ok(())
        }
        Command::Query {
            target,
            source,
            filters,
        } => {
            let mut request = RouteRequest::new(target.as_str()).with_params(parse_pairs(filters)?);
            request.source = source.clone();
            let result = router.resolve(&request);
            router.discard_request(&request.request_id);
            let result = result?;
            let output = json!({
                "entity": result.entity(),
                "count": result.len(),
                "records": result.records(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output)
                    .map_err(|e| SchemaRouteError::invalid_input(e.to_string()))?
            );
            Ok(())
        }
        Command::Insert { entity, fields } => {
            let mut record = Map::new();
            for (key, raw) in parse_pairs(fields)? {
                let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                record.insert(key, value);
            }
            let id = router.registry().get(entity)?.create(&record)?;
            println!("{id}");
            Ok(())
        }
        Command::Entities => {
            for node in router.graph().nodes() {
                let kind = if node.is_intermediate() {
                    "intermediate"
                } else {
                    "plain"
                };
                println!("{} height={} type={kind}", node.name(), node.height());
            }
            Ok(())
        }
    }
}

fn parse_pairs(pairs: &[String]) -> Result<FilterParams, SchemaRouteError> {
    let mut params = FilterParams::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            SchemaRouteError::invalid_input(format!("expected field=value, got {pair:?}"))
        })?;
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}
