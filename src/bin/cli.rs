//! dualstore CLI - Main entry point for CLI binary
//!
//! This binary provides the `dualstore` tool for compiling filters and running
//! retrieve/write/delete requests against a service's local store.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use dualstore_lib::engine::{
    adapter::{Backend, BackendKind, SqliteTableStore},
    batch::{ExecutionResult, ResultEnvelope, Verb},
    cli::{formatter::CliFormatter, BackendArg, Cli, Commands, OutputFormat, VerbArg},
    config::{BackendConfig, ConnectorConfig},
    error::ConnectorError,
    filter::{
        value::infer_literal, DocumentFilterCompiler, FieldMap, FilterCompiler, FilterParser, Params,
        PartitionedFilterCompiler,
    },
    nosql::LocalDocumentStore,
    resource::{Connector, RequestOptions},
};
use serde_json::Value;
use std::path::Path;
use tracing_subscriber::EnvFilter;

type DynConnector = Connector<Box<dyn Backend>>;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_output = cli.format == OutputFormat::Json;

    if let Err(e) = run_cli(cli) {
        match e.downcast_ref::<ConnectorError>().and_then(ConnectorError::context) {
            Some(context) if json_output => {
                let body = serde_json::json!({ "error": e.to_string(), "context": context });
                eprintln!("{}", body);
            }
            Some(context) => {
                CliFormatter::error(&format!("{:#}", e));
                eprintln!("{}", context);
            }
            None => CliFormatter::error(&format!("{:#}", e)),
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dualstore_lib=debug,info" } else { "dualstore_lib=info,warn" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn run_cli(cli: Cli) -> Result<()> {
    let project_dir = cli.get_project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init {
            name,
            backend,
            partition_key,
        } => cmd_init(&project_dir, &name, backend, partition_key, json_output),
        Commands::Compile {
            backend,
            table,
            filter,
            params,
            order_by,
        } => cmd_compile(backend, &table, &filter, &params, order_by.as_deref(), json_output),
        Commands::Query {
            table,
            filter,
            ids,
            params,
            fields,
            limit,
            order_by,
            partition_key,
            include_count,
        } => {
            let connector = open_connector(&project_dir)?;
            let options = RequestOptions {
                fields,
                filter,
                params: parse_params(&params)?,
                limit,
                order_by,
                partition_key,
                include_count,
                ..Default::default()
            };
            let envelope = match ids {
                Some(ids) => connector
                    .retrieve_by_ids(&table, &split_ids(&ids), &options)?
                    .envelope(),
                None => connector.retrieve_by_filter(&table, &options)?,
            };
            print_envelope(&envelope, json_output)
        }
        Commands::Write {
            table,
            verb,
            input,
            rollback,
            continue_on_error,
            fields,
            partition_key,
        } => {
            let connector = open_connector(&project_dir)?;
            let records = read_records(&input)?;
            let options = RequestOptions {
                fields,
                rollback,
                continue_on_error,
                partition_key,
                ..Default::default()
            };
            let result = connector.mutate_records(&table, verb_of(verb), records, &options)?;
            print_result(&result, json_output)
        }
        Commands::Delete {
            table,
            ids,
            filter,
            params,
            rollback,
            continue_on_error,
            partition_key,
        } => {
            let connector = open_connector(&project_dir)?;
            let options = RequestOptions {
                filter,
                params: parse_params(&params)?,
                rollback,
                continue_on_error,
                partition_key,
                ..Default::default()
            };
            let result = match ids {
                Some(ids) => connector.mutate_by_ids(&table, Verb::Delete, &split_ids(&ids), None, &options)?,
                None => connector.mutate_by_filter(&table, Verb::Delete, None, &options)?,
            };
            print_result(&result, json_output)
        }
    }
}

fn kind_of(backend: BackendArg) -> BackendKind {
    match backend {
        BackendArg::Table => BackendKind::Table,
        BackendArg::Document => BackendKind::Document,
    }
}

fn verb_of(verb: VerbArg) -> Verb {
    match verb {
        VerbArg::Create => Verb::Create,
        VerbArg::Replace => Verb::Replace,
        VerbArg::Patch => Verb::Patch,
        VerbArg::Delete => Verb::Delete,
        VerbArg::Get => Verb::Get,
    }
}

fn cmd_init(
    project_dir: &Path,
    name: &str,
    backend: BackendArg,
    partition_key: Option<String>,
    json: bool,
) -> Result<()> {
    std::fs::create_dir_all(project_dir)?;
    if project_dir.join(dualstore_lib::engine::config::CONFIG_FILE).exists() {
        bail!("Service already initialized in {}", project_dir.display());
    }

    let mut config = ConnectorConfig::default_for_service(name, kind_of(backend));
    if let BackendConfig::Table {
        default_partition_key, ..
    } = &mut config.backend
    {
        *default_partition_key = partition_key;
    }

    let store_path = config.backend_path(project_dir);
    match config.backend.kind() {
        BackendKind::Table => {
            if let Some(parent) = store_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            SqliteTableStore::new(&store_path)?;
        }
        BackendKind::Document => {
            LocalDocumentStore::open_or_create(&store_path)?;
        }
    }
    config.save(project_dir)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "success": true,
                "service": name,
                "backend": config.backend.kind(),
                "store": store_path.display().to_string(),
            })
        );
    } else {
        CliFormatter::success(&format!("Initialized service '{}'", name));
        CliFormatter::kv("backend", &config.backend.kind().to_string());
        CliFormatter::kv("store", &store_path.display().to_string());
    }
    Ok(())
}

fn cmd_compile(
    backend: BackendArg,
    table: &str,
    filter: &str,
    params: &[String],
    order_by: Option<&str>,
    json: bool,
) -> Result<()> {
    let kind = kind_of(backend);
    let params = parse_params(params)?;
    let fields = FieldMap::open_for(kind);

    let compiled = match kind {
        BackendKind::Document => {
            let compiler = DocumentFilterCompiler::new(table, &fields, &params);
            let compiled = compiler.compile_text(filter)?;
            let statement = compiler.select_statement(compiled.as_ref(), None, order_by);
            vec![(statement, compiled.map(|c| c.params).unwrap_or_default())]
        }
        BackendKind::Table => match FilterParser::new(&params).parse(filter)? {
            Some(node) => PartitionedFilterCompiler::new(&fields, &params)
                .compile_chunked(&node)?
                .into_iter()
                .map(|c| (c.native_filter, c.params))
                .collect(),
            None => Vec::new(),
        },
    };

    if json {
        let queries: Vec<Value> = compiled
            .iter()
            .map(|(native, bound)| serde_json::json!({ "native": native, "params": bound }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&queries)?);
    } else {
        CliFormatter::header(&format!("{} query", kind));
        for (native, bound) in &compiled {
            CliFormatter::item(native);
            for param in bound {
                CliFormatter::kv(&param.placeholder, &param.value.to_string());
            }
        }
    }
    Ok(())
}

fn open_connector(project_dir: &Path) -> Result<DynConnector> {
    let config = ConnectorConfig::load(project_dir)
        .with_context(|| format!("loading service config from {}", project_dir.display()))?;
    let store_path = config.backend_path(project_dir);
    let backend: Box<dyn Backend> = match config.backend.kind() {
        BackendKind::Table => Box::new(
            SqliteTableStore::new(&store_path)?.with_max_batch(config.limits.max_batch_operations),
        ),
        BackendKind::Document => Box::new(LocalDocumentStore::open_or_create(&store_path)?),
    };
    tracing::debug!(service = %config.service.name, backend = %config.backend.kind(), "opened store");
    Ok(Connector::configured(backend, &config))
}

/// `name=value` pairs, values typed the way filter literals are
fn parse_params(pairs: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid parameter '{}', expected NAME=VALUE", pair))?;
        params.insert(name.trim().to_string(), infer_literal(value.trim()));
    }
    Ok(params)
}

fn split_ids(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// A JSON object, an array of objects, or `{"resource": [...]}`
fn read_records(path: &Path) -> Result<Vec<serde_json::Map<String, Value>>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)?;
    let items = match value {
        Value::Object(mut object) => match object.remove("resource") {
            Some(Value::Array(items)) => items,
            Some(_) => bail!("'resource' must be an array"),
            None => vec![Value::Object(object)],
        },
        Value::Array(items) => items,
        _ => bail!("Input must be a JSON object or array"),
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(anyhow!("Expected a JSON object, found {}", other)),
        })
        .collect()
}

fn print_envelope(envelope: &ResultEnvelope, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(envelope)?);
    } else {
        CliFormatter::envelope(envelope);
    }
    Ok(())
}

fn print_result(result: &ExecutionResult, json: bool) -> Result<()> {
    print_envelope(&result.envelope(), json)
}
