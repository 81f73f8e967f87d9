use clap::{Parser, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use consentview::components::TableContainer;
use consentview::config::Config;
use consentview::core::{RowId, Table, TableSource};
use consentview::services::{ConsentService, Payload, VisualizationService, VisualizationStatus, VisualizationWorker};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Review extracted tables, redact rows and print the consent payload
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file holding one table source or an array of them
    #[arg(long = "input", value_name = "PATH")]
    input: PathBuf,
    /// Enable file logging at the given level (overrides RUST_LOG)
    #[arg(long = "logging", value_enum)]
    logging: Option<LogLevel>,
    /// Path to a config file (overrides default config discovery)
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Delete a batch of rows. Repeat per batch. Syntax: table=id,id,...
    #[arg(long = "delete", value_name = "BATCH")]
    delete: Vec<String>,
    /// Undo the most recent batch of every table this many times
    #[arg(long = "undo", default_value_t = 0)]
    undo: usize,
    /// Free-text search applied to every table
    #[arg(long = "query")]
    query: Option<String>,
    /// Only keep rows whose type-bearing cell equals this value
    #[arg(long = "type-filter")]
    type_filter: Option<String>,
    /// Print prepared visualization data instead of the consent payload
    #[arg(long = "visualizations")]
    visualizations: bool,
    /// Print the declined payload
    #[arg(long = "decline")]
    decline: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let level = match args.logging {
        Some(LogLevel::Error) => Some(tracing::Level::ERROR),
        Some(LogLevel::Warn) => Some(tracing::Level::WARN),
        Some(LogLevel::Info) => Some(tracing::Level::INFO),
        Some(LogLevel::Debug) => Some(tracing::Level::DEBUG),
        Some(LogLevel::Trace) => Some(tracing::Level::TRACE),
        None => None,
    };
    consentview::logging::init_with(None, level)?;

    let config = Config::from_path(args.config.as_ref()).wrap_err("failed to load configuration")?;
    let mut containers = load_tables(&args.input)?
        .into_iter()
        .map(|table| TableContainer::new(table, &config))
        .collect::<Vec<_>>();

    for arg in &args.delete {
        let (table_id, batch) = parse_batch(arg)?;
        let container = containers
            .iter_mut()
            .find(|c| c.table().id.as_str() == table_id)
            .ok_or_else(|| eyre!("no table with id '{table_id}'"))?;
        container.delete(batch);
    }
    for container in containers.iter_mut() {
        for _ in 0..args.undo {
            container.undo();
        }
        if let Some(query) = &args.query {
            container.set_query(query.clone(), std::time::Instant::now());
            container.flush();
        }
        if args.type_filter.is_some() {
            container.set_type_filter(args.type_filter.clone());
        }
    }

    if args.decline {
        ConsentService::decline(print_payload);
        return Ok(());
    }
    if args.visualizations {
        let output = prepare_visualizations(&mut containers, &config).await?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let tables: Vec<Table> = containers.iter().map(|c| c.table().clone()).collect();
    ConsentService::donate(&tables, print_payload)?;
    Ok(())
}

fn print_payload(payload: Payload) {
    match serde_json::to_string(&payload) {
        Ok(encoded) => println!("{encoded}"),
        Err(e) => warn!("Failed to encode payload: {e}"),
    }
}

fn load_tables(path: &PathBuf) -> Result<Vec<Table>> {
    let raw = std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let sources: Vec<TableSource> = match serde_json::from_str::<JsonValue>(&raw)? {
        JsonValue::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?,
        single => vec![serde_json::from_value(single)?],
    };
    let tables = sources
        .into_iter()
        .map(Table::from_source)
        .collect::<Result<Vec<_>, _>>()?;
    info!(tables = tables.len(), "Loaded consent tables");
    Ok(tables)
}

/// Parse `table=id,id,...` into a table id and a deletion batch
fn parse_batch(arg: &str) -> Result<(&str, Vec<RowId>)> {
    let (table_id, ids) = arg
        .split_once('=')
        .ok_or_else(|| eyre!("invalid --delete '{arg}', expected table=id,id,..."))?;
    let batch = ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(RowId::from)
        .collect();
    Ok((table_id.trim(), batch))
}

async fn prepare_visualizations(containers: &mut [TableContainer], config: &Config) -> Result<JsonValue> {
    let service = Arc::new(VisualizationService::new(config.stopwords()));
    let (worker, mut responses) = VisualizationWorker::spawn(service);

    let mut pending = 0usize;
    for container in containers.iter_mut() {
        for request in container.visualization_requests() {
            if worker.submit(request) {
                pending += 1;
            }
        }
    }
    debug!(pending, "Waiting for visualization responses");

    let by_table: HashMap<String, usize> = containers
        .iter()
        .enumerate()
        .map(|(i, c)| (c.table().id.to_string(), i))
        .collect();
    while pending > 0 {
        let Some(response) = responses.recv().await else {
            break;
        };
        pending -= 1;
        if let Some(&i) = by_table.get(response.key.table_id.as_str()) {
            containers[i].accept(response);
        }
    }
    worker.shutdown().await;

    let output = containers
        .iter()
        .map(|container| {
            let table = container.table();
            let visualizations: Vec<JsonValue> = table
                .visualizations()
                .iter()
                .zip(container.statuses())
                .map(|(descriptor, status)| {
                    let mut data = match status {
                        VisualizationStatus::Loading => json!({"status": "loading"}),
                        VisualizationStatus::Success(data) => json!({"status": "success", "data": data}),
                        VisualizationStatus::Error(e) => json!({"status": "error", "error": e}),
                    };
                    if let VisualizationStatus::Success(Some(consentview::core::VisualizationData::Text(text))) = status {
                        data["top"] = json!(text.top(config.visualization.max_words));
                    }
                    json!({
                        "type": descriptor.type_name(),
                        "title": descriptor.title().text(&config.locale),
                        "result": data,
                    })
                })
                .collect();
            json!({"table": table.id, "visualizations": visualizations})
        })
        .collect::<Vec<_>>();
    Ok(JsonValue::Array(output))
}
