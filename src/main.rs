// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use gazetteer_edit::{changed_record_types, Aggregate, RecordValidator, Settings, SqliteStore};

/// Settings file, overridable with GAZETTEER_SETTINGS
const DEFAULT_SETTINGS: &str = "gazetteer.json";

fn main() -> Result<()> {
    // Logs go to stderr so they do not fight the terminal UI for stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let settings_path = env::var("GAZETTEER_SETTINGS").unwrap_or_else(|_| DEFAULT_SETTINGS.to_string());
    let settings = Settings::load_or_default(&settings_path)?;

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("import") => run_import(&settings, args.get(2))?,
        Some("check") => run_check(args.get(2), args.get(3))?,
        Some("validate") => run_validate(&settings, args.get(2))?,
        Some(other) => bail!("Unknown command: {} (expected import, check or validate)", other),
        None => run_ui_mode(&settings)?,
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

/// Load a JSON array of streets and properties into the database
fn run_import(settings: &Settings, file: Option<&String>) -> Result<()> {
    let file = file.context("Usage: gazetteer-edit import <aggregates.json>")?;
    let aggregates: Vec<Aggregate> = read_json(Path::new(file))?;

    let mut store = SqliteStore::open(&settings.database_path)
        .with_context(|| format!("Failed to open database {:?}", settings.database_path))?
        .with_actor(&settings.user_name);

    for aggregate in &aggregates {
        store.import(aggregate)?;
    }
    tracing::info!(count = aggregates.len(), db = ?settings.database_path, "Import complete");
    println!("Imported {} aggregates into {}", aggregates.len(), settings.database_path.display());

    Ok(())
}

/// Print the record types that differ between two copies of an aggregate
fn run_check(source: Option<&String>, current: Option<&String>) -> Result<()> {
    let (source, current) = match (source, current) {
        (Some(source), Some(current)) => (source, current),
        _ => bail!("Usage: gazetteer-edit check <source.json> <current.json>"),
    };
    let source: Aggregate = read_json(Path::new(source))?;
    let current: Aggregate = read_json(Path::new(current))?;
    if source.aggregate_type() != current.aggregate_type() {
        bail!("Cannot compare a {} with a {}", source.aggregate_type(), current.aggregate_type());
    }

    let changed = changed_record_types(&source, &current);
    if changed.is_empty() {
        println!("No changes");
    } else {
        for record_type in changed {
            println!("{:>2}  {}", record_type.code(), record_type.title());
        }
    }
    Ok(())
}

/// Validate one aggregate and print the report as JSON
fn run_validate(settings: &Settings, file: Option<&String>) -> Result<()> {
    let file = file.context("Usage: gazetteer-edit validate <aggregate.json>")?;
    let aggregate: Aggregate = read_json(Path::new(file))?;

    let report = RecordValidator::new(settings.profile()).validate(&aggregate);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_valid() {
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(settings: &Settings) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;

    let store = SqliteStore::open(&settings.database_path)
        .with_context(|| format!("Failed to open database {:?}", settings.database_path))?
        .with_actor(&settings.user_name);
    let controller = gazetteer_edit::EditController::new(store, settings);

    let mut app = ui::App::new(controller, runtime.handle().clone());
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_settings: &Settings) -> Result<()> {
    eprintln!("TUI mode not available");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: gazetteer-edit import | check | validate");
    std::process::exit(1);
}
