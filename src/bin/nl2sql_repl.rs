//! Terminal front end for the NL2SQL explorer
//!
//! # Usage
//!
//! ```bash
//! nl2sql_repl --api-base http://127.0.0.1:8000
//! > top 10 players by pitches
//! > :retry
//! > :upload ./scores.csv
//! ```
//!
//! Anything that is not a `:command` is asked as a question.

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use nl2sql_explorer::config::parse_viewport;
use nl2sql_explorer::explorer_types::{Cell, Dataset, QuerySuccess, TablePreview};
use nl2sql_explorer::{
    AppEvent, ExplorerApp, ExplorerConfig, QueryResult, UploadFile, ValidationError, WindowKind,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nl2sql_repl")]
#[command(version = "0.1.0")]
#[command(about = "Ask questions of a tabular dataset in plain language")]
struct Cli {
    /// Query service base URL (overrides NL2SQL_API_BASE)
    #[arg(long, env = "NL2SQL_API_BASE")]
    api_base: Option<String>,

    /// Viewport size as WIDTHxHEIGHT (overrides NL2SQL_VIEWPORT)
    #[arg(long, env = "NL2SQL_VIEWPORT")]
    viewport: Option<String>,

    /// Maximum result rows printed per query
    #[arg(long, default_value_t = 20)]
    max_rows: usize,
}

enum Command {
    Ask(String),
    Retry,
    Demo,
    Upload(String),
    Schema,
    Examples,
    Preview,
    Health,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(':') else {
        return Command::Ask(line.to_string());
    };
    let (name, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    match name {
        "retry" => Command::Retry,
        "demo" => Command::Demo,
        "upload" => Command::Upload(arg.trim().to_string()),
        "schema" => Command::Schema,
        "examples" => Command::Examples,
        "preview" => Command::Preview,
        "health" => Command::Health,
        "help" => Command::Help,
        "quit" | "q" | "exit" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ExplorerConfig::from_env()?;
    if let Some(base) = cli.api_base.as_deref() {
        config = config.with_api_base(base)?;
    }
    if let Some(viewport) = cli.viewport.as_deref() {
        config = config.with_viewport(parse_viewport(viewport)?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut app = ExplorerApp::from_config(&config, tokio::runtime::Handle::current());
    tracing::info!(session_id = %app.session_id(), api = %config.api_base_url, "starting explorer");

    app.mount();
    app.settle().await;
    print_dataset(app.dataset().dataset(), app.dataset().schema_error());

    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;
    println!("{}", "Type a question, or :help for commands.".dimmed());

    loop {
        let line = match editor.readline(&"nl2sql> ".cyan().to_string()) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("failed to read input"),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        match parse_command(&line) {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Unknown(name) => println!("{} unknown command :{}", "?".yellow(), name),
            Command::Examples => {
                for (i, example) in app.example_prompts().iter().enumerate() {
                    println!("  {} {:<20} {}", format!("{}.", i + 1).dimmed(), example.label.bold(), example.prompt);
                }
            }
            Command::Ask(question) => {
                run(&mut app, AppEvent::Ask(question)).await;
                print_query(&app, cli.max_rows);
            }
            Command::Retry => {
                run(&mut app, AppEvent::Retry).await;
                print_query(&app, cli.max_rows);
            }
            Command::Demo => {
                run(&mut app, AppEvent::UseDemo).await;
                print_dataset_switch(&app);
            }
            Command::Upload(path) => {
                if path.is_empty() {
                    println!("{} usage: :upload <path>", "?".yellow());
                    continue;
                }
                match UploadFile::from_path(&path).await {
                    Ok(file) => {
                        run(&mut app, AppEvent::SelectFile(file)).await;
                        run(&mut app, AppEvent::OpenWindow(WindowKind::Upload)).await;
                        run(&mut app, AppEvent::Upload).await;
                        print_dataset_switch(&app);
                    }
                    Err(e) => println!("{} could not read {}: {}", "✗".red(), path, e),
                }
            }
            Command::Schema => {
                run(&mut app, AppEvent::RefreshSchema).await;
                print_dataset(app.dataset().dataset(), app.dataset().schema_error());
            }
            Command::Preview => {
                run(&mut app, AppEvent::LoadPreview).await;
                match app.preview().value() {
                    Some(preview) => print_preview(preview, cli.max_rows),
                    None => {
                        let message = app.preview().error().cloned().unwrap_or_default();
                        println!("{} {}", "✗".red(), message);
                    }
                }
            }
            Command::Health => {
                run(&mut app, AppEvent::CheckHealth).await;
                match app.health().value() {
                    Some(h) if h.ok => println!("{} service is up", "✓".green()),
                    Some(_) => println!("{} service answered but is not ok", "!".yellow()),
                    None => {
                        let message = app.health().error().cloned().unwrap_or_default();
                        println!("{} {}", "✗".red(), message);
                    }
                }
            }
        }
    }

    app.unmount();
    Ok(())
}

/// Send one event and wait for whatever it started
async fn run(app: &mut ExplorerApp, event: AppEvent) {
    match app.handle_event(event) {
        Ok(()) => app.settle().await,
        Err(ValidationError::EmptyQuestion) => {}
        Err(e) => println!("{} {}", "!".yellow(), e),
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_help() {
    println!("  {:<16} ask a question (default)", "<text>");
    println!("  {:<16} retry the last failed query", ":retry");
    println!("  {:<16} switch to the demo dataset", ":demo");
    println!("  {:<16} upload a CSV or Parquet file", ":upload <path>");
    println!("  {:<16} show the active table's columns", ":schema");
    println!("  {:<16} suggested questions", ":examples");
    println!("  {:<16} first rows of the active table", ":preview");
    println!("  {:<16} check the service is reachable", ":health");
    println!("  {:<16} exit", ":quit");
}

fn print_dataset(dataset: Option<&Dataset>, error: Option<&str>) {
    if let Some(error) = error {
        println!("{} {}", "✗".red(), error);
    }
    let Some(dataset) = dataset else {
        println!("{}", "No dataset loaded.".dimmed());
        return;
    };
    println!(
        "{} {} ({} rows, {}{})",
        "Dataset".bold(),
        dataset.table.cyan(),
        dataset.row_count,
        dataset.source,
        if dataset.filename.is_empty() {
            String::new()
        } else {
            format!(": {}", dataset.filename)
        }
    );
    for column in &dataset.columns {
        println!("  {:<24} {}", column.name, column.column_type.dimmed());
    }
}

fn print_dataset_switch(app: &ExplorerApp) {
    match app.dataset().error() {
        Some(error) => println!("{} {}", "✗".red(), error),
        None => print_dataset(app.dataset().dataset(), None),
    }
}

fn print_query(app: &ExplorerApp, max_rows: usize) {
    if let Some(error) = app.query().network_error() {
        println!("{} {}", "network:".red().bold(), error);
    }
    match app.query().result() {
        QueryResult::Idle | QueryResult::Loading => {}
        QueryResult::Success(success) => print_success(success, max_rows),
        QueryResult::Failure(failure) => {
            let kind = failure.error_kind.as_deref().unwrap_or("error");
            println!("{} [{}] {}", "✗".red(), kind, failure.message);
            if let Some(sql) = &failure.sql {
                println!("  {}", sql.dimmed());
            }
            if app.can_retry() {
                println!("{}", "  :retry to try again".dimmed());
            }
        }
    }
}

fn print_success(success: &QuerySuccess, max_rows: usize) {
    println!("{}", success.sql.green());
    if let Some(at) = success.timestamp {
        println!("{}", format!("  answered {}", at.format("%H:%M:%S UTC")).dimmed());
    }
    if let Some(confidence) = success.confidence() {
        println!("{}", format!("  confidence {:.2}", confidence).dimmed());
    }
    print_table(&success.columns, &success.rows, max_rows);
}

fn print_preview(preview: &TablePreview, max_rows: usize) {
    println!("{} {}", "Preview".bold(), preview.table.cyan());
    print_table(&preview.columns, &preview.rows, max_rows);
}

fn print_table(columns: &[String], rows: &[Vec<Cell>], max_rows: usize) {
    println!("{}", columns.join(" | ").bold());
    for row in rows.iter().take(max_rows) {
        let cells: Vec<String> = row.iter().map(Cell::to_string).collect();
        println!("{}", cells.join(" | "));
    }
    if rows.len() > max_rows {
        println!("{}", format!("... {} more rows", rows.len() - max_rows).dimmed());
    }
    println!("{}", format!("({} rows)", rows.len()).dimmed());
}
