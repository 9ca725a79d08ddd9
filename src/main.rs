use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use configuration::{Config, LogFormat};
use core_types::{QueryLogEntry, ReportResult};
use database::catalog::ParamDefault;
use database::{ParamKind, QueryLogger, RequestContext, query_log, reports};

/// Caller label recorded in the query log for statements issued from the command line.
const CLI_CALLER: &str = "cli";

/// The main entry point for the crowdfunding tracker.
#[tokio::main]
async fn main() {
    // A missing .env file is fine; every setting has a default or an environment override.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Reporting and query layer for the crowdfunding tracker database.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    /// Overrides the log output style from the configuration file.
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply migrations and serve the HTTP API.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// List the available reports and their parameters.
    Reports,
    /// Run one report and print its rows.
    Report(ReportArgs),
    /// Inspect or prune the statement log.
    #[command(subcommand)]
    QueryLog(QueryLogCommand),
}

#[derive(Parser)]
struct ReportArgs {
    /// The report name (see `reports`), e.g. "top-donors".
    name: String,

    /// A report parameter as NAME=VALUE. May be repeated.
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Print the result as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum QueryLogCommand {
    /// The most recent log entries.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Aggregates per statement type and per caller.
    Stats,
    /// Entries whose statement text contains TERM.
    Search {
        term: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Delete entries older than the given number of days.
    Prune {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = configuration::load_config_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    let _guard = configuration::init_tracing(&config.logging)?;

    match cli.command {
        Commands::Serve => web_server::run_server(&config).await,
        Commands::Migrate => {
            let pool = database::connect(&config.database).await?;
            database::run_migrations(&pool).await?;
            tracing::info!(database = %config.database.name, "Migrations applied");
            println!("Migrations applied.");
            Ok(())
        }
        Commands::Reports => {
            print_catalog();
            Ok(())
        }
        Commands::Report(args) => handle_report(&config, args).await,
        Commands::QueryLog(command) => handle_query_log(&config, command).await,
    }
}

/// Connects and builds the execution context shared by every statement of one invocation.
async fn cli_context(config: &Config) -> anyhow::Result<RequestContext> {
    let pool = database::connect(&config.database).await?;
    let logger = Arc::new(QueryLogger::mysql(pool.clone(), config.query_log.enabled));
    let session = uuid::Uuid::new_v4().to_string();
    Ok(RequestContext::new(pool, logger, session, CLI_CALLER))
}

async fn handle_report(config: &Config, args: ReportArgs) -> anyhow::Result<()> {
    // Fail on a typo before touching the database.
    let report = reports::find(&args.name)
        .ok_or_else(|| anyhow::anyhow!("Unknown report '{}'. Run `reports` for the list.", args.name))?;
    let params = report.parse(args.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

    let ctx = cli_context(config).await?;
    let result = reports::run_with(&ctx, report, params).await?;
    tracing::info!(
        report = report.name,
        rows = result.len(),
        session = ctx.session_id(),
        caller = CLI_CALLER,
        "Report finished"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", report.title);
        println!("{}", result_table(&result));
        println!("{} row(s)", result.len());
    }
    Ok(())
}

async fn handle_query_log(config: &Config, command: QueryLogCommand) -> anyhow::Result<()> {
    let ctx = cli_context(config).await?;
    tracing::debug!(session = ctx.session_id(), caller = CLI_CALLER, "Connected");
    match command {
        QueryLogCommand::Recent { limit } => {
            let entries = query_log::recent(&ctx, limit).await?;
            println!("{}", entries_table(&entries));
        }
        QueryLogCommand::Stats => {
            println!("By statement type");
            println!("{}", result_table(&query_log::stats_by_type(&ctx).await?));
            println!("By caller");
            println!("{}", result_table(&query_log::stats_by_caller(&ctx).await?));
            let stats = ctx.logger().stats();
            println!(
                "This run: {} written, {} failed writes",
                stats.written, stats.failures
            );
        }
        QueryLogCommand::Search { term, limit } => {
            let entries = query_log::search(&ctx, &term, limit).await?;
            println!("{}", entries_table(&entries));
            println!("{} match(es)", entries.len());
        }
        QueryLogCommand::Prune { days } => {
            let deleted = query_log::prune(&ctx, days).await?;
            println!("Deleted {deleted} entries older than {days} day(s).");
        }
    }
    Ok(())
}

// ==============================================================================
// Rendering
// ==============================================================================

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn result_table(result: &ReportResult) -> Table {
    let mut table = new_table();
    table.set_header(result.columns.iter().map(String::as_str));
    for row in &result.rows {
        table.add_row(result.columns.iter().map(|column| {
            row.get(column)
                .map(ToString::to_string)
                .unwrap_or_default()
        }));
    }
    table
}

fn entries_table(entries: &[QueryLogEntry]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["id", "executed at", "type", "caller", "seconds", "rows", "statement"]);
    for entry in entries {
        table.add_row(vec![
            entry.id.to_string(),
            entry.executed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.query_type.clone(),
            entry.caller.clone(),
            format!("{:.6}", entry.elapsed_seconds),
            entry.affected_rows.to_string(),
            entry.query_text.clone(),
        ]);
    }
    table
}

fn print_catalog() {
    let mut table = new_table();
    table.set_header(vec!["report", "title", "parameters"]);
    for report in reports::REPORTS {
        let params = report
            .params
            .iter()
            .map(|spec| {
                let kind = match spec.kind {
                    ParamKind::Int { min, max } => format!("int {min}..={max}"),
                    ParamKind::Text { max_len } => format!("text <= {max_len}"),
                    ParamKind::Date => "date".to_string(),
                };
                match spec.default {
                    ParamDefault::Required => format!("{} ({kind}, required)", spec.name),
                    ParamDefault::Null => format!("{} ({kind}, optional)", spec.name),
                    ParamDefault::Int(v) => format!("{} ({kind}, default {v})", spec.name),
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![report.name, report.title, params.as_str()]);
    }
    println!("{table}");
}
