//! tablecopy CLI - cross-dialect SQL table replication.

mod report;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tablecopy::{
    connect, Config, CopyError, Endpoint, EventSink, IncrementalFilter, Orchestrator, RunPlan,
    TableJob,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "tablecopy")]
#[command(about = "Copy tables between SQLite, MySQL, PostgreSQL, SQL Server and Oracle")]
#[command(version)]
struct Cli {
    /// Path to the JSON or YAML configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    config: PathBuf,

    /// Write the run summary as JSON to this path
    #[arg(long, global = true)]
    output_json: Option<PathBuf>,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log verbosity: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    verbosity: String,

    /// Print progress events as JSON lines on stdout
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every table in the configuration file
    Run {
        /// Plan the copy and show sample rows without writing to the target
        #[arg(long)]
        dry_run: bool,
    },

    /// Copy a single table without a configuration file
    Copy {
        #[arg(long, env = "TABLECOPY_SOURCE_DRIVER")]
        source_driver: String,

        #[arg(long, env = "TABLECOPY_SOURCE_DSN")]
        source_dsn: String,

        #[arg(long, env = "TABLECOPY_TARGET_DRIVER")]
        target_driver: String,

        #[arg(long, env = "TABLECOPY_TARGET_DSN")]
        target_dsn: String,

        /// Source table
        #[arg(long)]
        table: String,

        /// Target table [default: same as --table]
        #[arg(long)]
        target_table: Option<String>,

        /// Extra predicate for the source SELECT
        #[arg(long = "where")]
        where_clause: Option<String>,

        /// Rows per committed batch
        #[arg(long, default_value = "1000")]
        batch: usize,

        /// Incremental watermark column
        #[arg(long)]
        inc_key: Option<String>,

        /// Rows with --inc-key greater than this value
        #[arg(long, requires = "inc_key")]
        since: Option<String>,

        /// Rows with --inc-key up to and including this value
        #[arg(long, requires = "inc_key")]
        until: Option<String>,

        /// Create the target table from source metadata when missing
        #[arg(long)]
        auto_create: bool,

        #[arg(long)]
        dry_run: bool,
    },

    /// List base tables on the source
    ListTables {
        /// Restrict to one schema
        #[arg(long)]
        schema: Option<String>,

        /// Use this driver instead of the configuration file
        #[arg(long, requires = "source_dsn")]
        source_driver: Option<String>,

        #[arg(long, requires = "source_driver")]
        source_dsn: Option<String>,
    },

    /// Test source and target connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();
    setup_logging(&cli.verbosity, cli.log_format);

    match &cli.command {
        Commands::Run { dry_run } => {
            let plan = load_config(&cli)?.resolve()?.with_dry_run(*dry_run);
            execute(&cli, plan).await?;
        }

        Commands::Copy {
            source_driver,
            source_dsn,
            target_driver,
            target_dsn,
            table,
            target_table,
            where_clause,
            batch,
            inc_key,
            since,
            until,
            auto_create,
            dry_run,
        } => {
            let mut job = TableJob::for_table(table)
                .with_batch_size(*batch)
                .with_auto_create(*auto_create);
            if let Some(target) = target_table {
                job = job.with_target(target);
            }
            if let Some(predicate) = where_clause {
                job = job.with_where(predicate);
            }
            if let Some(key) = inc_key {
                job = job.with_incremental(IncrementalFilter {
                    key: key.clone(),
                    since: since.clone(),
                    until: until.clone(),
                });
            }

            let plan = RunPlan::single(
                Endpoint::new(source_driver, source_dsn),
                Endpoint::new(target_driver, target_dsn),
                job,
            )?
            .with_dry_run(*dry_run);
            execute(&cli, plan).await?;
        }

        Commands::ListTables {
            schema,
            source_driver,
            source_dsn,
        } => {
            let (endpoint, default_schema) = match (source_driver, source_dsn) {
                (Some(driver), Some(dsn)) => (Endpoint::new(driver, dsn), None),
                _ => {
                    let plan = load_config(&cli)?.resolve()?;
                    let schema = plan.discovery.and_then(|d| d.schema);
                    (plan.source, schema)
                }
            };
            let schema = schema.clone().or(default_schema);

            info!(
                "Listing tables on {} ({})",
                endpoint.driver,
                endpoint.redacted_dsn()
            );
            let conn = connect(&endpoint.driver, &endpoint.dsn).await?;
            let tables = tablecopy::core::list_tables(conn.as_ref(), schema.as_deref()).await;
            conn.close().await;

            for table in tables? {
                println!("{}", table);
            }
        }

        Commands::HealthCheck => {
            let plan = load_config(&cli)?.resolve()?;
            let orchestrator = Orchestrator::new(plan).await?;
            let result = orchestrator.health_check().await;
            orchestrator.close().await;
            result?;
            println!("Source and target are reachable");
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config, CopyError> {
    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    Ok(config)
}

/// Connect, run the plan with progress rendering, and report the summary.
async fn execute(cli: &Cli, plan: RunPlan) -> Result<(), CopyError> {
    let dry_run = plan.dry_run;
    let cancel = setup_signal_handler();

    let (sink, rx) = EventSink::channel();
    let printer = report::spawn(rx, cli.progress);

    let orchestrator = Orchestrator::new(plan).await?.with_events(sink);
    let outcome = orchestrator.run(Some(cancel)).await;
    orchestrator.close().await;

    // Dropping the orchestrator closes the event channel.
    drop(orchestrator);
    let _ = printer.await;

    let summary = outcome?;
    if !cli.progress {
        print!("{}", report::render_summary(&summary, dry_run));
    }
    if let Some(path) = &cli.output_json {
        report::write_json(path, &summary)?;
        info!("Wrote summary to {:?}", path);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: LogFormat) {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries progress lines and the summary.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}

/// Cancel the run on SIGINT or SIGTERM. The table in flight finishes first.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    if stream.recv().await.is_some() {
                        eprintln!("\nReceived {}. Stopping after the current table...", name);
                        token.cancel();
                    }
                });
            }
            Err(e) => tracing::warn!("Cannot install {} handler: {}", name, e),
        }
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current table...");
            token.cancel();
        }
    });

    cancel_token
}
