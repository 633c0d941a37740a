//! sqladmin: command-line front end for the SQL Server admin client
//!
//! Every command runs against a fresh execution core. Queries go through the
//! same validation and history path as any other front end, so commands run
//! here show up in `sqladmin history` afterwards.
//!
//! # Commands
//!
//! - `exec`: run a query and print its first result set
//! - `non-query`: run a statement and print the affected row count
//! - `scalar`: run a query and print the first column of its first row
//! - `plan`: print the estimated execution plan as showplan XML
//! - `databases`: list user databases on a server
//! - `history`: show recorded executions, newest first
//! - `clear-history`: forget every recorded execution
//! - `templates`: list, save or remove saved query templates

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use sqladmin_connection::ConnectRequest;
use sqladmin_core::{AuthMode, CoreSettings};
use sqladmin_query::{
    CoreHandle, CsvExporter, ExecutionRequest, QueryExecutionCore, QueryTemplate, ResultExporter,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

mod logging;
mod output;

#[derive(Parser, Debug)]
#[command(name = "sqladmin", version, about = "Run and track queries against SQL Server")]
struct Cli {
    /// Settings file (defaults to the per-user settings.toml)
    #[arg(long, global = true, env = "SQLADMIN_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a query and print the result
    Exec {
        /// Query text
        query: String,
        #[command(flatten)]
        target: TargetArgs,
        /// Write CSV to stdout instead of a table
        #[arg(long)]
        csv: bool,
    },
    /// Run a statement that returns no rows
    NonQuery {
        /// Statement text
        sql: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Run a query and print the first column of its first row
    Scalar {
        /// Query text
        query: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the estimated execution plan of a query without running it
    Plan {
        /// Query text
        query: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// List user databases on the server
    Databases {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show query history, newest first
    History {
        /// Only entries whose query contains this text
        #[arg(long)]
        search: Option<String>,
        /// Show at most this many entries
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete all query history
    ClearHistory,
    /// Manage saved query templates
    Templates {
        #[command(subcommand)]
        action: Option<TemplateAction>,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateAction {
    /// List saved templates (the default)
    List,
    /// Save a template, replacing one with the same name
    Save {
        name: String,
        query: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        category: String,
    },
    /// Remove a template by name
    Remove { name: String },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Server address: host, host,port or host\instance
    #[arg(long, env = "SQLADMIN_SERVER")]
    server: String,

    /// Database to run in
    #[arg(long, env = "SQLADMIN_DATABASE")]
    database: Option<String>,

    /// SQL login; integrated authentication when omitted
    #[arg(long, requires = "password")]
    user: Option<String>,

    #[arg(long, env = "SQLADMIN_PASSWORD", hide_env_values = true, requires = "user")]
    password: Option<String>,
}

impl TargetArgs {
    fn connect_request(&self) -> ConnectRequest {
        let auth = match (&self.user, &self.password) {
            (Some(user), Some(password)) => AuthMode::SqlLogin {
                user: user.clone(),
                password: password.clone(),
            },
            _ => AuthMode::Integrated,
        };
        let request = ConnectRequest::new(self.server.clone(), auth);
        match &self.database {
            Some(database) => request.with_database(database.clone()),
            None => request,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging_config = if cli.verbose {
        logging::LoggingConfig::verbose()
    } else {
        logging::LoggingConfig::default()
    };
    let _guard = match logging::init(logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("warning: logging unavailable: {:#}", e);
            None
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = match &cli.config {
        Some(path) => CoreSettings::load_from(path),
        None => CoreSettings::load(),
    }
    .context("failed to load settings")?;

    let core = QueryExecutionCore::from_settings(&settings)
        .await
        .context("failed to initialise the execution core")?;
    let (handle, worker) = CoreHandle::spawn(core);

    let result = dispatch(&handle, cli.command).await;

    // Closing the last handle stops the worker and closes the session
    drop(handle);
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "execution core worker ended abnormally");
    }

    result
}

async fn dispatch(handle: &CoreHandle, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Exec { query, target, csv } => {
            connect(handle, &target).await?;
            let request = execution_request(query, &target);
            let outcome = handle.execute(request).await.context("query failed")?;

            let mut stdout = std::io::stdout().lock();
            if csv {
                CsvExporter::new()
                    .export(&outcome.result, &mut stdout)
                    .context("failed to write CSV")?;
            } else {
                writeln!(stdout, "{}", output::result_table(&outcome.result))?;
                writeln!(
                    stdout,
                    "{} in {} ms",
                    output::rows_footer(outcome.result.row_count()),
                    outcome.duration.as_millis()
                )?;
            }
        }
        Command::NonQuery { sql, target } => {
            connect(handle, &target).await?;
            let request = execution_request(sql, &target);
            let affected = handle
                .execute_non_query(request)
                .await
                .context("statement failed")?;
            println!("{} row(s) affected", affected);
        }
        Command::Scalar { query, target } => {
            connect(handle, &target).await?;
            let value = handle
                .execute_scalar(execution_request(query, &target))
                .await
                .context("query failed")?;
            println!("{}", value);
        }
        Command::Plan { query, target } => {
            connect(handle, &target).await?;
            let plan = handle
                .query_plan(execution_request(query, &target))
                .await
                .context("failed to get execution plan")?;
            println!("{}", plan);
        }
        Command::Databases { target } => {
            connect(handle, &target).await?;
            let databases = handle
                .list_databases()
                .await
                .context("failed to list databases")?;
            for name in databases {
                println!("{}", name);
            }
        }
        Command::History { search, limit } => {
            let mut entries = handle.history(search).await?;
            if let Some(limit) = limit {
                entries.truncate(limit);
            }
            if entries.is_empty() {
                println!("No history");
            } else {
                println!("{}", output::history_table(&entries));
            }
        }
        Command::ClearHistory => {
            handle.clear_history().await?;
            println!("History cleared");
        }
        Command::Templates { action } => match action.unwrap_or(TemplateAction::List) {
            TemplateAction::List => {
                let templates = handle.templates().await?;
                if templates.is_empty() {
                    println!("No templates");
                } else {
                    println!("{}", output::templates_table(&templates));
                }
            }
            TemplateAction::Save {
                name,
                query,
                description,
                category,
            } => {
                if query.trim().is_empty() {
                    bail!("template query must not be empty");
                }
                let template = QueryTemplate::new(name.clone(), query)
                    .with_description(description)
                    .with_category(category);
                handle.save_template(template).await?;
                println!("Saved template {:?}", name);
            }
            TemplateAction::Remove { name } => {
                if !handle.remove_template(name.clone()).await? {
                    bail!("no template named {:?}", name);
                }
                println!("Removed template {:?}", name);
            }
        },
    }
    Ok(())
}

async fn connect(handle: &CoreHandle, target: &TargetArgs) -> anyhow::Result<()> {
    if target.server.trim().is_empty() {
        bail!("--server must not be empty");
    }
    handle
        .connect(target.connect_request())
        .await
        .with_context(|| format!("could not connect to {}", target.server))
}

fn execution_request(query: String, target: &TargetArgs) -> ExecutionRequest {
    let request = ExecutionRequest::new(query);
    match &target.database {
        Some(database) => request.with_database(database.clone()),
        None => request,
    }
}
