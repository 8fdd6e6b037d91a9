//! Command line interface of the `relq` binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use relq_core::{
    DbQuery, Metadata, QueryDefinition, RecordOptions, Relation, StaticCatalog, TableReflector,
};
use relq_mysql::{MySqlConnectionManager, MySqlRecordExecutor, MySqlSchemaSnapshot};
use relq_shared::{QueryMetrics, RelqConfig};
use tracing::{debug, info};

/// relq - build relational queries and trace their columns back to the schema
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file; `relq.toml` and `RELQ__SECTION__KEY` variables otherwise
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// What to do with the query
    #[command(subcommand)]
    pub command: Command,
}

/// Where the query and its schema come from.
#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// JSON query definition
    #[arg(long)]
    pub query: PathBuf,

    /// JSON table catalog used instead of reflecting the database
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the SQL of the transformed query
    Sql {
        /// Query source
        #[command(flatten)]
        source: QueryArgs,
    },

    /// Fetch rows of the transformed query as JSON
    Rows {
        /// Query source
        #[command(flatten)]
        source: QueryArgs,

        /// Maximum number of rows, capped by `records.max_limit`
        #[arg(long)]
        limit: Option<u64>,

        /// Rows to skip
        #[arg(long)]
        offset: Option<u64>,
    },

    /// Count rows of the transformed query
    Count {
        /// Query source
        #[command(flatten)]
        source: QueryArgs,
    },

    /// List the aliases a transformation step receives
    Aliases {
        /// Query source
        #[command(flatten)]
        source: QueryArgs,

        /// Step index; 0 lists the initial aliases
        #[arg(long, default_value_t = 0)]
        step: usize,
    },

    /// Show the initial column an output alias derives from
    Trace {
        /// Query source
        #[command(flatten)]
        source: QueryArgs,

        /// Number of transformations applied before looking up the alias
        #[arg(long)]
        step: usize,

        /// Output alias to trace
        #[arg(long)]
        alias: String,
    },
}

impl Command {
    /// Query source shared by every subcommand.
    pub fn source(&self) -> &QueryArgs {
        match self {
            Command::Sql { source }
            | Command::Rows { source, .. }
            | Command::Count { source }
            | Command::Aliases { source, .. }
            | Command::Trace { source, .. } => source,
        }
    }

    /// Whether the command runs SQL, as opposed to only building it.
    pub fn executes(&self) -> bool {
        matches!(self, Command::Rows { .. } | Command::Count { .. })
    }
}

/// Load the configuration named on the command line, or the default one.
pub fn load_config(cli: &Cli) -> anyhow::Result<RelqConfig> {
    let config = match &cli.config {
        Some(path) => RelqConfig::load_from_file(path),
        None => RelqConfig::load(),
    };
    config.context("Failed to load configuration")
}

fn read_definition(path: &Path) -> anyhow::Result<QueryDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read query {}", path.display()))?;
    QueryDefinition::from_json(&raw)
        .with_context(|| format!("Invalid query definition in {}", path.display()))
}

fn read_catalog(path: &Path) -> anyhow::Result<StaticCatalog> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid catalog in {}", path.display()))
}

/// Outer joins the initial relation emits; columns sharing a join path
/// share its joins.
fn joins_emitted(query: &DbQuery) -> anyhow::Result<usize> {
    let initial = query
        .initial_relation()
        .with_context(|| format!("Failed to build query `{}`", query.name()))?;
    Ok(initial.head().map(|select| select.joins().len()).unwrap_or_default())
}

fn record_built(query: &DbQuery) -> anyhow::Result<()> {
    QueryMetrics::relation_built(joins_emitted(query)?, query.transformations().len());
    Ok(())
}

fn built_relation(query: &DbQuery) -> anyhow::Result<Relation> {
    let relation = query
        .current_relation()
        .with_context(|| format!("Failed to build query `{}`", query.name()))?;
    record_built(query)?;
    debug!(relation = %relation.name(), columns = relation.columns().len(), "relation built");
    Ok(relation)
}

/// Run a command that needs no database: `sql`, `aliases` or `trace`.
///
/// Returns `None` for commands that execute SQL.
pub fn describe(command: &Command, query: &DbQuery) -> anyhow::Result<Option<String>> {
    let output = match command {
        Command::Sql { .. } => {
            let (sql, binds) = built_relation(query)?.to_sql()?;
            if binds.is_empty() {
                sql
            } else {
                format!("{sql}\n-- binds: {}", serde_json::to_string(&binds)?)
            }
        }
        Command::Aliases { step, .. } => query.input_aliases_before_step(*step).join("\n"),
        Command::Trace { step, alias, .. } => match query.initial_column_for_output_alias(*step, alias) {
            Some(column) => serde_json::to_string_pretty(column)?,
            None => "none".to_string(),
        },
        Command::Rows { .. } | Command::Count { .. } => return Ok(None),
    };
    Ok(Some(output))
}

/// Run `command` and return what it prints.
pub async fn run(command: &Command, config: &RelqConfig) -> anyhow::Result<String> {
    let source = command.source();
    let definition = read_definition(&source.query)?;

    let connection = if command.executes() || source.catalog.is_none() {
        Some(MySqlConnectionManager::connect(&config.database, &config.retry).await?)
    } else {
        None
    };

    let reflector: Arc<dyn TableReflector> = match (&source.catalog, &connection) {
        (Some(path), _) => Arc::new(read_catalog(path)?),
        (None, Some(conn)) => Arc::new(MySqlSchemaSnapshot::load(conn.pool(), conn.schema()).await?),
        (None, None) => anyhow::bail!("Either a catalog or a database connection is required"),
    };
    let query = definition.into_query(Metadata::new(reflector));
    info!(query = %query.name(), steps = query.transformations().len(), "query loaded");

    if let Some(output) = describe(command, &query)? {
        return Ok(output);
    }

    let conn = connection.context("Executing a query requires a database connection")?;
    let executor = MySqlRecordExecutor::new(conn.pool().clone(), config.records.clone());
    record_built(&query)?;
    match command {
        Command::Rows { limit, offset, .. } => {
            let options = RecordOptions {
                limit: *limit,
                offset: *offset,
                ..RecordOptions::default()
            };
            let rows = query.fetch_rows(&executor, &options).await?;
            Ok(serde_json::to_string_pretty(&rows)?)
        }
        _ => {
            let count = query.fetch_count(&executor, &RecordOptions::default()).await?;
            Ok(count.to_string())
        }
    }
}
