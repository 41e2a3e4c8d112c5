//! Query translation CLI.
//!
//! Reads a catalog and a request query string, and prints the SQL the
//! request translates to with its bound parameters.
//!
//! ```text
//! query-cli --catalog catalog.json --model posts 'status=published&sort=-created_at'
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;
use helios_query::config::EngineConfig;
use helios_query::schema::Catalog;
use helios_query::sql::{Dialect, SqlQuery};
use helios_query::{QueryFilter, init_logging};
use tracing::{debug, info};

/// Command line arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "query-cli")]
#[command(about = "Translate request filter, search and sort parameters to SQL")]
struct CliArgs {
    /// Engine configuration file (JSON).
    #[arg(long, env = "HELIOS_QUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog of models and relations (JSON).
    #[arg(long, env = "HELIOS_QUERY_CATALOG")]
    catalog: PathBuf,

    /// Model to query.
    #[arg(long)]
    model: String,

    /// SQL dialect (sqlite, postgres).
    #[arg(long, env = "HELIOS_QUERY_DIALECT", default_value = "sqlite")]
    dialect: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "HELIOS_QUERY_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Maximum number of top-level filters.
    #[arg(long, env = "HELIOS_QUERY_MAX_FILTERS")]
    max_filters: Option<usize>,

    /// Maximum group and relation nesting depth.
    #[arg(long, env = "HELIOS_QUERY_MAX_NESTING_LEVEL")]
    max_nesting_level: Option<usize>,

    /// IANA timezone for relative-date operators.
    #[arg(long, env = "HELIOS_QUERY_TIMEZONE")]
    timezone: Option<String>,

    /// Reject sort keys on models that declare no sortable list.
    #[arg(long, default_value = "false")]
    restrict_sort: bool,

    /// Request query string, e.g. `status=published&views[gt]=100`.
    query: String,
}

impl CliArgs {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => EngineConfig::default(),
        };

        if let Some(max) = self.max_filters {
            config.max_filters = max;
        }
        if let Some(max) = self.max_nesting_level {
            config.max_nesting_level = max;
        }
        if let Some(tz) = &self.timezone {
            config.dates.timezone = tz.clone();
        }
        if self.restrict_sort {
            config.sort.allow_any_column = false;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(&args.log_level);

    let config = args.engine_config()?;
    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    let catalog = Catalog::from_file(&args.catalog)
        .with_context(|| format!("Failed to load catalog from {}", args.catalog.display()))?;
    catalog.validate()?;
    info!(models = catalog.models.len(), "Loaded catalog");

    let dialect =
        Dialect::parse(&args.dialect).ok_or_else(|| anyhow!("Unknown dialect '{}'", args.dialect))?;
    let mut query = SqlQuery::new(Arc::new(catalog), &args.model, dialect)
        .ok_or_else(|| anyhow!("Unknown model '{}'", args.model))?;

    let filters = QueryFilter::new(config)?;
    match filters.apply_request(&mut query, &args.query, None) {
        Ok(params) => debug!(params = ?params, "Applied request"),
        Err(e) => {
            eprintln!("error[{}]: {}", e.kind(), e);
            std::process::exit(2);
        }
    }

    let sql = query.to_sql()?;
    println!("{}", sql.sql);
    for (i, param) in sql.params.iter().enumerate() {
        println!("  ?{} = {}", i + 1, param);
    }
    for (relation, order) in query.eager_loads() {
        match order {
            Some(order) => println!(
                "  with {} ORDER BY {} {}",
                relation,
                order.column,
                order.direction.as_sql()
            ),
            None => println!("  with {}", relation),
        }
    }

    Ok(())
}
