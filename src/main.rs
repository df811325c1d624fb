//! # Rowmill CLI
//!
//! Thin command-line wiring around the engine:
//!
//! ```bash
//! rowmill run --from customers.csv --filter "age > 30" --select name --out out.csv
//! rowmill run --from customers.csv --join orders.csv --on "id = cid" \
//!     --select name,oid --out joined.csv
//! rowmill explain --from customers.csv --join orders.csv --on "id = cid" \
//!     --filter "age > 30"
//! rowmill analyze customers.csv --json
//! ```
//!
//! Logging is controlled by `ROWMILL_LOG` (an env-filter directive) or,
//! failing that, the `logging.level` from config.toml.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rowmill::{
    execute_with_trace, load_statistics, Catalog, Config, Executor, Optimizer, PlanBuilder,
    PlanNode,
};

#[derive(Parser)]
#[command(name = "rowmill", version, about = "CSV query engine with a cost-based optimizer")]
struct Cli {
    /// Path to a configuration file (defaults to config.toml + overrides)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build, optimize and execute a query
    Run {
        #[command(flatten)]
        query: QueryArgs,

        /// Output CSV path
        #[arg(long)]
        out: PathBuf,

        /// Execute the plan exactly as built, skipping the optimizer
        #[arg(long)]
        no_optimize: bool,
    },

    /// Print the plan before and after optimization, without executing
    Explain {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Collect and print statistics for one CSV table
    Analyze {
        /// Input CSV path
        path: PathBuf,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

/// Flags shared by `run` and `explain`.
#[derive(clap::Args)]
struct QueryArgs {
    /// Input CSV table
    #[arg(long)]
    from: PathBuf,

    /// Join against another CSV table (requires --on)
    #[arg(long)]
    join: Option<PathBuf>,

    /// Join predicate, e.g. "id = cid"
    #[arg(long, requires = "join")]
    on: Option<String>,

    /// Row predicate, e.g. "age > 30"; may be repeated
    #[arg(long)]
    filter: Vec<String>,

    /// Comma-separated output columns
    #[arg(long)]
    select: Option<String>,

    /// Deduplicate the selected columns
    #[arg(long, requires = "select")]
    distinct: bool,
}

impl QueryArgs {
    /// Every table the query touches, for catalog loading.
    fn tables(&self) -> Vec<&PathBuf> {
        let mut tables = vec![&self.from];
        if let Some(join) = &self.join {
            tables.push(join);
        }
        tables
    }

    /// Build the plan tree these flags describe. Filters sit above the
    /// join so they may reference either side; the optimizer pushes them
    /// down.
    fn build_plan(&self, out: Option<&PathBuf>) -> Result<PlanNode> {
        let mut builder = PlanBuilder::scan(&self.from)
            .with_context(|| format!("cannot scan '{}'", self.from.display()))?;

        if let Some(join_path) = &self.join {
            let Some(on) = &self.on else {
                bail!("--join requires --on");
            };
            let right = PlanBuilder::scan(join_path)
                .with_context(|| format!("cannot scan '{}'", join_path.display()))?;
            builder = builder.join(right, on)?;
        }

        for filter in &self.filter {
            builder = builder.filter(filter)?;
        }

        if let Some(select) = &self.select {
            let columns: Vec<&str> = select.split(',').map(str::trim).collect();
            builder = if self.distinct {
                builder.project_distinct(columns)?
            } else {
                builder.project(columns)?
            };
        }

        if let Some(out) = out {
            builder = builder.sink(out);
        }
        Ok(builder.build())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).context("loading configuration")?,
        None => Config::load().context("loading configuration")?,
    };

    let filter = EnvFilter::try_from_env("ROWMILL_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Run {
            query,
            out,
            no_optimize,
        } => {
            let plan = query.build_plan(Some(&out))?;
            let catalog = load_catalog(&query, &config)?;

            let summary = if no_optimize {
                Executor::new().execute(&plan)?
            } else {
                let optimizer = Optimizer::with_config(config.optimizer.clone());
                let (summary, _) = execute_with_trace(&plan, &catalog, &optimizer)?;
                summary
            };
            println!("{} rows written to {}", summary.rows, out.display());
        }

        Command::Explain { query } => {
            let plan = query.build_plan(None)?;
            let catalog = load_catalog(&query, &config)?;
            let optimizer = Optimizer::with_config(config.optimizer.clone());

            let mut trace = rowmill::PlanTrace::new();
            trace.record_before(
                plan.clone(),
                rowmill::estimate_cardinality(&plan, &catalog),
            );
            let optimized = optimizer.optimize(&plan, &catalog);
            trace.record_after(
                optimized.clone(),
                rowmill::estimate_cardinality(&optimized, &catalog),
            );
            print!("{}", trace.format_trace());
        }

        Command::Analyze { path, json } => {
            let stats = load_statistics(&path, &config.statistics)
                .with_context(|| format!("analyzing '{}'", path.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}: {} rows", path.display(), stats.row_count);
                for column in &stats.columns {
                    println!(
                        "  {}: distinct={} nulls={} min={} max={}",
                        column.name,
                        column.distinct_count,
                        column.null_count,
                        column.min.as_ref().map_or(String::from("-"), |v| v.to_string()),
                        column.max.as_ref().map_or(String::from("-"), |v| v.to_string()),
                    );
                }
            }
        }
    }

    Ok(())
}

/// Analyze every table the query touches.
fn load_catalog(query: &QueryArgs, config: &Config) -> Result<Catalog> {
    let mut catalog = Catalog::new();
    for table in query.tables() {
        catalog
            .analyze(table, &config.statistics)
            .with_context(|| format!("analyzing '{}'", table.display()))?;
    }
    Ok(catalog)
}
