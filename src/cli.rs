/*!
sqlagg Command Line Interface

Resolves view-context definition files against a data source and prints the
merged result tree as JSON.
*/

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sqlagg::config::ContextDefinition;
use sqlagg::reader::DuckDBReader;
use sqlagg::{FilterParams, Value, VERSION};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sqlagg")]
#[command(about = "Aggregate named SQL views into one nested result")]
#[command(version = VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show verbose output (compiled queries, row counts)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a definition file and print the result tree
    Run {
        /// Path to the JSON view-context definition
        file: PathBuf,

        /// Data source connection string
        #[arg(long, default_value = "duckdb://memory")]
        reader: String,

        /// SQL script executed before resolving (tables, fixtures)
        #[arg(long)]
        init: Option<PathBuf>,

        /// Filter parameter, repeatable: --param enddate=2013-02-01
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Output file path
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the compiled query of every partition without executing
    Sql {
        /// Path to the JSON view-context definition
        file: PathBuf,

        /// Filter parameter, repeatable: --param enddate=2013-02-01
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
    },

    /// Check that every table and column referenced by the definition exists
    Validate {
        /// Path to the JSON view-context definition
        file: PathBuf,

        /// Data source connection string
        #[arg(long, default_value = "duckdb://memory")]
        reader: String,

        /// SQL script executed before validating
        #[arg(long)]
        init: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::Run {
            file,
            reader,
            init,
            params,
            output,
        } => cmd_run(&file, &reader, init.as_deref(), &params, output.as_deref()),
        Commands::Sql { file, params } => cmd_sql(&file, &params),
        Commands::Validate { file, reader, init } => cmd_validate(&file, &reader, init.as_deref()),
    }
}

/// Parse `name=value` pairs; values go through `Value::parse_literal`
fn parse_params(raw: &[String]) -> Result<FilterParams> {
    let mut params = FilterParams::new();
    for pair in raw {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("Invalid --param '{}': expected NAME=VALUE", pair);
        };
        let name = name.trim().trim_start_matches(':');
        if name.is_empty() {
            bail!("Invalid --param '{}': empty name", pair);
        }
        params.insert(name.to_string(), Value::parse_literal(value));
    }
    Ok(params)
}

fn open_reader(uri: &str, init: Option<&Path>) -> Result<DuckDBReader> {
    let reader = DuckDBReader::from_connection_string(uri)?;

    if let Some(init) = init {
        let script = std::fs::read_to_string(init)
            .with_context(|| format!("Failed to read init script {}", init.display()))?;
        tracing::info!("Running init script {}", init.display());
        reader.execute_batch(&script)?;
    }
    Ok(reader)
}

fn cmd_run(
    file: &Path,
    reader: &str,
    init: Option<&Path>,
    params: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let definition = ContextDefinition::from_file(file)?;
    let params = parse_params(params)?;
    let db_reader = open_reader(reader, init)?;

    let mut context = definition.to_context()?;
    tracing::debug!(
        "Loaded {} view(s) from {}",
        context.views().len(),
        file.display()
    );
    context
        .resolve(&db_reader, Some(&params))
        .with_context(|| format!("Failed to resolve {}", file.display()))?;

    let json_output = serde_json::to_string_pretty(context.data())?;

    match output {
        None => println!("{}", json_output),
        Some(output) => {
            std::fs::write(output, &json_output)
                .with_context(|| format!("Failed to write to {}", output.display()))?;
            tracing::info!("Result written to: {}", output.display());
        }
    }
    Ok(())
}

fn cmd_sql(file: &Path, params: &[String]) -> Result<()> {
    let definition = ContextDefinition::from_file(file)?;
    let params = parse_params(params)?;
    let context = definition.to_context()?;

    let groups = context.partitions();
    let compiled = context.compile(Some(&params))?;
    for (idx, (group, query)) in groups.iter().zip(&compiled).enumerate() {
        println!("-- Partition {}: {}", idx + 1, group.key);
        println!("{};", query.sql);
        if !query.params.is_empty() {
            let bound: Vec<String> = query.params.iter().map(|p| p.to_string()).collect();
            println!("-- Parameters: {}", bound.join(", "));
        }
        println!();
    }
    Ok(())
}

fn cmd_validate(file: &Path, reader: &str, init: Option<&Path>) -> Result<()> {
    let definition = ContextDefinition::from_file(file)?;
    let db_reader = open_reader(reader, init)?;
    let context = definition.to_context()?;

    context.validate(&db_reader)?;
    println!(
        "OK: {} view(s) in {} partition(s)",
        context.views().len(),
        context.partitions().len()
    );
    Ok(())
}
