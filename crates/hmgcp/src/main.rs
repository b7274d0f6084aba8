use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use hmgcp_core::{infer_with, SolverConfig};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Infer the HM type and flow value of a small functional program
#[derive(Parser, Debug)]
#[command(name = "hmgcp", version, about)]
struct Cli {
    /// Source file; reads stdin when neither a file nor --expr is given
    file: Option<PathBuf>,

    /// Program text given inline
    #[arg(short, long, conflicts_with = "file")]
    expr: Option<String>,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,

    /// Print every node with its type and flow
    #[arg(long)]
    dump: bool,

    /// Solver configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip structural (HM) inference
    #[arg(long)]
    no_hm: bool,

    /// Skip flow (GCP) propagation
    #[arg(long)]
    no_gcp: bool,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = read_source(&cli)?;
    let config = load_config(&cli)?;
    tracing::debug!(bytes = source.len(), ?config, "starting inference");
    let inf = infer_with(&source, config).context("inference failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&inf.report())?);
        return Ok(());
    }

    println!("{} {}", "type:".bold().green(), inf.program.root_type());
    println!("{} {}", "flow:".bold().green(), inf.program.root_flow());
    println!("{} {}", "sig: ".bold().green(), inf.program.signature());
    if !inf.stats.converged {
        println!("{}", "warning: iteration ceiling reached".yellow());
    }
    for violation in &inf.stats.violations {
        println!("{} {violation}", "violation:".red());
    }
    if cli.dump {
        println!("{}", "nodes:".bold());
        print!("{}", inf.program.dump());
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(cli: &Cli) -> Result<String> {
    if let Some(expr) = &cli.expr {
        return Ok(expr.clone());
    }
    if let Some(path) = &cli.file {
        return std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()));
    }
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("reading stdin")?;
    Ok(buffer)
}

fn load_config(cli: &Cli) -> Result<SolverConfig> {
    let mut config = match &cli.config {
        Some(path) => SolverConfig::from_file(path)?,
        None => SolverConfig::default(),
    };
    if cli.no_hm {
        config = config.with_hm(false);
    }
    if cli.no_gcp {
        config = config.with_gcp(false);
    }
    if let Some(max) = cli.max_iterations {
        config = config.with_max_iterations(max);
    }
    Ok(config)
}
