//! Rulegraph Command-Line Client
//!
//! Compiles presentation rulesets against schema files and prints the
//! resulting content sources, relationship paths and query text.

mod executor;
mod formatter;

use clap::{Parser, Subcommand, ValueEnum};
use formatter::OutputFormat;
use rulegraph_core::query::RelationshipDirection;
use std::path::PathBuf;

/// Rulegraph Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "rulegraph")]
#[command(version, about = "Rulegraph presentation rule compiler")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(long, default_value = "table", value_enum, global = true)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile every content rule of a ruleset for the given input classes
    Compile(CompileArgs),
    /// Resolve relationship paths from a class
    Paths(PathsArgs),
}

#[derive(clap::Args, Debug)]
pub struct CompileArgs {
    /// Schema files (JSON), one or more
    #[arg(short = 's', long = "schema", required = true)]
    pub schemas: Vec<PathBuf>,

    /// Ruleset file (JSON)
    #[arg(short = 'r', long)]
    pub ruleset: PathBuf,

    /// Input class as Schema:Class, repeatable
    #[arg(short = 'c', long = "class")]
    pub classes: Vec<String>,

    /// Treat input classes polymorphically
    #[arg(long)]
    pub polymorphic: bool,

    /// Instance counts as Schema:Class=count, repeatable
    #[arg(long = "instances")]
    pub instances: Vec<String>,

    /// Also print the rendered content, instance node and grouping queries
    #[arg(long)]
    pub query: bool,

    /// Merge content rows into a single row
    #[arg(long)]
    pub merge: bool,
}

#[derive(clap::Args, Debug)]
pub struct PathsArgs {
    /// Schema files (JSON), one or more
    #[arg(short = 's', long = "schema", required = true)]
    pub schemas: Vec<PathBuf>,

    /// Source class as Schema:Class
    #[arg(short = 'c', long = "class")]
    pub class: String,

    /// Direction to follow relationships in
    #[arg(long, default_value = "both", value_enum)]
    pub direction: DirectionArg,

    /// Levels to skip; -1 follows relationships recursively
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub depth: i32,

    /// Class-list filter of target classes
    #[arg(long, default_value = "")]
    pub classes: String,

    /// Class-list filter of relationships
    #[arg(long, default_value = "")]
    pub relationships: String,

    /// Hop limit for recursive traversal
    #[arg(long)]
    pub max_depth: Option<usize>,
}

/// Relationship direction argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    Forward,
    Backward,
    Both,
}

impl From<DirectionArg> for RelationshipDirection {
    fn from(direction: DirectionArg) -> Self {
        match direction {
            DirectionArg::Forward => RelationshipDirection::FORWARD,
            DirectionArg::Backward => RelationshipDirection::BACKWARD,
            DirectionArg::Both => RelationshipDirection::BOTH,
        }
    }
}

fn main() {
    let filter = match "rulegraph_cli=info".parse() {
        Ok(directive) => tracing_subscriber::EnvFilter::from_default_env().add_directive(directive),
        Err(_) => tracing_subscriber::EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let formatter = formatter::create_formatter(args.format);
    let output = match &args.command {
        Command::Compile(compile) => executor::compile(compile, &*formatter)?,
        Command::Paths(paths) => executor::paths(paths, &*formatter)?,
    };
    println!("{}", output);
    Ok(())
}
