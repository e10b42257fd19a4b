use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rust_sqlindex::model::AliasTarget;
use rust_sqlindex::{
    index_workspace, read_sql_file, DialectOptions, IndexConfig, Location, Workspace,
};

#[derive(Parser)]
#[command(name = "rust-sqlindex")]
#[command(author, version, about = "Symbol and reference index for T-SQL workspaces")]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IndexArgs {
    /// Workspace root directory
    #[arg(default_value = ".")]
    root: PathBuf,

    /// Skip files larger than this many bytes
    #[arg(long, default_value_t = 12 * 1024)]
    max_file_bytes: usize,

    /// Stop extracting references from a file after this many
    #[arg(long = "max-refs", default_value_t = 10_000)]
    max_refs: usize,

    /// Skip paths containing this substring (repeatable; replaces the default)
    #[arg(long)]
    exclude: Vec<String>,

    /// Number of structured-parse workers
    #[arg(long, default_value_t = 2)]
    pool_size: usize,

    /// Per-statement structured parse timeout
    #[arg(long, default_value_t = 2000)]
    parse_timeout_ms: u64,

    /// Leave ambiguous columns unresolved instead of parsing statements
    #[arg(long)]
    no_parse: bool,

    /// Dialect for structured parsing (tsql, generic, ansi)
    #[arg(long, default_value = "tsql")]
    dialect: DialectOptions,
}

impl IndexArgs {
    fn config(&self) -> IndexConfig {
        let mut config = IndexConfig::default()
            .with_max_file_bytes(self.max_file_bytes)
            .with_max_references(self.max_refs);
        if !self.exclude.is_empty() {
            config.excluded_path_fragments = self.exclude.clone();
        }
        config.parse.pool_size = if self.no_parse { 0 } else { self.pool_size };
        config.parse.job_timeout = Duration::from_millis(self.parse_timeout_ms);
        config.parse.dialect = self.dialect;
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Index a workspace and print a summary
    Index {
        #[command(flatten)]
        args: IndexArgs,
    },

    /// List references to a name such as `employee` or `employee.name`
    References {
        name: String,

        #[command(flatten)]
        args: IndexArgs,
    },

    /// Find where a table, routine or column is defined
    Definition {
        /// Object name, `table.column`, or a bare word
        name: String,

        #[command(flatten)]
        args: IndexArgs,
    },

    /// Show aliases and candidate tables of the statement at a position
    Scope {
        file: PathBuf,

        /// 0-based line
        #[arg(long)]
        line: usize,

        /// 0-based character within the line
        #[arg(long, default_value_t = 0)]
        character: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Index { args } => {
            let workspace = open_workspace(&args)?;
            let stats = workspace.stats();
            println!("Files indexed:     {}", stats.index.files);
            println!("Symbols:           {}", stats.index.symbols);
            println!("Tables w/ columns: {}", stats.index.tables_with_columns);
            println!("References:        {}", stats.index.references);
            if let Some(pool) = stats.pool {
                println!(
                    "Corrections:       {} applied, {} rejected, {} inconclusive, {} stale",
                    stats.applied_corrections,
                    stats.rejected_corrections,
                    stats.inconclusive_corrections,
                    stats.stale_corrections
                );
                println!(
                    "Parse workers:     {} live, {} disabled",
                    pool.live_workers, pool.degraded_slots
                );
            }
        }
        Commands::References { name, args } => {
            let workspace = open_workspace(&args)?;
            let references = workspace.get_references(&name);
            for reference in &references {
                println!("{}\t{:?}", format_location(&reference.location()), reference.kind);
            }
            eprintln!("{} reference(s) to {}", references.len(), name);
        }
        Commands::Definition { name, args } => {
            let workspace = open_workspace(&args)?;
            let mut locations: Vec<Location> = workspace
                .find_definitions(&name)
                .iter()
                .map(|symbol| symbol.location())
                .collect();
            if locations.is_empty() {
                if let Some((table, column)) = name.rsplit_once('.') {
                    locations = workspace.find_column_locations(table, column);
                }
            }
            if locations.is_empty() {
                locations = workspace.find_any_locations(&name);
            }
            for location in &locations {
                println!("{}", format_location(location));
            }
        }
        Commands::Scope {
            file,
            line,
            character,
        } => {
            let text = read_sql_file(&file)?;
            let workspace = Workspace::new(IndexConfig::default().without_structured_parse())?;
            let scope = workspace.resolve_statement_scope(&text, line, character);
            println!("Statement: {}", scope.text(&text).trim());
            println!("Candidate tables:");
            for table in &scope.candidate_tables {
                println!("  {table}");
            }
            println!("Aliases:");
            let mut aliases: Vec<_> = scope.aliases.iter().collect();
            aliases.sort_by(|a, b| a.0.cmp(b.0));
            for (alias, target) in aliases {
                match target {
                    AliasTarget::Table(table) => println!("  {alias} -> {table}"),
                    AliasTarget::Subquery => println!("  {alias} -> (subquery)"),
                }
            }
            if !scope.local_tables.is_empty() {
                println!("Local tables:");
                for (table, columns) in scope.local_tables.iter() {
                    let columns: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
                    println!("  {table} ({})", columns.join(", "));
                }
            }
        }
    }

    Ok(())
}

fn open_workspace(args: &IndexArgs) -> Result<Workspace> {
    let root = args.root.as_path();
    let workspace = Workspace::new(args.config()).context("Invalid index configuration")?;
    index_workspace(root, &workspace)
        .with_context(|| format!("Failed to index {}", display_root(root)))?;
    let timeout = Duration::from_millis(args.parse_timeout_ms.saturating_mul(4).max(1000));
    if !workspace.wait_for_corrections(timeout) {
        tracing::warn!("Some disambiguation jobs did not finish in time");
    }
    Ok(workspace)
}

fn display_root(root: &Path) -> String {
    root.canonicalize()
        .unwrap_or_else(|_| root.to_path_buf())
        .display()
        .to_string()
}

/// `path:line:col` with 1-based line and column, as editors expect.
fn format_location(location: &Location) -> String {
    let path = location
        .uri
        .strip_prefix("file://")
        .unwrap_or(&location.uri);
    format!("{}:{}:{}", path, location.line + 1, location.start_col + 1)
}
