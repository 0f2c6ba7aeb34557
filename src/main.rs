//! Gene Variants Worker main executable

pub mod common;
pub mod db;
pub mod err;
pub mod seqvars;

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Gene variants heavy lifting",
    long_about = "This tool annotates VCF files, stores their variants per gene, and queries them"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum Commands {
    /// Sequence variant related commands.
    Seqvars(Seqvars),
    /// Database-related commands.
    Db(Db),
}

/// Parsing of "seqvars *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Seqvars {
    /// The sub command to run
    #[command(subcommand)]
    command: SeqvarsCommands,
}

/// Enum supporting the parsing of "seqvars *" sub commands.
#[derive(Debug, Subcommand)]
enum SeqvarsCommands {
    Validate(seqvars::validate::Args),
    Filter(seqvars::filtered::Args),
    Ingest(seqvars::ingest::Args),
}

/// Parsing of "db *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Db {
    /// The sub command to run
    #[command(subcommand)]
    command: DbCommands,
}

/// Enum supporting the parsing of "db *" sub commands.
#[derive(Debug, Subcommand)]
enum DbCommands {
    Summary(db::cli::SummaryArgs),
    Files(db::cli::FilesArgs),
    DeleteFile(db::cli::DeleteFileArgs),
    Variants(db::cli::VariantsArgs),
    Facets(db::cli::FacetsArgs),
    GeneSet(db::cli::GeneSetArgs),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Seqvars(seqvars) => match &seqvars.command {
                SeqvarsCommands::Validate(args) => seqvars::validate::run(&cli.common, args)?,
                SeqvarsCommands::Filter(args) => seqvars::filtered::run(&cli.common, args)?,
                SeqvarsCommands::Ingest(args) => seqvars::ingest::run(&cli.common, args)?,
            },
            Commands::Db(db) => match &db.command {
                DbCommands::Summary(args) => db::cli::run_summary(&cli.common, args)?,
                DbCommands::Files(args) => db::cli::run_files(&cli.common, args)?,
                DbCommands::DeleteFile(args) => db::cli::run_delete_file(&cli.common, args)?,
                DbCommands::Variants(args) => db::cli::run_variants(&cli.common, args)?,
                DbCommands::Facets(args) => db::cli::run_facets(&cli.common, args)?,
                DbCommands::GeneSet(args) => db::cli::run_gene_set(&cli.common, args)?,
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
