//! CLI module for SAGE
//!
//! Command-line parsing for the `sage` binary. Uses clap for argument
//! parsing and owo-colors for colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SAGE - multi-agent research assistant
///
/// Answers research questions by planning sub-tasks, searching an indexed
/// knowledge base and external tools, and writing cited reports.
#[derive(Parser, Debug)]
#[command(
    name = "sage",
    version,
    about = "SAGE - multi-agent research assistant",
    long_about = "Answers research questions by planning sub-tasks, searching a hybrid\n\
                  vector + knowledge-graph index and external tools (web, Wikipedia, arXiv),\n\
                  and writing reports where every claim cites its source.",
    after_help = "EXAMPLES:\n    \
                  sage ingest notes/rnn.md notes/transformers.md\n    \
                  sage ingest --url https://en.wikipedia.org/wiki/Transformer_(deep_learning_architecture)\n    \
                  sage ask \"Compare transformer and RNN architectures for time-series forecasting\"\n    \
                  sage history list --session default\n    \
                  sage config --validate"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sage.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a research question
    Ask {
        /// The question
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Session the run is recorded under
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Show the task plan and agent path
        #[arg(long)]
        trace: bool,
    },

    /// Index documents into the knowledge base
    Ingest {
        /// Text or markdown files to index
        paths: Vec<PathBuf>,

        /// Fetch and index a web page instead
        #[arg(long, conflicts_with = "paths")]
        url: Option<String>,

        /// Title for the document (defaults to the file name or page title)
        #[arg(long)]
        title: Option<String>,

        /// Comma-separated author names
        #[arg(long, value_delimiter = ',')]
        authors: Vec<String>,
    },

    /// Inspect or delete recorded thought paths
    #[command(subcommand)]
    History(HistoryCommands),

    /// Show configuration information
    Config {
        /// Print the effective configuration as TOML
        #[arg(short = 'f', long)]
        full: bool,

        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List the runs of a session
    List {
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Only show the last N runs
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete every run of a session
    Delete {
        #[arg(short, long)]
        session: String,
    },

    /// List sessions with recorded runs
    Sessions,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
