//! dualstore CLI Module
//! Command-line interface for compiling filters and running requests against a local store

pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dualstore")]
#[command(author = "dualstore Team")]
#[command(version)]
#[command(about = "One filter and batch-write contract over entity tables and document stores", long_about = None)]
pub struct Cli {
    /// Service directory holding dualstore.config.json (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendArg {
    Table,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VerbArg {
    Create,
    Replace,
    Patch,
    Delete,
    Get,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a service directory with a default config
    Init {
        /// Service name
        #[arg(short, long)]
        name: String,

        /// Native store to use
        #[arg(short, long, value_enum, default_value = "table")]
        backend: BackendArg,

        /// Default partition key for entity-table requests
        #[arg(long)]
        partition_key: Option<String>,
    },

    /// Compile a filter to a native query without running it
    Compile {
        /// Target dialect
        #[arg(short, long, value_enum)]
        backend: BackendArg,

        /// Table or collection name
        #[arg(short, long, default_value = "t")]
        table: String,

        /// Filter expression
        #[arg(long)]
        filter: String,

        /// Replacement parameter as name=value (repeatable)
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Ordering for the document SELECT
        #[arg(long)]
        order_by: Option<String>,
    },

    /// Retrieve records by filter or ids
    Query {
        /// Table or collection name
        #[arg(short, long)]
        table: String,

        /// Filter expression
        #[arg(long, conflicts_with = "ids")]
        filter: Option<String>,

        /// Comma separated record ids
        #[arg(long)]
        ids: Option<String>,

        /// Replacement parameter as name=value (repeatable)
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// `*` or a comma separated field list
        #[arg(long)]
        fields: Option<String>,

        /// Maximum number of records
        #[arg(short, long)]
        limit: Option<usize>,

        /// `field [ASC|DESC], ...`
        #[arg(long)]
        order_by: Option<String>,

        /// Entity-table partition
        #[arg(long)]
        partition_key: Option<String>,

        /// Report the matched count
        #[arg(long)]
        include_count: bool,
    },

    /// Apply a verb to the records in a JSON file (an object or an array)
    Write {
        /// Table or collection name
        #[arg(short, long)]
        table: String,

        #[arg(long, value_enum)]
        verb: VerbArg,

        /// JSON input file
        #[arg(short, long)]
        input: PathBuf,

        /// Undo applied items when one fails
        #[arg(long)]
        rollback: bool,

        /// Attempt every item and report failures per index
        #[arg(long = "continue")]
        continue_on_error: bool,

        /// `*` or a comma separated field list for the output
        #[arg(long)]
        fields: Option<String>,

        /// Entity-table partition
        #[arg(long)]
        partition_key: Option<String>,
    },

    /// Delete records by ids or filter
    Delete {
        /// Table or collection name
        #[arg(short, long)]
        table: String,

        /// Comma separated record ids
        #[arg(long, conflicts_with = "filter", required_unless_present = "filter")]
        ids: Option<String>,

        /// Filter expression
        #[arg(long)]
        filter: Option<String>,

        /// Replacement parameter as name=value (repeatable)
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Undo applied deletes when one fails
        #[arg(long)]
        rollback: bool,

        /// Attempt every delete and report failures per index
        #[arg(long = "continue")]
        continue_on_error: bool,

        /// Entity-table partition
        #[arg(long)]
        partition_key: Option<String>,
    },
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}
