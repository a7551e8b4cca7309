use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "whittle")]
#[command(about = "Whole-program usage analysis: find what codegen may erase")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a program and report reachable symbols
    Analyze {
        /// Path to the serialized program
        program: String,

        /// Also print per-symbol used argument indices
        #[arg(short, long)]
        verbose: bool,
    },

    /// Dump the conditional dependency graph without solving it
    Graph {
        /// Path to the serialized program
        program: String,
    },
}
