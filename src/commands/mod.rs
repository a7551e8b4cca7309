pub mod analyze;
pub mod graph;

use crate::cli::Commands;
use whittle::errors::WhittleResult;

pub fn handle_command(command: Commands) -> WhittleResult<()> {
    match command {
        Commands::Analyze { program, verbose } => analyze::handle(&program, verbose),
        Commands::Graph { program } => graph::handle(&program),
    }
}
