use console::style;
use std::path::Path;

use whittle::builtins::{self, ENTRY_POINT};
use whittle::deps::{render_edge, GraphBuilder};
use whittle::errors::WhittleResult;
use whittle::program::Program;

/// Build and print the conditional dependency graph, postulates included,
/// without running the solver.
pub fn handle(path: &str) -> WhittleResult<()> {
    let program = Program::load(Path::new(path))?;
    if !program.context.contains(&ENTRY_POINT) {
        println!(
            "{}: no entry point, the graph is empty.",
            style("note").green().bold()
        );
        return Ok(());
    }

    let builder = GraphBuilder::new(&program.context, &program.classes);
    let (mut deps, visited) = builder.build(&ENTRY_POINT)?;
    builtins::seed_postulates(&mut deps, &ENTRY_POINT, &visited);

    let mut lines: Vec<String> = deps
        .iter()
        .map(|(cond, nodes)| render_edge(cond, nodes))
        .collect();
    lines.sort();
    for line in &lines {
        println!("  {line}");
    }
    println!(
        "{} conditional edges over {} symbols.",
        style(lines.len()).bold(),
        style(visited.len()).bold()
    );
    Ok(())
}
