use console::style;
use std::path::Path;

use whittle::errors::WhittleResult;
use whittle::find_used;
use whittle::program::Program;

/// Entry point called by the CLI.
pub fn handle(path: &str, verbose: bool) -> WhittleResult<()> {
    let mut program = Program::load(Path::new(path))?;
    let reachable = find_used(&mut program)?;

    if reachable.is_empty() {
        println!(
            "{}: no entry point, nothing is reachable.",
            style("note").green().bold()
        );
        return Ok(());
    }

    println!(
        "{} symbols reachable from {}:",
        style(reachable.len()).bold(),
        style("Main.main").white().bold()
    );
    for name in &reachable {
        if verbose {
            let used = program
                .callgraph
                .get(name)
                .map(|cg| cg.used_args.as_slice())
                .unwrap_or(&[]);
            println!("  {name}  {}", style(format!("uses {used:?}")).dim());
        } else {
            println!("  {name}");
        }
    }
    Ok(())
}

#[test]
fn handle_runs_on_a_program_file() {
    let json = r#"
    {
        "context": {
            "Main.main": { "CaseOp": {
                "args": [],
                "arg_tys": [],
                "tree": { "Leaf": { "App": [
                    { "Ref": ["Func", "id"] },
                    { "Ref": ["DataCon", "Z"] }
                ] } }
            } },
            "id": { "CaseOp": {
                "args": ["x"],
                "arg_tys": ["Erased"],
                "tree": { "Leaf": { "Ref": ["Bound", "x"] } }
            } },
            "Z": { "Decl": { "kind": "DataCon", "arity": 0 } }
        }
    }"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("id.json");
    std::fs::write(&path, json).unwrap();

    handle(path.to_str().unwrap(), true).expect("analysis should succeed");
}

#[test]
fn missing_file_is_an_io_error() {
    let err = handle("/definitely/not/here.json", false).unwrap_err();
    assert!(matches!(err, whittle::WhittleError::Io(_)));
}
