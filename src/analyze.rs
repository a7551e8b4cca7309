use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use crate::builtins::{self, ENTRY_POINT};
use crate::deps::{render_edge, Arg, GraphBuilder};
use crate::errors::{WhittleError, WhittleResult};
use crate::name::Name;
use crate::program::Program;
#[cfg(test)]
use crate::program::{ClassInfo, OptInfo};
use crate::solve::forward_chain;
#[cfg(test)]
use crate::term::{CaseAlt, CaseDef, CaseTree, Def, Literal, RefKind, Term};

/// Run the whole pass: build the conditional dependency graph from the entry
/// point, postulate the underivable facts, solve, and project the solution
/// into per-symbol usage.
///
/// Returns the reachable symbols in ascending order and writes each one's
/// ascending used-argument indices into its call-graph record, creating a
/// blank record for symbols (pure data constructors) that had none. With no
/// `Main.main` in scope the translation unit is not being linked and the
/// whole pass is skipped.
pub fn find_used(program: &mut Program) -> WhittleResult<Vec<Name>> {
    let entry = &*ENTRY_POINT;
    if !program.context.contains(entry) {
        debug!(target: "usage", "no {entry} in scope, nothing to analyze");
        return Ok(Vec::new());
    }

    let builder = GraphBuilder::new(&program.context, &program.classes);
    let (mut deps, visited) = builder.build(entry)?;
    builtins::seed_postulates(&mut deps, entry, &visited);

    let (residual, used) = forward_chain(deps);

    let mut reachable: BTreeSet<Name> = BTreeSet::new();
    let mut used_args: BTreeMap<Name, BTreeSet<usize>> = BTreeMap::new();
    for node in &used {
        match node.arg {
            Arg::Result => {
                reachable.insert(node.name.clone());
            }
            Arg::Pos(i) => {
                used_args.entry(node.name.clone()).or_default().insert(i);
            }
        }
    }

    debug!(target: "usage", "{} reachable symbols", reachable.len());
    for name in &reachable {
        debug!(target: "usage", "  {name}");
    }
    for (name, indices) in &used_args {
        trace!(target: "usage", "{name} keeps arguments {indices:?}");
    }
    for (cond, nodes) in &residual {
        trace!(target: "residual", "{}", render_edge(cond, nodes));
    }

    check_accessibility(&used_args, program)?;

    for name in &reachable {
        let indices: Vec<usize> = used_args
            .get(name)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        program.callgraph.entry(name.clone()).or_default().used_args = indices;
    }

    Ok(reachable.into_iter().collect())
}

/// An argument both used at runtime and marked inaccessible by an earlier
/// pass means that pass was wrong; abort loudly rather than miscompile.
fn check_accessibility(
    used_args: &BTreeMap<Name, BTreeSet<usize>>,
    program: &Program,
) -> WhittleResult<()> {
    let mut offenders = Vec::new();
    for (name, used) in used_args {
        if let Some(opt) = program.opts.get(name) {
            let clash: Vec<usize> = opt
                .inaccessible
                .iter()
                .copied()
                .filter(|i| used.contains(i))
                .collect();
            if !clash.is_empty() {
                offenders.push(format!("{name} {clash:?}"));
            }
        }
    }
    if offenders.is_empty() {
        Ok(())
    } else {
        Err(WhittleError::InaccessibleUsed(offenders.join(", ")))
    }
}

#[cfg(test)]
fn n(s: &str) -> Name {
    s.parse().unwrap()
}

#[cfg(test)]
fn fref(s: &str) -> Term {
    Term::Ref(RefKind::Func, n(s))
}

#[cfg(test)]
fn bref(s: &str) -> Term {
    Term::Ref(RefKind::Bound, n(s))
}

#[cfg(test)]
fn dcon(s: &str) -> Term {
    Term::Ref(RefKind::DataCon, n(s))
}

#[cfg(test)]
fn int(i: i64) -> Term {
    Term::Const(Literal::Int(i))
}

#[cfg(test)]
fn caseop(args: &[&str], tree: CaseTree) -> Def {
    Def::CaseOp(CaseDef {
        args: args.iter().map(|a| n(a)).collect(),
        arg_tys: vec![Term::Erased; args.len()],
        tree,
    })
}

#[cfg(test)]
fn leaf(args: &[&str], body: Term) -> Def {
    caseop(args, CaseTree::Leaf(body))
}

#[cfg(test)]
fn datacon(arity: usize) -> Def {
    Def::Decl {
        kind: RefKind::DataCon,
        arity,
    }
}

#[cfg(test)]
fn program(defs: Vec<(&str, Def)>) -> Program {
    let mut program = Program::default();
    for (name, def) in defs {
        program.context.insert(n(name), def);
    }
    program
}

#[cfg(test)]
fn used_of(program: &Program, name: &str) -> Vec<usize> {
    program.callgraph[&n(name)].used_args.clone()
}

#[test]
fn no_entry_point_skips_the_pass() {
    let mut program = program(vec![("f", leaf(&[], int(1)))]);
    let reachable = find_used(&mut program).unwrap();
    assert!(reachable.is_empty());
    assert!(program.callgraph.is_empty(), "nothing may be written back");
}

#[test]
fn identity_call_uses_argument_and_constructor() {
    // id x = x; main = id Z
    let mut program = program(vec![
        ("Main.main", leaf(&[], fref("id").apply([dcon("Z")]))),
        ("id", leaf(&["x"], bref("x"))),
        ("Z", datacon(0)),
    ]);
    let reachable = find_used(&mut program).unwrap();
    // run__IO is postulated reachable whether or not the program has it
    assert_eq!(
        reachable,
        vec![n("Z"), n("id"), n("run__IO"), n("Main.main")]
    );
    assert_eq!(used_of(&program, "id"), vec![0]);
    assert_eq!(used_of(&program, "Main.main"), Vec::<usize>::new());
    assert_eq!(used_of(&program, "Z"), Vec::<usize>::new());
}

#[test]
fn pair_projection_keeps_only_the_projected_field() {
    // fst p = case p of MkPair a b => a; main = fst (MkPair 1 2)
    let mut program = program(vec![
        (
            "Main.main",
            leaf(
                &[],
                fref("fst").apply([dcon("MkPair").apply([int(1), int(2)])]),
            ),
        ),
        (
            "fst",
            caseop(
                &["p"],
                CaseTree::Case {
                    var: n("p"),
                    alts: vec![CaseAlt::Con {
                        ctor: n("MkPair"),
                        binds: vec![n("a"), n("b")],
                        rhs: CaseTree::Leaf(bref("a")),
                    }],
                },
            ),
        ),
        ("MkPair", datacon(2)),
    ]);
    let reachable = find_used(&mut program).unwrap();
    assert!(reachable.contains(&n("fst")));
    assert!(reachable.contains(&n("MkPair")));
    assert_eq!(used_of(&program, "MkPair"), vec![0], "second field is dead");
    assert_eq!(used_of(&program, "fst"), vec![0]);
}

#[test]
fn believe_me_erases_its_type_witnesses() {
    // main = prim__believe_me A B x
    let mut program = program(vec![
        (
            "Main.main",
            leaf(
                &[],
                fref("prim__believe_me").apply([
                    Term::Ref(RefKind::TypeCon, n("A")),
                    Term::Ref(RefKind::TypeCon, n("B")),
                    dcon("C"),
                ]),
            ),
        ),
        ("prim__believe_me", Def::Operator { arity: 3 }),
        (
            "A",
            Def::Decl {
                kind: RefKind::TypeCon,
                arity: 0,
            },
        ),
        (
            "B",
            Def::Decl {
                kind: RefKind::TypeCon,
                arity: 0,
            },
        ),
        ("C", datacon(0)),
    ]);
    let reachable = find_used(&mut program).unwrap();
    assert_eq!(used_of(&program, "prim__believe_me"), vec![2]);
    assert!(reachable.contains(&n("C")), "the value argument is live");
    assert!(!reachable.contains(&n("A")));
    assert!(!reachable.contains(&n("B")));
}

#[cfg(test)]
fn mutual_program(g_second_arg: Term) -> Program {
    // f 0 y = y; f n y = g n y
    // g n y = f (prim__subInt n 1) <g_second_arg>
    // main = f 5 42
    program(vec![
        ("Main.main", leaf(&[], fref("f").apply([int(5), int(42)]))),
        (
            "f",
            caseop(
                &["fn", "fy"],
                CaseTree::Case {
                    var: n("fn"),
                    alts: vec![
                        CaseAlt::Lit {
                            value: Literal::Int(0),
                            rhs: CaseTree::Leaf(bref("fy")),
                        },
                        CaseAlt::Default {
                            rhs: CaseTree::Leaf(
                                fref("g").apply([bref("fn"), bref("fy")]),
                            ),
                        },
                    ],
                },
            ),
        ),
        (
            "g",
            leaf(
                &["gn", "gy"],
                fref("f").apply([
                    fref("prim__subInt").apply([bref("gn"), int(1)]),
                    g_second_arg,
                ]),
            ),
        ),
        ("prim__subInt", Def::Operator { arity: 2 }),
    ])
}

#[test]
fn mutual_recursion_keeps_live_arguments() {
    let mut program = mutual_program(bref("gy"));
    let reachable = find_used(&mut program).unwrap();
    assert!(reachable.contains(&n("f")) && reachable.contains(&n("g")));
    assert_eq!(used_of(&program, "f"), vec![0, 1]);
    assert_eq!(used_of(&program, "g"), vec![0, 1]);
}

#[test]
fn dead_argument_in_recursion_is_dropped() {
    // g passes a constant instead of forwarding y
    let mut program = mutual_program(int(0));
    find_used(&mut program).unwrap();
    assert_eq!(used_of(&program, "f"), vec![0, 1], "f still eats y directly");
    assert_eq!(used_of(&program, "g"), vec![0], "g's y goes nowhere");
}

#[test]
fn foreign_call_spares_the_spec_and_keeps_the_rest() {
    // main = mkForeign spec callee 7 "hi"
    let mut program = program(vec![
        (
            "Main.main",
            leaf(
                &[],
                fref("mkForeign").apply([
                    fref("spec"),
                    fref("callee"),
                    int(7),
                    Term::Const(Literal::Str("hi".into())),
                ]),
            ),
        ),
        ("spec", leaf(&[], int(0))),
        ("callee", leaf(&[], int(0))),
    ]);
    let reachable = find_used(&mut program).unwrap();
    assert!(reachable.contains(&n("callee")));
    assert!(!reachable.contains(&n("spec")));
}

#[test]
fn inaccessible_but_used_argument_aborts() {
    let mut program = program(vec![
        ("Main.main", leaf(&[], fref("id").apply([dcon("Z")]))),
        ("id", leaf(&["x"], bref("x"))),
        ("Z", datacon(0)),
    ]);
    program.opts.insert(
        n("id"),
        OptInfo {
            inaccessible: vec![0],
            detaggable: false,
        },
    );
    let err = find_used(&mut program).unwrap_err();
    assert!(matches!(err, WhittleError::InaccessibleUsed(_)));
    assert!(err.to_string().contains("id"));
}

#[test]
fn entry_point_is_always_demanded() {
    let mut program = program(vec![("Main.main", leaf(&[], int(0)))]);
    let reachable = find_used(&mut program).unwrap();
    assert_eq!(reachable, vec![n("run__IO"), n("Main.main")]);
}

#[test]
fn unused_primitive_gets_no_postulate() {
    // prim__concat is defined but never referenced
    let mut program = program(vec![
        ("Main.main", leaf(&[], int(0))),
        ("prim__concat", Def::Operator { arity: 2 }),
    ]);
    let reachable = find_used(&mut program).unwrap();
    assert!(!reachable.contains(&n("prim__concat")));
    assert!(!program.callgraph.contains_key(&n("prim__concat")));
}

#[test]
fn method_call_through_dictionary_projection() {
    // show' d = ((@Show(List)).0) d; coarse: field 0 of MkShow is kept
    let show = "Show";
    let mut program = program(vec![
        (
            "Main.main",
            leaf(&[], fref("show'").apply([dcon("Nil")])),
        ),
        (
            "show'",
            leaf(
                &["d"],
                Term::Proj(
                    Box::new(Term::Ref(
                        RefKind::Func,
                        Name::impl_name(n(show), &["List"]),
                    )),
                    0,
                )
                .apply([bref("d")]),
            ),
        ),
        ("MkShow", datacon(1)),
        ("Nil", datacon(0)),
    ]);
    program
        .context
        .insert(Name::impl_name(n(show), &["List"]), leaf(&[], dcon("MkShow")));
    program.classes.insert(
        n(show),
        ClassInfo {
            ctor: n("MkShow"),
            methods: vec![n("show")],
        },
    );
    let reachable = find_used(&mut program).unwrap();
    assert!(reachable.contains(&Name::impl_name(n(show), &["List"])));
    assert_eq!(used_of(&program, "MkShow"), vec![0]);
}
