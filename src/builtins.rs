use once_cell::sync::Lazy;
use phf::phf_map;
use std::collections::HashSet;

use crate::deps::{Deps, NodeSet, UseNode};
use crate::name::Name;

/// Machine-generated names that stay legal as global references. Everything
/// else machine-generated must be bound locally.
pub const GLOBALLY_VISIBLE: &[&str] = &["__Unit", "__True", "__False"];

/// Variadic foreign-call wrappers. Never seeded as postulates; the graph
/// builder special-cases them at call sites because their first argument is a
/// compile-time type spec.
pub const FOREIGN_WRAPPERS: &[&str] = &["mkForeign", "mkForeignPrim", "mkLazyForeignPrim"];

/// Builtin primitive table: primitive name to arity.
pub static PRIMITIVES: phf::Map<&'static str, usize> = phf_map! {
    "prim__addInt" => 2,
    "prim__subInt" => 2,
    "prim__mulInt" => 2,
    "prim__divInt" => 2,
    "prim__modInt" => 2,
    "prim__negInt" => 1,
    "prim__eqInt" => 2,
    "prim__sltInt" => 2,
    "prim__addFloat" => 2,
    "prim__subFloat" => 2,
    "prim__mulFloat" => 2,
    "prim__divFloat" => 2,
    "prim__eqFloat" => 2,
    "prim__concat" => 2,
    "prim__eqString" => 2,
    "prim__strHead" => 1,
    "prim__strTail" => 1,
    "prim__strCons" => 2,
    "prim__strIndex" => 2,
    "prim__strRev" => 1,
    "prim__strLen" => 1,
    "prim__intToStr" => 1,
    "prim__strToInt" => 1,
    "prim__intToChar" => 1,
    "prim__charToInt" => 1,
    "prim__floatToStr" => 1,
    "prim__strToFloat" => 1,
    "prim__readString" => 1,
    "prim__writeString" => 2,
    "prim__stdin" => 0,
    "prim__vm" => 0,
    "prim_fork" => 1,
    "prim__believe_me" => 3,
};

/// The conventional program entry point.
pub static ENTRY_POINT: Lazy<Name> = Lazy::new(|| Name::namespaced(&["Main"], "main"));
/// Wrapper the runtime calls to drive the top-level I/O action.
pub static IO_RUNNER: Lazy<Name> = Lazy::new(|| Name::user("run__IO"));
pub static PAIR_CON: Lazy<Name> = Lazy::new(|| Name::machine(0, "__MkPair"));
pub static FORK: Lazy<Name> = Lazy::new(|| Name::user("prim_fork"));
/// Unsafe coercion. Arguments 0 and 1 are type witnesses with no runtime
/// content; only argument 2 survives erasure.
pub static BELIEVE_ME: Lazy<Name> = Lazy::new(|| Name::user("prim__believe_me"));

pub fn is_foreign_call(name: &Name) -> bool {
    matches!(name, Name::User { ns, ident } if ns.is_empty() && FOREIGN_WRAPPERS.contains(&ident.as_str()))
}

fn as_primitive(name: &Name) -> Option<usize> {
    match name {
        Name::User { ns, ident } if ns.is_empty() => PRIMITIVES.get(ident.as_str()).copied(),
        _ => None,
    }
}

/// Seed the edge map with the facts that cannot be derived from program text:
/// the entry point and I/O runner are demanded, and the builtins keep the
/// argument positions the runtime inspects.
///
/// `referenced` is the set of names the builder visited; primitives outside
/// it get no postulate, so an unused primitive stays erasable.
pub fn seed_postulates(deps: &mut Deps, entry: &Name, referenced: &HashSet<Name>) {
    let mut always = NodeSet::new();
    always.insert(UseNode::result(entry.clone()));
    always.insert(UseNode::result(IO_RUNNER.clone()));
    always.insert(UseNode::arg(IO_RUNNER.clone(), 0));
    always.insert(UseNode::arg(PAIR_CON.clone(), 0));
    always.insert(UseNode::arg(PAIR_CON.clone(), 1));
    always.insert(UseNode::arg(FORK.clone(), 0));
    always.insert(UseNode::arg(BELIEVE_ME.clone(), 2));

    for name in referenced {
        if name == &*FORK || name == &*BELIEVE_ME {
            continue;
        }
        if let Some(arity) = as_primitive(name) {
            for i in 0..arity {
                always.insert(UseNode::arg(name.clone(), i));
            }
        }
    }

    deps.entry(NodeSet::new()).or_default().extend(always);
}

#[test]
fn foreign_wrappers_are_unqualified_user_names() {
    assert!(is_foreign_call(&Name::user("mkForeign")));
    assert!(is_foreign_call(&Name::user("mkLazyForeignPrim")));
    assert!(!is_foreign_call(&Name::namespaced(&["FFI"], "mkForeign")));
    assert!(!is_foreign_call(&Name::machine(0, "mkForeign")));
}

#[test]
fn postulates_gate_primitives_on_being_referenced() {
    let mut deps = Deps::new();
    let referenced: HashSet<Name> =
        [Name::user("prim__addInt"), Name::user("prim__believe_me")]
            .into_iter()
            .collect();
    seed_postulates(&mut deps, &ENTRY_POINT, &referenced);

    let always = &deps[&NodeSet::new()];
    assert!(always.contains(&UseNode::result(ENTRY_POINT.clone())));
    assert!(always.contains(&UseNode::arg(Name::user("prim__addInt"), 0)));
    assert!(always.contains(&UseNode::arg(Name::user("prim__addInt"), 1)));
    // believe_me keeps only its value argument even though it was referenced
    assert!(!always.contains(&UseNode::arg(BELIEVE_ME.clone(), 0)));
    assert!(!always.contains(&UseNode::arg(BELIEVE_ME.clone(), 1)));
    assert!(always.contains(&UseNode::arg(BELIEVE_ME.clone(), 2)));
    // unreferenced primitives get nothing
    assert!(!always.contains(&UseNode::arg(Name::user("prim__concat"), 0)));
}
