use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::errors::{WhittleError, WhittleResult};
use crate::name::Name;
use crate::term::Def;
#[cfg(test)]
use crate::term::{RefKind, Term};

/// The elaborated symbol table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    defs: HashMap<Name, Def>,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn insert(&mut self, name: Name, def: Def) {
        self.defs.insert(name, def);
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.defs.contains_key(name)
    }

    /// Exact lookup, no resolution.
    pub fn get(&self, name: &Name) -> Option<&Def> {
        self.defs.get(name)
    }

    /// Resolving lookup. An unqualified user name that is not itself defined
    /// may resolve into a namespace; more than one candidate is an error.
    pub fn lookup(&self, name: &Name) -> WhittleResult<&Def> {
        if let Some(def) = self.defs.get(name) {
            return Ok(def);
        }
        if let Name::User { ns, ident } = name {
            if ns.is_empty() {
                let hits: Vec<(&Name, &Def)> = self
                    .defs
                    .iter()
                    .filter(|(n, _)| {
                        matches!(n, Name::User { ns, ident: i } if !ns.is_empty() && i == ident)
                    })
                    .collect();
                return match hits.as_slice() {
                    [] => Err(WhittleError::UnknownName(name.clone())),
                    [(_, def)] => Ok(def),
                    many => {
                        let mut candidates: Vec<String> =
                            many.iter().map(|(n, _)| n.to_string()).collect();
                        candidates.sort();
                        Err(WhittleError::Ambiguous(name.clone(), candidates.join(", ")))
                    }
                };
            }
        }
        Err(WhittleError::UnknownName(name.clone()))
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.defs.keys()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

/// Interface descriptor: the dictionary constructor plus the method fields in
/// declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    pub ctor: Name,
    #[serde(default)]
    pub methods: Vec<Name>,
}

/// Per-symbol results of earlier optimization passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptInfo {
    /// Argument indices proven statically inaccessible.
    pub inaccessible: Vec<usize>,
    pub detaggable: bool,
}

/// Call-graph record; the analyzer writes its verdict into `used_args`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CgInfo {
    pub calls: Vec<Name>,
    pub scc: Vec<Name>,
    /// Ascending argument indices used at runtime.
    pub used_args: Vec<usize>,
}

/// Everything the pass consumes and writes back: symbol table, interface
/// table, optimization annotations and the call-graph records the results
/// land in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Program {
    pub context: Context,
    pub classes: HashMap<Name, ClassInfo>,
    pub opts: HashMap<Name, OptInfo>,
    pub callgraph: HashMap<Name, CgInfo>,
}

impl Program {
    pub fn from_json(text: &str) -> WhittleResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> WhittleResult<Self> {
        tracing::debug!("loading program from {}", path.display());
        let text = fs::read_to_string(path)?;
        Program::from_json(&text)
    }
}

#[cfg(test)]
fn decl() -> Def {
    Def::Decl {
        kind: RefKind::Func,
        arity: 0,
    }
}

#[test]
fn exact_lookup_wins_over_resolution() {
    let mut ctx = Context::new();
    ctx.insert(Name::user("foo"), decl());
    ctx.insert(Name::namespaced(&["A"], "foo"), decl());
    assert!(ctx.lookup(&Name::user("foo")).is_ok());
}

#[test]
fn unqualified_name_resolves_into_unique_namespace() {
    let mut ctx = Context::new();
    ctx.insert(Name::namespaced(&["A"], "foo"), decl());
    assert!(ctx.lookup(&Name::user("foo")).is_ok());
    assert!(matches!(
        ctx.lookup(&Name::user("bar")),
        Err(WhittleError::UnknownName(_))
    ));
}

#[test]
fn two_candidates_are_ambiguous() {
    let mut ctx = Context::new();
    ctx.insert(Name::namespaced(&["A"], "foo"), decl());
    ctx.insert(Name::namespaced(&["B"], "foo"), decl());
    let err = ctx.lookup(&Name::user("foo")).unwrap_err();
    assert!(matches!(err, WhittleError::Ambiguous(..)));
    assert!(err.to_string().contains("A.foo"));
    assert!(err.to_string().contains("B.foo"));
}

#[test]
fn program_loads_from_json_file() {
    let json = r#"
    {
        "context": {
            "Main.main": { "Function": { "body": "Erased" } },
            "nil": { "Decl": { "kind": "DataCon", "arity": 0 } }
        },
        "opts": { "nil": { "inaccessible": [0] } }
    }"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.json");
    fs::write(&path, json).unwrap();

    let program = Program::load(&path).expect("well-formed program");
    assert_eq!(program.context.len(), 2);
    assert!(program.context.contains(&Name::namespaced(&["Main"], "main")));
    assert_eq!(program.opts[&Name::user("nil")].inaccessible, vec![0]);
    assert!(program.callgraph.is_empty());
}

#[test]
fn bad_json_is_a_serde_error() {
    assert!(matches!(
        Program::from_json("{ not json"),
        Err(WhittleError::Serde(_))
    ));
}

#[test]
fn term_json_shape_is_stable() {
    let t: Term = serde_json::from_str(r#"{"Ref": ["Func", "Main.go"]}"#).unwrap();
    assert_eq!(
        t,
        Term::Ref(RefKind::Func, Name::namespaced(&["Main"], "go"))
    );
}
