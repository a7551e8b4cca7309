use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, trace};

use crate::builtins;
use crate::errors::{WhittleError, WhittleResult};
use crate::name::Name;
use crate::program::{ClassInfo, Context};
use crate::term::{Binder, CaseAlt, CaseDef, CaseTree, Def, RefKind, Term};
#[cfg(test)]
use crate::term::Literal;

// -------------------------------------------------------------------------
//  Node vocabulary
// -------------------------------------------------------------------------

/// Argument position within a symbol: a parameter index or the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arg {
    Pos(usize),
    Result,
}

/// Elementary usage fact: "this position of this symbol is needed at
/// runtime".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UseNode {
    pub name: Name,
    pub arg: Arg,
}

impl UseNode {
    pub fn result(name: Name) -> Self {
        UseNode {
            name,
            arg: Arg::Result,
        }
    }

    pub fn arg(name: Name, i: usize) -> Self {
        UseNode {
            name,
            arg: Arg::Pos(i),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Pos(i) => write!(f, "#{i}"),
            Arg::Result => f.write_str("#ret"),
        }
    }
}

impl fmt::Display for UseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.arg)
    }
}

pub type NodeSet = BTreeSet<UseNode>;

/// Conjunction of usage assumptions; the empty set is `true`.
pub type Cond = NodeSet;

/// The conditional edge map. An entry `C -> N` reads: if every assumption in
/// `C` holds then every node in `N` is used. Entries with the same key
/// combine by union, so the map is a set of Horn clauses keyed by body.
pub type Deps = HashMap<Cond, NodeSet>;

pub fn merge_deps(acc: &mut Deps, extra: Deps) {
    for (cond, nodes) in extra {
        if nodes.is_empty() {
            continue;
        }
        acc.entry(cond).or_default().extend(nodes);
    }
}

fn single(cond: &Cond, nodes: NodeSet) -> Deps {
    if nodes.is_empty() {
        return Deps::new();
    }
    Deps::from([(cond.clone(), nodes)])
}

fn with_node(cond: &Cond, node: UseNode) -> Cond {
    let mut out = cond.clone();
    out.insert(node);
    out
}

pub fn render_edge(cond: &Cond, nodes: &NodeSet) -> String {
    let rhs = nodes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if cond.is_empty() {
        format!("true => {rhs}")
    } else {
        let lhs = cond
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" & ");
        format!("{lhs} => {rhs}")
    }
}

// -------------------------------------------------------------------------
//  Traversal environments
// -------------------------------------------------------------------------

/// Per-definition environment: locally bound name to the usage nodes a
/// reference to it drags in. A formal parameter of `f` at position `i`
/// starts as `{f#i}`; pattern variables accumulate from there.
type Vars = HashMap<Name, NodeSet>;

/// One entry of the de Bruijn binder stack. Lambdas and Πs carry no
/// dependencies of their own; a let keeps its bound term and contributes only
/// when the variable is actually referenced, under the condition of the
/// reference site.
#[derive(Clone, Copy)]
enum Slot<'t> {
    Opaque,
    Bound(&'t Term),
}

fn push<'t>(stack: &[Slot<'t>], slot: Slot<'t>) -> Vec<Slot<'t>> {
    let mut out = Vec::with_capacity(stack.len() + 1);
    out.extend_from_slice(stack);
    out.push(slot);
    out
}

// -------------------------------------------------------------------------
//  Whole-program graph builder
// -------------------------------------------------------------------------

/// Walks every definition reachable from the entry symbol and accumulates
/// conditional dependency edges.
pub struct GraphBuilder<'a> {
    ctx: &'a Context,
    classes: &'a HashMap<Name, ClassInfo>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(ctx: &'a Context, classes: &'a HashMap<Name, ClassInfo>) -> Self {
        GraphBuilder { ctx, classes }
    }

    /// Traverse the program starting from `entry`. Returns the edge map and
    /// every name the traversal visited.
    ///
    /// Discovery runs as a breadth-first wavefront: definitions on the
    /// current frontier are independent of each other, so each round analyzes
    /// them in parallel and merges the per-definition maps by key-wise union.
    pub fn build(&self, entry: &Name) -> WhittleResult<(Deps, HashSet<Name>)> {
        let mut deps = Deps::new();
        let mut visited: HashSet<Name> = HashSet::from([entry.clone()]);
        let mut frontier = vec![entry.clone()];

        while !frontier.is_empty() {
            let batches: Vec<(&Name, Deps)> = frontier
                .par_iter()
                .map(|name| self.def_deps(name).map(|d| (name, d)))
                .collect::<WhittleResult<_>>()?;

            let mut next = Vec::new();
            for (name, batch) in batches {
                trace!(target: "deps", "{name}: {} edge groups", batch.len());
                for node in batch.keys().flatten().chain(batch.values().flatten()) {
                    if !visited.contains(&node.name) {
                        visited.insert(node.name.clone());
                        next.push(node.name.clone());
                    }
                }
                merge_deps(&mut deps, batch);
            }
            debug!(target: "deps", "wavefront discovered {} new symbols", next.len());
            frontier = next;
        }

        Ok((deps, visited))
    }

    /// Per-definition dispatch.
    fn def_deps(&self, name: &Name) -> WhittleResult<Deps> {
        match self.ctx.lookup(name)? {
            Def::Decl { .. } | Def::Operator { .. } => Ok(Deps::new()),
            Def::Function { .. } => Err(WhittleError::Unsupported(format!(
                "{name} has not been compiled to a case tree"
            ))),
            Def::CaseOp(def) => self.case_deps(name, def),
        }
    }

    /// Set up the parameter environment for one case-op and analyze its tree.
    ///
    /// The tree may bind fewer parameters than declared (partial eta form);
    /// the missing trailing positions get fresh machine variables that every
    /// leaf term is applied to.
    fn case_deps(&self, fname: &Name, def: &CaseDef) -> WhittleResult<Deps> {
        let mut vars = Vars::with_capacity(def.arg_tys.len());
        for (i, v) in def.args.iter().enumerate() {
            vars.insert(v.clone(), NodeSet::from([UseNode::arg(fname.clone(), i)]));
        }
        let etas: Vec<Name> = (def.args.len()..def.arg_tys.len())
            .map(|i| {
                let eta = Name::machine(i as i32, "eta");
                vars.insert(eta.clone(), NodeSet::from([UseNode::arg(fname.clone(), i)]));
                eta
            })
            .collect();
        self.tree_deps(fname, &etas, &vars, &def.tree)
    }

    fn tree_deps(
        &self,
        fname: &Name,
        etas: &[Name],
        vars: &Vars,
        tree: &CaseTree,
    ) -> WhittleResult<Deps> {
        match tree {
            CaseTree::Impossible | CaseTree::Unmatched(_) => Ok(Deps::new()),

            // every reference in a body is gated on the result being demanded
            CaseTree::Leaf(t) => {
                let demanded = NodeSet::from([UseNode::result(fname.clone())]);
                if etas.is_empty() {
                    self.term_deps(vars, &[], &demanded, t)
                } else {
                    let expanded = t.clone().apply(
                        etas.iter()
                            .map(|eta| Term::Ref(RefKind::Bound, eta.clone())),
                    );
                    self.term_deps(vars, &[], &demanded, &expanded)
                }
            }

            CaseTree::Case { var, alts } => {
                let scrutinee = vars.get(var).ok_or_else(|| {
                    WhittleError::Unsupported(format!("case on unbound variable {var} in {fname}"))
                })?;
                let demanded = NodeSet::from([UseNode::result(fname.clone())]);
                let mut out = single(&demanded, scrutinee.clone());
                for alt in alts {
                    merge_deps(&mut out, self.alt_deps(fname, etas, vars, scrutinee, alt)?);
                }
                Ok(out)
            }

            CaseTree::ProjCase { .. } => Err(WhittleError::Unsupported(format!(
                "projection case in {fname}"
            ))),
        }
    }

    fn alt_deps(
        &self,
        fname: &Name,
        etas: &[Name],
        vars: &Vars,
        scrutinee: &NodeSet,
        alt: &CaseAlt,
    ) -> WhittleResult<Deps> {
        match alt {
            CaseAlt::Lit { rhs, .. } | CaseAlt::Default { rhs } => {
                self.tree_deps(fname, etas, vars, rhs)
            }

            // successor is transparent: the predecessor aliases the scrutinee
            CaseAlt::Suc { bind, rhs } => {
                let mut inner = vars.clone();
                inner.insert(bind.clone(), scrutinee.clone());
                self.tree_deps(fname, etas, &inner, rhs)
            }

            // a pattern variable inherits the scrutinee's dependencies plus
            // the fact that its constructor field must be kept
            CaseAlt::Con { ctor, binds, rhs } => {
                let mut inner = vars.clone();
                for (j, bind) in binds.iter().enumerate() {
                    let mut dep = scrutinee.clone();
                    dep.insert(UseNode::arg(ctor.clone(), j));
                    inner.insert(bind.clone(), dep);
                }
                self.tree_deps(fname, etas, &inner, rhs)
            }

            CaseAlt::Fun { func, .. } => Err(WhittleError::Unsupported(format!(
                "function-matching alternative on {func} in {fname}"
            ))),
        }
    }

    // ---------------------------------------------------------------------
    //  Term analysis
    // ---------------------------------------------------------------------

    fn term_deps<'t>(
        &self,
        vars: &Vars,
        stack: &[Slot<'t>],
        cond: &Cond,
        term: &'t Term,
    ) -> WhittleResult<Deps> {
        match term {
            Term::App(..) => self.app_deps(vars, stack, cond, term),

            Term::Ref(_, name) => {
                if let Some(dep) = vars.get(name) {
                    return Ok(single(cond, dep.clone()));
                }
                if name.is_machine() && !name.is_globally_visible() {
                    return Err(WhittleError::StrayVariable(name.clone()));
                }
                Ok(single(cond, NodeSet::from([UseNode::result(name.clone())])))
            }

            Term::Var(i) => self.slot_deps(vars, stack, cond, *i),

            Term::Bind(_, Binder::Lam | Binder::Pi, body) => {
                let inner = push(stack, Slot::Opaque);
                self.term_deps(vars, &inner, cond, body)
            }

            Term::Bind(_, Binder::Let { value, .. }, body) => {
                let inner = push(stack, Slot::Bound(value.as_ref()));
                self.term_deps(vars, &inner, cond, body)
            }

            Term::Proj(t, _) => self.term_deps(vars, stack, cond, t),

            Term::Const(_) | Term::Universe(_) | Term::Erased | Term::Impossible => Ok(Deps::new()),
        }
    }

    /// Evaluate de Bruijn index `i`. The bound term of a let is analyzed in
    /// the stack it was closed over, with the condition of the reference
    /// site; that is what makes an unreferenced let cost nothing.
    fn slot_deps<'t>(
        &self,
        vars: &Vars,
        stack: &[Slot<'t>],
        cond: &Cond,
        i: usize,
    ) -> WhittleResult<Deps> {
        let Some(pos) = stack.len().checked_sub(i + 1) else {
            return Err(WhittleError::Unsupported(format!(
                "de Bruijn index {i} exceeds binder depth {}",
                stack.len()
            )));
        };
        match stack[pos] {
            Slot::Opaque => Ok(Deps::new()),
            Slot::Bound(t) => self.term_deps(vars, &stack[..pos], cond, t),
        }
    }

    fn app_deps<'t>(
        &self,
        vars: &Vars,
        stack: &[Slot<'t>],
        cond: &Cond,
        term: &'t Term,
    ) -> WhittleResult<Deps> {
        let (head, args) = term.unapply();
        match head {
            // type constructors have no runtime content of their own
            Term::Ref(RefKind::TypeCon, _) => self.spine_deps(vars, stack, cond, &args),

            Term::Ref(RefKind::DataCon, ctor) => self.call_deps(vars, stack, cond, ctor, &args),

            Term::Ref(_, name) => {
                if builtins::is_foreign_call(name) {
                    // the first argument is the compile-time type spec
                    return self.spine_deps(vars, stack, cond, args.get(1..).unwrap_or(&[]));
                }
                if let Some(dep) = vars.get(name) {
                    // an applied local: the variable itself, then every
                    // argument with no position information
                    let mut out = single(cond, dep.clone());
                    merge_deps(&mut out, self.spine_deps(vars, stack, cond, &args)?);
                    return Ok(out);
                }
                self.call_deps(vars, stack, cond, name, &args)
            }

            Term::Var(i) => {
                let mut out = self.slot_deps(vars, stack, cond, *i)?;
                merge_deps(&mut out, self.spine_deps(vars, stack, cond, &args)?);
                Ok(out)
            }

            // (λx. body) a …rest  ≡  (let x = a in body) …rest
            Term::Bind(n, Binder::Lam, body) => {
                let Some((first, rest)) = args.split_first() else {
                    return self.term_deps(vars, stack, cond, head);
                };
                let rewritten = Term::Bind(
                    n.clone(),
                    Binder::Let {
                        value: Box::new((*first).clone()),
                        lazy: false,
                    },
                    body.clone(),
                )
                .apply(rest.iter().map(|t| (*t).clone()));
                self.term_deps(vars, stack, cond, &rewritten)
            }

            // (let x = t in body) a  ≡  let x = t in (body a)
            Term::Bind(n, Binder::Let { value, lazy }, body) => {
                let rewritten = Term::Bind(
                    n.clone(),
                    Binder::Let {
                        value: value.clone(),
                        lazy: *lazy,
                    },
                    Box::new(
                        (**body)
                            .clone()
                            .apply(args.iter().map(|t| (*t).clone())),
                    ),
                );
                self.term_deps(vars, stack, cond, &rewritten)
            }

            // method extraction from an implementation dictionary: field i of
            // the dictionary constructor is needed, and so is the dictionary
            Term::Proj(dict, field) => {
                let (dict_head, dict_args) = dict.unapply();
                let Term::Ref(_, impl_name) = dict_head else {
                    return Err(WhittleError::Unsupported(format!(
                        "applied projection of {dict_head:?}"
                    )));
                };
                let Some(class) = impl_name.impl_class() else {
                    return Err(WhittleError::Unsupported(format!(
                        "applied projection of non-implementation {impl_name}"
                    )));
                };
                let info = self
                    .classes
                    .get(class)
                    .ok_or_else(|| WhittleError::UnknownName(class.clone()))?;
                let mut out = single(
                    cond,
                    NodeSet::from([
                        UseNode::arg(info.ctor.clone(), *field),
                        UseNode::result(impl_name.clone()),
                    ]),
                );
                merge_deps(&mut out, self.spine_deps(vars, stack, cond, &dict_args)?);
                merge_deps(&mut out, self.spine_deps(vars, stack, cond, &args)?);
                Ok(out)
            }

            Term::Erased => Ok(Deps::new()),

            Term::Universe(_) => self.spine_deps(vars, stack, cond, &args),

            _ => Err(WhittleError::Unsupported(format!(
                "application head {head:?}"
            ))),
        }
    }

    fn spine_deps<'t>(
        &self,
        vars: &Vars,
        stack: &[Slot<'t>],
        cond: &Cond,
        args: &[&'t Term],
    ) -> WhittleResult<Deps> {
        let mut out = Deps::new();
        for arg in args {
            merge_deps(&mut out, self.term_deps(vars, stack, cond, arg)?);
        }
        Ok(out)
    }

    /// A global call `n a₀ … aₘ`. The callee's result is demanded under the
    /// current condition; each argument within the declared arity is analyzed
    /// under the extra assumption "position i of n is used", so its
    /// dependencies fire only if the position survives erasure. Spill
    /// arguments past the arity stay unconditional.
    fn call_deps<'t>(
        &self,
        vars: &Vars,
        stack: &[Slot<'t>],
        cond: &Cond,
        callee: &Name,
        args: &[&'t Term],
    ) -> WhittleResult<Deps> {
        let mut out = single(cond, NodeSet::from([UseNode::result(callee.clone())]));
        let arity = self.arity(callee);
        for (i, arg) in args.iter().enumerate() {
            if i < arity {
                let gated = with_node(cond, UseNode::arg(callee.clone(), i));
                merge_deps(&mut out, self.term_deps(vars, stack, &gated, arg)?);
            } else {
                merge_deps(&mut out, self.term_deps(vars, stack, cond, arg)?);
            }
        }
        Ok(out)
    }

    /// Declared arity of a callee, 0 when the symbol is unknown or opaque.
    /// Unknown callees fail later when the traversal visits them; from this
    /// call site they simply have no erasable positions.
    fn arity(&self, name: &Name) -> usize {
        self.ctx
            .lookup(name)
            .ok()
            .and_then(Def::arity)
            .unwrap_or(0)
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
fn caseop(args: &[&str], declared: usize, tree: CaseTree) -> Def {
    Def::CaseOp(CaseDef {
        args: args.iter().map(|a| n(a)).collect(),
        arg_tys: vec![Term::Erased; declared],
        tree,
    })
}

#[cfg(test)]
fn leaf(args: &[&str], declared: usize, body: Term) -> Def {
    caseop(args, declared, CaseTree::Leaf(body))
}

#[cfg(test)]
fn cond(nodes: &[UseNode]) -> Cond {
    nodes.iter().cloned().collect()
}

#[cfg(test)]
fn result(s: &str) -> UseNode {
    UseNode::result(n(s))
}

#[cfg(test)]
fn arg(s: &str, i: usize) -> UseNode {
    UseNode::arg(n(s), i)
}

#[cfg(test)]
fn builder_ctx() -> (Context, HashMap<Name, ClassInfo>) {
    (Context::new(), HashMap::new())
}

#[test]
fn pattern_variables_inherit_scrutinee_plus_field() {
    // fst p = case p of MkPair a b => a
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(
        n("fst"),
        caseop(
            &["p"],
            1,
            CaseTree::Case {
                var: n("p"),
                alts: vec![CaseAlt::Con {
                    ctor: n("MkPair"),
                    binds: vec![n("a"), n("b")],
                    rhs: CaseTree::Leaf(bref("a")),
                }],
            },
        ),
    );
    ctx.insert(
        n("MkPair"),
        Def::Decl {
            kind: RefKind::DataCon,
            arity: 2,
        },
    );

    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("fst")).unwrap();

    let body = &deps[&cond(&[result("fst")])];
    assert!(body.contains(&arg("fst", 0)), "scrutinizing p uses arg 0");
    assert!(
        body.contains(&arg("MkPair", 0)),
        "using the pattern variable keeps the constructor field"
    );
    assert!(!body.contains(&arg("MkPair", 1)), "b is never referenced");
}

#[test]
fn successor_alternative_is_transparent() {
    // pred k = case k of S m => m
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(
        n("pred"),
        caseop(
            &["k"],
            1,
            CaseTree::Case {
                var: n("k"),
                alts: vec![CaseAlt::Suc {
                    bind: n("m"),
                    rhs: CaseTree::Leaf(bref("m")),
                }],
            },
        ),
    );
    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("pred")).unwrap();

    let body = &deps[&cond(&[result("pred")])];
    assert_eq!(body, &cond(&[arg("pred", 0)]));
}

#[test]
fn unreferenced_let_contributes_nothing() {
    // f x = let v = g x in 0
    let (mut ctx, classes) = builder_ctx();
    let body = Term::Bind(
        n("v"),
        Binder::Let {
            value: Box::new(fref("g").apply([bref("x")])),
            lazy: false,
        },
        Box::new(int(0)),
    );
    ctx.insert(n("f"), leaf(&["x"], 1, body));
    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("f")).unwrap();

    assert!(
        deps.values().flatten().all(|node| node.name != n("g")),
        "the bound term must not be analyzed when the let is dead"
    );
}

#[test]
fn referenced_let_fires_under_the_reference_condition() {
    // f x = let v = g x in v
    let (mut ctx, classes) = builder_ctx();
    let body = Term::Bind(
        n("v"),
        Binder::Let {
            value: Box::new(fref("g").apply([bref("x")])),
            lazy: true,
        },
        Box::new(Term::Var(0)),
    );
    ctx.insert(n("f"), leaf(&["x"], 1, body));
    ctx.insert(n("g"), leaf(&["y"], 1, bref("y")));
    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("f")).unwrap();

    let body = &deps[&cond(&[result("f")])];
    assert!(body.contains(&result("g")));
    // x flows into g's argument position
    let gated = &deps[&cond(&[result("f"), arg("g", 0)])];
    assert!(gated.contains(&arg("f", 0)));
}

#[test]
fn eta_expansion_covers_missing_parameters() {
    // comp declared with 2 parameters, tree binds only the first:
    // comp x = h x  ~~>  comp x eta1 = h x eta1
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(n("comp"), leaf(&["x"], 2, fref("h").apply([bref("x")])));
    ctx.insert(n("h"), leaf(&["a", "b"], 2, bref("b")));
    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("comp")).unwrap();

    let gated = &deps[&cond(&[result("comp"), arg("h", 1)])];
    assert!(
        gated.contains(&arg("comp", 1)),
        "the synthesized parameter must feed h's second position"
    );
}

#[test]
fn foreign_call_drops_the_type_spec() {
    // main = mkForeign spec callee
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(
        n("Main.main"),
        leaf(
            &[],
            0,
            Term::Ref(RefKind::Func, Name::user("mkForeign"))
                .apply([fref("spec"), fref("callee")]),
        ),
    );
    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("Main.main")).unwrap();

    let all: NodeSet = deps.values().flatten().cloned().collect();
    assert!(all.contains(&result("callee")));
    assert!(!all.contains(&result("spec")), "type spec is compile-time only");
    assert!(
        !all.contains(&result("mkForeign")),
        "the wrapper itself is not a runtime symbol"
    );
}

#[test]
fn stray_machine_variable_is_fatal() {
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(n("f"), leaf(&[], 0, Term::Ref(RefKind::Bound, Name::machine(0, "in"))));
    let builder = GraphBuilder::new(&ctx, &classes);
    assert!(matches!(
        builder.def_deps(&n("f")),
        Err(WhittleError::StrayVariable(_))
    ));
}

#[test]
fn whitelisted_machine_names_pass_as_globals() {
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(n("f"), leaf(&[], 0, Term::Ref(RefKind::DataCon, Name::machine(0, "__Unit"))));
    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("f")).unwrap();
    let body = &deps[&cond(&[result("f")])];
    assert!(body.contains(&UseNode::result(Name::machine(0, "__Unit"))));
}

#[test]
fn applied_lambda_behaves_like_let() {
    // f x = (λy. y) x, so the argument is demanded through the binder
    let (mut ctx, classes) = builder_ctx();
    let body = Term::Bind(n("y"), Binder::Lam, Box::new(Term::Var(0))).apply([bref("x")]);
    ctx.insert(n("f"), leaf(&["x"], 1, body));
    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("f")).unwrap();

    let body = &deps[&cond(&[result("f")])];
    assert!(body.contains(&arg("f", 0)));
}

#[test]
fn dictionary_projection_uses_ctor_field_and_dictionary() {
    let (mut ctx, mut classes) = builder_ctx();
    let show = n("Show");
    let imp = Name::impl_name(show.clone(), &["List"]);
    classes.insert(
        show,
        ClassInfo {
            ctor: n("MkShow"),
            methods: vec![n("show")],
        },
    );
    // f d = ((@Show(List)).0) x
    let body = Term::Proj(Box::new(Term::Ref(RefKind::Func, imp.clone())), 0)
        .apply([bref("x")]);
    ctx.insert(n("f"), leaf(&["x"], 1, body));
    let builder = GraphBuilder::new(&ctx, &classes);
    let deps = builder.def_deps(&n("f")).unwrap();

    let body = &deps[&cond(&[result("f")])];
    assert!(body.contains(&arg("MkShow", 0)));
    assert!(body.contains(&UseNode::result(imp)));
    assert!(body.contains(&arg("f", 0)), "method arguments are unconditional");
}

#[test]
fn projection_of_unrecognized_head_is_fatal() {
    let (mut ctx, classes) = builder_ctx();
    let body = Term::Proj(Box::new(fref("opaque")), 0).apply([int(1)]);
    ctx.insert(n("f"), leaf(&[], 0, body));
    let builder = GraphBuilder::new(&ctx, &classes);
    assert!(matches!(
        builder.def_deps(&n("f")),
        Err(WhittleError::Unsupported(_))
    ));
}

#[test]
fn build_visits_names_in_conditions_too() {
    // main = id 0: id shows up only inside gated conditions' nodes, and
    // the constructor only under id's argument condition
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(n("Main.main"), leaf(&[], 0, fref("id").apply([dcon("Z")])));
    ctx.insert(n("id"), leaf(&["x"], 1, bref("x")));
    ctx.insert(
        n("Z"),
        Def::Decl {
            kind: RefKind::DataCon,
            arity: 0,
        },
    );
    let builder = GraphBuilder::new(&ctx, &classes);
    let (_, visited) = builder.build(&n("Main.main")).unwrap();
    assert!(visited.contains(&n("id")));
    assert!(visited.contains(&n("Z")));
}

#[test]
fn unknown_reference_is_reported_with_its_name() {
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(n("Main.main"), leaf(&[], 0, fref("ghost").apply([int(0)])));
    let builder = GraphBuilder::new(&ctx, &classes);
    let err = builder.build(&n("Main.main")).unwrap_err();
    assert!(matches!(err, WhittleError::UnknownName(name) if name == n("ghost")));
}

#[test]
fn unelaborated_function_is_fatal() {
    let (mut ctx, classes) = builder_ctx();
    ctx.insert(n("f"), Def::Function { body: Term::Erased });
    let builder = GraphBuilder::new(&ctx, &classes);
    assert!(matches!(
        builder.def_deps(&n("f")),
        Err(WhittleError::Unsupported(_))
    ));
}
