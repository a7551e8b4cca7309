use serde::{Deserialize, Serialize};

use crate::name::Name;

/// What kind of thing a reference points at. Elaboration resolves this, so
/// the analyzer can dispatch on it without consulting the symbol table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefKind {
    /// Locally bound variable (pattern variable, eta parameter).
    Bound,
    /// Top-level function or postulate.
    Func,
    DataCon,
    TypeCon,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Ch(char),
}

/// A term of the elaborated core calculus. Consumed read-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// Reference to a named thing, local or global.
    Ref(RefKind, Name),
    /// De Bruijn index into the enclosing binder stack.
    Var(usize),
    Bind(Name, Binder, Box<Term>),
    App(Box<Term>, Box<Term>),
    /// Field extraction from a constructor value.
    Proj(Box<Term>, usize),
    Const(Literal),
    Universe(usize),
    /// Hole left by a previous erasure pass; has no runtime content.
    Erased,
    Impossible,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Binder {
    Lam,
    Pi,
    Let { value: Box<Term>, lazy: bool },
}

impl Term {
    /// Left-fold application: `f.apply([a, b])` is `(f a) b`.
    pub fn apply(self, args: impl IntoIterator<Item = Term>) -> Term {
        args.into_iter()
            .fold(self, |f, a| Term::App(Box::new(f), Box::new(a)))
    }

    /// Flatten an application spine into its head and arguments.
    pub fn unapply(&self) -> (&Term, Vec<&Term>) {
        let mut head = self;
        let mut args = Vec::new();
        while let Term::App(f, a) = head {
            args.push(a.as_ref());
            head = f.as_ref();
        }
        args.reverse();
        (head, args)
    }
}

/// A decision tree compiled from pattern-matching equations: scrutiny of one
/// variable at a time, one alternative per constructor or constant plus a
/// default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CaseTree {
    Case { var: Name, alts: Vec<CaseAlt> },
    ProjCase { scrutinee: Term, alts: Vec<CaseAlt> },
    Leaf(Term),
    /// Fell through every alternative; carries the runtime error message.
    Unmatched(String),
    Impossible,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CaseAlt {
    /// `C b₀ … b₋₁ => rhs`
    Con {
        ctor: Name,
        binds: Vec<Name>,
        rhs: CaseTree,
    },
    /// Match on an underapplied function value; never produced for runtime
    /// trees.
    Fun {
        func: Name,
        binds: Vec<Name>,
        rhs: CaseTree,
    },
    Lit {
        value: Literal,
        rhs: CaseTree,
    },
    /// Successor pattern `S b`; the bound variable aliases the scrutinee.
    Suc {
        bind: Name,
        rhs: CaseTree,
    },
    Default {
        rhs: CaseTree,
    },
}

/// A runtime-compiled pattern-match definition.
///
/// `args` are the parameters the tree actually binds; `arg_tys` is the full
/// declared parameter list. The tree may bind fewer variables than declared
/// (partial eta form), never more.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseDef {
    pub args: Vec<Name>,
    pub arg_tys: Vec<Term>,
    pub tree: CaseTree,
}

/// One entry of the symbol table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Def {
    /// Forward declaration or constructor: carries what it is and how many
    /// arguments it takes.
    Decl { kind: RefKind, arity: usize },
    /// Opaque primitive operator.
    Operator { arity: usize },
    /// Unelaborated right-hand side. The analyzer refuses these; bodies must
    /// be compiled to case trees first.
    Function { body: Term },
    CaseOp(CaseDef),
}

impl Def {
    /// Declared argument count, when the definition states one.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Def::Decl { arity, .. } | Def::Operator { arity } => Some(*arity),
            Def::CaseOp(def) => Some(def.arg_tys.len()),
            Def::Function { .. } => None,
        }
    }
}

#[test]
fn apply_unapply_inverse() {
    let f = Term::Ref(RefKind::Func, Name::user("f"));
    let spine = f.clone().apply([
        Term::Const(Literal::Int(1)),
        Term::Const(Literal::Int(2)),
        Term::Erased,
    ]);
    let (head, args) = spine.unapply();
    assert_eq!(head, &f);
    assert_eq!(args.len(), 3);
    assert_eq!(args[2], &Term::Erased);
}

#[test]
fn unapply_of_non_application_has_empty_spine() {
    let t = Term::Const(Literal::Str("hi".into()));
    let (head, args) = t.unapply();
    assert_eq!(head, &t);
    assert!(args.is_empty());
}

#[test]
fn caseop_arity_is_the_declared_one() {
    let def = Def::CaseOp(CaseDef {
        args: vec![Name::user("x")],
        arg_tys: vec![Term::Erased, Term::Erased],
        tree: CaseTree::Impossible,
    });
    assert_eq!(def.arity(), Some(2));
    assert_eq!(Def::Function { body: Term::Erased }.arity(), None);
}
