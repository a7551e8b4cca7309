use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::builtins::GLOBALLY_VISIBLE;

/// A fully resolved symbol name.
///
/// Names are totally ordered and hashable so they can key every table in the
/// analyzer. They serialize as plain strings (see [`FromStr`] for the
/// grammar) so that name-keyed maps stay ordinary JSON objects.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Name {
    /// Source-level name, possibly namespaced: `Main.main`, `reverse`.
    User { ns: Vec<String>, ident: String },
    /// Compiler-generated name: a numeric tag plus a hint string.
    Machine { tag: i32, ident: String },
    /// The dictionary-building function of an interface implementation,
    /// carrying the interface it implements.
    Impl { class: Box<Name>, tags: Vec<String> },
}

impl Name {
    pub fn user(ident: &str) -> Self {
        Name::User {
            ns: Vec::new(),
            ident: ident.to_owned(),
        }
    }

    pub fn namespaced(ns: &[&str], ident: &str) -> Self {
        Name::User {
            ns: ns.iter().map(|s| (*s).to_owned()).collect(),
            ident: ident.to_owned(),
        }
    }

    pub fn machine(tag: i32, ident: &str) -> Self {
        Name::Machine {
            tag,
            ident: ident.to_owned(),
        }
    }

    pub fn impl_name(class: Name, tags: &[&str]) -> Self {
        Name::Impl {
            class: Box::new(class),
            tags: tags.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    pub fn is_machine(&self) -> bool {
        matches!(self, Name::Machine { .. })
    }

    /// Machine-generated names normally never escape a definition; the few
    /// listed in [`GLOBALLY_VISIBLE`] are legitimate global references.
    pub fn is_globally_visible(&self) -> bool {
        match self {
            Name::Machine { ident, .. } => GLOBALLY_VISIBLE.contains(&ident.as_str()),
            _ => false,
        }
    }

    /// The interface this name implements, if it is an implementation name.
    pub fn impl_class(&self) -> Option<&Name> {
        match self {
            Name::Impl { class, .. } => Some(class.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::User { ns, ident } => {
                for part in ns {
                    write!(f, "{part}.")?;
                }
                f.write_str(ident)
            }
            Name::Machine { tag, ident } => write!(f, "{{{ident}_{tag}}}"),
            Name::Impl { class, tags } => {
                write!(f, "@{class}")?;
                if tags.is_empty() {
                    Ok(())
                } else {
                    write!(f, "({})", tags.join(","))
                }
            }
        }
    }
}

impl FromStr for Name {
    type Err = String;

    /// Grammar: `Ns.Sub.ident` for user names, `{ident_tag}` for machine
    /// names, `@Class` or `@Class(tag,…)` for implementation names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty name".to_owned());
        }
        if let Some(rest) = s.strip_prefix('@') {
            let (class_str, tags) = match rest.split_once('(') {
                Some((class_str, tail)) => {
                    let inner = tail
                        .strip_suffix(')')
                        .ok_or_else(|| format!("unterminated implementation name: {s}"))?;
                    let tags = if inner.is_empty() {
                        Vec::new()
                    } else {
                        inner.split(',').map(|t| t.trim().to_owned()).collect()
                    };
                    (class_str, tags)
                }
                None => (rest, Vec::new()),
            };
            let class: Name = class_str.parse()?;
            return Ok(Name::Impl {
                class: Box::new(class),
                tags,
            });
        }
        if let Some(inner) = s.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
            let (ident, tag) = inner
                .rsplit_once('_')
                .ok_or_else(|| format!("malformed machine name: {s}"))?;
            if ident.is_empty() {
                return Err(format!("malformed machine name: {s}"));
            }
            let tag: i32 = tag
                .parse()
                .map_err(|_| format!("malformed machine name tag: {s}"))?;
            return Ok(Name::Machine {
                tag,
                ident: ident.to_owned(),
            });
        }
        let mut parts: Vec<&str> = s.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("empty name segment: {s}"));
        }
        let ident = parts.pop().unwrap_or(s).to_owned();
        Ok(Name::User {
            ns: parts.into_iter().map(str::to_owned).collect(),
            ident,
        })
    }
}

impl TryFrom<String> for Name {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Name> for String {
    fn from(n: Name) -> String {
        n.to_string()
    }
}

#[test]
fn user_name_roundtrip() {
    for raw in ["main", "Main.main", "Prelude.List.reverse"] {
        let n: Name = raw.parse().unwrap();
        assert_eq!(n.to_string(), raw);
    }
}

#[test]
fn machine_name_roundtrip() {
    let n: Name = "{eta_3}".parse().unwrap();
    assert_eq!(n, Name::machine(3, "eta"));
    assert_eq!(n.to_string(), "{eta_3}");

    // underscores in the hint bind to the ident, not the tag
    let n: Name = "{case_block_0}".parse().unwrap();
    assert_eq!(n, Name::machine(0, "case_block"));
}

#[test]
fn impl_name_roundtrip() {
    let n: Name = "@Prelude.Show(List)".parse().unwrap();
    assert_eq!(
        n,
        Name::impl_name(Name::namespaced(&["Prelude"], "Show"), &["List"])
    );
    assert_eq!(n.to_string(), "@Prelude.Show(List)");
    assert_eq!(
        n.impl_class(),
        Some(&Name::namespaced(&["Prelude"], "Show"))
    );
}

#[test]
fn whitelist_only_covers_machine_names() {
    assert!(Name::machine(0, "__True").is_globally_visible());
    assert!(Name::machine(7, "__Unit").is_globally_visible());
    assert!(!Name::machine(0, "__in").is_globally_visible());
    assert!(!Name::user("__True").is_globally_visible());
}

#[test]
fn malformed_names_are_rejected() {
    assert!("".parse::<Name>().is_err());
    assert!("{nope}".parse::<Name>().is_err());
    assert!("@Cls(open".parse::<Name>().is_err());
    assert!("a..b".parse::<Name>().is_err());
}
