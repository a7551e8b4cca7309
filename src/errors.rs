use crate::name::Name;
use thiserror::Error;

pub type WhittleResult<T, E = WhittleError> = Result<T, E>;

/// Everything that can abort the pass. All analysis errors are fatal; the
/// driver surfaces them verbatim and exits.
#[derive(Debug, Error)]
pub enum WhittleError {
    /// A case tree references a symbol the table does not know.
    #[error("unknown reference: {0}")]
    UnknownName(Name),

    #[error("ambiguous reference: {0} could be any of {1}")]
    Ambiguous(Name, String),

    /// Term or tree shape the analyzer does not handle.
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// A compiler-internal name escaped its definition; indicates a bug in an
    /// earlier pass.
    #[error("stray compiler-generated variable: {0}")]
    StrayVariable(Name),

    /// Runtime uses were found for arguments a previous pass proved
    /// statically inaccessible.
    #[error("inaccessible arguments used at runtime: {0}")]
    InaccessibleUsed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed program: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Msg(String),
}

impl From<&str> for WhittleError {
    fn from(s: &str) -> Self {
        WhittleError::Msg(s.to_owned())
    }
}

impl From<String> for WhittleError {
    fn from(s: String) -> Self {
        WhittleError::Msg(s)
    }
}

#[test]
fn io_conversion_retains_message() {
    let e = std::io::Error::other("boom!");
    let w: WhittleError = e.into();
    assert!(matches!(w, WhittleError::Io(_)));
    assert!(w.to_string().contains("boom"));
}

#[test]
fn unknown_name_names_the_culprit() {
    let w = WhittleError::UnknownName(Name::namespaced(&["Main"], "missing"));
    assert_eq!(w.to_string(), "unknown reference: Main.missing");
}

#[test]
fn simple_string_into_msg() {
    let w: WhittleError = "plain msg".into();
    assert!(matches!(w, WhittleError::Msg(s) if s == "plain msg"));
}
