use thiserror::Error;

/// A user action a component refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("waiting for a value from `{0}`")]
    Invalid(String),

    #[error("`{0}` is not configured")]
    Unconfigured(&'static str),

    #[error("form is read-only; declare `update` to enable saving")]
    ReadOnly,

    #[error("navigation is disabled while connected to a producer")]
    NavigationDisabled,

    #[error("no record is shown")]
    NoRecord,

    #[error("record key `{0}` is not an integer")]
    KeyNotInteger(String),

    #[error("row {0} is out of range")]
    NoSuchRow(usize),

    #[error("no option with value `{0}`")]
    UnknownOption(String),
}
