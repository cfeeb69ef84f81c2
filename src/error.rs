use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

const UNKNOWN_ENUM_VALUE: &str = "does not contain the value";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Init(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{}", .0.join("; "))]
    GraphQl(Vec<String>),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Invalid choice: {0}")]
    InvalidChoice(String),

    #[error("Storage error: {0}")]
    Store(#[from] anyhow::Error),
}

impl Error {
    /// True when the application rejected an enum literal it does not declare,
    /// e.g. `enumeration type "Choice" does not contain the value "Rock"`.
    pub fn is_unknown_enum_value(&self) -> bool {
        match self {
            Error::GraphQl(messages) => {
                messages.iter().any(|m| m.contains(UNKNOWN_ENUM_VALUE))
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
