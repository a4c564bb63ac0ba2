use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// The control plane rejected an administrative command.
    #[error("Command failed ({}): {message}", code_label(.code, .code_name))]
    Command {
        code: Option<i32>,
        code_name: Option<String>,
        message: String,
    },

    #[error("Endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Administrative session is closed")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(String),
}

impl BootstrapError {
    /// Builds a command error from a numeric code and message.
    pub fn command(code: i32, code_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            code: Some(code),
            code_name: Some(code_name.into()),
            message: message.into(),
        }
    }

    /// Builds a command error that only carries a message.
    pub fn command_message(message: impl Into<String>) -> Self {
        Self::Command {
            code: None,
            code_name: None,
            message: message.into(),
        }
    }
}

fn code_label(code: &Option<i32>, code_name: &Option<String>) -> String {
    match (code, code_name) {
        (Some(code), Some(name)) => format!("{name}, code {code}"),
        (Some(code), None) => format!("code {code}"),
        (None, Some(name)) => name.to_string(),
        (None, None) => "no code".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;

impl From<std::io::Error> for BootstrapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BootstrapError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidTopology(err.to_string())
    }
}
