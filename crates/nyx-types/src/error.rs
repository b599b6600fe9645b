use thiserror::Error;

#[derive(Debug, Error)]
pub enum NyxError {
    #[error(
        "Nyx trigger definition validation failed. The execution can't be scheduled before the \
         issue is fixed or the Nyx trigger is disabled.\n Validation Error : \n {0}"
    )]
    Validation(String),

    #[error("Trigger registration failed: {0}")]
    Registration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {status} from Nyx service: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed Nyx response: {0}")]
    Protocol(String),

    #[error("Nyx service error: {0}")]
    Remote(String),

    #[error("Trigger is not registered")]
    NotRegistered,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Phrases the service uses when a trigger id does not exist.
const UNKNOWN_TRIGGER_MARKERS: &[&str] = &[
    "not found",
    "unknown trigger",
    "unknown id",
    "no such trigger",
];

impl NyxError {
    /// Whether the service reported that it does not know the trigger id.
    pub fn is_unknown_trigger(&self) -> bool {
        match self {
            NyxError::Http { status, .. } => *status == 404,
            NyxError::Remote(message) => {
                let message = message.to_ascii_lowercase();
                UNKNOWN_TRIGGER_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for NyxError {
    fn from(err: serde_json::Error) -> Self {
        NyxError::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NyxError>;
