use thiserror::Error;

use crate::ticket::TicketStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Container already processed: ticket #{ticket_id} is {status}")]
    AlreadyProcessed { ticket_id: u64, status: TicketStatus },

    #[error("Slot {slot_id} is not available (state: {state})")]
    SlotUnavailable { slot_id: u64, state: String },

    #[error("Invalid ticket transition: {from} -> {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Error::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
