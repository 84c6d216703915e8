use std::fmt;

use thiserror::Error;

use crate::models::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListMessages,
    CreateMessage,
    DeleteMessage,
    FetchMessage,
    SearchMessages,
    AuthHealth,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::ListMessages => "fetch messages",
            Operation::CreateMessage => "send message",
            Operation::DeleteMessage => "delete message",
            Operation::FetchMessage => "fetch message",
            Operation::SearchMessages => "search messages",
            Operation::AuthHealth => "reach auth server",
        };
        f.write_str(label)
    }
}

/// Non-success response or a request that could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to {operation}: {reason}")]
pub struct TransportError {
    pub operation: Operation,
    pub reason: String,
    /// HTTP status, when the backend answered at all.
    pub status: Option<u16>,
}

impl TransportError {
    pub fn status(operation: Operation, status: u16, reason: impl Into<String>) -> Self {
        TransportError {
            operation,
            reason: reason.into(),
            status: Some(status),
        }
    }

    pub fn failed(operation: Operation, reason: impl fmt::Display) -> Self {
        TransportError {
            operation,
            reason: reason.to_string(),
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("message {0} is not confirmed by the server yet")]
    NotConfirmed(MessageId),

    #[error("no placeholder message {0}")]
    UnknownPlaceholder(MessageId),

    #[error("message {0} has not failed")]
    NotFailed(MessageId),

    #[error("invalid search: {0}")]
    InvalidQuery(String),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
