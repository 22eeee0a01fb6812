//! Error taxonomy shared across the router.

use thiserror::Error;

use crate::id::{ChannelId, ConnectionId};

/// Stable wire codes for error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ChannelNotFound = 1,
    ChannelExists = 2,
    Unauthorized = 3,
    InvalidMessage = 4,
    InboxFull = 5,
    ConnectionGone = 6,
    Internal = 7,
}

impl ErrorCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(ErrorCode::ChannelNotFound),
            2 => Some(ErrorCode::ChannelExists),
            3 => Some(ErrorCode::Unauthorized),
            4 => Some(ErrorCode::InvalidMessage),
            5 => Some(ErrorCode::InboxFull),
            6 => Some(ErrorCode::ConnectionGone),
            7 => Some(ErrorCode::Internal),
            _ => None,
        }
    }
}

/// Errors surfaced by registry and dispatch operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    #[error("a GLOBAL channel already exists")]
    ChannelExists,

    #[error("connection {0} has no authority for this operation")]
    Unauthorized(ConnectionId),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("inbox of channel {0} is full")]
    InboxFull(ChannelId),

    #[error("connection {0} is gone")]
    ConnectionGone(ConnectionId),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::ChannelNotFound(_) => ErrorCode::ChannelNotFound,
            ServerError::ChannelExists => ErrorCode::ChannelExists,
            ServerError::Unauthorized(_) => ErrorCode::Unauthorized,
            ServerError::InvalidMessage(_) => ErrorCode::InvalidMessage,
            ServerError::InboxFull(_) => ErrorCode::InboxFull,
            ServerError::ConnectionGone(_) => ErrorCode::ConnectionGone,
            ServerError::Internal(_) => ErrorCode::Internal,
        }
    }
}
