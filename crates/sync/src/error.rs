// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use crate::event::EventKind;

/// Errors surfaced by the sync client to its caller.
///
/// None of these are fatal to the hosting process; connection errors are
/// retried by the connection manager and only reported through listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// `start()` was called while the auth collaborator reports no session.
    NotAuthenticated,
    /// The auth collaborator had no bearer token for the handshake.
    MissingToken,
    /// The transport did not open within the configured timeout.
    ConnectTimeout,
    /// The transport failed to open or broke while open.
    Transport(String),
}

impl SyncError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::MissingToken => "MISSING_TOKEN",
            Self::ConnectTimeout => "CONNECT_TIMEOUT",
            Self::Transport(_) => "TRANSPORT",
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => f.write_str("not authenticated"),
            Self::MissingToken => f.write_str("no bearer token available for handshake"),
            Self::ConnectTimeout => f.write_str("connect attempt timed out"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {}

/// Why an inbound frame was dropped by the decoder.
#[derive(Debug)]
pub enum DecodeError {
    /// Not JSON, or not a JSON object.
    Malformed(String),
    /// Object without a string `type` field.
    MissingType,
    /// A `type` outside the closed set. Dropped silently for forward compat.
    UnknownType(String),
    /// Known type whose payload does not match its shape.
    InvalidPayload { kind: EventKind, reason: String },
}

impl DecodeError {
    /// Unknown types are expected when the server adds events; everything
    /// else indicates a broken frame.
    pub fn is_forward_compatible(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed frame: {msg}"),
            Self::MissingType => f.write_str("frame has no type"),
            Self::UnknownType(t) => write!(f, "unknown event type: {t}"),
            Self::InvalidPayload { kind, reason } => {
                write!(f, "invalid {kind} payload: {reason}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
