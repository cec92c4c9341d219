// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication collaborator.
//!
//! Token acquisition and refresh live outside this crate; the sync layer only
//! asks whether a session exists and which bearer token to present.

use parking_lot::RwLock;

pub trait AuthProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn bearer_token(&self) -> Option<String>;
}

/// Token held in memory, set at startup and cleared on logout.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: RwLock<Option<String>>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self { token: RwLock::new(token.filter(|t| !t.is_empty())) }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl AuthProvider for StaticToken {
    fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    fn bearer_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}
