// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport seam between the connection manager and the network.

pub mod ws;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;

use crate::error::SyncError;

pub use ws::{build_ws_url, WsConnector};

/// Inbound text frames. The stream ending means the peer closed.
pub type FrameStream = BoxStream<'static, Result<String, SyncError>>;

/// Everything needed to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub token: String,
}

/// Opens the duplex event-stream connection.
///
/// Dropping the returned stream closes the connection.
pub trait Connector: Send + Sync {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<FrameStream, SyncError>>;
}
