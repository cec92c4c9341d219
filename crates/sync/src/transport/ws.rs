// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport over tokio-tungstenite.

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use super::{ConnectRequest, Connector, FrameStream};
use crate::error::SyncError;

/// Production connector: one WebSocket per `connect` call.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<FrameStream, SyncError>> {
        async move {
            let url = with_token_query(&request.url, &request.token)?;
            let mut req =
                url.as_str().into_client_request().map_err(|e| SyncError::Transport(e.to_string()))?;
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", request.token)) {
                req.headers_mut().insert(AUTHORIZATION, value);
            }

            let (ws_stream, _) = tokio_tungstenite::connect_async(req)
                .await
                .map_err(|e| SyncError::Transport(e.to_string()))?;

            let frames = ws_stream
                .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
                .filter_map(|msg| {
                    future::ready(match msg {
                        Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                        Ok(_) => None, // binary, ping, pong
                        Err(e) => Some(Err(SyncError::Transport(e.to_string()))),
                    })
                });
            Ok(frames.boxed())
        }
        .boxed()
    }
}

fn with_token_query(url: &str, token: &str) -> Result<reqwest::Url, SyncError> {
    let mut url = reqwest::Url::parse(url).map_err(|e| SyncError::Transport(e.to_string()))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

/// Build the event-stream WebSocket URL from the backend's HTTP base URL.
pub fn build_ws_url(base_url: &str, path: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let ws_base = if base_url.starts_with("https://") {
        base_url.replacen("https://", "wss://", 1)
    } else {
        base_url.replacen("http://", "ws://", 1)
    };

    format!("{ws_base}{path}")
}
