// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single event-stream connection and its reconnect policy.
//!
//! One spawned task per connection attempt owns the transport: it opens it,
//! feeds every inbound frame to the dispatcher, and runs the close handler
//! when the stream ends. Reconnects are scheduled with exponential backoff
//! (`base * 2^attempt`) until `max_attempts` is reached, after which the
//! manager stays disconnected until [`ConnectionManager::reconnect`].
//!
//! Connectivity is reported only through listeners; `true` once per opened
//! connection, `false` once per close or failed attempt.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthProvider;
use crate::dispatch::Dispatcher;
use crate::error::SyncError;
use crate::transport::{ConnectRequest, Connector, FrameStream};

/// Lifecycle phase of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Connection and reconnect parameters.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub reconnect_base: Duration,
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

/// Delay before reconnect number `attempt` (0-based).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

type StatusListener = Arc<dyn Fn(bool) + Send + Sync>;
type ExhaustedListener = Arc<dyn Fn(u32) + Send + Sync>;

/// Handle returned by listener registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct State {
    phase: ConnectionPhase,
    /// Reconnects scheduled since the last successful open.
    attempt: u32,
    /// Bumped for every new connection attempt; stale attempts compare unequal.
    generation: u64,
    session: Option<CancellationToken>,
    /// Pending reconnect timer and its sequence number.
    timer: Option<(u64, CancellationToken)>,
    timer_seq: u64,
    /// `connect()` arrived while the previous connection was closing.
    connect_after_close: bool,
}

impl State {
    fn cancel_timer(&mut self) {
        if let Some((_, token)) = self.timer.take() {
            token.cancel();
        }
    }
}

struct Inner {
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    auth: Arc<dyn AuthProvider>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<State>,
    status_listeners: Mutex<Vec<(ListenerId, StatusListener)>>,
    exhausted_listeners: Mutex<Vec<(ListenerId, ExhaustedListener)>>,
    next_listener: AtomicU64,
}

/// Owner of the one live event-stream connection for a client session.
///
/// Cheap to clone; clones share the same connection. Must be used from
/// within a tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthProvider>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let state = State {
            phase: ConnectionPhase::Disconnected,
            attempt: 0,
            generation: 0,
            session: None,
            timer: None,
            timer_seq: 0,
            connect_after_close: false,
        };
        Self {
            inner: Arc::new(Inner {
                settings,
                connector,
                auth,
                dispatcher,
                state: Mutex::new(state),
                status_listeners: Mutex::new(Vec::new()),
                exhausted_listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Open the connection. No-op while connecting or open.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Listeners hear `false` from the close handler if the connection was
    /// open; an attempt still connecting is abandoned silently.
    pub fn disconnect(&self) {
        let mut state = self.inner.state.lock();
        state.cancel_timer();
        state.connect_after_close = false;
        match state.phase {
            ConnectionPhase::Open => {
                state.phase = ConnectionPhase::Closing;
                if let Some(session) = &state.session {
                    session.cancel();
                }
            }
            ConnectionPhase::Connecting => {
                state.phase = ConnectionPhase::Disconnected;
                if let Some(session) = state.session.take() {
                    session.cancel();
                }
            }
            ConnectionPhase::Closing | ConnectionPhase::Disconnected => {}
        }
        tracing::debug!(phase = ?state.phase, "disconnect requested");
    }

    /// Manual retry after the reconnect budget is spent: resets the attempt
    /// counter and connects.
    pub fn reconnect(&self) {
        {
            let mut state = self.inner.state.lock();
            state.attempt = 0;
            state.cancel_timer();
        }
        self.inner.connect();
    }

    /// Register a connectivity listener.
    pub fn on_connection_status<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.listener_id();
        self.inner.status_listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Register a listener for the terminal state: called with the number of
    /// reconnects tried once the budget is spent.
    pub fn on_reconnect_exhausted<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        let id = self.inner.listener_id();
        self.inner.exhausted_listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener registered with either `on_*` method.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.inner.status_listeners.lock().retain(|(l, _)| {
            let keep = *l != id;
            removed |= !keep;
            keep
        });
        self.inner.exhausted_listeners.lock().retain(|(l, _)| {
            let keep = *l != id;
            removed |= !keep;
            keep
        });
        removed
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.state.lock().phase
    }
}

impl Inner {
    fn listener_id(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    fn connect(self: &Arc<Self>) {
        let (generation, cancel) = {
            let mut state = self.state.lock();
            match state.phase {
                ConnectionPhase::Open | ConnectionPhase::Connecting => return,
                ConnectionPhase::Closing => {
                    state.connect_after_close = true;
                    return;
                }
                ConnectionPhase::Disconnected => {}
            }
            state.generation += 1;
            state.phase = ConnectionPhase::Connecting;
            let cancel = CancellationToken::new();
            state.session = Some(cancel.clone());
            (state.generation, cancel)
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_session(generation, cancel).await;
        });
    }

    async fn run_session(self: Arc<Self>, generation: u64, cancel: CancellationToken) {
        let stream = tokio::select! {
            _ = cancel.cancelled() => return,
            result = self.open() => result,
        };
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                self.on_connect_failed(generation, e);
                return;
            }
        };
        if !self.on_open(generation) {
            return;
        }

        let error = loop {
            tokio::select! {
                _ = cancel.cancelled() => break None,
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        self.dispatcher.handle_frame(&text);
                    }
                    Some(Err(e)) => break Some(e),
                    None => break Some(SyncError::Transport("closed by peer".to_owned())),
                }
            }
        };
        drop(stream);
        self.on_close(generation, error);
    }

    async fn open(&self) -> Result<FrameStream, SyncError> {
        let token = self.auth.bearer_token().ok_or(SyncError::MissingToken)?;
        let request = ConnectRequest { url: self.settings.url.clone(), token };
        match tokio::time::timeout(self.settings.connect_timeout, self.connector.connect(request)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::ConnectTimeout),
        }
    }

    /// Transition Connecting -> Open. Returns false when this attempt was
    /// abandoned or superseded, in which case the stream must be dropped.
    fn on_open(self: &Arc<Self>, generation: u64) -> bool {
        {
            let mut state = self.state.lock();
            if state.generation != generation || state.phase != ConnectionPhase::Connecting {
                return false;
            }
            state.phase = ConnectionPhase::Open;
            state.attempt = 0;
            state.cancel_timer();
        }
        tracing::info!(url = %self.settings.url, "event stream connected");
        self.notify_status(true);
        true
    }

    fn on_connect_failed(self: &Arc<Self>, generation: u64, error: SyncError) {
        {
            let mut state = self.state.lock();
            if state.generation != generation || state.phase != ConnectionPhase::Connecting {
                return;
            }
            state.phase = ConnectionPhase::Disconnected;
            state.session = None;
        }
        tracing::debug!(err = %error, "event stream connect failed");
        self.notify_status(false);
        self.schedule_reconnect();
    }

    /// Close handler for a connection that was open. `error` is `None` when
    /// the close was requested through `disconnect()`.
    fn on_close(self: &Arc<Self>, generation: u64, error: Option<SyncError>) {
        let (requested, connect_again) = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let requested = state.phase == ConnectionPhase::Closing;
            state.phase = ConnectionPhase::Disconnected;
            state.session = None;
            (requested, std::mem::take(&mut state.connect_after_close))
        };
        match &error {
            Some(e) => tracing::info!(err = %e, "event stream closed"),
            None => tracing::info!("event stream closed on request"),
        }
        self.notify_status(false);

        if connect_again {
            self.connect();
        } else if !requested {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let max = self.settings.max_attempts;
        let scheduled = {
            let mut state = self.state.lock();
            if state.phase != ConnectionPhase::Disconnected {
                return;
            }
            if state.attempt >= max {
                state.cancel_timer();
                None
            } else {
                let delay = backoff_delay(self.settings.reconnect_base, state.attempt);
                state.attempt += 1;
                state.cancel_timer();
                state.timer_seq += 1;
                let token = CancellationToken::new();
                state.timer = Some((state.timer_seq, token.clone()));
                Some((state.attempt, state.timer_seq, delay, token))
            }
        };

        let Some((attempt, seq, delay, token)) = scheduled else {
            tracing::warn!(attempts = max, "reconnect attempts exhausted, staying disconnected");
            self.notify_exhausted(max);
            return;
        };

        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.fire_timer(seq),
            }
        });
    }

    fn fire_timer(self: &Arc<Self>, seq: u64) {
        {
            let mut state = self.state.lock();
            match &state.timer {
                Some((current, token)) if *current == seq && !token.is_cancelled() => {
                    state.timer = None;
                }
                _ => return,
            }
        }
        self.connect();
    }

    fn notify_status(&self, connected: bool) {
        let listeners: Vec<StatusListener> =
            self.status_listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(connected))).is_err() {
                tracing::warn!(connected, "connection status listener panicked");
            }
        }
    }

    fn notify_exhausted(&self, attempts: u32) {
        let listeners: Vec<ExhaustedListener> =
            self.exhausted_listeners.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(attempts))).is_err() {
                tracing::warn!(attempts, "reconnect exhausted listener panicked");
            }
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
