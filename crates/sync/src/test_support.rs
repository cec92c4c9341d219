// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles for the transport, REST and notification seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::cache::EntityKind;
use crate::dispatch::{Notice, Notifier};
use crate::error::SyncError;
use crate::event::{EntityKey, Record};
use crate::rest::{Page, RestSource};
use crate::transport::{ConnectRequest, Connector, FrameStream};

/// Sender half of an open fake connection. Dropping it closes the stream.
pub(crate) type FrameSender = mpsc::UnboundedSender<Result<String, SyncError>>;

enum Outcome {
    Fail,
    Open(mpsc::UnboundedReceiver<Result<String, SyncError>>),
    Hang,
}

/// Scripted connector. Attempts past the end of the script are refused.
#[derive(Default)]
pub(crate) struct FakeConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<(Instant, ConnectRequest)>>,
}

impl FakeConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_next(&self) {
        self.script.lock().push_back(Outcome::Fail);
    }

    /// Script the next attempt to succeed; frames sent on the returned
    /// sender arrive on the connection.
    pub(crate) fn open_next(&self) -> FrameSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().push_back(Outcome::Open(rx));
        tx
    }

    /// Script the next attempt to never complete.
    pub(crate) fn hang_next(&self) {
        self.script.lock().push_back(Outcome::Hang);
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().iter().map(|(at, _)| *at).collect()
    }

    pub(crate) fn requests(&self) -> Vec<ConnectRequest> {
        self.attempts.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<FrameStream, SyncError>> {
        self.attempts.lock().push((Instant::now(), request));
        match self.script.lock().pop_front().unwrap_or(Outcome::Fail) {
            Outcome::Fail => {
                future::ready(Err(SyncError::Transport("connection refused".to_owned()))).boxed()
            }
            Outcome::Hang => future::pending().boxed(),
            Outcome::Open(rx) => {
                let frames = futures_util::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                future::ready(Ok(frames.boxed())).boxed()
            }
        }
    }
}

/// Notifier that keeps every notice.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) notices: Mutex<Vec<Notice>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// In-memory REST source. Lists and details come from the same rows.
#[derive(Default)]
pub(crate) struct FakeRest {
    rows: Mutex<HashMap<EntityKind, Vec<Record>>>,
    series: Mutex<HashMap<EntityKey, Vec<Record>>>,
    calls: Mutex<usize>,
    failing: Mutex<bool>,
}

impl FakeRest {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_rows(&self, kind: EntityKind, rows: Vec<Record>) {
        self.rows.lock().insert(kind, rows);
    }

    pub(crate) fn set_series(&self, channel: impl Into<EntityKey>, samples: Vec<Record>) {
        self.series.lock().insert(channel.into(), samples);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock()
    }

    fn begin(&self) -> anyhow::Result<()> {
        *self.calls.lock() += 1;
        if *self.failing.lock() {
            anyhow::bail!("backend unavailable");
        }
        Ok(())
    }

    fn rows_of(&self, kind: EntityKind) -> Vec<Record> {
        self.rows.lock().get(&kind).cloned().unwrap_or_default()
    }
}

impl RestSource for FakeRest {
    fn list(&self, kind: EntityKind, _page: Option<u32>) -> BoxFuture<'_, anyhow::Result<Page>> {
        let result = self.begin().map(|()| {
            let items = self.rows_of(kind);
            let total = Some(items.len() as u64);
            Page { items, total }
        });
        future::ready(result).boxed()
    }

    fn get(&self, kind: EntityKind, id: EntityKey) -> BoxFuture<'_, anyhow::Result<Record>> {
        let result = self.begin().and_then(|()| {
            self.rows_of(kind)
                .into_iter()
                .find(|r| id.matches(r.get("id")))
                .ok_or_else(|| anyhow::anyhow!("{kind}/{id} not found"))
        });
        future::ready(result).boxed()
    }

    fn series(&self, channel: EntityKey) -> BoxFuture<'_, anyhow::Result<Vec<Record>>> {
        let result =
            self.begin().map(|()| self.series.lock().get(&channel).cloned().unwrap_or_default());
        future::ready(result).boxed()
    }

    fn alerts(&self) -> BoxFuture<'_, anyhow::Result<Vec<Record>>> {
        let result = self.begin().map(|()| self.rows_of(EntityKind::Alert));
        future::ready(result).boxed()
    }

    fn dashboard(&self) -> BoxFuture<'_, anyhow::Result<Vec<Record>>> {
        let result = self.begin().map(|()| self.rows_of(EntityKind::Dashboard));
        future::ready(result).boxed()
    }
}

/// Let spawned tasks run until they block.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
