// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame decoding and fan-out to registered callbacks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::event::{EventKind, ServerEvent};
use crate::registry::SubscriptionRegistry;

// -- Notifications -----------------------------------------------------------

/// Severity of a transient user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Warning,
    Error,
}

/// A transient notification raised for alerting events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub kind: EventKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    /// Build the notification for an alerting event, `None` for the rest.
    pub fn for_event(event: &ServerEvent) -> Option<Self> {
        match event {
            ServerEvent::FaultEvent(patch) => {
                let message = match patch.fields.get("message").and_then(|v| v.as_str()) {
                    Some(m) => m.to_owned(),
                    None => format!("fault reported on channel {}", patch.id),
                };
                Some(Self {
                    level: NoticeLevel::Error,
                    kind: EventKind::FaultEvent,
                    title: "Fault detected".to_owned(),
                    message,
                })
            }
            ServerEvent::BandwidthAlert(sample) => {
                let message = match sample.fields.get("message").and_then(|v| v.as_str()) {
                    Some(m) => m.to_owned(),
                    None => match &sample.channel {
                        Some(ch) => format!("channel {ch} crossed its bandwidth threshold"),
                        None => "bandwidth threshold crossed".to_owned(),
                    },
                };
                Some(Self {
                    level: NoticeLevel::Warning,
                    kind: EventKind::BandwidthAlert,
                    title: "Bandwidth alert".to_owned(),
                    message,
                })
            }
            _ => None,
        }
    }
}

/// Sink for transient notifications (a toast in the UI).
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier: writes notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => {
                tracing::error!(kind = %notice.kind, title = %notice.title, "{}", notice.message)
            }
            NoticeLevel::Warning => {
                tracing::warn!(kind = %notice.kind, title = %notice.title, "{}", notice.message)
            }
        }
    }
}

// -- Dispatcher --------------------------------------------------------------

/// Result of dispatching one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks invoked, including ones that failed.
    pub invoked: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
}

/// Decodes frames and fans events out to the registry's callbacks.
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Handle one raw text frame from the transport. Never fails: frames
    /// that do not decode are logged and dropped.
    pub fn handle_frame(&self, text: &str) -> Option<DispatchReport> {
        match ServerEvent::decode(text) {
            Ok(event) => Some(self.dispatch(&event)),
            Err(e) if e.is_forward_compatible() => {
                tracing::debug!(err = %e, "ignoring event");
                None
            }
            Err(e) => {
                tracing::warn!(err = %e, len = text.len(), "dropping frame");
                None
            }
        }
    }

    /// Raise the alert notification (if any), then invoke every callback
    /// registered for the event's kind in registration order.
    ///
    /// Iterates a snapshot taken before the first callback runs, so callbacks
    /// may subscribe or unsubscribe freely; changes apply from the next event.
    pub fn dispatch(&self, event: &ServerEvent) -> DispatchReport {
        let kind = event.kind();
        if let Some(notice) = Notice::for_event(event) {
            if catch_unwind(AssertUnwindSafe(|| self.notifier.notify(notice))).is_err() {
                tracing::warn!(kind = %kind, "notifier panicked");
            }
        }

        let callbacks = self.registry.snapshot(kind);
        let mut report = DispatchReport { invoked: callbacks.len(), failed: 0 };
        for (index, cb) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| cb(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(kind = %kind, index, err = %e, "subscriber failed");
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(kind = %kind, index, "subscriber panicked");
                }
            }
        }
        report
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
