//! User-visible notifications.
//!
//! The engine never throws past its public boundary; failures the user
//! should know about are reported through a [`Notifier`] instead.

use std::fmt;

use parking_lot::Mutex;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Info,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Drops every toast.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _toast: Toast) {}
}

impl fmt::Debug for NoopNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopNotifier")
    }
}

/// Writes toasts to the log; used by the command-line tools.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Error => error!(target: "archivist::toast", "{}", toast.message),
            ToastKind::Success | ToastKind::Info => {
                info!(target: "archivist::toast", "{}", toast.message)
            }
        }
    }
}

/// Keeps every toast for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.toasts
            .lock()
            .iter()
            .filter(|toast| toast.kind == ToastKind::Error)
            .map(|toast| toast.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.toasts.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts.lock().push(toast);
    }
}
