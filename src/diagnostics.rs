//! Compiler diagnostics: every report becomes a `tracing` event and is kept for inspection.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Message id attached to every report.
pub const MESSAGE_ID: &str = "crystalspace.graphics3d.shadercompiler.xmlshader";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Bug,
    Error,
    Warning,
    Notify,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Bug | Severity::Error => {
                tracing::error!(message_id = MESSAGE_ID, "{message}")
            }
            Severity::Warning => tracing::warn!(message_id = MESSAGE_ID, "{message}"),
            Severity::Notify => tracing::info!(message_id = MESSAGE_ID, "{message}"),
            Severity::Debug => tracing::debug!(message_id = MESSAGE_ID, "{message}"),
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Diagnostic { severity, message });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.report(Severity::Warning, message);
    }

    pub fn records(&self) -> Vec<Diagnostic> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// True if any recorded message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|d| d.message.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_are_recorded_in_order() {
        let d = Diagnostics::new();
        d.warning("first");
        d.report(Severity::Notify, "second");
        let r = d.records();
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].severity, Severity::Warning);
        assert_eq!(r[1].message, "second");
        assert!(d.contains("sec"));
        assert_eq!(d.take().len(), 2);
        assert!(d.records().is_empty());
    }
}
