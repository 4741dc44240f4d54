//! Append-only alert log for budget threshold events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

/// Alert severity classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    /// Utilization crossed the warning threshold
    Warning,
    /// Utilization crossed the critical threshold
    Critical,
    /// The monthly budget is fully spent
    CapExceeded,
}

/// A single budget alert. Alerts are append-only; acknowledgement fills in
/// the `acknowledged_*` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// Free-form context (utilization, model, month)
    pub context: String,
}

/// Thread-safe append-only alert log.
#[derive(Debug, Default)]
pub struct AlertLog {
    entries: RwLock<Vec<Alert>>,
}

impl AlertLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new alert and return it.
    pub fn append(&self, kind: AlertKind, context: impl Into<String>) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4(),
            kind,
            created_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            context: context.into(),
        };

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.push(alert.clone());
        alert
    }

    /// Acknowledge an alert. Returns false when the id is unknown.
    pub fn acknowledge(&self, id: Uuid, who: impl Into<String>) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match entries.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged_by = Some(who.into());
                alert.acknowledged_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Snapshot of every alert, oldest first.
    pub fn list(&self) -> Vec<Alert> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Alerts not yet acknowledged.
    pub fn unacknowledged(&self) -> Vec<Alert> {
        self.list()
            .into_iter()
            .filter(|a| a.acknowledged_at.is_none())
            .collect()
    }

    /// Number of alerts in the log.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_list_preserve_order() {
        let log = AlertLog::new();
        log.append(AlertKind::Warning, "80% of monthly budget");
        log.append(AlertKind::Critical, "96% of monthly budget");

        let alerts = log.list();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::Warning);
        assert_eq!(alerts[1].kind, AlertKind::Critical);
    }

    #[test]
    fn acknowledge_sets_fields() {
        let log = AlertLog::new();
        let alert = log.append(AlertKind::CapExceeded, "budget exhausted");

        assert!(log.acknowledge(alert.id, "ops"));
        let stored = &log.list()[0];
        assert_eq!(stored.acknowledged_by.as_deref(), Some("ops"));
        assert!(stored.acknowledged_at.is_some());
        assert!(log.unacknowledged().is_empty());
    }

    #[test]
    fn acknowledge_unknown_id_is_false() {
        let log = AlertLog::new();
        assert!(!log.acknowledge(Uuid::new_v4(), "ops"));
    }

    #[test]
    fn alert_kind_serializes_kebab() {
        let json = serde_json::to_string(&AlertKind::CapExceeded).unwrap();
        assert_eq!(json, "\"cap-exceeded\"");
    }
}
