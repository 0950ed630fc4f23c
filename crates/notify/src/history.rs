//! Notification history tracking

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::backend::{Notification, NotificationKind};

/// A record of a delivered notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    /// Unix timestamp when the notification was delivered
    pub timestamp: i64,
    /// "success" or "error"
    pub kind: String,
    pub message: String,
    /// Whether a retry was offered
    pub retryable: bool,
}

impl NotificationRecord {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            kind: notification.kind.as_str().to_string(),
            message: notification.message.clone(),
            retryable: notification.retry.is_some(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == NotificationKind::Error.as_str()
    }

    /// Get the timestamp as a local DateTime
    pub fn datetime(&self) -> DateTime<Local> {
        Local
            .timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or_else(Local::now)
    }

    /// Format as a display string
    pub fn format(&self) -> String {
        format!(
            "{} [{}] {}",
            self.datetime().format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.message
        )
    }
}

/// Bounded history of delivered notifications, oldest first
#[derive(Debug)]
pub struct NotificationHistory {
    limit: usize,
    records: VecDeque<NotificationRecord>,
}

impl NotificationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            records: VecDeque::with_capacity(limit.min(64)),
        }
    }

    pub fn log(&mut self, notification: &Notification) {
        if self.limit == 0 {
            return;
        }
        if self.records.len() == self.limit {
            self.records.pop_front();
        }
        self.records
            .push_back(NotificationRecord::from_notification(notification));
    }

    /// The last `limit` records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<NotificationRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
