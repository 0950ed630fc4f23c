//! Notifications and the sinks that display them

use async_trait::async_trait;
use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// Zero-argument callback that re-invokes a failed operation
pub type RetryAction = Arc<dyn Fn() + Send + Sync>;

/// Label of the action attached to retryable errors
pub const RETRY_LABEL: &str = "Retry";

/// Kind of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Success,
    Error,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            NotificationKind::Success => "✓",
            NotificationKind::Error => "✗",
        }
    }
}

/// A notification to display
#[derive(Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    /// Label of the offered action; only set when `retry` is
    pub action_label: Option<String>,
    pub retry: Option<RetryAction>,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
            action_label: None,
            retry: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
            action_label: None,
            retry: None,
        }
    }

    /// Offer a retry action
    pub fn with_retry(mut self, retry: RetryAction) -> Self {
        self.action_label = Some(RETRY_LABEL.to_string());
        self.retry = Some(retry);
        self
    }

    /// Display text, prefixed with the kind's symbol
    pub fn text(&self) -> String {
        format!("{} {}", self.kind.symbol(), self.message)
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("action_label", &self.action_label)
            .field("retry", &self.retry.is_some())
            .finish()
    }
}

/// What the user did with a displayed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkResponse {
    Dismissed,
    ActionPerformed,
}

/// Something that can put a notification in front of the user
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Display one notification and report whether its action was taken.
    /// The coordinator never calls this concurrently.
    async fn show(&self, notification: &Notification) -> SinkResponse;
}

/// Prints to stderr; optionally asks on the terminal whether to retry
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    interactive: bool,
}

impl ConsoleSink {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }

    /// Interactive only when both stdin and stderr are terminals
    pub fn detect() -> Self {
        Self::new(io::stdin().is_terminal() && io::stderr().is_terminal())
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn show(&self, notification: &Notification) -> SinkResponse {
        eprintln!("{}", notification.text());

        let label = match (&notification.action_label, self.interactive) {
            (Some(label), true) => label.clone(),
            _ => return SinkResponse::Dismissed,
        };

        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stderr = io::stderr();
            write!(stderr, "{}? [y/N] ", label)?;
            stderr.flush()?;

            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes") => {
                SinkResponse::ActionPerformed
            }
            _ => SinkResponse::Dismissed,
        }
    }
}

/// Writes notifications to the log; never takes an action
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn show(&self, notification: &Notification) -> SinkResponse {
        match notification.kind {
            NotificationKind::Success => info!(message = %notification.message, "notification"),
            NotificationKind::Error => warn!(
                message = %notification.message,
                retryable = notification.retry.is_some(),
                "notification"
            ),
        }
        SinkResponse::Dismissed
    }
}
