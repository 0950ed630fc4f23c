//! passvault-notify - Surface operation outcomes to the user
//!
//! The coordinator turns terminal operation states into success or error
//! notifications. It knows nothing about which operation it is reporting:
//! callers hand it a message and, optionally, a zero-argument retry action
//! that re-invokes the same operation.
//!
//! Notifications are queued and delivered one at a time through a
//! [`NotificationSink`]; overlapping ones wait their turn instead of being
//! dropped.

mod backend;
mod history;

pub use backend::{
    ConsoleSink, Notification, NotificationKind, NotificationSink, RetryAction, SinkResponse,
    TracingSink, RETRY_LABEL,
};
pub use history::{NotificationHistory, NotificationRecord};

use passvault_core::OperationState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

enum Message {
    Show(Notification),
    Flush(oneshot::Sender<()>),
}

/// Build the notification for a state, if it is terminal. Retry is only
/// offered for recoverable failures.
pub fn notification_for<T>(
    state: &OperationState<T>,
    success_message: &str,
    retry: Option<RetryAction>,
) -> Option<Notification> {
    match state {
        OperationState::Success(_) => Some(Notification::success(success_message)),
        OperationState::Error(err) => {
            let notification = Notification::error(err.message.clone());
            match retry {
                Some(retry) if err.is_recoverable() => Some(notification.with_retry(retry)),
                _ => Some(notification),
            }
        }
        OperationState::Idle | OperationState::Loading => None,
    }
}

fn lock(history: &Mutex<NotificationHistory>) -> MutexGuard<'_, NotificationHistory> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn deliver(
    mut rx: mpsc::UnboundedReceiver<Message>,
    sink: Arc<dyn NotificationSink>,
    history: Arc<Mutex<NotificationHistory>>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Show(notification) => {
                lock(&history).log(&notification);
                debug!(kind = notification.kind.as_str(), "delivering notification");

                if sink.show(&notification).await == SinkResponse::ActionPerformed {
                    if let Some(retry) = &notification.retry {
                        debug!("retry requested");
                        retry();
                    }
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Queues notifications and delivers them in order
pub struct NotificationCoordinator {
    tx: mpsc::UnboundedSender<Message>,
    history: Arc<Mutex<NotificationHistory>>,
    worker: JoinHandle<()>,
}

impl NotificationCoordinator {
    /// Start delivering to `sink`. Must be called inside a tokio runtime.
    pub fn new(sink: Arc<dyn NotificationSink>, history_limit: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let history = Arc::new(Mutex::new(NotificationHistory::new(history_limit)));
        let worker = tokio::spawn(deliver(rx, sink, Arc::clone(&history)));

        Self {
            tx,
            history,
            worker,
        }
    }

    pub fn notify(&self, notification: Notification) {
        if self.tx.send(Message::Show(notification)).is_err() {
            warn!("notification dropped: delivery has stopped");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(Notification::success(message));
    }

    pub fn error(&self, message: impl Into<String>, retry: Option<RetryAction>) {
        let notification = Notification::error(message);
        self.notify(match retry {
            Some(retry) => notification.with_retry(retry),
            None => notification,
        });
    }

    /// Report a state. Returns whether it was terminal (and so queued).
    pub fn report<T>(
        &self,
        state: &OperationState<T>,
        success_message: &str,
        retry: Option<RetryAction>,
    ) -> bool {
        match notification_for(state, success_message, retry) {
            Some(notification) => {
                self.notify(notification);
                true
            }
            None => false,
        }
    }

    /// Report every terminal state published after this call, until the
    /// state's owner goes away or delivery stops
    pub fn observe<T>(
        &self,
        mut rx: watch::Receiver<OperationState<T>>,
        success_message: impl Into<String>,
        retry: Option<RetryAction>,
    ) -> JoinHandle<()>
    where
        T: Send + Sync + 'static,
    {
        let tx = self.tx.clone();
        let success_message = success_message.into();

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let notification =
                    notification_for(&*rx.borrow_and_update(), &success_message, retry.clone());

                if let Some(notification) = notification {
                    if tx.send(Message::Show(notification)).is_err() {
                        break;
                    }
                }
            }
        })
    }

    /// Wait until everything queued so far has been delivered (including
    /// any retry the user asked for)
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Deliver what is queued, then stop
    pub async fn shutdown(self) {
        self.flush().await;
    }

    pub fn recent(&self, limit: usize) -> Vec<NotificationRecord> {
        lock(&self.history).recent(limit)
    }
}

impl Drop for NotificationCoordinator {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use passvault_core::{ErrorKind, OperationError};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records what it shows; answers from a script, then dismisses
    #[derive(Default)]
    struct RecordingSink {
        shown: Mutex<Vec<String>>,
        answers: Mutex<VecDeque<SinkResponse>>,
        in_flight: AtomicUsize,
        overlapped: AtomicUsize,
    }

    impl RecordingSink {
        fn answering(answers: &[SinkResponse]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                ..Self::default()
            }
        }

        fn shown(&self) -> Vec<String> {
            self.shown.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn show(&self, notification: &Notification) -> SinkResponse {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.shown.lock().unwrap().push(notification.text());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SinkResponse::Dismissed)
        }
    }

    fn counter_retry(counter: &Arc<AtomicUsize>) -> RetryAction {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_sequenced_delivery() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = NotificationCoordinator::new(sink.clone(), 10);

        coordinator.success("first");
        coordinator.error("second", None);
        coordinator.success("third");
        coordinator.flush().await;

        assert_eq!(sink.shown(), vec!["✓ first", "✗ second", "✓ third"]);
        assert_eq!(sink.overlapped.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.recent(10).len(), 3);
    }

    #[tokio::test]
    async fn test_retry_invoked_on_action() {
        let sink = Arc::new(RecordingSink::answering(&[SinkResponse::ActionPerformed]));
        let coordinator = NotificationCoordinator::new(sink.clone(), 10);
        let retries = Arc::new(AtomicUsize::new(0));

        coordinator.error("Network error", Some(counter_retry(&retries)));
        coordinator.flush().await;

        assert_eq!(retries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_not_invoked_when_dismissed() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = NotificationCoordinator::new(sink, 10);
        let retries = Arc::new(AtomicUsize::new(0));

        coordinator.error("Network error", Some(counter_retry(&retries)));
        coordinator.shutdown().await;

        assert_eq!(retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_report_ignores_non_terminal() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = NotificationCoordinator::new(sink.clone(), 10);

        assert!(!coordinator.report(&OperationState::<()>::Idle, "done", None));
        assert!(!coordinator.report(&OperationState::<()>::Loading, "done", None));
        assert!(coordinator.report(&OperationState::Success(()), "Password saved", None));
        coordinator.flush().await;

        assert_eq!(sink.shown(), vec!["✓ Password saved"]);
    }

    #[test]
    fn test_no_retry_for_unrecoverable() {
        let retry: RetryAction = Arc::new(|| {});
        let fatal: OperationState<()> = OperationState::Error(OperationError::new(
            ErrorKind::StorageUnavailable,
            "disk gone",
        ));
        let notification = notification_for(&fatal, "ok", Some(retry.clone())).unwrap();
        assert!(notification.retry.is_none());
        assert!(notification.action_label.is_none());

        let transient: OperationState<()> =
            OperationState::Error(OperationError::new(ErrorKind::Network, "offline"));
        let notification = notification_for(&transient, "ok", Some(retry)).unwrap();
        assert_eq!(notification.action_label.as_deref(), Some(RETRY_LABEL));
        assert_eq!(notification.message, "offline");
    }

    #[tokio::test]
    async fn test_observe_reports_terminal_transitions() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = NotificationCoordinator::new(sink.clone(), 10);
        let (state_tx, state_rx) = watch::channel(OperationState::<u32>::Idle);

        let observer = coordinator.observe(state_rx, "Loaded", None);

        state_tx.send_replace(OperationState::Loading);
        tokio::time::sleep(Duration::from_millis(10)).await;
        state_tx.send_replace(OperationState::Success(3));
        tokio::time::sleep(Duration::from_millis(10)).await;
        state_tx.send_replace(OperationState::Error(OperationError::new(
            ErrorKind::NotFound,
            "Password not found",
        )));
        drop(state_tx);

        observer.await.unwrap();
        coordinator.flush().await;
        assert_eq!(sink.shown(), vec!["✓ Loaded", "✗ Password not found"]);
    }
}
