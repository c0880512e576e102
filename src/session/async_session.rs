//! Event-driven driver.
//!
//! The transport pushes inbound frames with
//! [`AsyncSession::on_frame_received`]; outbound frames go to a
//! [`FrameSink`]. Retry deadlines run on the tokio runtime the session was
//! built on.
//!
//! ```text
//!   transport ──frame──►┐
//!                       ├─► Mutex<SessionCore> ──send──► FrameSink
//!   RetryScheduler ─────┘          │
//!                                  ├──► watch<Outcome>
//!                                  └──► SessionListener (after unlock)
//! ```
//!
//! All events are serialized through one lock. Listener callbacks run after
//! the lock is released, so a listener may call back into the session.
//! The sink is invoked under the lock and must not.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::listener::{Notification, SessionListener};
use super::machine::{Action, SessionCore, SessionState};
use super::Communication;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::retry::{ExpiryCallback, RetryScheduler};
use crate::transport::FrameSink;

/// Where the current exchange stands, as seen by waiters.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Never connected.
    Idle,
    Pending,
    Finished(Communication),
    /// Disconnected; whatever the exchange had collected is gone.
    Discarded,
}

struct Inner {
    core: SessionCore,
    scheduler: RetryScheduler,
}

struct Shared {
    inner: Mutex<Inner>,
    sink: Arc<dyn FrameSink>,
    listener: Arc<dyn SessionListener>,
    outcome: watch::Sender<Outcome>,
}

impl Shared {
    fn drive<F>(&self, event: F)
    where
        F: FnOnce(&mut Inner) -> Vec<Action>,
    {
        let notifications = {
            let mut inner = self.inner.lock();
            let actions = event(&mut inner);
            let notifications = self.apply(&mut inner, actions);
            self.publish(inner.core.state(), inner.core.communication());
            notifications
        };

        for notification in &notifications {
            notification.deliver(self.listener.as_ref());
        }
    }

    fn apply(&self, inner: &mut Inner, actions: Vec<Action>) -> Vec<Notification> {
        let mut notifications = Vec::new();
        for action in actions {
            match action {
                Action::Send(frame) => {
                    if let Err(err) = self.sink.send_frame(frame) {
                        // Lost like any other frame; the deadline covers it.
                        tracing::warn!("Failed to send frame: {}", err);
                    }
                }
                Action::Arm(after) => {
                    inner.scheduler.arm(after);
                }
                Action::Cancel => inner.scheduler.cancel(),
                Action::Notify(notification) => notifications.push(notification),
            }
        }
        notifications
    }

    fn publish(&self, state: SessionState, communication: &Communication) {
        self.outcome.send_if_modified(|current| {
            let next = match state {
                SessionState::AwaitingInfo | SessionState::AwaitingResultOrEnd => Outcome::Pending,
                SessionState::Done | SessionState::Error => {
                    Outcome::Finished(communication.clone())
                }
                SessionState::Disconnected if *current == Outcome::Idle => Outcome::Idle,
                SessionState::Disconnected => Outcome::Discarded,
            };
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn on_expire(&self, token: u64) {
        self.drive(|inner| {
            if inner.scheduler.take_expired(token) {
                inner.core.on_deadline()
            } else {
                tracing::trace!(token, "Stale deadline ignored");
                Vec::new()
            }
        });
    }
}

/// Session handle. Clones share the same exchange.
#[derive(Clone)]
pub struct AsyncSession {
    shared: Arc<Shared>,
}

impl AsyncSession {
    pub(crate) fn new(
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        listener: Arc<dyn SessionListener>,
        sink: Arc<dyn FrameSink>,
        handle: Handle,
    ) -> Self {
        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            let on_expire: ExpiryCallback = Arc::new(move |token: u64| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_expire(token);
                }
            });
            let (outcome, _) = watch::channel(Outcome::Idle);

            Shared {
                inner: Mutex::new(Inner {
                    core: SessionCore::new(config, clock),
                    scheduler: RetryScheduler::new(handle, on_expire),
                }),
                sink,
                listener,
                outcome,
            }
        });
        Self { shared }
    }

    /// Start a fresh exchange. Ignored while one is running.
    pub fn connect(&self) {
        self.shared.drive(|inner| inner.core.connect());
    }

    /// Feed one complete inbound frame.
    pub fn on_frame_received(&self, frame: &[u8]) {
        self.shared.drive(|inner| inner.core.on_frame(frame));
    }

    /// Drop the exchange and its pending deadline. Idempotent.
    pub fn disconnect(&self) {
        self.shared.drive(|inner| inner.core.disconnect());
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().core.state()
    }

    /// Snapshot of what has been collected so far.
    pub fn communication(&self) -> Communication {
        self.shared.inner.lock().core.communication().clone()
    }

    pub fn config(&self) -> SessionConfig {
        self.shared.inner.lock().core.config().clone()
    }

    pub fn outcome(&self) -> Outcome {
        self.shared.outcome.borrow().clone()
    }

    /// Watch outcome changes.
    pub fn subscribe(&self) -> watch::Receiver<Outcome> {
        self.shared.outcome.subscribe()
    }

    /// Wait until the running exchange ends.
    ///
    /// Returns `None` if the session is idle or the exchange is discarded by
    /// [`disconnect`](Self::disconnect).
    pub async fn wait_for_outcome(&self) -> Option<Communication> {
        let mut rx = self.subscribe();
        loop {
            match &*rx.borrow_and_update() {
                Outcome::Finished(communication) => return Some(communication.clone()),
                Outcome::Idle | Outcome::Discarded => return None,
                Outcome::Pending => {}
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl std::fmt::Debug for AsyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("AsyncSession")
            .field("state", &inner.core.state())
            .field("version", &inner.core.config().version)
            .field("attempts", &inner.core.attempts())
            .field("scheduler", &inner.scheduler)
            .finish()
    }
}
