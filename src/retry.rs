//! Single-deadline timer for the asynchronous driver.
//!
//! At most one deadline is pending. Arming replaces it; the replaced timer is
//! aborted. A timer that already fired and is racing with a re-arm is told
//! apart by its token: the owner calls [`RetryScheduler::take_expired`] with
//! the token it was handed and ignores the fire when it returns `false`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use glucometer_link::retry::RetryScheduler;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut scheduler = RetryScheduler::new(
//!     tokio::runtime::Handle::current(),
//!     Arc::new(|token: u64| println!("deadline {token} expired")),
//! );
//! scheduler.arm(Duration::from_millis(300));
//! assert!(scheduler.is_armed());
//! scheduler.cancel();
//! assert!(!scheduler.is_armed());
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Invoked with the token of the deadline that expired.
pub type ExpiryCallback = Arc<dyn Fn(u64) + Send + Sync>;

struct Pending {
    token: u64,
    task: JoinHandle<()>,
}

/// Owns the pending retry deadline.
pub struct RetryScheduler {
    handle: Handle,
    on_expire: ExpiryCallback,
    pending: Option<Pending>,
    next_token: u64,
}

impl RetryScheduler {
    pub fn new(handle: Handle, on_expire: ExpiryCallback) -> Self {
        Self {
            handle,
            on_expire,
            pending: None,
            next_token: 0,
        }
    }

    /// Schedule a deadline `after` from now, replacing any pending one.
    ///
    /// Returns the token the callback will receive.
    pub fn arm(&mut self, after: Duration) -> u64 {
        self.cancel();

        self.next_token = self.next_token.wrapping_add(1);
        let token = self.next_token;
        let on_expire = Arc::clone(&self.on_expire);
        let task = self.handle.spawn(async move {
            tokio::time::sleep(after).await;
            on_expire(token);
        });

        tracing::trace!(token, ?after, "Deadline armed");
        self.pending = Some(Pending { token, task });
        token
    }

    /// Same as [`arm`](Self::arm); the old deadline is dropped.
    pub fn re_arm(&mut self, after: Duration) -> u64 {
        self.arm(after)
    }

    /// Drop the pending deadline, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::trace!(token = pending.token, "Deadline cancelled");
            pending.task.abort();
        }
    }

    #[inline]
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Claim a fired deadline. `false` means it was cancelled or replaced
    /// after it fired, and the fire must be ignored.
    pub fn take_expired(&mut self, token: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.token == token => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("pending", &self.pending.as_ref().map(|p| p.token))
            .finish()
    }
}
