//! Suspending long-held connections until something happens
//!
//! A connection that waits on outside events, such as a long poll or a
//! server-sent event stream, parks in [`Mailbox::hibernate`] until a
//! message arrives through a [`MailboxSender`] or the optional timeout
//! elapses.
//!
//! The timer of the current wait is recorded in the connection's private
//! storage. Arming a new timeout replaces the previous one, and a timeout
//! that fires for a timer that is no longer current is dropped.
//!
//! # Examples
//!
//! ```
//! use maker_conn::{hibernate::{Mailbox, Wake}, test};
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let mut mailbox = Mailbox::new();
//! let sender = mailbox.sender();
//!
//! tokio::spawn(async move { sender.send("new post") });
//!
//! let conn = test::req("GET", "/events", "");
//! let (conn, wake) = mailbox.hibernate(conn, Some(Duration::from_secs(30))).await;
//! assert!(matches!(wake, Wake::Message("new post")));
//!
//! let (_, wake) = mailbox.hibernate(conn, Some(Duration::from_millis(5))).await;
//! assert!(matches!(wake, Wake::Timeout));
//! # });
//! ```

use crate::Conn;
use std::{
    fmt,
    future::pending,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::sleep,
};
use tracing::trace;

const TIMER_KEY: &str = "maker_conn.hibernate_timer";

static NEXT_TIMER: AtomicU64 = AtomicU64::new(1);

/// Identifies one armed timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerRef(u64);

impl TimerRef {
    #[inline]
    fn next() -> Self {
        Self(NEXT_TIMER.fetch_add(1, Ordering::Relaxed))
    }

    /// The timer armed for `conn`'s current wait, if any.
    #[inline]
    pub fn current(conn: &Conn) -> Option<Self> {
        conn.private().get::<Option<Self>>(TIMER_KEY).copied().flatten()
    }
}

/// Why [`Mailbox::hibernate`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wake<M> {
    Message(M),
    Timeout,
}

enum Event<M> {
    Message(M),
    Timeout(TimerRef),
}

/// Where a hibernating connection waits.
pub struct Mailbox<M> {
    tx: UnboundedSender<Event<M>>,
    rx: UnboundedReceiver<Event<M>>,
    timer: Option<JoinHandle<()>>,
}

/// Delivers messages to a [`Mailbox`]. Cheap to clone.
pub struct MailboxSender<M> {
    tx: UnboundedSender<Event<M>>,
}

impl<M> MailboxSender<M> {
    /// Queues `message`. Returns `false` once the mailbox is gone.
    #[inline]
    pub fn send(&self, message: M) -> bool {
        self.tx.send(Event::Message(message)).is_ok()
    }
}

impl<M> Clone for MailboxSender<M> {
    #[inline]
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<M: Send + 'static> Mailbox<M> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self { tx, rx, timer: None }
    }

    #[inline]
    pub fn sender(&self) -> MailboxSender<M> {
        MailboxSender { tx: self.tx.clone() }
    }

    /// Waits for a message, or for `timeout` when given.
    ///
    /// Messages queued before the call are delivered right away, oldest
    /// first. Whatever the wake reason, the connection comes back with no
    /// timer armed.
    pub async fn hibernate(&mut self, conn: Conn, timeout: Option<Duration>) -> (Conn, Wake<M>) {
        let conn = match timeout {
            Some(after) => self.arm(conn, after),
            None => self.disarm(conn),
        };
        let current = TimerRef::current(&conn);

        while let Some(event) = self.rx.recv().await {
            match event {
                Event::Message(message) => {
                    trace!("hibernation woken by a message");
                    return (self.disarm(conn), Wake::Message(message));
                }
                Event::Timeout(timer) if Some(timer) == current => {
                    trace!(?timer, "hibernation timed out");
                    return (self.disarm(conn), Wake::Timeout);
                }
                Event::Timeout(timer) => trace!(?timer, "discarding stale timeout"),
            }
        }

        // `self.tx` keeps the channel open
        pending().await
    }

    fn arm(&mut self, conn: Conn, after: Duration) -> Conn {
        self.cancel_timer();

        let timer = TimerRef::next();
        let tx = self.tx.clone();
        self.timer = Some(tokio::spawn(async move {
            sleep(after).await;
            let _ = tx.send(Event::Timeout(timer));
        }));
        conn.put_private(TIMER_KEY, Some(timer))
    }

    fn disarm(&mut self, conn: Conn) -> Conn {
        self.cancel_timer();
        match TimerRef::current(&conn) {
            Some(_) => conn.put_private(TIMER_KEY, None::<TimerRef>),
            None => conn,
        }
    }

    #[inline]
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<M: Send + 'static> Default for Mailbox<M> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Drop for Mailbox<M> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl<M> fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("timer_armed", &self.timer.is_some())
            .finish_non_exhaustive()
    }
}

impl<M> fmt::Debug for MailboxSender<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
