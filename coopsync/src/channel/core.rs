//! Bounded blocking channel with broadcast close

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::time::Instant;
use tracing::debug;

use super::error::{ChannelError, PopError, PushError};
use crate::timeout::Timeout;

/// Internal state protected by mutex
struct State<T> {
    queue: VecDeque<T>,
    closed: bool,

    /// Tasks currently parked in `push`
    producers: usize,

    /// Tasks currently parked in `pop`
    consumers: usize,
}

/// Snapshot of a channel for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub capacity: usize,
    pub queued: usize,
    pub producers: usize,
    pub consumers: usize,
    pub closed: bool,
}

/// A bounded FIFO queue whose `close` wakes every parked task at once.
///
/// Values pushed before close can still be drained; once empty, every `pop`
/// on a closed channel returns [`PopError::Closed`] without suspending.
pub struct Channel<T> {
    capacity: usize,
    state: Mutex<State<T>>,

    /// Consumers park here waiting for data
    readable: Notify,

    /// Producers park here waiting for space
    writable: Notify,
}

#[derive(Clone, Copy)]
enum Role {
    Producer,
    Consumer,
}

/// Keeps the parked-task counters honest even if the waiting future is dropped
struct Parked<'a, T> {
    channel: &'a Channel<T>,
    role: Role,
}

impl<T> Drop for Parked<'_, T> {
    fn drop(&mut self) {
        let mut state = self.channel.lock();
        match self.role {
            Role::Producer => state.producers -= 1,
            Role::Consumer => state.consumers -= 1,
        }
    }
}

impl<T> Channel<T> {
    /// Create a channel holding at most `capacity` values
    pub fn new(capacity: usize) -> Result<Self, ChannelError> {
        debug!(capacity, "Channel::new: called");
        NonZeroUsize::new(capacity)
            .map(Self::bounded)
            .ok_or(ChannelError::ZeroCapacity)
    }

    /// Create a channel with a capacity known to be non-zero
    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self {
            capacity: capacity.get(),
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity.get()),
                closed: false,
                producers: 0,
                consumers: 0,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Critical sections never leave the state half-updated
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park(&self, state: &mut State<T>, role: Role) -> Parked<'_, T> {
        match role {
            Role::Producer => state.producers += 1,
            Role::Consumer => state.consumers += 1,
        }
        Parked { channel: self, role }
    }

    /// Push a value, suspending while the channel is full
    ///
    /// Fails with the value handed back if the channel is (or becomes) closed,
    /// or if `timeout` elapses first.
    pub async fn push(&self, value: T, timeout: Timeout) -> Result<(), PushError<T>> {
        let deadline = timeout.deadline();

        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let _parked = {
                let mut state = self.lock();
                if state.closed {
                    return Err(PushError::Closed(value));
                }
                if state.queue.len() < self.capacity {
                    state.queue.push_back(value);
                    drop(state);
                    self.readable.notify_one();
                    return Ok(());
                }
                if expired(deadline) {
                    return Err(PushError::Timeout(value));
                }
                self.park(&mut state, Role::Producer)
            };

            wait(notified, deadline).await;
        }
    }

    /// Pop the oldest value, suspending while the channel is empty
    ///
    /// Queued values are always delivered before closed is reported.
    pub async fn pop(&self, timeout: Timeout) -> Result<T, PopError> {
        let deadline = timeout.deadline();

        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let _parked = {
                let mut state = self.lock();
                if let Some(value) = state.queue.pop_front() {
                    drop(state);
                    self.writable.notify_one();
                    return Ok(value);
                }
                if state.closed {
                    return Err(PopError::Closed);
                }
                if expired(deadline) {
                    return Err(PopError::Timeout);
                }
                self.park(&mut state, Role::Consumer)
            };

            wait(notified, deadline).await;
        }
    }

    /// Push without suspending
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed(value));
        }
        if state.queue.len() >= self.capacity {
            return Err(PushError::Timeout(value));
        }
        state.queue.push_back(value);
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    /// Pop without suspending
    pub fn try_pop(&self) -> Result<T, PopError> {
        let mut state = self.lock();
        match state.queue.pop_front() {
            Some(value) => {
                drop(state);
                self.writable.notify_one();
                Ok(value)
            }
            None if state.closed => Err(PopError::Closed),
            None => Err(PopError::Timeout),
        }
    }

    /// Close the channel, releasing every parked producer and consumer
    ///
    /// Returns `true` only for the call that performed the close.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            debug!("Channel::close: already closed");
            return false;
        }
        state.closed = true;
        let (producers, consumers) = (state.producers, state.consumers);
        drop(state);

        debug!(producers, consumers, "Channel::close: waking all parked tasks");
        self.readable.notify_waiters();
        self.writable.notify_waiters();
        true
    }

    /// Deliver every value to `callback` until the channel is closed and drained
    ///
    /// Returns the number of values delivered.
    pub async fn pop_loop<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(T),
    {
        let mut delivered = 0;
        // Only a closed-and-drained channel fails a pop that never times out
        while let Ok(value) = self.pop(Timeout::Forever).await {
            callback(value);
            delivered += 1;
        }
        debug!(delivered, "Channel::pop_loop: closed and drained");
        delivered
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().queue.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of queue length, parked tasks and closed flag
    pub fn stats(&self) -> ChannelStats {
        let state = self.lock();
        ChannelStats {
            capacity: self.capacity,
            queued: state.queue.len(),
            producers: state.producers,
            consumers: state.consumers,
            closed: state.closed,
        }
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("stats", &self.stats()).finish()
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Park until notified or the deadline passes; the caller re-checks state either way
async fn wait(notified: Pin<&mut Notified<'_>>, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            let _ = tokio::time::timeout_at(deadline, notified).await;
        }
        None => notified.await,
    }
}
