//! Shared outcome buffers
//!
//! An [`OutcomeStream`] is an unbounded FIFO written by many pollers and
//! drained by exactly one flusher. Both `push` and `drain` take the lock for
//! a constant-time operation, so producers are never blocked for the length
//! of a flush.
//!
//! ## Known limitation
//!
//! Streams are unbounded and send no backpressure signal to the pollers. A
//! sink that stays slow or keeps failing (with the `Discard` policy) lets the
//! buffers grow without limit.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Errors raised by stream operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A thread panicked while holding the stream lock
    Poisoned(&'static str),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Poisoned(name) => write!(f, "{name} stream lock is poisoned"),
        }
    }
}

impl std::error::Error for StreamError {}

/// Multi-producer, single-drain FIFO buffer
///
/// Cloning yields another handle onto the same buffer.
#[derive(Debug)]
pub struct OutcomeStream<T> {
    name: &'static str,
    queue: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for OutcomeStream<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> OutcomeStream<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Name used in logs and errors ("result" or "error")
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<T>>, StreamError> {
        self.queue.lock().map_err(|_| StreamError::Poisoned(self.name))
    }

    /// Append an item at the back of the stream
    pub fn push(&self, item: T) -> Result<(), StreamError> {
        self.lock()?.push_back(item);
        Ok(())
    }

    /// Atomically remove every queued item, oldest first
    ///
    /// Items pushed after the lock is released stay queued for the next drain.
    /// Draining an empty stream returns an empty vector.
    pub fn drain(&self) -> Result<Vec<T>, StreamError> {
        let taken = std::mem::take(&mut *self.lock()?);
        Ok(taken.into())
    }

    pub fn len(&self) -> Result<usize, StreamError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StreamError> {
        Ok(self.lock()?.is_empty())
    }
}
