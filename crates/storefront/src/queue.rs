//! Per-key FIFO ordering for remote writes.
//!
//! Optimistic deltas are applied immediately, but their remote writes must
//! reach the server in call order for each product. Each enqueued write gets
//! a [`Turn`] that resolves once the previous write for the same key has
//! finished (or was dropped). Writes run as tasks on the runtime, so a
//! caller that stops waiting does not stall the writes queued behind it.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use tokio::sync::oneshot;

use crate::error::{self, MutationOutcome};

/// Tail of the write chain for every key.
pub(crate) struct KeyedQueue<K> {
    next_seq: u64,
    tails: HashMap<K, (u64, oneshot::Receiver<()>)>,
}

impl<K: Eq + Hash + Clone> KeyedQueue<K> {
    pub(crate) fn new() -> Self {
        Self {
            next_seq: 0,
            tails: HashMap::new(),
        }
    }

    /// Join the back of `key`'s chain.
    pub(crate) fn enqueue(&mut self, key: &K) -> Turn {
        let seq = self.next_seq;
        self.next_seq += 1;

        let (done, rx) = oneshot::channel();
        let previous = self.tails.insert(key.clone(), (seq, rx)).map(|(_, rx)| rx);
        Turn {
            seq,
            previous,
            done: Some(done),
        }
    }

    /// Forget `key` if `turn` is still the last one queued for it.
    pub(crate) fn release(&mut self, key: &K, turn: &Turn) {
        if self.tails.get(key).is_some_and(|(seq, _)| *seq == turn.seq) {
            self.tails.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tails.len()
    }
}

/// A place in a key's write chain.
///
/// Dropping the turn lets the next write for the key proceed.
pub(crate) struct Turn {
    seq: u64,
    previous: Option<oneshot::Receiver<()>>,
    done: Option<oneshot::Sender<()>>,
}

impl Turn {
    /// Wait until every earlier write for this key has finished.
    pub(crate) async fn ready(&mut self) {
        if let Some(previous) = self.previous.take() {
            // An Err means the previous turn was dropped without signalling,
            // which also ends it.
            let _ = previous.await;
        }
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

/// Run a queued write on the runtime so it completes even if the caller
/// stops waiting, and return a future for its result.
///
/// `Ok(None)` means there was nothing to write. Must be called from within
/// a tokio runtime.
pub(crate) fn spawn_write<F>(
    write: error::Result<Option<F>>,
) -> impl Future<Output = error::Result<MutationOutcome>> + Send + 'static
where
    F: Future<Output = error::Result<MutationOutcome>> + Send + 'static,
{
    let handle = write.map(|write| write.map(tokio::spawn));
    async move {
        let Some(handle) = handle? else {
            return Ok(MutationOutcome::Unchanged);
        };
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Only happens while the runtime shuts down.
            Err(_) => Ok(MutationOutcome::Discarded),
        }
    }
}
