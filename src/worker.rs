//! # Commit Worker
//!
//! A dedicated thread that owns the commit loop. Producers stage changes on
//! any thread and call [`CommitWorker::request_commit`]; the worker commits
//! immediately on request, or after the configured interval otherwise, so
//! every commit and every model notification runs on this one thread.
//!
//! Shutting the worker down (explicitly or by dropping it) commits whatever
//! is still staged before the thread exits.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};

use crate::db::RhythmDb;

#[derive(Debug, Default)]
struct WorkerState {
    /// Bumped by every request.
    requested: u64,
    /// Highest request generation a finished commit has covered.
    completed: u64,
    shutdown: bool,
    stopped: bool,
}

#[derive(Debug, Default)]
struct CommitSignal {
    state: Mutex<WorkerState>,
    wake: Condvar,
    done: Condvar,
}

impl CommitSignal {
    /// Blocks until a commit is due. Returns the request generation the
    /// commit will cover and whether the worker should exit afterwards.
    fn wait_for_commit(&self, interval: Duration) -> (u64, bool) {
        let mut state = self.state.lock();
        if state.requested == state.completed && !state.shutdown {
            self.wake.wait_for(&mut state, interval);
        }
        (state.requested, state.shutdown)
    }

    fn finish(&self, generation: u64, stopped: bool) {
        let mut state = self.state.lock();
        state.completed = state.completed.max(generation);
        state.stopped = stopped;
        self.done.notify_all();
    }
}

/// Handle to the background commit thread.
#[derive(Debug)]
pub struct CommitWorker {
    signal: Arc<CommitSignal>,
    handle: Option<JoinHandle<()>>,
}

impl CommitWorker {
    /// Spawns the worker thread for `db`, committing every
    /// `db.config().commit_interval()` when not asked sooner.
    pub fn spawn(db: RhythmDb) -> Result<Self> {
        let signal = Arc::new(CommitSignal::default());
        let interval = db.config().commit_interval();
        let thread_signal = Arc::clone(&signal);

        let handle = thread::Builder::new()
            .name("rhythmdb-commit".into())
            .spawn(move || {
                log::info!("commit worker started (interval {interval:?})");
                loop {
                    let (generation, shutdown) = thread_signal.wait_for_commit(interval);
                    let summary = db.commit();
                    if !summary.is_empty() {
                        log::debug!("worker commit: {summary:?}");
                    }
                    thread_signal.finish(generation, shutdown);
                    if shutdown {
                        break;
                    }
                }
                log::info!("commit worker stopped");
            })
            .context("Failed to spawn commit worker thread")?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Asks the worker to commit as soon as possible without waiting.
    pub fn request_commit(&self) {
        let mut state = self.signal.state.lock();
        state.requested += 1;
        self.signal.wake.notify_one();
    }

    /// Requests a commit and blocks until the worker has performed it.
    pub fn flush(&self) {
        let mut state = self.signal.state.lock();
        state.requested += 1;
        let target = state.requested;
        self.signal.wake.notify_one();
        while state.completed < target && !state.stopped {
            self.signal.done.wait(&mut state);
        }
    }

    /// Commits remaining staged work and joins the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        {
            let mut state = self.signal.state.lock();
            state.shutdown = true;
            self.signal.wake.notify_one();
        }
        if handle.join().is_err() {
            log::warn!("commit worker panicked");
        }
    }
}

impl Drop for CommitWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
