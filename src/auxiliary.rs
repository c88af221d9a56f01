use super::{Action, Error, FailureReason, ProgressSnapshot};

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Copy, Clone)]
struct Counters {
    file_size: u64,
    bytes_processed: u64,
    file_size_processed: u64,
}

#[derive(Debug, Default, Copy, Clone)]
struct Outcome {
    success: bool,
    aborted: bool,
    failure: Option<FailureReason>,
}

#[derive(Debug, Default)]
struct State {
    action: Option<Action>,
    counters: Counters,
    /// Set as soon as the running operation failed, before its teardown
    /// is done.
    failed: bool,
    outcome: Outcome,
    /// Replaced for every operation, since a cancelled token stays cancelled.
    cancel_token: CancellationToken,
}

impl State {
    fn snapshot(&self) -> Option<ProgressSnapshot> {
        let counters = self.counters;

        if self.action.is_none() || counters.file_size == 0 {
            return None;
        }

        let progress = if self.failed {
            ProgressSnapshot::FAILED
        } else {
            (counters.file_size_processed as f64 / counters.file_size as f64).min(1.0) as f32
        };

        Some(ProgressSnapshot {
            progress,
            file_size: counters.file_size,
            bytes_processed: counters.bytes_processed,
            file_size_processed: counters.file_size_processed,
        })
    }
}

/// State shared between the thread calling into
/// [`TransferEngine`](crate::TransferEngine) and the task running the
/// operation.
///
/// Everything lives behind one lock so that `progress()` never observes
/// counters of different generations.
#[derive(Debug)]
pub(super) struct Auxiliary {
    state: Mutex<State>,
    progress_tx: watch::Sender<Option<ProgressSnapshot>>,
}

impl Auxiliary {
    pub(super) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            progress_tx: watch::channel(None).0,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // The state is plain data, updated field by field, so it is
        // usable even if a holder of the lock panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: Option<ProgressSnapshot>) {
        self.progress_tx.send_replace(snapshot);
    }

    /// Mark `action` as running and hand out its cancellation token.
    pub(super) fn begin(&self, action: Action) -> Result<CancellationToken, Error> {
        let mut state = self.lock();

        if state.action.is_some() {
            return Err(Error::OperationInProgress);
        }

        *state = State {
            action: Some(action),
            ..State::default()
        };
        let cancel_token = state.cancel_token.clone();
        drop(state);

        self.publish(None);

        Ok(cancel_token)
    }

    pub(super) fn set_file_size(&self, file_size: u64) {
        let mut state = self.lock();
        state.counters.file_size = file_size;
        let snapshot = state.snapshot();
        drop(state);

        self.publish(snapshot);
    }

    /// Account for `n` bytes written to the sink.
    pub(super) fn add_processed(&self, n: u64) {
        let mut state = self.lock();
        state.counters.bytes_processed += n;
        state.counters.file_size_processed += n;
        let snapshot = state.snapshot();
        drop(state);

        if self.progress_tx.receiver_count() > 0 {
            self.publish(snapshot);
        }
    }

    /// Switch the progress to [`ProgressSnapshot::FAILED`] while the
    /// teardown of the operation is still running.
    pub(super) fn mark_failed(&self) {
        let mut state = self.lock();
        state.failed = true;
        let snapshot = state.snapshot();
        drop(state);

        self.publish(snapshot);
    }

    /// Record the outcome of the running operation and mark the engine idle.
    pub(super) fn finish<T>(&self, res: &Result<T, Error>) {
        let mut state = self.lock();

        state.action = None;
        state.outcome = match res {
            Ok(_) => Outcome {
                success: true,
                ..Outcome::default()
            },
            Err(err) => {
                let failure = FailureReason::from(err);
                Outcome {
                    success: false,
                    aborted: failure == FailureReason::Aborted,
                    failure: Some(failure),
                }
            }
        };
        drop(state);

        self.publish(None);
    }

    /// Cancel the running operation, if any.
    pub(super) fn abort(&self) {
        let state = self.lock();

        if state.action.is_some() {
            state.cancel_token.cancel();
        }
    }

    pub(super) fn snapshot(&self) -> Option<ProgressSnapshot> {
        self.lock().snapshot()
    }

    pub(super) fn action(&self) -> Option<Action> {
        self.lock().action
    }

    pub(super) fn last_failure(&self) -> Option<FailureReason> {
        self.lock().outcome.failure
    }

    pub(super) fn was_aborted(&self) -> bool {
        self.lock().outcome.aborted
    }

    pub(super) fn was_successful(&self) -> bool {
        self.lock().outcome.success
    }

    pub(super) fn subscribe(&self) -> watch::Receiver<Option<ProgressSnapshot>> {
        self.progress_tx.subscribe()
    }
}
