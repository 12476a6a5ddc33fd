//! Sequential batch application with progress events and cooperative cancellation.
//!
//! Renames in one batch run strictly in order on one worker: each verification reads
//! the backend state left by the move just before it. Only one batch may run against a
//! backend at a time; the [`std::sync::Mutex`] taken in [`BatchApplier::spawn`] enforces it.

use std::{
        collections::VecDeque,
        sync::{
                Arc, Mutex,
                atomic::{AtomicBool, Ordering},
                mpsc::{self, Receiver},
        },
        thread::{self, JoinHandle},
};

use crate::{
        connection::{ChangelistId, RenameBackend},
        error::Error,
        pairs::RenamePair,
        strategy::{MoveOutcome, RenameStrategy},
};

/// Default number of log lines kept.
pub const DEFAULT_TAIL: usize = 20;

/// Shared stop signal, observed once per item.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
        pub fn new() -> Self {
                Self::default()
        }

        pub fn cancel(&self) {
                self.0.store(true, Ordering::SeqCst);
        }

        pub fn is_cancelled(&self) -> bool {
                self.0.load(Ordering::SeqCst)
        }
}

/// Counts after each processed item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
        pub processed: usize,
        pub ok: usize,
        pub failed: usize,
        pub skipped: usize,
        pub message: String,
}

/// Recorded result for one selected index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
        pub index: usize,
        pub outcome: MoveOutcome,
}

/// Aggregate of a finished (or cancelled) batch.
///
/// `Exception` outcomes count as failures in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
        pub ok: usize,
        pub failed: usize,
        pub skipped: usize,
        pub cancelled: bool,
        /// In processing order; unprocessed indices are absent.
        pub outcomes: Vec<ItemOutcome>,
        /// Newest `tail` lines, oldest first.
        pub log: Vec<String>,
}

impl RunSummary {
        pub fn processed(&self) -> usize {
                self.outcomes.len()
        }
}

/// Events sent from the worker; exactly one `Finished` ends the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
        Progress(Progress),
        Finished(RunSummary),
}

/// Bounded log that drops its oldest lines.
#[derive(Debug, Clone)]
pub struct LogTail {
        bound: usize,
        lines: VecDeque<String>,
}

impl LogTail {
        pub fn new(bound: usize) -> Self {
                Self { bound, lines: VecDeque::with_capacity(bound.min(256)) }
        }

        pub fn push(&mut self, line: impl Into<String>) {
                if self.bound == 0 {
                        return;
                }
                if self.lines.len() == self.bound {
                        self.lines.pop_front();
                }
                self.lines.push_back(line.into());
        }

        pub fn into_lines(self) -> Vec<String> {
                self.lines.into()
        }
}

#[derive(Debug, Clone)]
pub struct BatchApplier {
        tail: usize,
}

impl Default for BatchApplier {
        fn default() -> Self {
                Self::new(DEFAULT_TAIL)
        }
}

impl BatchApplier {
        pub fn new(tail: usize) -> Self {
                Self { tail }
        }

        /// Apply `selected` pairs in the order given, on the calling thread.
        ///
        /// Never fails: every per-item problem becomes that item's outcome.
        #[tracing::instrument(skip_all, fields(changelist = %changelist, selected = selected.len()))]
        pub fn apply<B, F>(
                &self,
                backend: &B,
                changelist: ChangelistId,
                pairs: &[RenamePair],
                selected: &[usize],
                cancel: &CancelToken,
                mut on_progress: F,
        ) -> RunSummary
        where
                B: RenameBackend + ?Sized,
                F: FnMut(&Progress),
        {
                let strategy = RenameStrategy::new(backend, changelist);
                let mut log = LogTail::new(self.tail);
                let mut summary = RunSummary::default();

                for &index in selected {
                        if cancel.is_cancelled() {
                                tracing::info!("batch interrupted after {} items", summary.processed());
                                log.push(format!("{} cancelled by operator", MoveOutcome::Interrupted));
                                summary.cancelled = true;
                                break;
                        }
                        let (outcome, message) = Self::apply_one(&strategy, pairs, index);
                        match outcome {
                                MoveOutcome::Success => summary.ok += 1,
                                MoveOutcome::Skipped => summary.skipped += 1,
                                MoveOutcome::Failed | MoveOutcome::Exception | MoveOutcome::Interrupted => {
                                        summary.failed += 1
                                }
                        }
                        tracing::info!("{}", message);
                        log.push(message.clone());
                        summary.outcomes.push(ItemOutcome { index, outcome });
                        on_progress(&Progress {
                                processed: summary.processed(),
                                ok: summary.ok,
                                failed: summary.failed,
                                skipped: summary.skipped,
                                message,
                        });
                }
                summary.log = log.into_lines();
                summary
        }

        fn apply_one<B: RenameBackend + ?Sized>(
                strategy: &RenameStrategy<'_, B>,
                pairs: &[RenamePair],
                index: usize,
        ) -> (MoveOutcome, String) {
                let Some(pair) = pairs.get(index) else {
                        let fault = Error::IndexOutOfRange { index, len: pairs.len() };
                        return (MoveOutcome::Exception, format!("{} idx={} err={}", MoveOutcome::Exception, index, fault));
                };
                if !pair.needs_rename() {
                        return (MoveOutcome::Skipped, format!("{} unchanged {}", MoveOutcome::Skipped, pair.source()));
                }
                let (source, target) = (pair.source(), pair.current_target());
                match strategy.apply(source, target) {
                        Ok(report) => (report.outcome, report.log_line(source, target)),
                        Err(fault) => {
                                tracing::error!("rename of {} faulted: {}", source, fault);
                                (MoveOutcome::Exception, format!("{} idx={} err={}", MoveOutcome::Exception, index, fault))
                        }
                }
        }

        /// Every selected item faults when the backend can't be reached.
        fn backend_unavailable(&self, selected: &[usize]) -> RunSummary {
                let mut log = LogTail::new(self.tail);
                let mut summary = RunSummary::default();
                for &index in selected {
                        log.push(format!("{} idx={} err=backend unavailable", MoveOutcome::Exception, index));
                        summary.failed += 1;
                        summary.outcomes.push(ItemOutcome { index, outcome: MoveOutcome::Exception });
                }
                summary.log = log.into_lines();
                summary
        }

        /// Run [`apply`](Self::apply) on a dedicated worker thread.
        ///
        /// Events arrive in increasing `processed` order, then one [`BatchEvent::Finished`].
        /// The backend lock is held for the whole batch, so a second batch on the same
        /// backend waits for the first.
        pub fn spawn<B>(
                self,
                backend: Arc<Mutex<B>>,
                changelist: ChangelistId,
                pairs: Vec<RenamePair>,
                selected: Vec<usize>,
                cancel: CancelToken,
        ) -> (Receiver<BatchEvent>, JoinHandle<()>)
        where
                B: RenameBackend + 'static,
        {
                let (tx, rx) = mpsc::channel();
                let handle = thread::spawn(move || {
                        let summary = match backend.lock() {
                                Ok(guard) => self.apply(&*guard, changelist, &pairs, &selected, &cancel, |p| {
                                        // receiver gone: the foreground stopped listening, keep going regardless
                                        let _ = tx.send(BatchEvent::Progress(p.clone()));
                                }),
                                Err(poisoned) => {
                                        tracing::error!("backend lock poisoned: {}", poisoned);
                                        self.backend_unavailable(&selected)
                                }
                        };
                        let _ = tx.send(BatchEvent::Finished(summary));
                });
                (rx, handle)
        }
}
