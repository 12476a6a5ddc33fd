//! Move application for one pair: direct move, falling back to a two-hop move
//! through a temporary name, with every success verified against the exact target.
//!
//! ```md
//! TrySingle ──fail──────────────────────────────> TwoStep(source) ─> Verify ─> Success | Failed
//!     │ ok
//!     └─> Verify ─exact─> Success
//!              └─not exact─> find case-insensitive location ─none─> Failed
//!                                        └─found─> TwoStep(found) ─> Verify ─> Success | Failed
//! ```
//!
//! A two-hop move whose second hop fails leaves the file under its temporary name;
//! there is no rollback.

use std::fmt;

use rand::Rng;

use crate::{
        connection::{ChangelistId, RenameBackend},
        error::Result,
        verify::ConsistencyVerifier,
};

/// Marker placed between a target's base name and the random token.
pub const TEMP_MARKER: &str = ".__tmp__";

/// Per-item result of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveOutcome {
        Success,
        Failed,
        Skipped,
        Interrupted,
        Exception,
}

impl MoveOutcome {
        /// Log-line tag.
        pub fn tag(&self) -> &'static str {
                match self {
                        MoveOutcome::Success => "[OK]",
                        MoveOutcome::Failed => "[FAIL]",
                        MoveOutcome::Skipped => "[SKIP]",
                        MoveOutcome::Interrupted => "[INTERRUPT]",
                        MoveOutcome::Exception => "[EXCEPT]",
                }
        }
}

impl fmt::Display for MoveOutcome {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.tag())
        }
}

/// Which path through the state machine produced the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveMethod {
        /// `move source target`
        Single,
        /// `move source tmp` + `move tmp target`, after the direct move was refused
        TwoStep,
        /// direct move accepted but not realized; two hops from where the file actually is
        Corrective { from: String },
}

impl fmt::Display for MoveMethod {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                        MoveMethod::Single => write!(f, "move"),
                        MoveMethod::TwoStep => write!(f, "move*2"),
                        MoveMethod::Corrective { .. } => write!(f, "move*2(fix-after-1st)"),
                }
        }
}

/// What happened to one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameReport {
        pub outcome: MoveOutcome,
        pub method: MoveMethod,
        /// `move` commands issued for this pair
        pub moves_issued: usize,
        /// Set when a two-hop move stopped after its first hop.
        pub stranded_at: Option<String>,
}

impl RenameReport {
        /// Human-readable log line.
        pub fn log_line(&self, source: &str, target: &str) -> String {
                let from = match &self.method {
                        MoveMethod::Corrective { from } => from.as_str(),
                        _ => source,
                };
                let mut line = format!("{} {} {} -> {}", self.outcome, self.method, from, target);
                if let Some(tmp) = &self.stranded_at {
                        line.push_str(&format!(" (left at {})", tmp));
                }
                line
        }
}

/// Result of a two-hop move.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TwoStep {
        Done,
        FirstHopFailed,
        SecondHopFailed { temporary: String },
}

impl TwoStep {
        fn moves_issued(&self) -> usize {
                match self {
                        TwoStep::FirstHopFailed => 1,
                        TwoStep::Done | TwoStep::SecondHopFailed { .. } => 2,
                }
        }
}

/// Applies one rename at a time against a backend.
pub struct RenameStrategy<'a, B: ?Sized> {
        backend: &'a B,
        verifier: ConsistencyVerifier<'a, B>,
}

impl<'a, B: RenameBackend + ?Sized> RenameStrategy<'a, B> {
        pub fn new(backend: &'a B, changelist: ChangelistId) -> Self {
                Self { backend, verifier: ConsistencyVerifier::new(backend, changelist) }
        }

        /// Rename `source` to `target`, verifying the exact result.
        ///
        /// `Err` only when a command could not be run at all.
        #[tracing::instrument(skip(self))]
        pub fn apply(&self, source: &str, target: &str) -> Result<RenameReport> {
                if !self.move_once(source, target)? {
                        tracing::debug!("direct move refused; trying two hops");
                        let hops = self.two_step(source, target)?;
                        return self.finish(MoveMethod::TwoStep, 1, hops, target);
                }
                if self.verifier.is_exact_match(target)? {
                        return Ok(RenameReport {
                                outcome: MoveOutcome::Success,
                                method: MoveMethod::Single,
                                moves_issued: 1,
                                stranded_at: None,
                        });
                }
                tracing::warn!("move accepted but {} is not open under that exact name", target);
                let Some(actual) = self.verifier.find_case_insensitive_match(target)? else {
                        return Ok(RenameReport {
                                outcome: MoveOutcome::Failed,
                                method: MoveMethod::Single,
                                moves_issued: 1,
                                stranded_at: None,
                        });
                };
                let hops = self.two_step(&actual, target)?;
                self.finish(MoveMethod::Corrective { from: actual }, 1, hops, target)
        }

        fn finish(&self, method: MoveMethod, prior_moves: usize, hops: TwoStep, target: &str) -> Result<RenameReport> {
                let moves_issued = prior_moves + hops.moves_issued();
                let (outcome, stranded_at) = match hops {
                        TwoStep::Done if self.verifier.is_exact_match(target)? => (MoveOutcome::Success, None),
                        TwoStep::Done | TwoStep::FirstHopFailed => (MoveOutcome::Failed, None),
                        TwoStep::SecondHopFailed { temporary } => {
                                tracing::error!("second hop failed; file left at {}", temporary);
                                (MoveOutcome::Failed, Some(temporary))
                        }
                };
                Ok(RenameReport { outcome, method, moves_issued, stranded_at })
        }

        fn move_once(&self, from: &str, to: &str) -> Result<bool> {
                let out = self.backend.move_file(from, to)?;
                if !out.success() {
                        tracing::debug!("move {} -> {} failed: {}", from, to, out.diagnostic());
                }
                Ok(out.success())
        }

        fn two_step(&self, from: &str, target: &str) -> Result<TwoStep> {
                let temporary = temporary_name(target, &fresh_token());
                if !self.move_once(from, &temporary)? {
                        return Ok(TwoStep::FirstHopFailed);
                }
                if !self.move_once(&temporary, target)? {
                        return Ok(TwoStep::SecondHopFailed { temporary });
                }
                Ok(TwoStep::Done)
        }
}

/// `//dir/name.ext` ~> `//dir/name.ext.__tmp__<token>`
pub fn temporary_name(target: &str, token: &str) -> String {
        format!("{}{}{}", target, TEMP_MARKER, token)
}

/// Random hex token; two concurrent runs never pick the same temporary name in practice.
fn fresh_token() -> String {
        format!("{:016x}", rand::rng().random::<u64>())
}
