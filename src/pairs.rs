//! Rename pairs: source path, auto-suggested target, operator's current target.

use std::cmp::Ordering;

use crate::{
        connection::{ChangelistId, RenameBackend},
        error::{Error, Result},
        lister::{OpenFileEntry, list_open_files},
        resolve::CaseResolver,
};

/// How a pair's current target relates to its source and suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
        /// current == source: nothing to do
        Unchanged,
        /// current == auto suggestion
        Auto,
        /// operator override
        Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePair {
        pub entry: OpenFileEntry,
        auto_target: String,
        current_target: String,
        /// The suggestion came from the normalization fallback, not the local files.
        pub degraded: bool,
}

impl RenamePair {
        /// `auto_target` is fixed for the life of the pair; only the current target may change.
        pub fn new(entry: OpenFileEntry, auto_target: impl Into<String>) -> Self {
                let auto_target = auto_target.into();
                Self { entry, current_target: auto_target.clone(), auto_target, degraded: false }
        }

        pub fn source(&self) -> &str {
                &self.entry.depot_path
        }

        pub fn auto_target(&self) -> &str {
                &self.auto_target
        }

        pub fn current_target(&self) -> &str {
                &self.current_target
        }

        pub fn set_target(&mut self, target: impl Into<String>) {
                self.current_target = target.into();
        }

        pub fn reset_target(&mut self) {
                self.current_target.clone_from(&self.auto_target);
        }

        pub fn status(&self) -> TargetStatus {
                if self.current_target == self.entry.depot_path {
                        TargetStatus::Unchanged
                } else if self.current_target == self.auto_target {
                        TargetStatus::Auto
                } else {
                        TargetStatus::Manual
                }
        }

        /// Non-empty target that differs from the source.
        pub fn needs_rename(&self) -> bool {
                !self.current_target.is_empty() && self.current_target != self.entry.depot_path
        }
}

/// List open files and compute each one's suggested target, in display order.
#[tracing::instrument(skip(backend, resolver))]
pub fn refresh_pairs<B: RenameBackend + ?Sized>(
        backend: &B,
        changelist: &ChangelistId,
        resolver: &CaseResolver,
) -> Result<Vec<RenamePair>> {
        let entries = list_open_files(backend, changelist)?;
        let mut pairs: Vec<RenamePair> = entries
                .into_iter()
                .map(|entry| {
                        let resolution = resolver.resolve(backend, &entry.depot_path);
                        let entry = OpenFileEntry { local_path: resolution.local_path, ..entry };
                        RenamePair { degraded: resolution.degraded, ..RenamePair::new(entry, resolution.target) }
                })
                .collect();
        sort_for_display(&mut pairs);
        Ok(pairs)
}

/// Apply an `INDEX=//depot/path` override.
pub fn apply_override(pairs: &mut [RenamePair], spec: &str) -> Result<()> {
        let invalid = || Error::InvalidOverride { given: spec.to_string() };
        let (index, target) = spec.split_once('=').ok_or_else(invalid)?;
        let index: usize = index.trim().parse().map_err(|_| invalid())?;
        let len = pairs.len();
        let pair = pairs.get_mut(index).ok_or(Error::IndexOutOfRange { index, len })?;
        pair.set_target(target.trim());
        Ok(())
}

/// Indices of the rows shown; `only_changed` hides rows with nothing to do.
pub fn visible_indices(pairs: &[RenamePair], only_changed: bool) -> Vec<usize> {
        pairs.iter()
                .enumerate()
                .filter(|(_, p)| !only_changed || p.needs_rename())
                .map(|(i, _)| i)
                .collect()
}

/// Natural order on (source base name, auto target), case-folded.
pub fn sort_for_display(pairs: &mut [RenamePair]) {
        // stable sort keeps listing order as the final tie-break
        pairs.sort_by_cached_key(|p| (natural_key(base_name(p.source())), natural_key(p.auto_target())));
}

fn base_name(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
}

/// One run of a natural-sort key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyPart {
        Text(String),
        Number(Digits),
}

/// Digit run compared by numeric value without overflow.
#[derive(Debug, Clone, Eq)]
pub struct Digits(String);

impl PartialEq for Digits {
        fn eq(&self, other: &Self) -> bool {
                self.cmp(other) == Ordering::Equal
        }
}

impl Ord for Digits {
        fn cmp(&self, other: &Self) -> Ordering {
                let a = self.0.trim_start_matches('0');
                let b = other.0.trim_start_matches('0');
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
}

impl PartialOrd for Digits {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
        }
}

/// `a2` < `a10`; letters compared case-insensitively.
pub fn natural_key(s: &str) -> Vec<KeyPart> {
        let folded = s.to_lowercase();
        let mut parts = Vec::new();
        let mut run = String::new();
        let mut in_digits = false;
        for c in folded.chars() {
                let is_digit = c.is_ascii_digit();
                if is_digit != in_digits && !run.is_empty() {
                        parts.push(key_part(std::mem::take(&mut run), in_digits));
                }
                in_digits = is_digit;
                run.push(c);
        }
        if !run.is_empty() {
                parts.push(key_part(run, in_digits));
        }
        parts
}

fn key_part(run: String, digits: bool) -> KeyPart {
        if digits { KeyPart::Number(Digits(run)) } else { KeyPart::Text(run) }
}
