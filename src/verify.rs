//! Post-move consistency checks against a fresh `opened` listing.
//!
//! A zero exit status from `move` is not proof of a rename: case-insensitive
//! servers accept a pure case change and keep the old spelling. Every check here
//! re-queries; nothing is cached between calls.

use crate::{
        connection::{ChangelistId, RenameBackend},
        error::{Error, Result},
        lister::list_open_files,
};

#[derive(Debug)]
pub struct ConsistencyVerifier<'a, B: ?Sized> {
        backend: &'a B,
        changelist: ChangelistId,
}

impl<'a, B: RenameBackend + ?Sized> ConsistencyVerifier<'a, B> {
        pub fn new(backend: &'a B, changelist: ChangelistId) -> Self {
                Self { backend, changelist }
        }

        /// Depot paths currently open in the changelist.
        ///
        /// A failing listing counts as "nothing open": verification then fails rather than
        /// the whole item faulting.
        fn open_paths(&self) -> Result<Vec<String>> {
                match list_open_files(self.backend, &self.changelist) {
                        Ok(entries) => Ok(entries.into_iter().map(|e| e.depot_path).collect()),
                        Err(Error::Query { diagnostic }) => {
                                tracing::warn!("verification listing failed: {}", diagnostic);
                                Ok(Vec::new())
                        }
                        Err(e) => Err(e),
                }
        }

        /// `candidate` is open under exactly this spelling.
        #[tracing::instrument(skip(self))]
        pub fn is_exact_match(&self, candidate: &str) -> Result<bool> {
                Ok(self.open_paths()?.iter().any(|p| p == candidate))
        }

        /// First open path equal to `candidate` ignoring case.
        #[tracing::instrument(skip(self))]
        pub fn find_case_insensitive_match(&self, candidate: &str) -> Result<Option<String>> {
                let wanted = candidate.to_lowercase();
                Ok(self.open_paths()?.into_iter().find(|p| p.to_lowercase() == wanted))
        }
}
