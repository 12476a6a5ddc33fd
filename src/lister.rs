//! Open-file listing and pending-changelist discovery.

use std::path::PathBuf;

use crate::{
        connection::{ChangelistId, RenameBackend},
        error::{Error, Result},
        parse::{OpenAction, PendingChange, parse_changes, parse_opened},
};

/// A file currently open in a changelist, eligible for renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFileEntry {
        pub depot_path: String,
        /// Filled in by case resolution, when the path maps onto the workspace.
        pub local_path: Option<PathBuf>,
        pub action: OpenAction,
}

/// List renamable open files (edit, add, move/add) in `changelist`.
///
/// # Errors
/// [`Error::Query`] with the tool's diagnostic text when `opened` exits non-zero.
#[tracing::instrument(skip(backend))]
pub fn list_open_files<B: RenameBackend + ?Sized>(backend: &B, changelist: &ChangelistId) -> Result<Vec<OpenFileEntry>> {
        let out = backend.opened(changelist)?;
        if !out.success() {
                let diagnostic = out.diagnostic();
                tracing::error!("opened failed: {}", diagnostic);
                return Err(Error::Query { diagnostic });
        }
        let entries: Vec<_> = parse_opened(&out.stdout)
                .into_iter()
                .filter(|line| line.action.is_renamable())
                .map(|line| OpenFileEntry { depot_path: line.depot_path, local_path: None, action: line.action })
                .collect();
        tracing::debug!(count = entries.len(), "renamable open files");
        Ok(entries)
}

/// Pending changelists of this workspace, newest first as the server reports them.
///
/// A failing query yields an empty list: the `default` changelist is always usable.
#[tracing::instrument(skip(backend))]
pub fn pending_changelists<B: RenameBackend + ?Sized>(backend: &B, max: usize) -> Result<Vec<PendingChange>> {
        let out = backend.pending_changes(max)?;
        if !out.success() {
                tracing::warn!("changes failed: {}", out.diagnostic());
                return Ok(Vec::new());
        }
        Ok(parse_changes(&out.stdout))
}

#[cfg(test)]
mod tests {
        use test_log::test;

        use super::*;
        use crate::test_pub_utilities::FakeDepot;

        #[test]
        fn filters_to_renamable_actions() {
                let depot = FakeDepot::new()
                        .with_open("//depot/x/A.txt", "edit")
                        .with_open("//depot/x/B.txt", "add")
                        .with_open("//depot/x/C.txt", "move/add")
                        .with_open("//depot/x/D.txt", "delete")
                        .with_open("//depot/x/E.txt", "move/delete")
                        .with_open("//depot/x/F.txt", "integrate");
                let entries = list_open_files(&depot, &ChangelistId::Default).unwrap();
                let paths: Vec<_> = entries.iter().map(|e| e.depot_path.as_str()).collect();
                assert_eq!(paths, ["//depot/x/A.txt", "//depot/x/B.txt", "//depot/x/C.txt"]);
                assert!(entries.iter().all(|e| e.local_path.is_none()));
        }

        #[test]
        fn names_containing_dashes_are_listed() {
                let depot = FakeDepot::new().with_open("//depot/x/Foo - Copy.TXT", "edit");
                let entries = list_open_files(&depot, &ChangelistId::Default).unwrap();
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].depot_path, "//depot/x/Foo - Copy.TXT");
        }

        #[test]
        fn query_failure_carries_diagnostic() {
                let depot = FakeDepot::new().with_open("//depot/x/A.txt", "edit").failing_queries("not logged in");
                match list_open_files(&depot, &ChangelistId::Default) {
                        Err(Error::Query { diagnostic }) => assert_eq!(diagnostic, "not logged in"),
                        other => panic!("expected query error, got {:?}", other),
                }
        }

        #[test]
        fn changelist_scope_is_forwarded() {
                let depot = FakeDepot::new().with_open("//depot/x/A.txt", "edit");
                list_open_files(&depot, &ChangelistId::Numbered(99)).unwrap();
                assert_eq!(depot.opened_scopes(), [ChangelistId::Numbered(99)]);
        }

        #[test]
        fn pending_changelists_tolerate_failure() {
                let depot = FakeDepot::new()
                        .with_change(12, "Fix naming case")
                        .with_change(7, "Older work");
                let changes = pending_changelists(&depot, 50).unwrap();
                let labels: Vec<_> = changes.iter().map(PendingChange::label).collect();
                assert_eq!(labels, ["12 - Fix naming case", "7 - Older work"]);

                let depot = FakeDepot::new().with_change(12, "x").failing_queries("not logged in");
                assert_eq!(pending_changelists(&depot, 50).unwrap(), Vec::new());
        }
}
