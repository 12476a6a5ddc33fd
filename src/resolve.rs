//! Target-name resolution for open files.
//!
//! Two modes:
//! - **normalize**: same depot directory, base name passed through a [`NameRule`].
//! - **local** (default): map the depot path to its workspace file, read the true
//!   on-disk case of every path segment, and carry that case back onto the depot path.
//!   Falls back to *normalize* for any entry it cannot map.
//!
//! Resolution never fails; it degrades instead.

use std::{
        fmt,
        path::{Component, Path, PathBuf},
};

use walkdir::WalkDir;

use crate::{connection::RenameBackend, error::Result, parse::parse_where};

/// Case convention enforced by [`StandardNameRule`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CaseConvention {
        /// Leave letter case alone
        #[default]
        Keep,
        Lower,
        Upper,
}

/// Pluggable base-name transform.
pub trait NameRule: Send + Sync {
        fn normalize(&self, name: &str) -> String;
}

impl<F> NameRule for F
where
        F: Fn(&str) -> String + Send + Sync,
{
        fn normalize(&self, name: &str) -> String {
                self(name)
        }
}

/// Trim surrounding whitespace, then apply a [`CaseConvention`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNameRule {
        pub convention: CaseConvention,
}

impl NameRule for StandardNameRule {
        fn normalize(&self, name: &str) -> String {
                let trimmed = name.trim();
                match self.convention {
                        CaseConvention::Keep => trimmed.to_string(),
                        CaseConvention::Lower => trimmed.to_lowercase(),
                        CaseConvention::Upper => trimmed.to_uppercase(),
                }
        }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ResolveMode {
        /// Normalize the base name only
        Normalize,
        /// Take the case of every segment from the local workspace files
        #[default]
        #[value(name = "local")]
        LocalAuthority,
}

/// Outcome of resolving one depot path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
        pub target: String,
        pub local_path: Option<PathBuf>,
        /// Local-authority resolution was not possible; `target` is the normalized fallback.
        pub degraded: bool,
}

pub struct CaseResolver {
        mode: ResolveMode,
        rule: Box<dyn NameRule>,
}

impl fmt::Debug for CaseResolver {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct("CaseResolver").field("mode", &self.mode).finish_non_exhaustive()
        }
}

impl Default for CaseResolver {
        fn default() -> Self {
                Self::new(ResolveMode::default(), StandardNameRule::default())
        }
}

impl CaseResolver {
        pub fn new(mode: ResolveMode, rule: impl NameRule + 'static) -> Self {
                Self { mode, rule: Box::new(rule) }
        }

        /// Suggested target for `depot_path`.
        #[tracing::instrument(skip(self, backend))]
        pub fn resolve<B: RenameBackend + ?Sized>(&self, backend: &B, depot_path: &str) -> Resolution {
                match self.mode {
                        ResolveMode::Normalize => Resolution {
                                target: self.normalized_target(depot_path),
                                local_path: None,
                                degraded: false,
                        },
                        ResolveMode::LocalAuthority => self.local_target(backend, depot_path).unwrap_or_else(|| {
                                tracing::warn!("no local mapping for {}; normalizing name only", depot_path);
                                Resolution { target: self.normalized_target(depot_path), local_path: None, degraded: true }
                        }),
                }
        }

        /// Same directory, normalized base name. An empty result keeps the original name.
        pub fn normalized_target(&self, depot_path: &str) -> String {
                let tidy = tidy_depot_path(depot_path);
                let Some((dir, base)) = tidy.rsplit_once('/') else {
                        return tidy;
                };
                let new_base = self.rule.normalize(base);
                if new_base.is_empty() || new_base.contains(['/', '\\']) {
                        return tidy;
                }
                format!("{}/{}", dir, new_base)
        }

        fn local_target<B: RenameBackend + ?Sized>(&self, backend: &B, depot_path: &str) -> Option<Resolution> {
                let tidy = tidy_depot_path(depot_path);
                let out = match backend.where_path(&tidy) {
                        Ok(out) if out.success() => out,
                        Ok(out) => {
                                tracing::debug!("where failed: {}", out.diagnostic());
                                return None;
                        }
                        Err(e) => {
                                tracing::debug!("where could not run: {}", e);
                                return None;
                        }
                };
                let mapping = parse_where(&out.stdout)?;
                // a path with spaces splits the depot/client/local triple at the wrong place
                if mapping.depot.to_lowercase() != tidy.to_lowercase() {
                        tracing::debug!("where mapping {:?} does not describe {}", mapping, tidy);
                        return None;
                }
                if mapping.local.is_empty() {
                        return None;
                }
                let local = PathBuf::from(&mapping.local);
                let on_disk = disk_case_segments(&local);

                let mut depot_segments: Vec<String> =
                        tidy.trim_start_matches('/').split('/').map(str::to_string).collect();
                // never touch the namespace root
                let covered = mapping
                        .client_segments()
                        .len()
                        .min(on_disk.len())
                        .min(depot_segments.len().saturating_sub(1));
                let depot_tail = depot_segments.len() - covered;
                let disk_tail = on_disk.len() - covered;
                for (depot_seg, disk_seg) in depot_segments[depot_tail..].iter_mut().zip(&on_disk[disk_tail..]) {
                        if depot_seg.to_lowercase() == disk_seg.to_lowercase() {
                                *depot_seg = disk_seg.clone();
                        }
                }
                Some(Resolution {
                        target: format!("//{}", depot_segments.join("/")),
                        local_path: Some(local),
                        degraded: false,
                })
        }
}

/// Namespace-rooted, forward slashes, no empty segments.
pub fn tidy_depot_path(path: &str) -> String {
        let unified = path.replace('\\', "/");
        let segments: Vec<&str> = unified.split('/').filter(|s| !s.is_empty()).collect();
        format!("//{}", segments.join("/"))
}

/// True on-disk case of each named segment of `local`.
///
/// Segments at or below the first one that cannot be found (or is ambiguous) are
/// returned unchanged.
pub fn disk_case_segments(local: &Path) -> Vec<String> {
        let mut walked = PathBuf::new();
        let mut corrected = Vec::new();
        let mut scanning = true;
        for component in local.components() {
                let Component::Normal(segment) = component else {
                        walked.push(component.as_os_str());
                        continue;
                };
                let segment = segment.to_string_lossy().into_owned();
                let actual = if scanning {
                        let dir = if walked.as_os_str().is_empty() { Path::new(".") } else { walked.as_path() };
                        match on_disk_name(dir, &segment) {
                                Ok(Some(name)) => name,
                                Ok(None) => {
                                        scanning = false;
                                        segment
                                }
                                Err(e) => {
                                        tracing::debug!("cannot scan {:?}: {}", dir, e);
                                        scanning = false;
                                        segment
                                }
                        }
                } else {
                        segment
                };
                walked.push(&actual);
                corrected.push(actual);
        }
        corrected
}

/// Real name of the entry in `dir` matching `segment` case-insensitively.
///
/// An exact match wins; several case-insensitive matches count as none.
fn on_disk_name(dir: &Path, segment: &str) -> Result<Option<String>> {
        let wanted = segment.to_lowercase();
        let mut candidates = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy();
                if name == segment {
                        return Ok(Some(segment.to_string()));
                }
                if name.to_lowercase() == wanted {
                        candidates.push(name.into_owned());
                }
        }
        match candidates.as_slice() {
                [only] => Ok(Some(only.clone())),
                [] => Ok(None),
                _ => {
                        tracing::warn!("ambiguous case for {:?} in {:?}: {:?}", segment, dir, candidates);
                        Ok(None)
                }
        }
}
