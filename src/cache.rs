//! Last-used connection identity.
//!
//! Cached as JSON at `~/.p4_submitlist_tool/user.json`; the credential is never written.
//! Missing values are filled from `p4 set`.

use std::{
        fs,
        path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
        connection::ConnectionIdentity,
        error::{Error, Result},
        parse::parse_set_value,
        runner::CommandRunner,
};

const CACHE_DIR: &str = ".p4_submitlist_tool";
const CACHE_FILE: &str = "user.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CachedIdentity {
        server: String,
        user: String,
        client: String,
}

/// Fixed cache location under the home directory.
pub fn cache_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(Error::NoHomeDir)?;
        Ok(home.join(CACHE_DIR).join(CACHE_FILE))
}

/// Read a cached identity. Missing, unreadable or empty caches yield `None`.
pub fn load_identity(path: &Path) -> Option<ConnectionIdentity> {
        let text = fs::read_to_string(path).ok()?;
        let cached: CachedIdentity = match serde_json::from_str(&text) {
                Ok(cached) => cached,
                Err(e) => {
                        tracing::debug!("ignoring unreadable identity cache {:?}: {}", path, e);
                        return None;
                }
        };
        if cached.server.is_empty() && cached.user.is_empty() && cached.client.is_empty() {
                return None;
        }
        Some(ConnectionIdentity::new(cached.server, cached.user, cached.client))
}

/// Write `identity` (without credential), creating the directory as needed.
pub fn save_identity(path: &Path, identity: &ConnectionIdentity) -> Result<()> {
        if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
        }
        let cached = CachedIdentity {
                server: identity.server.clone(),
                user: identity.user.clone(),
                client: identity.workspace.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&cached)?)?;
        Ok(())
}

/// Identity from `p4 set` (P4PORT / P4USER / P4CLIENT). Failures yield empty fields.
pub fn identity_from_set<R: CommandRunner + ?Sized>(runner: &R) -> ConnectionIdentity {
        let out = match runner.run(&["set".to_string()], None) {
                Ok(out) if out.success() => out,
                Ok(out) => {
                        tracing::debug!("p4 set failed: {}", out.diagnostic());
                        return ConnectionIdentity::default();
                }
                Err(e) => {
                        tracing::debug!("p4 set could not run: {}", e);
                        return ConnectionIdentity::default();
                }
        };
        let text = format!("{}\n{}", out.stdout, out.stderr);
        let pick = |name| parse_set_value(&text, name).unwrap_or_default();
        ConnectionIdentity::new(pick("P4PORT"), pick("P4USER"), pick("P4CLIENT"))
}

/// Fill blanks in `given` from the cache, then from `p4 set`.
pub fn resolve_identity<R: CommandRunner + ?Sized>(
        given: ConnectionIdentity,
        cache: Option<&Path>,
        runner: &R,
) -> ConnectionIdentity {
        let mut identity = given;
        if identity.is_complete() {
                return identity;
        }
        let cached = cache.and_then(load_identity).unwrap_or_default();
        fill_blanks(&mut identity, &cached);
        if !identity.is_complete() {
                fill_blanks(&mut identity, &identity_from_set(runner));
        }
        identity
}

fn fill_blanks(identity: &mut ConnectionIdentity, from: &ConnectionIdentity) {
        for (field, fallback) in [
                (&mut identity.server, &from.server),
                (&mut identity.user, &from.user),
                (&mut identity.workspace, &from.workspace),
        ] {
                if field.trim().is_empty() {
                        field.clone_from(fallback);
                }
        }
}
