//! Server/user/workspace identity and the command-issuing context.
//!
//! Core components never touch [`ConnectionContext`] directly; they depend on
//! [`RenameBackend`], which the context implements.

use std::{fmt, str::FromStr};

use crate::{
        error::{Error, Result},
        runner::{CommandOutput, CommandRunner, ProcessRunner},
};

/// Who we talk to, as whom, through which workspace.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionIdentity {
        pub server: String,
        pub user: String,
        pub workspace: String,
        /// Held only for the session; never cached or logged.
        pub credential: Option<String>,
}

impl ConnectionIdentity {
        pub fn new(server: impl Into<String>, user: impl Into<String>, workspace: impl Into<String>) -> Self {
                Self { server: server.into(), user: user.into(), workspace: workspace.into(), credential: None }
        }

        /// All three identity fields are present.
        pub fn is_complete(&self) -> bool {
                !self.server.trim().is_empty() && !self.user.trim().is_empty() && !self.workspace.trim().is_empty()
        }
}

impl fmt::Debug for ConnectionIdentity {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct("ConnectionIdentity")
                        .field("server", &self.server)
                        .field("user", &self.user)
                        .field("workspace", &self.workspace)
                        .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
                        .finish()
        }
}

/// Scope of a file query: the `default` changelist or a numbered pending change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChangelistId {
        #[default]
        Default,
        Numbered(u64),
}

impl ChangelistId {
        /// Scope arguments for `opened`/`submit`; `default` omits them.
        pub fn scope_args(&self) -> Vec<String> {
                match self {
                        ChangelistId::Default => Vec::new(),
                        ChangelistId::Numbered(n) => vec!["-c".to_string(), n.to_string()],
                }
        }
}

impl fmt::Display for ChangelistId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                        ChangelistId::Default => write!(f, "default"),
                        ChangelistId::Numbered(n) => write!(f, "{}", n),
                }
        }
}

impl FromStr for ChangelistId {
        type Err = Error;

        fn from_str(s: &str) -> Result<Self> {
                let s = s.trim();
                if s.is_empty() || s.eq_ignore_ascii_case("default") {
                        return Ok(ChangelistId::Default);
                }
                match s.parse::<u64>() {
                        Ok(n) if n > 0 => Ok(ChangelistId::Numbered(n)),
                        _ => Err(Error::InvalidChangelist { given: s.to_string() }),
                }
        }
}

/// Capability surface the core depends on.
///
/// Every method returns the raw captured output; interpreting exit codes and text
/// is left to the caller (see [`crate::parse`]).  `Err` is reserved for failing to
/// run the command at all.
pub trait RenameBackend: Send + Sync {
        /// `opened`, optionally scoped to a changelist.
        fn opened(&self, changelist: &ChangelistId) -> Result<CommandOutput>;
        /// `where <path>`: depot / client / local mapping for one path.
        fn where_path(&self, depot_path: &str) -> Result<CommandOutput>;
        /// `changes` for pending changes of this workspace.
        fn pending_changes(&self, max: usize) -> Result<CommandOutput>;
        /// `move <from> <to>`.
        fn move_file(&self, from: &str, to: &str) -> Result<CommandOutput>;
        /// `submit`, scoped to a numbered changelist or described for `default`.
        fn submit(&self, changelist: &ChangelistId, description: Option<&str>) -> Result<CommandOutput>;
}

/// Issues commands on behalf of one identity.
#[derive(Debug)]
pub struct ConnectionContext<R = ProcessRunner> {
        identity: ConnectionIdentity,
        runner: R,
}

impl<R: CommandRunner> ConnectionContext<R> {
        pub fn new(identity: ConnectionIdentity, runner: R) -> Self {
                Self { identity, runner }
        }

        pub fn identity(&self) -> &ConnectionIdentity {
                &self.identity
        }

        fn global_args(&self, with_client: bool) -> Vec<String> {
                let mut base = vec![
                        "-p".to_string(),
                        self.identity.server.clone(),
                        "-u".to_string(),
                        self.identity.user.clone(),
                ];
                if with_client {
                        base.push("-c".to_string());
                        base.push(self.identity.workspace.clone());
                }
                base
        }

        /// Run an arbitrary command under this identity.
        pub fn execute<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
                let mut full = self.global_args(true);
                full.extend(args.iter().map(|a| a.as_ref().to_string()));
                tracing::debug!(args = ?full, "execute");
                self.runner.run(&full, None)
        }

        /// `info`; `NotConnected` carries the server's diagnostic on failure.
        #[tracing::instrument(skip(self), fields(server = %self.identity.server, user = %self.identity.user))]
        pub fn test_connection(&self) -> Result<()> {
                let out = self.execute(&["info"])?;
                if out.success() {
                        Ok(())
                } else {
                        Err(Error::NotConnected { diagnostic: out.diagnostic() })
                }
        }

        /// `login`, feeding the secret on stdin. The workspace flag is not passed.
        #[tracing::instrument(skip(self, secret), fields(server = %self.identity.server, user = %self.identity.user))]
        pub fn login(&mut self, secret: &str) -> Result<()> {
                let mut args = self.global_args(false);
                args.push("login".to_string());
                let out = self.runner.run(&args, Some(&format!("{}\n", secret)))?;
                if !out.success() {
                        return Err(Error::Login { diagnostic: out.diagnostic() });
                }
                self.identity.credential = Some(secret.to_string());
                Ok(())
        }

        /// Test the connection, logging in when the server asks for a password.
        ///
        /// `prompt` is only called when needed; returning `None` abandons the login.
        pub fn connect_with<F>(&mut self, prompt: F) -> Result<()>
        where
                F: FnOnce() -> Result<Option<String>>,
        {
                let diagnostic = match self.test_connection() {
                        Ok(()) => return Ok(()),
                        Err(Error::NotConnected { diagnostic }) => diagnostic,
                        Err(e) => return Err(e),
                };
                if !needs_password(&diagnostic) {
                        return Err(Error::NotConnected { diagnostic });
                }
                tracing::info!("server requires a password");
                let Some(secret) = prompt()? else {
                        return Err(Error::Login { diagnostic });
                };
                self.login(&secret)
        }
}

/// Does a server message mean "log in first"?
pub fn needs_password(message: &str) -> bool {
        const KEYS: [&str; 7] = [
                "password",
                "login",
                "logged out",
                "not yet logged in",
                "p4 login is required",
                "ticket",
                "perforce password",
        ];
        let lowered = message.to_lowercase();
        KEYS.iter().any(|k| lowered.contains(k))
}

impl<R: CommandRunner> RenameBackend for ConnectionContext<R> {
        fn opened(&self, changelist: &ChangelistId) -> Result<CommandOutput> {
                let mut args = vec!["opened".to_string()];
                args.extend(changelist.scope_args());
                self.execute(args.as_slice())
        }

        fn where_path(&self, depot_path: &str) -> Result<CommandOutput> {
                self.execute(&["where", depot_path])
        }

        fn pending_changes(&self, max: usize) -> Result<CommandOutput> {
                let max = max.to_string();
                self.execute(&["changes", "-c", self.identity.workspace.as_str(), "-s", "pending", "-m", max.as_str()])
        }

        fn move_file(&self, from: &str, to: &str) -> Result<CommandOutput> {
                self.execute(&["move", from, to])
        }

        fn submit(&self, changelist: &ChangelistId, description: Option<&str>) -> Result<CommandOutput> {
                let mut args = vec!["submit".to_string()];
                match (changelist, description) {
                        (ChangelistId::Numbered(_), _) => args.extend(changelist.scope_args()),
                        (ChangelistId::Default, Some(text)) => args.extend(["-d".to_string(), text.to_string()]),
                        (ChangelistId::Default, None) => {}
                }
                self.execute(args.as_slice())
        }
}
