//! CLI interface to reconcile file-name case of opened Perforce files.
//! Targets come from the local workspace's on-disk case (or a naming rule) and are applied
//! with verified moves, falling back to a two-hop move through a temporary name.

pub mod batch;
pub mod cache;
pub mod connection;
pub mod error;
pub mod lister;
pub mod logging;
pub mod pairs;
pub mod parse;
pub mod resolve;
pub mod runner;
pub mod strategy;
pub mod verify;

use std::{
        fmt::Write as _,
        path::Path,
        sync::{Arc, Mutex},
        thread,
};

use batch::{BatchApplier, BatchEvent, CancelToken, DEFAULT_TAIL, Progress, RunSummary};
use clap::{Parser, Subcommand};
use connection::{ChangelistId, ConnectionContext, ConnectionIdentity, RenameBackend};
use error::{Error, Result};
use owo_colors::OwoColorize;
use pairs::{RenamePair, TargetStatus, apply_override, refresh_pairs, visible_indices};
use resolve::{CaseConvention, CaseResolver, ResolveMode, StandardNameRule};
use runner::{CommandRunner, ProcessRunner};

/// Description used when submitting the `default` changelist without `--description`.
pub const DEFAULT_SUBMIT_DESCRIPTION: &str = "Fix file name case";

/// Fix the letter case of opened files' names in a Perforce changelist.
///
/// `list` shows what would change; `apply` performs verified moves.
/// Type `q` + Enter during `apply` to stop after the current file.
#[derive(Parser, Debug)]
#[command(version, about, long_about)]
pub struct Args {
        #[command(flatten)]
        pub connection: ConnectionArgs,

        #[command(subcommand)]
        pub command: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConnectionArgs {
        /// Server address. Falls back to the cached identity, then `p4 set`.
        #[arg(short = 'p', long = "port", env = "P4PORT", global = true)]
        pub server: Option<String>,

        /// Server user.
        #[arg(short, long, env = "P4USER", global = true)]
        pub user: Option<String>,

        /// Workspace (client) name.
        #[arg(short = 'c', long = "client", env = "P4CLIENT", global = true)]
        pub workspace: Option<String>,

        /// Version-control command-line tool to run.
        #[arg(long, default_value = "p4", global = true)]
        pub p4_bin: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
        /// Test the connection, logging in if the server asks for a password.
        Login,

        /// List pending changelists of the workspace.
        Changes {
                /// Most changelists to show.
                #[arg(short, long, default_value_t = 50)]
                max: usize,
        },

        /// Show open files and their suggested names. Changes nothing.
        List(ListArgs),

        /// Rename open files to their target names.
        Apply(ApplyArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ListArgs {
        /// Changelist: `default` or a pending change number.
        #[arg(short = 'l', long, default_value = "default")]
        pub changelist: ChangelistId,

        /// Where target names come from.
        #[arg(short, long, value_enum, default_value_t)]
        pub mode: ResolveMode,

        /// Case convention for normalized names.
        #[arg(long = "case", value_enum, default_value_t)]
        pub convention: CaseConvention,

        /// Hide rows whose target equals the source.
        #[arg(long)]
        pub only_changed: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ApplyArgs {
        #[command(flatten)]
        pub list: ListArgs,

        /// Override a target, e.g. `--set '3=//depot/Game/Hero.uasset'` (indices as shown by `list`).
        #[arg(long = "set", value_name = "INDEX=PATH")]
        pub overrides: Vec<String>,

        /// Apply only these indices, in this order. Default: every shown row.
        #[arg(long, value_delimiter = ',')]
        pub only: Vec<usize>,

        /// Log lines kept for the final report.
        #[arg(long, default_value_t = DEFAULT_TAIL)]
        pub tail: usize,

        /// Submit the changelist if every rename succeeded.
        #[arg(long)]
        pub submit: bool,

        /// Submit description (used for the `default` changelist).
        #[arg(short, long, requires = "submit")]
        pub description: Option<String>,
}

/// Application code.  (main in lib.rs)
#[tracing::instrument(skip(args))]
pub fn app(args: &Args) -> Result<()> {
        let runner = ProcessRunner::new(&args.connection.p4_bin);
        let cache_path = cache::cache_path().ok();
        let given = ConnectionIdentity::new(
                args.connection.server.clone().unwrap_or_default(),
                args.connection.user.clone().unwrap_or_default(),
                args.connection.workspace.clone().unwrap_or_default(),
        );
        let identity = cache::resolve_identity(given, cache_path.as_deref(), &runner);
        let mut ctx = ConnectionContext::new(identity, runner);
        connect(&mut ctx, cache_path.as_deref())?;

        match &args.command {
                Command::Login => {
                        let id = ctx.identity();
                        println!("Connected to {} as {} ({})", id.server.blue(), id.user.green(), id.workspace);
                        Ok(())
                }
                Command::Changes { max } => {
                        println!("{}", "default".bold());
                        for change in lister::pending_changelists(&ctx, *max)? {
                                println!("{}", change.label());
                        }
                        Ok(())
                }
                Command::List(list) => {
                        let pairs = refresh_pairs(&ctx, &list.changelist, &resolver_for(list))?;
                        print!("{}", render_pairs(&pairs, &visible_indices(&pairs, list.only_changed), true));
                        Ok(())
                }
                Command::Apply(apply) => run_apply(ctx, apply),
        }
}

/// Connect (prompting for a password if needed) and remember the identity.
fn connect<R: CommandRunner>(ctx: &mut ConnectionContext<R>, cache_path: Option<&Path>) -> Result<()> {
        ctx.connect_with(|| {
                let secret = rpassword::prompt_password("Password: ")?;
                Ok((!secret.is_empty()).then_some(secret))
        })?;
        if let Some(path) = cache_path
                && let Err(e) = cache::save_identity(path, ctx.identity())
        {
                tracing::warn!("could not cache identity: {}", e);
        }
        Ok(())
}

fn resolver_for(list: &ListArgs) -> CaseResolver {
        CaseResolver::new(list.mode, StandardNameRule { convention: list.convention })
}

/// Refresh, apply overrides, run the batch on a worker, report, optionally submit.
fn run_apply(ctx: ConnectionContext, apply: &ApplyArgs) -> Result<()> {
        let changelist = apply.list.changelist;
        let mut pairs = refresh_pairs(&ctx, &changelist, &resolver_for(&apply.list))?;
        for spec in &apply.overrides {
                apply_override(&mut pairs, spec)?;
        }
        let selected = select_indices(&pairs, &apply.only, apply.list.only_changed)?;
        if selected.is_empty() {
                println!("Nothing to apply.");
                return Ok(());
        }
        print!("{}", render_pairs(&pairs, &selected, true));

        let cancel = CancelToken::new();
        watch_stdin_for_cancel(cancel.clone());
        let total = selected.len();
        let backend = Arc::new(Mutex::new(ctx));
        let (events, worker) =
                BatchApplier::new(apply.tail).spawn(Arc::clone(&backend), changelist, pairs, selected, cancel);

        let mut summary = None;
        for event in events {
                match event {
                        BatchEvent::Progress(progress) => println!("{}", render_progress(&progress, total)),
                        BatchEvent::Finished(done) => summary = Some(done),
                }
        }
        if worker.join().is_err() {
                tracing::error!("batch worker panicked");
        }
        let summary = summary.ok_or(Error::Worker)?;
        print!("{}", render_summary(&summary, true));

        if apply.submit {
                let backend = backend.lock().map_err(|_| Error::Worker)?;
                submit_after(&*backend, &changelist, apply.description.as_deref(), &summary)?;
        }
        Ok(())
}

/// Explicit indices (validated, caller's order) or every visible row.
pub fn select_indices(pairs: &[RenamePair], only: &[usize], only_changed: bool) -> Result<Vec<usize>> {
        if only.is_empty() {
                return Ok(visible_indices(pairs, only_changed));
        }
        if let Some(&index) = only.iter().find(|&&i| i >= pairs.len()) {
                return Err(Error::IndexOutOfRange { index, len: pairs.len() });
        }
        Ok(only.to_vec())
}

/// Submit when the batch ran to completion with at least one success and no failures.
///
/// Returns whether a submit happened.
pub fn submit_after<B: RenameBackend + ?Sized>(
        backend: &B,
        changelist: &ChangelistId,
        description: Option<&str>,
        summary: &RunSummary,
) -> Result<bool> {
        if summary.cancelled || summary.failed > 0 || summary.ok == 0 {
                println!("{}", "Not submitting: batch incomplete or nothing renamed.".yellow());
                return Ok(false);
        }
        let description = description.unwrap_or(DEFAULT_SUBMIT_DESCRIPTION);
        let out = backend.submit(changelist, Some(description))?;
        if !out.success() {
                return Err(Error::Submit { diagnostic: out.diagnostic() });
        }
        println!("{}", out.stdout.trim());
        Ok(true)
}

/// Stop the batch when the operator types `q`.
fn watch_stdin_for_cancel(cancel: CancelToken) {
        thread::spawn(move || {
                for line in std::io::stdin().lines() {
                        match line {
                                Ok(l) if l.trim().eq_ignore_ascii_case("q") => {
                                        tracing::info!("cancel requested");
                                        cancel.cancel();
                                        break;
                                }
                                Ok(_) => continue,
                                Err(_) => break,
                        }
                }
        });
}

/// Rows for `indices`: index, status, source, and target when it differs.
pub fn render_pairs(pairs: &[RenamePair], indices: &[usize], color: bool) -> String {
        let mut out = String::new();
        for &i in indices {
                let Some(pair) = pairs.get(i) else { continue };
                let status = pair.status();
                let tag = match status {
                        TargetStatus::Unchanged => "same",
                        TargetStatus::Auto => "auto",
                        TargetStatus::Manual => "manual",
                };
                let tag = match (color, status) {
                        (false, _) => format!("{:<6}", tag),
                        (true, TargetStatus::Unchanged) => format!("{:<6}", tag).dimmed().to_string(),
                        (true, TargetStatus::Auto) => format!("{:<6}", tag).green().to_string(),
                        (true, TargetStatus::Manual) => format!("{:<6}", tag).red().to_string(),
                };
                let fallback = match (color, pair.degraded) {
                        (_, false) => String::new(),
                        (false, true) => " (no local mapping)".to_string(),
                        (true, true) => " (no local mapping)".yellow().to_string(),
                };
                let _ = writeln!(out, "{:<4}{} {}{}", i, tag, pair.source(), fallback);
                if status != TargetStatus::Unchanged {
                        let _ = writeln!(out, "{:>10} {}", "~~>", pair.current_target());
                }
        }
        out
}

pub fn render_progress(progress: &Progress, total: usize) -> String {
        format!(
                "[{}/{}] ok {} / fail {} / skip {}  {}",
                progress.processed,
                total,
                progress.ok.green(),
                progress.failed.red(),
                progress.skipped.dimmed(),
                progress.message
        )
}

/// Counts line, cancellation note, then the retained log tail.
pub fn render_summary(summary: &RunSummary, color: bool) -> String {
        let mut out = String::new();
        let counts = format!("ok {}, failed {}, skipped {}", summary.ok, summary.failed, summary.skipped);
        let counts = match (color, summary.failed) {
                (true, 0) => counts.green().to_string(),
                (true, _) => counts.red().to_string(),
                (false, _) => counts,
        };
        let _ = writeln!(out, "{}", counts);
        if summary.cancelled {
                let _ = writeln!(out, "stopped after {} item(s)", summary.processed());
        }
        if !summary.log.is_empty() {
                out.push('\n');
                for line in &summary.log {
                        let _ = writeln!(out, "{}", line);
                }
        }
        out
}

/// /////////////////////////////////////////////////////////////////////////////////////// //
/// /////////////                 TESTS - lib.rs                             ////////////// //
/// /////////////////////////////////////////////////////////////////////////////////////// //
#[cfg(test)]
pub mod test_pub_utilities {
        use std::{
                collections::VecDeque,
                sync::Mutex,
        };

        use crate::{
                connection::{ChangelistId, RenameBackend},
                runner::{CommandOutput, CommandRunner},
        };

        pub type Result<T> = core::result::Result<T, Error>;
        pub type Error = Box<dyn std::error::Error>;

        /// In-memory depot standing in for a server.
        ///
        /// Models the open-file table of one changelist and renders it the way the
        /// command-line tool would, so parsers are exercised too.
        ///
        /// Scriptable behaviour:
        /// - `coalescing_case`: a case-only move is accepted but changes nothing
        /// - `with_move_results`: per-call accept/refuse, consumed in order
        /// - `with_rewrite_next_move`: next accepted move lands on the given path instead
        /// - `with_move_fault_on`: moving this path fails to run at all
        /// - `failing_queries`: `opened`/`where`/`changes` exit non-zero with the message
        #[derive(Debug, Default)]
        pub struct FakeDepot {
                state: Mutex<FakeState>,
        }

        #[derive(Debug, Default)]
        struct FakeState {
                open: Vec<(String, String)>,
                changes: Vec<(u64, String)>,
                wheres: Vec<(String, String, String)>,
                query_failure: Option<String>,
                coalesce_case: bool,
                move_results: VecDeque<bool>,
                rewrite_next_move: Option<String>,
                fault_on: Option<String>,
                moves: Vec<(String, String)>,
                move_attempts: usize,
                opened_scopes: Vec<ChangelistId>,
                where_calls: usize,
                submits: Vec<(ChangelistId, Option<String>)>,
        }

        impl FakeDepot {
                pub fn new() -> Self {
                        Self::default()
                }

                fn edit(mut self, f: impl FnOnce(&mut FakeState)) -> Self {
                        f(self.state.get_mut().unwrap());
                        self
                }

                pub fn with_open(self, path: &str, action: &str) -> Self {
                        self.edit(|s| s.open.push((path.to_string(), action.to_string())))
                }

                pub fn with_change(self, id: u64, description: &str) -> Self {
                        self.edit(|s| s.changes.push((id, description.to_string())))
                }

                pub fn with_where(self, depot: &str, client: &str, local: &str) -> Self {
                        self.edit(|s| s.wheres.push((depot.to_string(), client.to_string(), local.to_string())))
                }

                pub fn failing_queries(self, message: &str) -> Self {
                        self.edit(|s| s.query_failure = Some(message.to_string()))
                }

                pub fn coalescing_case(self) -> Self {
                        self.edit(|s| s.coalesce_case = true)
                }

                pub fn with_move_results(self, results: impl IntoIterator<Item = bool>) -> Self {
                        self.edit(|s| s.move_results.extend(results))
                }

                pub fn with_rewrite_next_move(self, path: &str) -> Self {
                        self.edit(|s| s.rewrite_next_move = Some(path.to_string()))
                }

                pub fn with_move_fault_on(self, path: &str) -> Self {
                        self.edit(|s| s.fault_on = Some(path.to_string()))
                }

                /// Accepted moves, as requested.
                pub fn moves(&self) -> Vec<(String, String)> {
                        self.state.lock().unwrap().moves.clone()
                }

                /// Every `move` call, accepted or not.
                pub fn move_attempts(&self) -> usize {
                        self.state.lock().unwrap().move_attempts
                }

                pub fn opened_scopes(&self) -> Vec<ChangelistId> {
                        self.state.lock().unwrap().opened_scopes.clone()
                }

                pub fn where_calls(&self) -> usize {
                        self.state.lock().unwrap().where_calls
                }

                pub fn submits(&self) -> Vec<(ChangelistId, Option<String>)> {
                        self.state.lock().unwrap().submits.clone()
                }

                pub fn is_open_exact(&self, path: &str) -> bool {
                        self.state.lock().unwrap().open.iter().any(|(p, _)| p == path)
                }

                /// Rename behind the strategy's back (no call recorded).
                pub fn move_file_now(&self, from: &str, to: &str) {
                        let mut state = self.state.lock().unwrap();
                        if let Some(entry) = state.open.iter_mut().find(|(p, _)| p == from) {
                                entry.0 = to.to_string();
                        }
                }
        }

        fn exit(code: i32, stdout: String, stderr: &str) -> CommandOutput {
                CommandOutput { code, stdout, stderr: stderr.to_string() }
        }

        impl RenameBackend for FakeDepot {
                fn opened(&self, changelist: &ChangelistId) -> crate::error::Result<CommandOutput> {
                        let mut state = self.state.lock().unwrap();
                        state.opened_scopes.push(*changelist);
                        if let Some(msg) = &state.query_failure {
                                return Ok(exit(1, String::new(), msg));
                        }
                        let change = match changelist {
                                ChangelistId::Default => "default change".to_string(),
                                ChangelistId::Numbered(n) => format!("change {}", n),
                        };
                        let stdout = state
                                .open
                                .iter()
                                .map(|(p, a)| format!("{}#1 - {} {} (text)\n", p, a, change))
                                .collect();
                        Ok(exit(0, stdout, ""))
                }

                fn where_path(&self, depot_path: &str) -> crate::error::Result<CommandOutput> {
                        let mut state = self.state.lock().unwrap();
                        state.where_calls += 1;
                        if let Some(msg) = &state.query_failure {
                                return Ok(exit(1, String::new(), msg));
                        }
                        match state.wheres.iter().find(|(d, _, _)| d == depot_path) {
                                Some((d, c, l)) => Ok(exit(0, format!("{} {} {}\n", d, c, l), "")),
                                None => Ok(exit(0, String::new(), &format!("{} - file(s) not in client view.", depot_path))),
                        }
                }

                fn pending_changes(&self, _max: usize) -> crate::error::Result<CommandOutput> {
                        let state = self.state.lock().unwrap();
                        if let Some(msg) = &state.query_failure {
                                return Ok(exit(1, String::new(), msg));
                        }
                        let stdout = state
                                .changes
                                .iter()
                                .map(|(id, d)| format!("Change {} on 2025/08/10 by alice@alice_ws *pending* '{}'\n", id, d))
                                .collect();
                        Ok(exit(0, stdout, ""))
                }

                fn move_file(&self, from: &str, to: &str) -> crate::error::Result<CommandOutput> {
                        let mut state = self.state.lock().unwrap();
                        state.move_attempts += 1;
                        if state.fault_on.as_deref() == Some(from) {
                                return Err(std::io::Error::other("broken pipe").into());
                        }
                        if state.move_results.pop_front() == Some(false) {
                                return Ok(exit(1, String::new(), "move refused"));
                        }
                        let Some(index) = state.open.iter().position(|(p, _)| p == from) else {
                                return Ok(exit(1, String::new(), &format!("{} - file(s) not opened.", from)));
                        };
                        let clash = state
                                .open
                                .iter()
                                .enumerate()
                                .any(|(i, (p, _))| i != index && p.to_lowercase() == to.to_lowercase());
                        if clash {
                                return Ok(exit(1, String::new(), &format!("{} - already opened.", to)));
                        }
                        state.moves.push((from.to_string(), to.to_string()));
                        let landed = match state.rewrite_next_move.take() {
                                Some(rewrite) => rewrite,
                                None if state.coalesce_case && from.to_lowercase() == to.to_lowercase() => from.to_string(),
                                None => to.to_string(),
                        };
                        state.open[index] = (landed, "move/add".to_string());
                        Ok(exit(0, format!("{} moved from {}\n", to, from), ""))
                }

                fn submit(&self, changelist: &ChangelistId, description: Option<&str>) -> crate::error::Result<CommandOutput> {
                        let mut state = self.state.lock().unwrap();
                        state.submits.push((*changelist, description.map(str::to_string)));
                        if let Some(msg) = &state.query_failure {
                                return Ok(exit(1, String::new(), msg));
                        }
                        Ok(exit(0, "Change 12 submitted.\n".to_string(), ""))
                }
        }

        /// Replays canned outputs and records each call's arguments and stdin.
        #[derive(Debug, Default)]
        pub struct ScriptedRunner {
                responses: Mutex<VecDeque<CommandOutput>>,
                fallback: CommandOutput,
                calls: Mutex<Vec<(Vec<String>, Option<String>)>>,
        }

        impl ScriptedRunner {
                pub fn always(output: CommandOutput) -> Self {
                        Self { fallback: output, ..Self::default() }
                }

                /// Outputs in order, then success with no output.
                pub fn sequence(outputs: Vec<CommandOutput>) -> Self {
                        Self { responses: Mutex::new(outputs.into()), ..Self::default() }
                }

                pub fn calls(&self) -> Vec<(Vec<String>, Option<String>)> {
                        self.calls.lock().unwrap().clone()
                }
        }

        impl CommandRunner for ScriptedRunner {
                fn run(&self, args: &[String], stdin: Option<&str>) -> crate::error::Result<CommandOutput> {
                        self.calls.lock().unwrap().push((args.to_vec(), stdin.map(str::to_string)));
                        let next = self.responses.lock().unwrap().pop_front();
                        Ok(next.unwrap_or_else(|| self.fallback.clone()))
                }
        }
}
