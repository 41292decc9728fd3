use crate::commands::{
    connector, restore_into, write_commit, write_entry, write_repo, write_report, write_status,
};
use crate::config::{app_dir, Config};
use crate::editor;
use crate::error::{Result, XgitError};
use crate::github::types::Credential;
use crate::github::Connector;
use crate::session::{Session, SessionOptions};
use crate::workspace::{self, WorkspaceState};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  login <token>            sign in with a personal access token
  logout [--force]         sign out, dropping pending changes
  whoami                   show the signed-in user
  repos                    list your repositories
  use <owner/name> [br]    open a repository (optionally at a branch)
  ls [path]                list a directory
  cd <path>                change directory
  pwd                      show repository, branch and directory
  open <path>              open a file
  show                     print the open file's buffer
  edit [path]              edit a file in $EDITOR
  load <path> <file>       replace a file's content with a local file
  status                   list pending changes
  stage <path>... | --all  include changes in the next commit
  unstage <path>...        exclude changes from the next commit
  discard <path>           drop a pending change
  rebase <path>            take the remote version as the new base, keeping edits
  commit -m <msg> [path]...  commit given paths, or everything staged
  log [path]               recent commits
  exit [--force]           leave the shell";

#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub async fn run(config: &Config) -> Result<()> {
    let mut session = Session::new(connector(config), SessionOptions::from(config));
    let mut out = std::io::stdout();

    if let Some(token) = config.token() {
        match session.sign_in(Credential::new(token)).await {
            Ok(identity) => writeln!(out, "Signed in as {}", identity.login)?,
            Err(e) => writeln!(out, "Stored token rejected: {e}")?,
        }
    }
    if session.is_signed_in() {
        if let Some(state) = workspace::restore(&app_dir()) {
            if let Err(e) = restore_into(&mut session, &state).await {
                tracing::warn!("could not reopen {}: {e}", state.full_name());
            }
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(out, "{}", prompt(&session))?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(args) = shlex::split(&line) else {
            writeln!(out, "error: unbalanced quotes")?;
            continue;
        };
        if args.is_empty() {
            continue;
        }

        match execute(&mut session, config, &args, &mut out).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => writeln!(out, "error: {e}")?,
        }
    }

    save_location(&session);
    let dropped = session.dispose();
    if dropped > 0 {
        writeln!(out, "warning: discarded {dropped} uncommitted change(s)")?;
    }
    Ok(())
}

fn prompt<C: Connector>(session: &Session<C>) -> String {
    match (session.repository(), session.branch(), session.cwd()) {
        (Some(repo), Some(branch), Some(cwd)) => {
            let pending = session.pending_count();
            let marker = if pending > 0 {
                format!(" *{pending}")
            } else {
                String::new()
            };
            format!("{}@{branch}:/{cwd}{marker}> ", repo.full_name())
        }
        _ if session.is_signed_in() => "xgit> ".to_string(),
        _ => "xgit (signed out)> ".to_string(),
    }
}

fn save_location<C: Connector>(session: &Session<C>) {
    if let (Some(repo), Some(branch), Some(cwd)) =
        (session.repository(), session.branch(), session.cwd())
    {
        let state = WorkspaceState {
            owner: repo.owner.clone(),
            name: repo.name.clone(),
            branch: branch.to_string(),
            cwd: cwd.to_string(),
        };
        if let Err(e) = workspace::save(&app_dir(), &state) {
            tracing::warn!("could not save workspace: {e}");
        }
    }
}

/// Runs one shell command line against the session.
pub async fn execute<C, W>(
    session: &mut Session<C>,
    config: &Config,
    args: &[String],
    out: &mut W,
) -> Result<Flow>
where
    C: Connector,
    W: Write,
{
    let (command, rest) = match args.split_first() {
        Some((c, rest)) => (c.as_str(), rest),
        None => return Ok(Flow::Continue),
    };
    // Only commands that can drop pending changes take --force.
    let takes_force = matches!(command, "exit" | "quit" | "logout" | "use");
    let is_force = |a: &String| a == "--force" || a == "-f";
    let force = takes_force && rest.iter().any(|a| is_force(a));
    let rest: Vec<String> = if takes_force {
        rest.iter().filter(|a| !is_force(*a)).cloned().collect()
    } else {
        rest.to_vec()
    };
    let rest = rest.as_slice();

    match command {
        "help" | "?" => writeln!(out, "{HELP}")?,
        "exit" | "quit" => {
            let pending = session.pending_count();
            if pending > 0 && !force {
                writeln!(
                    out,
                    "{pending} uncommitted change(s) would be lost; use `exit --force` to leave anyway"
                )?;
            } else {
                return Ok(Flow::Exit);
            }
        }
        "login" => {
            let token = arg(rest, 0, "login <token>")?;
            let identity = session.sign_in(Credential::new(token)).await?;
            writeln!(out, "Signed in as {}", identity.login)?;
        }
        "logout" => {
            let pending = session.pending_count();
            if pending > 0 && !force {
                writeln!(
                    out,
                    "{pending} uncommitted change(s) would be lost; use `logout --force`"
                )?;
            } else {
                session.sign_out();
                writeln!(out, "Signed out")?;
            }
        }
        "whoami" => match session.identity() {
            Some(identity) => writeln!(out, "{}", identity.login)?,
            None => return Err(XgitError::NotSignedIn),
        },
        "repos" => {
            let repos = session.list_repositories().await?;
            if repos.is_empty() {
                writeln!(out, "No repositories to show")?;
            }
            for repo in &repos {
                write_repo(out, repo)?;
            }
        }
        "use" => {
            let full = arg(rest, 0, "use <owner/name> [branch]")?;
            let (owner, name) = workspace::parse_full_name(full)
                .ok_or_else(|| XgitError::Config(format!("expected owner/name, got {full}")))?;
            let pending = session.pending_count();
            if pending > 0 && !force {
                writeln!(
                    out,
                    "{pending} uncommitted change(s) would be lost; use `use {full} --force`"
                )?;
                return Ok(Flow::Continue);
            }
            let branch = rest.get(1).map(String::as_str);
            let repo = session.open_repository(owner, name, branch).await?;
            writeln!(
                out,
                "Opened {} ({})",
                repo.full_name(),
                session.branch().unwrap_or_default()
            )?;
        }
        "ls" => {
            let entries = session.list_directory(rest.first().map(String::as_str)).await?;
            for entry in &entries {
                write_entry(out, entry)?;
            }
        }
        "cd" => {
            let path = rest.first().map(String::as_str).unwrap_or("/");
            let cwd = session.navigate(path)?;
            writeln!(out, "/{cwd}")?;
        }
        "pwd" => match (session.repository(), session.branch(), session.cwd()) {
            (Some(repo), Some(branch), Some(cwd)) => {
                writeln!(out, "{} ({branch}) /{cwd}", repo.full_name())?
            }
            _ => return Err(XgitError::NoRepository),
        },
        "open" => {
            let path = arg(rest, 0, "open <path>")?;
            let view = session.open_file(path).await?;
            let state = if view.dirty { " (modified)" } else { "" };
            writeln!(out, "--- {}{state}", view.path)?;
            if view.remote_changed == Some(true) {
                writeln!(
                    out,
                    "warning: {} changed on the remote; committing will conflict until you `rebase` it",
                    view.path
                )?;
            }
            write_text(out, &view.content)?;
        }
        "show" => {
            let open = session
                .current_file()
                .ok_or_else(|| XgitError::FileNotOpen("(none)".to_string()))?;
            write_text(out, &open.buffer)?;
        }
        "edit" => {
            if let Some(path) = rest.first() {
                session.open_file(path).await?;
            }
            let open = session
                .current_file()
                .ok_or_else(|| XgitError::FileNotOpen("(none)".to_string()))?;
            let path = format!("/{}", open.path);
            let editor = editor::resolve_editor(config.editor.as_deref())?;
            let edited = editor::edit_text(&editor, &open.path, &open.buffer)?;
            let outcome = session.edit(&path, edited)?;
            writeln!(out, "{}: {outcome:?}", &path[1..])?;
        }
        "load" => {
            let path = arg(rest, 0, "load <path> <local-file>")?;
            let local = arg(rest, 1, "load <path> <local-file>")?;
            let content = std::fs::read_to_string(local)?;
            // reopening never overwrites a pending edit, so this is safe for dirty files
            session.open_file(path).await?;
            let outcome = session.edit(path, content)?;
            writeln!(out, "{path}: {outcome:?}")?;
        }
        "status" => write_status(out, &session.list_dirty())?,
        "stage" | "unstage" => {
            let staged = command == "stage";
            if staged && rest.iter().any(|a| a == "--all" || a == "-a") {
                let count = session.stage_all()?;
                writeln!(out, "Staged {count} change(s)")?;
                return Ok(Flow::Continue);
            }
            if rest.is_empty() {
                return Err(XgitError::Config(format!("usage: {command} <path>...")));
            }
            for path in rest {
                if !session.set_staged(path, staged)? {
                    writeln!(out, "{path}: no pending change")?;
                }
            }
        }
        "discard" => {
            let path = arg(rest, 0, "discard <path>")?;
            if session.discard(path)? {
                writeln!(out, "Discarded {path}")?;
            } else {
                writeln!(out, "{path}: no pending change")?;
            }
        }
        "rebase" => {
            let path = arg(rest, 0, "rebase <path>")?;
            let outcome = session.rebase(path).await?;
            writeln!(out, "{path}: {outcome:?}")?;
        }
        "commit" => {
            let (message, paths) = parse_commit_args(rest)?;
            let report = if paths.is_empty() {
                if session.list_dirty().iter().all(|r| !r.staged) {
                    writeln!(out, "Nothing staged")?;
                    return Ok(Flow::Continue);
                }
                session.commit_staged(&message).await?
            } else {
                session.commit(&paths, &message).await?
            };
            write_report(out, &report)?;
        }
        "log" => {
            let commits = session.history(rest.first().map(String::as_str)).await?;
            for commit in &commits {
                write_commit(out, commit)?;
            }
        }
        other => writeln!(out, "unknown command `{other}`; try `help`")?,
    }

    Ok(Flow::Continue)
}

fn arg<'a>(rest: &'a [String], idx: usize, usage: &str) -> Result<&'a str> {
    rest.get(idx)
        .map(String::as_str)
        .ok_or_else(|| XgitError::Config(format!("usage: {usage}")))
}

fn parse_commit_args(rest: &[String]) -> Result<(String, Vec<String>)> {
    let mut message = None;
    let mut paths = Vec::new();
    let mut iter = rest.iter();
    while let Some(a) = iter.next() {
        match a.as_str() {
            "-m" | "--message" => message = iter.next().cloned(),
            _ => paths.push(a.clone()),
        }
    }
    let message = message.ok_or(XgitError::EmptyMessage)?;
    Ok((message, paths))
}

fn write_text<W: Write>(out: &mut W, text: &str) -> Result<()> {
    write!(out, "{text}")?;
    if !text.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}
