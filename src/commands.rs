use crate::changes::{ChangeRecord, EditOutcome};
use crate::commit::{CommitReport, PathOutcome};
use crate::config::{self, app_dir, Config};
use crate::error::{Result, XgitError};
use crate::github::client::GitHubConnector;
use crate::github::types::{CommitSummary, Credential, DirEntry, EntryKind, RepoSummary};
use crate::github::Connector;
use crate::session::{resolve_path, Session, SessionOptions};
use crate::workspace::{self, WorkspaceState};
use crate::{shell, Command};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn connector(config: &Config) -> GitHubConnector {
    GitHubConnector {
        api_base: config.api_base.clone(),
        timeout: config.request_timeout(),
    }
}

/// Runs one subcommand. `Ok(false)` means it ran but something failed.
pub async fn run(command: Command, config: &Config) -> Result<bool> {
    match command {
        Command::Login { token } => login(config, token).await,
        Command::Logout => logout(),
        Command::Whoami => {
            let session = signed_in(config).await?;
            if let Some(identity) = session.identity() {
                println!("{}", identity.login);
            }
            Ok(true)
        }
        Command::Repos => {
            let mut session = signed_in(config).await?;
            let repos = session.list_repositories().await?;
            let mut out = std::io::stdout().lock();
            if repos.is_empty() {
                writeln!(out, "No repositories to show")?;
            }
            for repo in &repos {
                write_repo(&mut out, repo)?;
            }
            Ok(true)
        }
        Command::Use { repo, branch } => use_repo(config, &repo, branch.as_deref()).await,
        Command::Ls { path } => {
            let (mut session, _) = restored(config).await?;
            let entries = session.list_directory(path.as_deref()).await?;
            let mut out = std::io::stdout().lock();
            for entry in &entries {
                write_entry(&mut out, entry)?;
            }
            Ok(true)
        }
        Command::Cd { path } => {
            let (mut session, mut state) = restored(config).await?;
            let target = session.navigate(&path)?;
            // make sure it is a directory before remembering it
            session.list_directory(None).await?;
            state.cwd = target;
            workspace::save(&app_dir(), &state)?;
            println!("/{}", state.cwd);
            Ok(true)
        }
        Command::Cat { path } => {
            let (mut session, _) = restored(config).await?;
            let view = session.open_file(&path).await?;
            print!("{}", view.content);
            if !view.content.ends_with('\n') {
                println!();
            }
            Ok(true)
        }
        Command::Log { path } => {
            let (mut session, _) = restored(config).await?;
            let commits = session.history(path.as_deref()).await?;
            let mut out = std::io::stdout().lock();
            for commit in &commits {
                write_commit(&mut out, commit)?;
            }
            Ok(true)
        }
        Command::Push {
            message,
            prefix,
            files,
        } => push(config, &message, &prefix, &files).await,
        Command::Shell => {
            shell::run(config).await?;
            Ok(true)
        }
    }
}

async fn login(config: &Config, token: Option<String>) -> Result<bool> {
    let token = match token {
        Some(t) => t,
        None => read_token()?,
    };
    let credential = Credential::new(token);
    let mut session = Session::new(connector(config), SessionOptions::from(config));
    let identity = session.sign_in(credential.clone()).await?;
    let path = config::save_token(&app_dir(), credential.expose())?;
    println!("Signed in as {} (token saved to {})", identity.login, path.display());
    Ok(true)
}

fn logout() -> Result<bool> {
    let dir = app_dir();
    let removed = config::clear_token(&dir)?;
    workspace::clear(&dir);
    if removed {
        println!("Signed out");
    } else {
        println!("No stored token");
    }
    if std::env::var("GITHUB_TOKEN").is_ok() || std::env::var("XGIT_GITHUB_TOKEN").is_ok() {
        eprintln!("note: a token is still set in the environment");
    }
    Ok(true)
}

fn read_token() -> Result<String> {
    eprint!("GitHub personal access token: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let token = line.trim().to_string();
    if token.is_empty() {
        return Err(XgitError::InvalidCredential("no token given".to_string()));
    }
    Ok(token)
}

async fn use_repo(config: &Config, full: &str, branch: Option<&str>) -> Result<bool> {
    let (owner, name) = workspace::parse_full_name(full)
        .ok_or_else(|| XgitError::Config(format!("expected owner/name, got {full}")))?;
    let mut session = signed_in(config).await?;
    let repo = session.open_repository(owner, name, branch).await?;
    let state = WorkspaceState {
        owner: repo.owner.clone(),
        name: repo.name.clone(),
        branch: session.branch().unwrap_or(&repo.default_branch).to_string(),
        cwd: String::new(),
    };
    workspace::save(&app_dir(), &state)?;
    println!("Using {} ({})", state.full_name(), state.branch);
    Ok(true)
}

async fn push(config: &Config, message: &str, prefix: &str, files: &[PathBuf]) -> Result<bool> {
    if message.trim().is_empty() {
        return Err(XgitError::EmptyMessage);
    }
    let (mut session, state) = restored(config).await?;
    let base = resolve_path(&state.cwd, prefix);
    let mut ok = true;

    for file in files {
        let remote = resolve_path(&base, &remote_name(file));
        let content = std::fs::read_to_string(file)?;
        match session.open_file(&format!("/{remote}")).await {
            Ok(_) => {}
            Err(XgitError::NotFound(_)) => {
                eprintln!("skip {remote}: not in the repository (new files are not supported)");
                ok = false;
                continue;
            }
            Err(e) => return Err(e),
        }
        match session.edit(&format!("/{remote}"), content)? {
            EditOutcome::Unchanged | EditOutcome::Reverted => println!("  unchanged  {remote}"),
            EditOutcome::Created | EditOutcome::Updated => println!("  modified   {remote}"),
        }
    }

    if session.stage_all()? == 0 && session.list_dirty().is_empty() {
        println!("Nothing to commit");
        return Ok(ok);
    }

    let report = session.commit_staged(message).await?;
    write_report(&mut std::io::stdout().lock(), &report)?;
    Ok(ok && report.all_committed())
}

// Relative paths keep their layout; absolute ones only contribute a file name.
fn remote_name(file: &Path) -> String {
    if file.is_absolute() {
        return file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    file.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

async fn signed_in(config: &Config) -> Result<Session<GitHubConnector>> {
    let token = config.token().ok_or(XgitError::NotSignedIn)?;
    let mut session = Session::new(connector(config), SessionOptions::from(config));
    session.sign_in(Credential::new(token)).await?;
    Ok(session)
}

async fn restored(config: &Config) -> Result<(Session<GitHubConnector>, WorkspaceState)> {
    let state = workspace::restore(&app_dir()).ok_or(XgitError::NoRepository)?;
    let mut session = signed_in(config).await?;
    restore_into(&mut session, &state).await?;
    Ok((session, state))
}

pub async fn restore_into<C: Connector>(
    session: &mut Session<C>,
    state: &WorkspaceState,
) -> Result<()> {
    let branch = (!state.branch.is_empty()).then_some(state.branch.as_str());
    session
        .open_repository(&state.owner, &state.name, branch)
        .await?;
    if !state.cwd.is_empty() {
        session.navigate(&format!("/{}", state.cwd))?;
    }
    Ok(())
}

pub fn write_repo<W: Write>(out: &mut W, repo: &RepoSummary) -> Result<()> {
    let privacy = if repo.private { "🔒" } else { "🌐" };
    let mut meta = Vec::new();
    if let Some(language) = &repo.language {
        meta.push(format!("[{language}]"));
    }
    meta.push(format!("branch: {}", repo.default_branch));
    if let Some(pushed) = repo.pushed_at {
        meta.push(format!("updated: {}", pushed.format("%Y-%m-%d %H:%M")));
    }
    writeln!(out, "{privacy} {}  {}", repo.full_name(), meta.join("  "))?;
    if let Some(description) = repo.description.as_deref().filter(|d| !d.is_empty()) {
        writeln!(out, "    {description}")?;
    }
    if let Some(url) = &repo.html_url {
        writeln!(out, "    {url}")?;
    }
    Ok(())
}

pub fn write_entry<W: Write>(out: &mut W, entry: &DirEntry) -> Result<()> {
    match entry.kind {
        EntryKind::Dir => writeln!(out, "{}/", entry.name)?,
        EntryKind::Symlink => writeln!(out, "{}@", entry.name)?,
        EntryKind::Submodule => writeln!(out, "{} (submodule)", entry.name)?,
        EntryKind::File => writeln!(out, "{:<40} {:>8}", entry.name, entry.size)?,
    }
    Ok(())
}

pub fn write_commit<W: Write>(out: &mut W, commit: &CommitSummary) -> Result<()> {
    let date = commit
        .date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    writeln!(
        out,
        "{} {:<10} {:<16} {}",
        commit.short_sha(),
        date,
        commit.author,
        commit.message
    )?;
    Ok(())
}

pub fn write_status<W: Write>(out: &mut W, records: &[&ChangeRecord]) -> Result<()> {
    if records.is_empty() {
        writeln!(out, "No pending changes")?;
        return Ok(());
    }
    for record in records {
        let mark = if record.staged { "[x]" } else { "[ ]" };
        let (added, removed) = line_delta(&record.original_content, &record.current_content);
        writeln!(out, "{mark} {}  +{added} -{removed}", record.path)?;
    }
    Ok(())
}

pub fn write_report<W: Write>(out: &mut W, report: &CommitReport) -> Result<()> {
    for (path, outcome) in &report.results {
        match outcome {
            PathOutcome::Committed { new_hash } => {
                writeln!(out, "  committed  {path} ({})", new_hash.get(..7).unwrap_or(new_hash))?
            }
            PathOutcome::Failed(e) => {
                let hint = if e.is_retryable() { " (retryable)" } else { "" };
                writeln!(out, "  failed     {path}: {e}{hint}")?
            }
        }
    }
    Ok(())
}

// Counts lines present on only one side. Good enough for a status summary.
fn line_delta(before: &str, after: &str) -> (usize, usize) {
    use std::collections::HashMap;
    let mut counts: HashMap<&str, isize> = HashMap::new();
    for line in before.lines() {
        *counts.entry(line).or_default() -= 1;
    }
    for line in after.lines() {
        *counts.entry(line).or_default() += 1;
    }
    counts.values().fold((0, 0), |(added, removed), &n| {
        if n > 0 {
            (added + n as usize, removed)
        } else {
            (added, removed + n.unsigned_abs())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn render<F: FnOnce(&mut Vec<u8>) -> Result<()>>(f: F) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_line_delta() {
        assert_eq!(line_delta("a\nb\nc", "a\nB\nc\nd"), (2, 1));
        assert_eq!(line_delta("same", "same"), (0, 0));
    }

    #[test]
    fn test_remote_name() {
        assert_eq!(remote_name(Path::new("./docs/guide.md")), "docs/guide.md");
        assert_eq!(remote_name(Path::new("/tmp/x/README.md")), "README.md");
    }

    #[test]
    fn test_write_repo_marks_privacy() {
        let repo = RepoSummary {
            owner: "octo".to_string(),
            name: "demo".to_string(),
            description: Some("A demo".to_string()),
            private: true,
            language: Some("Rust".to_string()),
            default_branch: "main".to_string(),
            pushed_at: None,
            html_url: None,
        };
        let text = render(|out| write_repo(out, &repo));
        assert!(text.starts_with("🔒 octo/demo"));
        assert!(text.contains("[Rust]"));
        assert!(text.contains("    A demo"));
    }

    #[test]
    fn test_write_status() {
        let staged = ChangeRecord {
            path: "a.txt".to_string(),
            original_content: "one\n".to_string(),
            current_content: "one\ntwo\n".to_string(),
            base_hash: "h".to_string(),
            staged: true,
        };
        let text = render(|out| write_status(out, &[&staged]));
        assert_eq!(text, "[x] a.txt  +1 -0\n");
        let empty = render(|out| write_status(out, &[]));
        assert_eq!(empty, "No pending changes\n");
    }

    #[test]
    fn test_write_report_flags_retryable() {
        let report = CommitReport {
            results: vec![
                (
                    "a.txt".to_string(),
                    PathOutcome::Committed {
                        new_hash: "0123456789".to_string(),
                    },
                ),
                (
                    "b.txt".to_string(),
                    PathOutcome::Failed(XgitError::Conflict("b.txt moved".to_string())),
                ),
            ],
        };
        let text = render(|out| write_report(out, &report));
        assert!(text.contains("committed  a.txt (0123456)"));
        assert!(text.contains("failed     b.txt: conflict: b.txt moved (retryable)"));
    }

    #[tokio::test]
    async fn test_restore_into_opens_repo_and_cwd() {
        let remote = FakeRemote::new();
        remote.put("docs/guide.md", "guide");
        let mut session = Session::new(remote.clone(), SessionOptions::default());
        session.sign_in(Credential::new(TOKEN)).await.unwrap();
        let state = WorkspaceState {
            owner: OWNER.to_string(),
            name: REPO.to_string(),
            branch: String::new(),
            cwd: "docs".to_string(),
        };

        restore_into(&mut session, &state).await.unwrap();
        assert_eq!(session.branch(), Some(BRANCH));
        assert_eq!(session.cwd(), Some("docs"));
    }
}
