use crate::changes::{ChangeRecord, ChangeSet, EditOutcome};
use crate::commit::{self, CommitReport, PathOutcome};
use crate::config::Config;
use crate::error::{Result, XgitError};
use crate::github::types::{CommitSummary, Credential, DirEntry, Identity, RepoRef, RepoSummary};
use crate::github::{Connector, ContentApi};

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub max_repositories: usize,
    pub history_limit: usize,
    pub check_remote_on_reopen: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_repositories: config.max_repositories,
            history_limit: config.history_limit,
            check_remote_on_reopen: config.check_remote_on_reopen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenFile {
    pub path: String,
    /// Remote content at open time, or what was last committed from here.
    pub baseline: String,
    pub baseline_hash: String,
    pub buffer: String,
}

#[derive(Debug, Clone)]
pub struct FileView {
    pub path: String,
    pub content: String,
    pub dirty: bool,
    /// Set when a dirty file was reopened and the remote was re-checked.
    pub remote_changed: Option<bool>,
}

pub struct RepoContext {
    pub repo: RepoRef,
    pub branch: String,
    pub cwd: String,
    pub open_file: Option<OpenFile>,
    pub changes: ChangeSet,
    opened_by: String,
}

impl RepoContext {
    fn locate(&self, input: &str) -> String {
        resolve_path(&self.cwd, input)
    }
}

struct Auth<A> {
    identity: Identity,
    api: A,
}

/// Signed-in identity, selected repository and pending edits.
///
/// Created empty with [`Session::new`]; everything remote goes through the
/// connector's API handle, which only exists while signed in.
pub struct Session<C: Connector> {
    connector: C,
    options: SessionOptions,
    auth: Option<Auth<C::Api>>,
    context: Option<RepoContext>,
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, options: SessionOptions) -> Self {
        Self {
            connector,
            options,
            auth: None,
            context: None,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.auth.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.auth.as_ref().map(|a| &a.identity)
    }

    pub fn repository(&self) -> Option<&RepoRef> {
        self.context.as_ref().map(|c| &c.repo)
    }

    pub fn branch(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.branch.as_str())
    }

    pub fn cwd(&self) -> Option<&str> {
        self.context.as_ref().map(|c| c.cwd.as_str())
    }

    pub fn current_file(&self) -> Option<&OpenFile> {
        self.context.as_ref().and_then(|c| c.open_file.as_ref())
    }

    pub fn pending_count(&self) -> usize {
        self.context.as_ref().map_or(0, |c| c.changes.len())
    }

    pub async fn sign_in(&mut self, credential: Credential) -> Result<Identity> {
        self.auth = None;
        let api = self
            .connector
            .connect(&credential)
            .map_err(|e| XgitError::InvalidCredential(e.to_string()))?;

        let identity = api
            .fetch_user()
            .await
            .map_err(|e| XgitError::InvalidCredential(e.to_string()))?;

        // Pending edits survive re-authentication only for the same account.
        if let Some(ctx) = &self.context {
            if ctx.opened_by != identity.login {
                let dropped = self.discard_context();
                if dropped > 0 {
                    tracing::warn!("signed in as another user, discarded {dropped} pending change(s)");
                }
            }
        }

        tracing::info!("signed in as {}", identity.login);
        self.auth = Some(Auth {
            identity: identity.clone(),
            api,
        });
        Ok(identity)
    }

    /// Drops the credential and every pending change. Returns how many changes
    /// were discarded.
    pub fn sign_out(&mut self) -> usize {
        let dropped = self.discard_context();
        if dropped > 0 {
            tracing::warn!("sign-out discarded {dropped} uncommitted change(s)");
        }
        if let Some(auth) = self.auth.take() {
            tracing::info!("signed out {}", auth.identity.login);
        }
        dropped
    }

    pub fn dispose(mut self) -> usize {
        self.sign_out()
    }

    pub async fn list_repositories(&mut self) -> Result<Vec<RepoSummary>> {
        let limit = self.options.max_repositories;
        let auth = self.auth.as_ref().ok_or(XgitError::NotSignedIn)?;
        let result = auth.api.list_repositories(limit).await;
        self.settle(result)
    }

    pub async fn open_repository(
        &mut self,
        owner: &str,
        name: &str,
        branch: Option<&str>,
    ) -> Result<RepoRef> {
        let auth = self.auth.as_ref().ok_or(XgitError::NotSignedIn)?;
        let login = auth.identity.login.clone();
        let result = auth.api.get_repository(owner, name).await;
        let summary = self.settle(result)?;

        let dropped = self.discard_context();
        if dropped > 0 {
            tracing::warn!("switching repository discarded {dropped} pending change(s)");
        }

        let repo = summary.to_ref();
        let branch = branch
            .map(str::to_string)
            .unwrap_or_else(|| repo.default_branch.clone());
        tracing::info!("opened {} at {branch}", repo.full_name());

        self.context = Some(RepoContext {
            repo: repo.clone(),
            branch,
            cwd: String::new(),
            open_file: None,
            changes: ChangeSet::new(),
            opened_by: login,
        });
        Ok(repo)
    }

    pub fn navigate(&mut self, path: &str) -> Result<String> {
        let ctx = self.context.as_mut().ok_or(XgitError::NoRepository)?;
        ctx.cwd = resolve_path(&ctx.cwd, path);
        Ok(ctx.cwd.clone())
    }

    /// Lists `path` (relative to the current directory) or the current
    /// directory itself.
    pub async fn list_directory(&mut self, path: Option<&str>) -> Result<Vec<DirEntry>> {
        let (api, ctx) = self.parts()?;
        let dir = match path {
            Some(p) => resolve_path(&ctx.cwd, p),
            None => ctx.cwd.clone(),
        };
        let result = api.list_directory(&ctx.repo, &dir, &ctx.branch).await;
        self.settle(result)
    }

    pub async fn open_file(&mut self, path: &str) -> Result<FileView> {
        let check_remote = self.options.check_remote_on_reopen;
        let (api, ctx) = self.parts()?;
        let path = ctx.locate(path);

        if let Some(record) = ctx.changes.get(&path) {
            let content = record.current_content.clone();
            let baseline = record.original_content.clone();
            let base_hash = record.base_hash.clone();

            let mut rejected = false;
            let remote_changed = if check_remote {
                match api.get_file_content(&ctx.repo, &path, &ctx.branch).await {
                    Ok(latest) => Some(latest.hash != base_hash),
                    Err(XgitError::Unauthorized) => {
                        rejected = true;
                        None
                    }
                    Err(e) => {
                        tracing::warn!("could not re-check {path} on the remote: {e}");
                        None
                    }
                }
            } else {
                None
            };
            if remote_changed == Some(true) {
                tracing::warn!("{path} changed on the remote since it was opened");
            }

            ctx.open_file = Some(OpenFile {
                path: path.clone(),
                baseline,
                baseline_hash: base_hash,
                buffer: content.clone(),
            });
            let view = FileView {
                path,
                content,
                dirty: true,
                remote_changed,
            };
            // The local edit is still shown, but the session no longer holds a
            // usable credential.
            if rejected {
                self.drop_auth();
            }
            return Ok(view);
        }

        let result = match api.get_file_content(&ctx.repo, &path, &ctx.branch).await {
            Ok(file) => {
                ctx.open_file = Some(OpenFile {
                    path: path.clone(),
                    baseline: file.content.clone(),
                    baseline_hash: file.hash,
                    buffer: file.content.clone(),
                });
                Ok(FileView {
                    path,
                    content: file.content,
                    dirty: false,
                    remote_changed: None,
                })
            }
            Err(e) => {
                if matches!(e, XgitError::NotFound(_)) {
                    ctx.open_file = None;
                }
                Err(e)
            }
        };
        self.settle(result)
    }

    pub fn edit(&mut self, path: &str, new_content: String) -> Result<EditOutcome> {
        let ctx = self.context.as_mut().ok_or(XgitError::NoRepository)?;
        let path = ctx.locate(path);

        let outcome = if ctx.changes.contains(&path) {
            ctx.changes.record_edit(&path, "", "", new_content.clone())
        } else {
            match &ctx.open_file {
                Some(open) if open.path == path => ctx.changes.record_edit(
                    &path,
                    &open.baseline,
                    &open.baseline_hash,
                    new_content.clone(),
                ),
                _ => return Err(XgitError::FileNotOpen(path)),
            }
        };

        if let Some(open) = ctx.open_file.as_mut().filter(|o| o.path == path) {
            open.buffer = new_content;
        }
        tracing::debug!("edit {path}: {outcome:?}");
        Ok(outcome)
    }

    pub fn set_staged(&mut self, path: &str, staged: bool) -> Result<bool> {
        let ctx = self.context.as_mut().ok_or(XgitError::NoRepository)?;
        let path = ctx.locate(path);
        Ok(ctx.changes.set_staged(&path, staged))
    }

    pub fn stage_all(&mut self) -> Result<usize> {
        let ctx = self.context.as_mut().ok_or(XgitError::NoRepository)?;
        Ok(ctx.changes.stage_all())
    }

    pub fn discard(&mut self, path: &str) -> Result<bool> {
        let ctx = self.context.as_mut().ok_or(XgitError::NoRepository)?;
        let path = ctx.locate(path);
        let removed = ctx.changes.discard(&path).is_some();
        if let Some(open) = ctx.open_file.as_mut().filter(|o| o.path == path) {
            open.buffer = open.baseline.clone();
        }
        Ok(removed)
    }

    pub fn list_dirty(&self) -> Vec<&ChangeRecord> {
        self.context
            .as_ref()
            .map(|c| c.changes.list_dirty())
            .unwrap_or_default()
    }

    /// Re-reads the remote version of a dirty file and makes it the new
    /// baseline, keeping the local edit. This is how a conflicted record
    /// becomes committable again.
    pub async fn rebase(&mut self, path: &str) -> Result<EditOutcome> {
        let (api, ctx) = self.parts()?;
        let path = ctx.locate(path);
        if !ctx.changes.contains(&path) {
            return Err(XgitError::NotDirty(path));
        }

        let result = match api.get_file_content(&ctx.repo, &path, &ctx.branch).await {
            Ok(latest) => {
                let outcome =
                    ctx.changes
                        .rebase(&path, latest.content.clone(), latest.hash.clone());
                if let Some(open) = ctx.open_file.as_mut().filter(|o| o.path == path) {
                    open.baseline = latest.content;
                    open.baseline_hash = latest.hash;
                }
                tracing::info!("rebased {path}: {outcome:?}");
                Ok(outcome)
            }
            Err(e) => Err(e),
        };
        self.settle(result)
    }

    pub async fn commit(&mut self, paths: &[String], message: &str) -> Result<CommitReport> {
        let (api, ctx) = self.parts()?;
        let resolved: Vec<String> = paths.iter().map(|p| ctx.locate(p)).collect();

        let report = commit::commit_paths(
            api,
            &ctx.repo,
            &ctx.branch,
            &mut ctx.changes,
            &resolved,
            message,
        )
        .await?;

        for (path, outcome) in &report.results {
            if let PathOutcome::Committed { new_hash } = outcome {
                if let Some(open) = ctx.open_file.as_mut().filter(|o| &o.path == path) {
                    open.baseline = open.buffer.clone();
                    open.baseline_hash = new_hash.clone();
                }
            }
        }

        if report
            .failures()
            .any(|(_, e)| matches!(e, XgitError::Unauthorized))
        {
            self.drop_auth();
        }
        Ok(report)
    }

    pub async fn commit_staged(&mut self, message: &str) -> Result<CommitReport> {
        let staged = self
            .context
            .as_ref()
            .ok_or(XgitError::NoRepository)?
            .changes
            .staged_paths();
        self.commit(&staged, message).await
    }

    pub async fn history(&mut self, path: Option<&str>) -> Result<Vec<CommitSummary>> {
        let limit = self.options.history_limit;
        let (api, ctx) = self.parts()?;
        let path = path.map(|p| ctx.locate(p)).filter(|p| !p.is_empty());
        let result = api
            .list_commits(&ctx.repo, &ctx.branch, path.as_deref(), limit)
            .await;
        self.settle(result)
    }

    fn parts(&mut self) -> Result<(&C::Api, &mut RepoContext)> {
        let auth = self.auth.as_ref().ok_or(XgitError::NotSignedIn)?;
        let ctx = self.context.as_mut().ok_or(XgitError::NoRepository)?;
        Ok((&auth.api, ctx))
    }

    // A rejected credential signs the session out of the remote but keeps
    // pending edits, so signing in again with the same account can commit them.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(XgitError::Unauthorized)) {
            self.drop_auth();
        }
        result
    }

    fn drop_auth(&mut self) {
        if let Some(auth) = self.auth.take() {
            tracing::warn!("credential for {} was rejected, signed out", auth.identity.login);
        }
    }

    fn discard_context(&mut self) -> usize {
        self.context
            .take()
            .map_or(0, |mut ctx| ctx.changes.clear())
    }
}

/// Resolves `input` against `cwd` into a repository-relative path. A leading
/// `/` starts from the root; `..` never climbs above it.
pub fn resolve_path(cwd: &str, input: &str) -> String {
    let mut parts: Vec<&str> = if input.starts_with('/') {
        Vec::new()
    } else {
        cwd.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in input.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}
