use crate::error::{Result, XgitError};
use crate::github::types::{
    sort_entries, CommitSummary, Credential, DirEntry, EntryKind, FileContent, FileWrite,
    Identity, PutOutcome, RepoRef, RepoSummary, FALLBACK_BRANCH,
};
use crate::github::{Connector, ContentApi};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use octocrab::models::repos::Content;
use octocrab::Octocrab;
use std::future::Future;
use std::time::Duration;

const PER_PAGE: usize = 100;

#[derive(Clone)]
pub struct GitHubClient {
    octo: Octocrab,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(token: &str, api_base: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if let Some(base) = api_base {
            builder = builder
                .base_uri(base)
                .map_err(|e| XgitError::Config(format!("invalid api_base {base}: {e}")))?;
        }
        let octo = builder
            .build()
            .map_err(|e| XgitError::GitHub(e.to_string()))?;

        Ok(Self { octo, timeout })
    }

    async fn timed<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = octocrab::Result<T>> + Send,
    {
        with_timeout(self.timeout, what, fut).await
    }
}

async fn with_timeout<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = octocrab::Result<T>> + Send,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|e| classify(e, what)),
        Err(_) => Err(XgitError::Network(format!(
            "{what}: request timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

#[async_trait]
impl ContentApi for GitHubClient {
    async fn fetch_user(&self) -> Result<Identity> {
        let user = self.timed("user", self.octo.current().user()).await?;
        Ok(Identity { login: user.login })
    }

    async fn list_repositories(&self, limit: usize) -> Result<Vec<RepoSummary>> {
        let mut repos = Vec::new();
        let mut page = 1u8;

        while repos.len() < limit {
            let result = self
                .timed(
                    "repositories",
                    self.octo
                        .current()
                        .list_repos_for_authenticated_user()
                        .sort("updated")
                        .affiliation("owner,collaborator,organization_member")
                        .visibility("all")
                        .per_page(PER_PAGE as u8)
                        .page(page)
                        .send(),
                )
                .await?;

            if result.items.is_empty() {
                break;
            }

            for repo in result.items {
                repos.push(summary_from(repo));
                if repos.len() >= limit {
                    break;
                }
            }

            match page.checked_add(1) {
                Some(next) if result.next.is_some() => page = next,
                _ => break,
            }
        }

        Ok(repos)
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<RepoSummary> {
        let what = format!("{owner}/{name}");
        let repo = self.timed(&what, self.octo.repos(owner, name).get()).await?;
        let mut summary = summary_from(repo);
        if summary.owner.is_empty() {
            summary.owner = owner.to_string();
        }
        Ok(summary)
    }

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<DirEntry>> {
        let handler = self.octo.repos(&repo.owner, &repo.name);
        let mut request = handler.get_content().r#ref(git_ref);
        if !path.is_empty() {
            request = request.path(path);
        }
        let what = display_path(repo, path);
        let items = self.timed(&what, request.send()).await?;

        let mut entries: Vec<DirEntry> = items
            .items
            .into_iter()
            .map(|item| DirEntry {
                kind: EntryKind::from_api(&item.r#type),
                size: u64::try_from(item.size).unwrap_or(0),
                name: item.name,
                path: item.path,
            })
            .collect();
        ensure_directory(path, &entries)?;
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent> {
        let what = display_path(repo, path);
        let handler = self.octo.repos(&repo.owner, &repo.name);
        let items = self
            .timed(&what, handler.get_content().path(path).r#ref(git_ref).send())
            .await?;

        // A directory comes back as a listing, a file as a single item.
        let item = match items.items.as_slice() {
            [item] if item.r#type == "file" => item,
            _ => return Err(XgitError::Decode(format!("{path} is not a file"))),
        };

        Ok(FileContent {
            content: decode_content(item)?,
            hash: item.sha.clone(),
        })
    }

    async fn put_file_content(&self, repo: &RepoRef, write: &FileWrite<'_>) -> Result<PutOutcome> {
        let what = display_path(repo, write.path);
        let handler = self.octo.repos(&repo.owner, &repo.name);
        let update = self
            .timed(
                &what,
                handler
                    .update_file(write.path, write.message, write.content, write.expected_hash)
                    .branch(write.branch)
                    .send(),
            )
            .await?;

        Ok(PutOutcome {
            new_hash: update.content.sha,
        })
    }

    async fn list_commits(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>> {
        let mut commits = Vec::new();
        let mut page = 1u32;
        let per_page = limit.clamp(1, PER_PAGE) as u8;

        while commits.len() < limit {
            let handler = self.octo.repos(&repo.owner, &repo.name);
            let mut request = handler
                .list_commits()
                .sha(git_ref)
                .per_page(per_page)
                .page(page);
            if let Some(p) = path {
                request = request.path(p);
            }
            let result = self.timed(&repo.full_name(), request.send()).await?;

            if result.items.is_empty() {
                break;
            }

            for c in &result.items {
                let message = c.commit.message.lines().next().unwrap_or("").to_string();
                let author = c
                    .commit
                    .author
                    .as_ref()
                    .map(|a| a.name.clone())
                    .unwrap_or_default();
                let date: Option<DateTime<Utc>> = c
                    .commit
                    .author
                    .as_ref()
                    .and_then(|a| a.date.as_ref())
                    .cloned();

                commits.push(CommitSummary {
                    sha: c.sha.clone(),
                    message,
                    author,
                    date,
                });
                if commits.len() >= limit {
                    break;
                }
            }

            if result.next.is_none() {
                break;
            }
            page += 1;
        }

        Ok(commits)
    }
}

#[derive(Clone, Debug)]
pub struct GitHubConnector {
    pub api_base: Option<String>,
    pub timeout: Duration,
}

impl Connector for GitHubConnector {
    type Api = GitHubClient;

    fn connect(&self, credential: &Credential) -> Result<GitHubClient> {
        if credential.is_empty() {
            return Err(XgitError::InvalidCredential("empty token".to_string()));
        }
        GitHubClient::new(credential.expose(), self.api_base.as_deref(), self.timeout)
    }
}

fn summary_from(repo: octocrab::models::Repository) -> RepoSummary {
    let owner = repo
        .owner
        .as_ref()
        .map(|o| o.login.clone())
        .unwrap_or_default();
    let language = repo
        .language
        .as_ref()
        .and_then(|v| v.as_str())
        .map(str::to_string);

    RepoSummary {
        owner,
        name: repo.name,
        description: repo.description,
        private: repo.private.unwrap_or(false),
        language,
        default_branch: repo
            .default_branch
            .unwrap_or_else(|| FALLBACK_BRANCH.to_string()),
        pushed_at: repo.pushed_at,
        html_url: repo.html_url.map(|u| u.to_string()),
    }
}

fn decode_content(item: &Content) -> Result<String> {
    let raw = item
        .content
        .as_deref()
        .ok_or_else(|| XgitError::Decode(item.path.clone()))?;
    decode_base64_text(raw).ok_or_else(|| XgitError::Decode(item.path.clone()))
}

// The contents API wraps base64 at 60 columns.
fn decode_base64_text(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(cleaned).ok()?;
    String::from_utf8(bytes).ok()
}

// Asking for a file's path returns that one file instead of a listing.
fn ensure_directory(path: &str, entries: &[DirEntry]) -> Result<()> {
    match entries {
        [entry] if entry.kind != EntryKind::Dir && entry.path == path => {
            Err(XgitError::NotFound(format!("directory {path}")))
        }
        _ => Ok(()),
    }
}

fn display_path(repo: &RepoRef, path: &str) -> String {
    if path.is_empty() {
        repo.full_name()
    } else {
        format!("{}:{path}", repo.full_name())
    }
}

fn classify(err: octocrab::Error, what: &str) -> XgitError {
    match &err {
        octocrab::Error::GitHub { source, .. } => {
            let message = source.message.clone();
            match source.status_code.as_u16() {
                401 => XgitError::Unauthorized,
                403 => XgitError::Forbidden(message),
                404 => XgitError::NotFound(what.to_string()),
                409 => XgitError::Conflict(format!("{what}: {message}")),
                422 if message.contains("sha") => XgitError::Conflict(format!("{what}: {message}")),
                _ => XgitError::GitHub(format!("{what}: {message}")),
            }
        }
        octocrab::Error::Hyper { .. } | octocrab::Error::Service { .. } => {
            XgitError::Network(format!("{what}: {err}"))
        }
        _ => XgitError::GitHub(format!("{what}: {err}")),
    }
}
