pub mod client;
pub mod types;

use crate::error::Result;
use async_trait::async_trait;
use types::{
    CommitSummary, Credential, DirEntry, FileContent, FileWrite, Identity, PutOutcome, RepoRef,
    RepoSummary,
};

/// Remote repository content operations the session and commit dispatcher rely on.
///
/// Implementations map HTTP failures onto the crate error taxonomy: 401 is
/// `Unauthorized`, 403 `Forbidden`, 404 `NotFound`, a stale `expected_hash` on
/// write is `Conflict`, transport failures and timeouts are `Network`.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn fetch_user(&self) -> Result<Identity>;

    async fn list_repositories(&self, limit: usize) -> Result<Vec<RepoSummary>>;

    async fn get_repository(&self, owner: &str, name: &str) -> Result<RepoSummary>;

    async fn list_directory(&self, repo: &RepoRef, path: &str, git_ref: &str)
        -> Result<Vec<DirEntry>>;

    async fn get_file_content(&self, repo: &RepoRef, path: &str, git_ref: &str)
        -> Result<FileContent>;

    async fn put_file_content(&self, repo: &RepoRef, write: &FileWrite<'_>) -> Result<PutOutcome>;

    async fn list_commits(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>>;
}

/// Builds an authenticated API handle for a credential.
pub trait Connector {
    type Api: ContentApi;

    fn connect(&self, credential: &Credential) -> Result<Self::Api>;
}
