#![cfg(test)]

use crate::error::{Result, XgitError};
use crate::github::types::*;
use crate::github::{Connector, ContentApi};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const TOKEN: &str = "ghp_test";
pub const OWNER: &str = "octo";
pub const REPO: &str = "demo";
pub const BRANCH: &str = "main";

#[derive(Default)]
struct RemoteState {
    next_hash: u64,
    tokens: HashMap<String, String>,
    repos: HashMap<String, String>,
    // (repo full name, branch, path) -> (content, hash)
    files: BTreeMap<(String, String, String), (String, String)>,
    commits: Vec<(String, String, String)>,
    fail_network: HashSet<String>,
    reject_writes: bool,
    gets: usize,
    puts: usize,
}

impl RemoteState {
    fn hash(&mut self) -> String {
        self.next_hash += 1;
        format!("{:040x}", self.next_hash)
    }
}

/// In-memory stand-in for the contents API. Clones share state, so a test can
/// keep a handle and mutate the "remote" behind the session's back.
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.add_user(TOKEN, "octocat");
        remote.add_repo(OWNER, REPO, BRANCH);
        remote
    }

    pub fn add_user(&self, token: &str, login: &str) {
        let mut state = self.state.lock().unwrap();
        state.tokens.insert(token.to_string(), login.to_string());
    }

    pub fn revoke(&self, token: &str) {
        self.state.lock().unwrap().tokens.remove(token);
    }

    pub fn add_repo(&self, owner: &str, name: &str, default_branch: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .insert(format!("{owner}/{name}"), default_branch.to_string());
    }

    /// Writes a file directly on the remote, as another client would.
    pub fn put(&self, path: &str, content: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let hash = state.hash();
        state.files.insert(
            (format!("{OWNER}/{REPO}"), BRANCH.to_string(), path.to_string()),
            (content.to_string(), hash.clone()),
        );
        hash
    }

    pub fn content(&self, path: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .files
            .get(&(format!("{OWNER}/{REPO}"), BRANCH.to_string(), path.to_string()))
            .map(|(c, _)| c.clone())
    }

    pub fn fail_network_for(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_network
            .insert(path.to_string());
    }

    pub fn reject_writes(&self) {
        self.state.lock().unwrap().reject_writes = true;
    }

    pub fn get_count(&self) -> usize {
        self.state.lock().unwrap().gets
    }

    pub fn put_count(&self) -> usize {
        self.state.lock().unwrap().puts
    }

    pub fn commit_messages(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.commits.iter().map(|(_, m, _)| m.clone()).collect()
    }

    pub fn connect_as(&self, token: &str) -> FakeApi {
        FakeApi {
            remote: self.clone(),
            token: token.to_string(),
        }
    }
}

impl Connector for FakeRemote {
    type Api = FakeApi;

    fn connect(&self, credential: &Credential) -> Result<FakeApi> {
        Ok(self.connect_as(credential.expose()))
    }
}

pub struct FakeApi {
    remote: FakeRemote,
    token: String,
}

impl FakeApi {
    fn authorize(&self) -> Result<String> {
        let state = self.remote.state.lock().unwrap();
        state
            .tokens
            .get(&self.token)
            .cloned()
            .ok_or(XgitError::Unauthorized)
    }

    fn summary(full: &str, branch: &str) -> RepoSummary {
        let (owner, name) = full.split_once('/').unwrap_or(("", full));
        RepoSummary {
            owner: owner.to_string(),
            name: name.to_string(),
            description: None,
            private: false,
            language: None,
            default_branch: branch.to_string(),
            pushed_at: None,
            html_url: None,
        }
    }
}

#[async_trait]
impl ContentApi for FakeApi {
    async fn fetch_user(&self) -> Result<Identity> {
        let login = self.authorize()?;
        Ok(Identity { login })
    }

    async fn list_repositories(&self, limit: usize) -> Result<Vec<RepoSummary>> {
        self.authorize()?;
        let state = self.remote.state.lock().unwrap();
        let mut repos: Vec<RepoSummary> = state
            .repos
            .iter()
            .map(|(full, branch)| Self::summary(full, branch))
            .collect();
        repos.sort_by_key(|r| r.full_name());
        repos.truncate(limit);
        Ok(repos)
    }

    async fn get_repository(&self, owner: &str, name: &str) -> Result<RepoSummary> {
        self.authorize()?;
        let full = format!("{owner}/{name}");
        let state = self.remote.state.lock().unwrap();
        state
            .repos
            .get(&full)
            .map(|branch| Self::summary(&full, branch))
            .ok_or(XgitError::NotFound(full))
    }

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<DirEntry>> {
        self.authorize()?;
        let state = self.remote.state.lock().unwrap();
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for ((full, branch, file), (content, _)) in &state.files {
            if *full != repo.full_name() || branch != git_ref {
                continue;
            }
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            let (name, kind) = match rest.split_once('/') {
                Some((dir, _)) => (dir, EntryKind::Dir),
                None => (rest, EntryKind::File),
            };
            if seen.insert(name.to_string()) {
                entries.push(DirEntry {
                    name: name.to_string(),
                    path: format!("{prefix}{name}"),
                    kind,
                    size: if kind == EntryKind::File {
                        content.len() as u64
                    } else {
                        0
                    },
                });
            }
        }
        if entries.is_empty() && !path.is_empty() {
            return Err(XgitError::NotFound(path.to_string()));
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn get_file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<FileContent> {
        self.authorize()?;
        let mut state = self.remote.state.lock().unwrap();
        state.gets += 1;
        if state.fail_network.contains(path) {
            return Err(XgitError::Network(format!("{path}: connection reset")));
        }
        state
            .files
            .get(&(repo.full_name(), git_ref.to_string(), path.to_string()))
            .map(|(content, hash)| FileContent {
                content: content.clone(),
                hash: hash.clone(),
            })
            .ok_or_else(|| XgitError::NotFound(path.to_string()))
    }

    async fn put_file_content(&self, repo: &RepoRef, write: &FileWrite<'_>) -> Result<PutOutcome> {
        self.authorize()?;
        let mut state = self.remote.state.lock().unwrap();
        state.puts += 1;
        if state.reject_writes {
            return Err(XgitError::Forbidden("token lacks contents:write".to_string()));
        }
        let key = (
            repo.full_name(),
            write.branch.to_string(),
            write.path.to_string(),
        );
        match state.files.get(&key) {
            Some((_, hash)) if hash == write.expected_hash => {}
            Some(_) => {
                return Err(XgitError::Conflict(format!(
                    "{} does not match {}",
                    write.path, write.expected_hash
                )))
            }
            None => return Err(XgitError::NotFound(write.path.to_string())),
        }
        let new_hash = state.hash();
        state
            .files
            .insert(key, (write.content.to_string(), new_hash.clone()));
        state.commits.push((
            write.path.to_string(),
            write.message.to_string(),
            new_hash.clone(),
        ));
        Ok(PutOutcome { new_hash })
    }

    async fn list_commits(
        &self,
        _repo: &RepoRef,
        _git_ref: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitSummary>> {
        self.authorize()?;
        let state = self.remote.state.lock().unwrap();
        Ok(state
            .commits
            .iter()
            .rev()
            .filter(|(p, _, _)| path.map_or(true, |want| want == p))
            .take(limit)
            .map(|(_, message, sha)| CommitSummary {
                sha: sha.clone(),
                message: message.clone(),
                author: "octocat".to_string(),
                date: None,
            })
            .collect())
    }
}

pub fn repo_ref() -> RepoRef {
    RepoRef {
        owner: OWNER.to_string(),
        name: REPO.to_string(),
        default_branch: BRANCH.to_string(),
    }
}
