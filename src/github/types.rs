use chrono::{DateTime, Utc};
use std::fmt;

pub const FALLBACK_BRANCH: &str = "main";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub login: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
}

impl RepoRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Clone, Debug)]
pub struct RepoSummary {
    pub owner: String,
    pub name: String,
    pub description: Option<String>,
    pub private: bool,
    pub language: Option<String>,
    pub default_branch: String,
    pub pushed_at: Option<DateTime<Utc>>,
    pub html_url: Option<String>,
}

impl RepoSummary {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn to_ref(&self) -> RepoRef {
        RepoRef {
            owner: self.owner.clone(),
            name: self.name.clone(),
            default_branch: self.default_branch.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
    Submodule,
}

impl EntryKind {
    pub fn from_api(kind: &str) -> Self {
        match kind {
            "dir" => EntryKind::Dir,
            "symlink" => EntryKind::Symlink,
            "submodule" => EntryKind::Submodule,
            _ => EntryKind::File,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub hash: String,
}

#[derive(Clone, Debug)]
pub struct FileWrite<'a> {
    pub path: &'a str,
    pub message: &'a str,
    pub content: &'a str,
    pub expected_hash: &'a str,
    pub branch: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutOutcome {
    pub new_hash: String,
}

#[derive(Clone, Debug)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
}

impl CommitSummary {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

pub fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(|a, b| {
        let a_dir = a.kind == EntryKind::Dir;
        let b_dir = b.kind == EntryKind::Dir;
        b_dir.cmp(&a_dir).then_with(|| a.name.cmp(&b.name))
    });
}
