use crate::changes::ChangeSet;
use crate::error::{Result, XgitError};
use crate::github::types::{FileWrite, RepoRef};
use crate::github::ContentApi;
use std::collections::HashSet;

#[derive(Debug)]
pub enum PathOutcome {
    Committed { new_hash: String },
    Failed(XgitError),
}

impl PathOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, PathOutcome::Committed { .. })
    }
}

/// Per-path results of one commit call, in the order the paths were given.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub results: Vec<(String, PathOutcome)>,
}

impl CommitReport {
    #[allow(dead_code)]
    pub fn get(&self, path: &str) -> Option<&PathOutcome> {
        self.results
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &XgitError)> {
        self.results.iter().filter_map(|(p, o)| match o {
            PathOutcome::Failed(e) => Some((p.as_str(), e)),
            PathOutcome::Committed { .. } => None,
        })
    }

    pub fn all_committed(&self) -> bool {
        self.results.iter().all(|(_, o)| o.is_committed())
    }
}

/// Pushes each path's pending content to `branch`, one file at a time.
///
/// A path whose remote hash moved away from the record's `base_hash` fails with
/// `Conflict` before anything is written. A failed path keeps its record
/// untouched; paths that succeeded stay committed.
pub async fn commit_paths<A>(
    api: &A,
    repo: &RepoRef,
    branch: &str,
    changes: &mut ChangeSet,
    paths: &[String],
    message: &str,
) -> Result<CommitReport>
where
    A: ContentApi + ?Sized,
{
    let message = message.trim();
    if message.is_empty() {
        return Err(XgitError::EmptyMessage);
    }

    let mut seen = HashSet::new();
    let mut report = CommitReport::default();

    for path in paths {
        if !seen.insert(path.as_str()) {
            continue;
        }
        let outcome = match push_one(api, repo, branch, changes, path, message).await {
            Ok(new_hash) => {
                changes.mark_committed(path);
                tracing::info!("committed {path} on {branch} ({new_hash})");
                PathOutcome::Committed { new_hash }
            }
            Err(e) => {
                tracing::warn!("commit of {path} failed: {e}");
                PathOutcome::Failed(e)
            }
        };
        report.results.push((path.clone(), outcome));
    }

    Ok(report)
}

async fn push_one<A>(
    api: &A,
    repo: &RepoRef,
    branch: &str,
    changes: &ChangeSet,
    path: &str,
    message: &str,
) -> Result<String>
where
    A: ContentApi + ?Sized,
{
    let record = changes
        .get(path)
        .ok_or_else(|| XgitError::NotDirty(path.to_string()))?;

    let latest = api.get_file_content(repo, path, branch).await?;
    if latest.hash != record.base_hash {
        return Err(XgitError::Conflict(format!(
            "{path} changed on the remote since it was opened ({} -> {})",
            short(&record.base_hash),
            short(&latest.hash)
        )));
    }

    let write = FileWrite {
        path,
        message,
        content: &record.current_content,
        expected_hash: &latest.hash,
        branch,
    };
    let outcome = api.put_file_content(repo, &write).await?;
    Ok(outcome.new_hash)
}

fn short(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn dirty(changes: &mut ChangeSet, remote: &FakeRemote, path: &str, content: &str) {
        let hash = remote.put(path, "original");
        changes.record_edit(path, "original", &hash, content.to_string());
        changes.set_staged(path, true);
    }

    async fn run<A: ContentApi>(
        api: &A,
        changes: &mut ChangeSet,
        list: &[&str],
        message: &str,
    ) -> Result<CommitReport> {
        let paths: Vec<String> = list.iter().map(|p| p.to_string()).collect();
        commit_paths(api, &repo_ref(), BRANCH, changes, &paths, message).await
    }

    #[tokio::test]
    async fn test_single_path_success_clears_record() {
        let remote = FakeRemote::new();
        let api = remote.connect_as(TOKEN);
        let mut changes = ChangeSet::new();
        dirty(&mut changes, &remote, "a.txt", "edited");

        let report = run(&api, &mut changes, &["a.txt"], "update")
            .await
            .unwrap();

        assert!(report.all_committed());
        assert!(changes.is_empty());
        assert_eq!(remote.content("a.txt").as_deref(), Some("edited"));
        assert_eq!(remote.commit_messages(), vec!["update"]);
    }

    #[tokio::test]
    async fn test_conflict_leaves_record_staged() {
        let remote = FakeRemote::new();
        let mut changes = ChangeSet::new();
        dirty(&mut changes, &remote, "a.txt", "mine");
        // another writer moves the file, and our write races with a second change
        let racing = RacingApi {
            inner: remote.connect_as(TOKEN),
            remote: remote.clone(),
        };

        let report = run(&racing, &mut changes, &["a.txt"], "update")
            .await
            .unwrap();

        assert!(matches!(
            report.get("a.txt"),
            Some(PathOutcome::Failed(XgitError::Conflict(_)))
        ));
        let record = changes.get("a.txt").unwrap();
        assert!(record.staged);
        assert_eq!(record.current_content, "mine");
        assert_eq!(remote.content("a.txt").as_deref(), Some("theirs"));
    }

    #[tokio::test]
    async fn test_remote_change_since_open_is_conflict() {
        let remote = FakeRemote::new();
        let api = remote.connect_as(TOKEN);
        let mut changes = ChangeSet::new();
        dirty(&mut changes, &remote, "a.txt", "mine");
        remote.put("a.txt", "moved");

        let report = run(&api, &mut changes, &["a.txt"], "update")
            .await
            .unwrap();

        assert!(matches!(
            report.get("a.txt"),
            Some(PathOutcome::Failed(XgitError::Conflict(_)))
        ));
        assert_eq!(remote.put_count(), 0);
        assert_eq!(remote.content("a.txt").as_deref(), Some("moved"));
        assert!(changes.get("a.txt").unwrap().staged);
    }

    #[tokio::test]
    async fn test_rebased_record_commits_after_conflict() {
        let remote = FakeRemote::new();
        let api = remote.connect_as(TOKEN);
        let mut changes = ChangeSet::new();
        dirty(&mut changes, &remote, "a.txt", "mine");
        let moved = remote.put("a.txt", "moved");
        changes.rebase("a.txt", "moved".to_string(), moved);

        let report = run(&api, &mut changes, &["a.txt"], "update")
            .await
            .unwrap();

        assert!(report.all_committed());
        assert_eq!(remote.content("a.txt").as_deref(), Some("mine"));
    }

    #[tokio::test]
    async fn test_partial_success_is_kept() {
        let remote = FakeRemote::new();
        let api = remote.connect_as(TOKEN);
        let mut changes = ChangeSet::new();
        dirty(&mut changes, &remote, "a.txt", "A");
        dirty(&mut changes, &remote, "b.txt", "B");
        remote.fail_network_for("b.txt");

        let report = run(&api, &mut changes, &["a.txt", "b.txt"], "batch")
            .await
            .unwrap();

        assert!(report.get("a.txt").unwrap().is_committed());
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.0, "b.txt");
        assert!(failure.1.is_retryable());
        assert!(!changes.contains("a.txt"));
        assert!(changes.get("b.txt").unwrap().staged);
    }

    #[tokio::test]
    async fn test_results_follow_caller_order_and_dedupe() {
        let remote = FakeRemote::new();
        let api = remote.connect_as(TOKEN);
        let mut changes = ChangeSet::new();
        dirty(&mut changes, &remote, "a.txt", "A");
        dirty(&mut changes, &remote, "b.txt", "B");

        let report = run(&api, &mut changes, &["b.txt", "a.txt", "b.txt"], "batch")
            .await
            .unwrap();

        let order: Vec<&str> = report.results.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(order, vec!["b.txt", "a.txt"]);
        assert_eq!(remote.put_count(), 2);
    }

    #[tokio::test]
    async fn test_clean_path_is_not_sent() {
        let remote = FakeRemote::new();
        let api = remote.connect_as(TOKEN);
        let mut changes = ChangeSet::new();

        let report = run(&api, &mut changes, &["nope.txt"], "x")
            .await
            .unwrap();

        assert!(matches!(
            report.get("nope.txt"),
            Some(PathOutcome::Failed(XgitError::NotDirty(_)))
        ));
        assert_eq!(remote.get_count(), 0);
        assert_eq!(remote.put_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let remote = FakeRemote::new();
        let api = remote.connect_as(TOKEN);
        let mut changes = ChangeSet::new();
        dirty(&mut changes, &remote, "a.txt", "A");

        let err = run(&api, &mut changes, &["a.txt"], "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, XgitError::EmptyMessage));
        assert!(changes.contains("a.txt"));
    }

    #[tokio::test]
    async fn test_rejected_write_keeps_record() {
        let remote = FakeRemote::new();
        let api = remote.connect_as(TOKEN);
        let mut changes = ChangeSet::new();
        dirty(&mut changes, &remote, "a.txt", "A");
        remote.reject_writes();
        let before = changes.get("a.txt").cloned();

        let report = run(&api, &mut changes, &["a.txt"], "x")
            .await
            .unwrap();

        assert!(matches!(
            report.get("a.txt"),
            Some(PathOutcome::Failed(XgitError::Forbidden(_)))
        ));
        assert_eq!(changes.get("a.txt").cloned(), before);
    }

    // Lets another writer land between our hash read and our write.
    struct RacingApi {
        inner: FakeApi,
        remote: FakeRemote,
    }

    #[async_trait::async_trait]
    impl ContentApi for RacingApi {
        async fn fetch_user(&self) -> Result<crate::github::types::Identity> {
            self.inner.fetch_user().await
        }

        async fn list_repositories(
            &self,
            limit: usize,
        ) -> Result<Vec<crate::github::types::RepoSummary>> {
            self.inner.list_repositories(limit).await
        }

        async fn get_repository(
            &self,
            owner: &str,
            name: &str,
        ) -> Result<crate::github::types::RepoSummary> {
            self.inner.get_repository(owner, name).await
        }

        async fn list_directory(
            &self,
            repo: &RepoRef,
            path: &str,
            git_ref: &str,
        ) -> Result<Vec<crate::github::types::DirEntry>> {
            self.inner.list_directory(repo, path, git_ref).await
        }

        async fn get_file_content(
            &self,
            repo: &RepoRef,
            path: &str,
            git_ref: &str,
        ) -> Result<crate::github::types::FileContent> {
            let latest = self.inner.get_file_content(repo, path, git_ref).await?;
            self.remote.put(path, "theirs");
            Ok(latest)
        }

        async fn put_file_content(
            &self,
            repo: &RepoRef,
            write: &FileWrite<'_>,
        ) -> Result<crate::github::types::PutOutcome> {
            self.inner.put_file_content(repo, write).await
        }

        async fn list_commits(
            &self,
            repo: &RepoRef,
            git_ref: &str,
            path: Option<&str>,
            limit: usize,
        ) -> Result<Vec<crate::github::types::CommitSummary>> {
            self.inner.list_commits(repo, git_ref, path, limit).await
        }
    }
}
