use std::collections::HashMap;

/// Pending local edit of one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: String,
    pub original_content: String,
    pub current_content: String,
    /// Remote blob hash the original content was read at.
    pub base_hash: String,
    pub staged: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    Created,
    Updated,
    Reverted,
    Unchanged,
}

/// Dirty files of the open repository, keyed by path.
///
/// Only divergent content is ever held here: an edit that lands back on the
/// original content removes the record.
#[derive(Debug, Default)]
pub struct ChangeSet {
    records: HashMap<String, ChangeRecord>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&ChangeRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Applies an edit. `baseline` and `base_hash` are only used when no record
    /// exists yet; an existing record keeps its own original content.
    pub fn record_edit(
        &mut self,
        path: &str,
        baseline: &str,
        base_hash: &str,
        new_content: String,
    ) -> EditOutcome {
        if let Some(record) = self.records.get_mut(path) {
            if new_content == record.original_content {
                self.records.remove(path);
                return EditOutcome::Reverted;
            }
            record.current_content = new_content;
            return EditOutcome::Updated;
        }

        if new_content == baseline {
            return EditOutcome::Unchanged;
        }

        self.records.insert(
            path.to_string(),
            ChangeRecord {
                path: path.to_string(),
                original_content: baseline.to_string(),
                current_content: new_content,
                base_hash: base_hash.to_string(),
                staged: false,
            },
        );
        EditOutcome::Created
    }

    pub fn set_staged(&mut self, path: &str, staged: bool) -> bool {
        match self.records.get_mut(path) {
            Some(record) => {
                record.staged = staged;
                true
            }
            None => false,
        }
    }

    pub fn stage_all(&mut self) -> usize {
        let mut count = 0;
        for record in self.records.values_mut() {
            if !record.staged {
                record.staged = true;
                count += 1;
            }
        }
        count
    }

    /// Moves a record onto a newer remote baseline, keeping the local edit.
    /// The record goes away if the edit now matches the remote.
    pub fn rebase(&mut self, path: &str, remote_content: String, remote_hash: String) -> EditOutcome {
        let Some(record) = self.records.get_mut(path) else {
            return EditOutcome::Unchanged;
        };
        if record.current_content == remote_content {
            self.records.remove(path);
            return EditOutcome::Reverted;
        }
        record.original_content = remote_content;
        record.base_hash = remote_hash;
        EditOutcome::Updated
    }

    pub fn discard(&mut self, path: &str) -> Option<ChangeRecord> {
        self.records.remove(path)
    }

    /// Drops the record once its content is on the remote.
    pub fn mark_committed(&mut self, path: &str) -> Option<ChangeRecord> {
        self.records.remove(path).map(|mut record| {
            record.original_content = record.current_content.clone();
            record
        })
    }

    pub fn list_dirty(&self) -> Vec<&ChangeRecord> {
        let mut records: Vec<&ChangeRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    pub fn staged_paths(&self) -> Vec<String> {
        self.list_dirty()
            .into_iter()
            .filter(|r| r.staged)
            .map(|r| r.path.clone())
            .collect()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }
}
