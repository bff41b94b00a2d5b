//! # Card Set
//!
//! Immutable, copy-on-write working set of file records.
//!
//! ## Overview
//!
//! A [`CardSet`] is the unit handed to subscribers. Entries live behind an
//! `Arc`, so cloning a card set is cheap and every mutation returns a new
//! value. Operations that change nothing return a set sharing the same
//! entries, which callers detect with [`CardSet::shares_entries`].
//!
//! Entries are unique by path. The `id` survives incremental updates of the
//! same load; a full reload produces a fresh id.

use bridge_traits::FileRecord;
use chrono::DateTime;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::models::{
    CardSetId, CardSetMode, FilterOption, GroupOption, SortDirection, SortField, SortOption,
};
use crate::paths::parent_dir;

#[derive(Debug, Clone, PartialEq)]
pub struct CardSet {
    id: CardSetId,
    mode: CardSetMode,
    source: Option<String>,
    entries: Arc<Vec<FileRecord>>,
    last_updated: i64,
}

/// One bucket of a grouped card set view.
#[derive(Debug, Clone, PartialEq)]
pub struct CardGroup {
    /// Folder path, tag or `YYYY-MM-DD`; empty for the catch-all bucket
    pub key: String,
    pub entries: Vec<FileRecord>,
}

impl CardSet {
    /// Builds a card set, keeping the first record of every path.
    pub fn new(
        mode: CardSetMode,
        source: Option<String>,
        entries: Vec<FileRecord>,
        last_updated: i64,
    ) -> Self {
        let mut seen = HashSet::with_capacity(entries.len());
        let entries: Vec<FileRecord> = entries
            .into_iter()
            .filter(|file| seen.insert(file.path.clone()))
            .collect();

        Self {
            id: CardSetId::new(),
            mode,
            source,
            entries: Arc::new(entries),
            last_updated,
        }
    }

    pub fn empty(mode: CardSetMode, source: Option<String>, last_updated: i64) -> Self {
        Self::new(mode, source, Vec::new(), last_updated)
    }

    pub fn id(&self) -> CardSetId {
        self.id
    }

    pub fn mode(&self) -> CardSetMode {
        self.mode
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn entries(&self) -> &[FileRecord] {
        &self.entries
    }

    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|file| file.path.as_str()).collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.position(path).map(|idx| &self.entries[idx])
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|file| file.path == path)
    }

    /// Same set, new entries; keeps id, mode and source.
    fn derive(&self, entries: Vec<FileRecord>, now: i64) -> Self {
        Self {
            id: self.id,
            mode: self.mode,
            source: self.source.clone(),
            entries: Arc::new(entries),
            last_updated: now,
        }
    }

    /// Appends a file. No-op when the path is already present.
    pub fn add_file(&self, file: FileRecord, now: i64) -> Self {
        if self.contains(&file.path) {
            return self.clone();
        }
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend(self.entries.iter().cloned());
        entries.push(file);
        self.derive(entries, now)
    }

    /// Drops the entry with this path. No-op when absent.
    pub fn remove_file(&self, path: &str, now: i64) -> Self {
        match self.position(path) {
            Some(idx) => {
                let mut entries = self.entries.as_ref().clone();
                entries.remove(idx);
                self.derive(entries, now)
            }
            None => self.clone(),
        }
    }

    /// Replaces the record with the same path, keeping its position.
    /// No-op when absent.
    pub fn update_file(&self, file: FileRecord, now: i64) -> Self {
        match self.position(&file.path) {
            Some(idx) => {
                let mut entries = self.entries.as_ref().clone();
                entries[idx] = file;
                self.derive(entries, now)
            }
            None => self.clone(),
        }
    }

    /// Entries ordered by `sort`; ties break on path so the order is total.
    pub fn sorted(&self, sort: &SortOption) -> Self {
        let mut entries = self.entries.as_ref().clone();
        entries.sort_by(|a, b| {
            let ordering = match sort.field {
                SortField::FileName => a
                    .display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase()),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::ModifiedAt => a.modified_at.cmp(&b.modified_at),
                SortField::Size => a.size_bytes.cmp(&b.size_bytes),
            };
            let ordering = match sort.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            ordering.then_with(|| a.path.cmp(&b.path))
        });
        Self {
            entries: Arc::new(entries),
            ..self.clone()
        }
    }

    /// Keeps entries matching every filter.
    pub fn filtered(&self, filters: &[FilterOption]) -> Self {
        if filters.is_empty() {
            return self.clone();
        }
        self.filter_by(|file| filters.iter().all(|filter| filter.matches(file)))
    }

    pub fn filter_by<F>(&self, predicate: F) -> Self
    where
        F: Fn(&FileRecord) -> bool,
    {
        let entries = self
            .entries
            .iter()
            .filter(|file| predicate(file))
            .cloned()
            .collect();
        Self {
            entries: Arc::new(entries),
            ..self.clone()
        }
    }

    /// Grouped view. Groups are ordered by key; entries keep set order.
    ///
    /// With [`GroupOption::Tag`] a file lands in one group per tag and
    /// untagged files (or files without metadata) in the `""` group.
    pub fn group(&self, option: &GroupOption) -> Vec<CardGroup> {
        if *option == GroupOption::None {
            return vec![CardGroup {
                key: String::new(),
                entries: self.entries.as_ref().clone(),
            }];
        }

        let mut groups: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();
        for file in self.entries.iter() {
            for key in group_keys(file, option) {
                groups.entry(key).or_default().push(file.clone());
            }
        }

        groups
            .into_iter()
            .map(|(key, entries)| CardGroup { key, entries })
            .collect()
    }

    /// Whether both sets point at the same entry allocation.
    pub fn shares_entries(&self, other: &CardSet) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// Whether both sets hold the same paths in the same order.
    pub fn same_paths(&self, other: &CardSet) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|(a, b)| a.path == b.path)
    }
}

fn group_keys(file: &FileRecord, option: &GroupOption) -> Vec<String> {
    match option {
        GroupOption::None => vec![String::new()],
        GroupOption::Folder => vec![parent_dir(&file.path).to_string()],
        GroupOption::Tag => {
            let tags: Vec<String> = file
                .metadata
                .as_ref()
                .map(|metadata| {
                    metadata
                        .tags
                        .iter()
                        .map(|tag| tag.trim_start_matches('#').to_lowercase())
                        .collect()
                })
                .unwrap_or_default();
            if tags.is_empty() {
                vec![String::new()]
            } else {
                let mut unique = tags;
                unique.sort();
                unique.dedup();
                unique
            }
        }
        GroupOption::ModifiedDay => vec![DateTime::from_timestamp_millis(file.modified_at)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default()],
    }
}
