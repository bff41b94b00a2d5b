//! # Selection Model Types
//!
//! Value types shared by providers, the state manager and consumers: modes,
//! selection options, sort/filter/group settings and file change events.

use bridge_traits::{FileRecord, FileStoreEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CardError;

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of a card set, stable across incremental updates of the same
/// load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardSetId(Uuid);

impl CardSetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CardSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CardSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription handle. Ids increase monotonically, so sorting by id
/// recovers registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Modes
// ============================================================================

/// Selection strategy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSetMode {
    /// Files next to the file focused in the host editor
    ActiveLocation,
    /// Files of a folder chosen by the user
    FixedLocation,
    /// Every eligible file of the store
    WholeStore,
    /// Files matching a text query
    QueryResult,
}

impl CardSetMode {
    pub const ALL: [CardSetMode; 4] = [
        CardSetMode::ActiveLocation,
        CardSetMode::FixedLocation,
        CardSetMode::WholeStore,
        CardSetMode::QueryResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardSetMode::ActiveLocation => "active_location",
            CardSetMode::FixedLocation => "fixed_location",
            CardSetMode::WholeStore => "whole_store",
            CardSetMode::QueryResult => "query_result",
        }
    }
}

impl fmt::Display for CardSetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardSetMode {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "active_location" | "active" => Ok(CardSetMode::ActiveLocation),
            "fixed_location" | "folder" => Ok(CardSetMode::FixedLocation),
            "whole_store" | "vault" => Ok(CardSetMode::WholeStore),
            "query_result" | "search" => Ok(CardSetMode::QueryResult),
            _ => Err(CardError::UnsupportedMode(s.to_string())),
        }
    }
}

// ============================================================================
// Sort / Filter / Group
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    FileName,
    CreatedAt,
    ModifiedAt,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOption {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortOption {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

impl Default for SortOption {
    fn default() -> Self {
        Self::new(SortField::ModifiedAt, SortDirection::Descending)
    }
}

/// Predicate narrowing a selection, applied by every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterOption {
    /// Display name contains the text (case-insensitive)
    NameContains(String),
    /// Path starts with the prefix
    PathPrefix(String),
    /// Note carries the tag (without `#`, case-insensitive)
    HasTag(String),
    /// Modified at or after the unix millis timestamp
    ModifiedAfter(i64),
}

impl FilterOption {
    /// Whether evaluating the predicate needs tags/headings/frontmatter.
    pub fn needs_metadata(&self) -> bool {
        matches!(self, FilterOption::HasTag(_))
    }

    /// Evaluates the predicate. Metadata-based predicates fail on records
    /// without metadata.
    pub fn matches(&self, file: &FileRecord) -> bool {
        match self {
            FilterOption::NameContains(text) => file
                .display_name
                .to_lowercase()
                .contains(&text.to_lowercase()),
            FilterOption::PathPrefix(prefix) => file.path.starts_with(prefix.as_str()),
            FilterOption::HasTag(tag) => {
                let wanted = tag.trim_start_matches('#');
                file.metadata.as_ref().map_or(false, |metadata| {
                    metadata
                        .tags
                        .iter()
                        .any(|t| t.trim_start_matches('#').eq_ignore_ascii_case(wanted))
                })
            }
            FilterOption::ModifiedAfter(ts) => file.modified_at >= *ts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOption {
    #[default]
    None,
    Folder,
    Tag,
    ModifiedDay,
}

// ============================================================================
// Selection Options
// ============================================================================

/// Selection criteria shared by all providers.
///
/// Each provider reads only the fields relevant to its mode: `source` is the
/// folder for [`CardSetMode::FixedLocation`] and the query text for
/// [`CardSetMode::QueryResult`]; the other modes ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionOptions {
    pub mode: CardSetMode,
    pub source: Option<String>,
    pub sort_option: SortOption,
    pub filter_options: Vec<FilterOption>,
    pub group_option: GroupOption,
    pub include_subdirectories: bool,
    pub include_hidden: bool,
    /// Follow file store change events
    pub auto_refresh: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            mode: CardSetMode::ActiveLocation,
            source: None,
            sort_option: SortOption::default(),
            filter_options: Vec::new(),
            group_option: GroupOption::None,
            include_subdirectories: false,
            include_hidden: false,
            auto_refresh: true,
        }
    }
}

impl SelectionOptions {
    pub fn for_mode(mode: CardSetMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_subdirectories(mut self, include: bool) -> Self {
        self.include_subdirectories = include;
        self
    }

    pub fn with_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn with_sort(mut self, sort_option: SortOption) -> Self {
        self.sort_option = sort_option;
        self
    }

    pub fn with_filter(mut self, filter: FilterOption) -> Self {
        self.filter_options.push(filter);
        self
    }

    pub fn with_group(mut self, group_option: GroupOption) -> Self {
        self.group_option = group_option;
        self
    }

    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    /// Trimmed, non-empty source text.
    pub fn source_text(&self) -> Option<&str> {
        self.source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// File Changes
// ============================================================================

/// A single change to reconcile against a card set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Create(FileRecord),
    Modify(FileRecord),
    Delete { path: String },
    Rename { file: FileRecord, old_path: String },
}

impl FileChange {
    /// Translates a store notification. Focus changes are not file changes.
    pub fn from_store_event(event: FileStoreEvent) -> Option<Self> {
        match event {
            FileStoreEvent::Created { file } => Some(FileChange::Create(file)),
            FileStoreEvent::Modified { file } => Some(FileChange::Modify(file)),
            FileStoreEvent::Deleted { file } => Some(FileChange::Delete { path: file.path }),
            FileStoreEvent::Renamed { file, old_path } => {
                Some(FileChange::Rename { file, old_path })
            }
            FileStoreEvent::ActiveFileChanged { .. } => None,
        }
    }

    /// Every path the change touches; a rename touches two.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            FileChange::Create(file) | FileChange::Modify(file) => vec![file.path.as_str()],
            FileChange::Delete { path } => vec![path.as_str()],
            FileChange::Rename { file, old_path } => vec![old_path.as_str(), file.path.as_str()],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FileChange::Create(_) => "create",
            FileChange::Modify(_) => "modify",
            FileChange::Delete { .. } => "delete",
            FileChange::Rename { .. } => "rename",
        }
    }
}
