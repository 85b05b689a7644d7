use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which partitions a consumption reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PartitionSelector {
    #[default]
    All,
    Partition(i32),
}

/// Partition text that is neither `"all"` nor an integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPartition(pub String);

impl std::fmt::Display for InvalidPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid partition id '{}'", self.0)
    }
}

impl std::error::Error for InvalidPartition {}

impl FromStr for PartitionSelector {
    type Err = InvalidPartition;

    /// `"all"` and the empty string select every partition.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PartitionSelector::All);
        }
        s.parse::<i32>()
            .ok()
            .filter(|p| *p >= 0)
            .map(PartitionSelector::Partition)
            .ok_or_else(|| InvalidPartition(s.to_string()))
    }
}

impl TryFrom<String> for PartitionSelector {
    type Error = InvalidPartition;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PartitionSelector> for String {
    fn from(p: PartitionSelector) -> Self {
        p.to_string()
    }
}

impl std::fmt::Display for PartitionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionSelector::All => f.write_str("all"),
            PartitionSelector::Partition(p) => write!(f, "{p}"),
        }
    }
}

/// Where consumption starts within each selected partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    #[default]
    #[serde(alias = "Oldest", alias = "OLDEST")]
    Oldest,
    #[serde(alias = "Newest", alias = "NEWEST")]
    Newest,
}

impl std::fmt::Display for StartPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartPosition::Oldest => f.write_str("oldest"),
            StartPosition::Newest => f.write_str("newest"),
        }
    }
}

/// Consumption filter. Two instances live in the controller: the pending
/// one the user edits and the applied one that governs consumption.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub partition: PartitionSelector,
    /// Ignored when `partition` is `All`.
    #[serde(default)]
    pub start_offset: Option<i64>,
    #[serde(default)]
    pub start_position: StartPosition,
    #[serde(default)]
    pub key_filter: Option<String>,
    #[serde(default)]
    pub payload_filter: Option<String>,
}

impl FilterSpec {
    /// True when either substring filter is set, which switches refresh
    /// from a batch pull to a streaming session.
    pub fn has_text_filters(&self) -> bool {
        non_empty(&self.key_filter).is_some() || non_empty(&self.payload_filter).is_some()
    }

    /// Case-insensitive substring match of both text filters.
    pub fn matches(&self, key: &str, payload: &str) -> bool {
        if let Some(kf) = non_empty(&self.key_filter) {
            if !key.to_lowercase().contains(&kf.to_lowercase()) {
                return false;
            }
        }
        if let Some(pf) = non_empty(&self.payload_filter) {
            if !payload.to_lowercase().contains(&pf.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// Apply a partial change, replacing only the fields it carries.
    pub fn merge(&mut self, patch: FilterPatch) {
        if let Some(p) = patch.partition {
            self.partition = p;
        }
        if let Some(o) = patch.start_offset {
            self.start_offset = o;
        }
        if let Some(s) = patch.start_position {
            self.start_position = s;
        }
        if let Some(k) = patch.key_filter {
            self.key_filter = normalize(k);
        }
        if let Some(p) = patch.payload_filter {
            self.payload_filter = normalize(p);
        }
    }
}

/// Partial update of a [`FilterSpec`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPatch {
    #[serde(default)]
    pub partition: Option<PartitionSelector>,
    #[serde(default)]
    pub start_offset: Option<Option<i64>>,
    #[serde(default)]
    pub start_position: Option<StartPosition>,
    #[serde(default)]
    pub key_filter: Option<Option<String>>,
    #[serde(default)]
    pub payload_filter: Option<Option<String>>,
}

impl FilterPatch {
    pub fn partition(mut self, p: PartitionSelector) -> Self {
        self.partition = Some(p);
        self
    }

    pub fn start_offset(mut self, o: Option<i64>) -> Self {
        self.start_offset = Some(o);
        self
    }

    pub fn start_position(mut self, s: StartPosition) -> Self {
        self.start_position = Some(s);
        self
    }

    pub fn key_filter(mut self, k: impl Into<String>) -> Self {
        self.key_filter = Some(Some(k.into()));
        self
    }

    pub fn payload_filter(mut self, p: impl Into<String>) -> Self {
        self.payload_filter = Some(Some(p.into()));
        self
    }

    /// Remove both text filters.
    pub fn clear_text_filters(mut self) -> Self {
        self.key_filter = Some(None);
        self.payload_filter = Some(None);
        self
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

fn normalize(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}
