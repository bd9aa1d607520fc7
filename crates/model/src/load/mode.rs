use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How staged rows reach the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadMode {
    /// Bulk-load straight into the target.
    Insert,
    /// Empty the target, then bulk-load into it.
    TruncateInsert,
    /// Load into a temp table, delete matching ids from the target, then
    /// insert everything from the temp table.
    Upsert,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Insert => "INSERT",
            LoadMode::TruncateInsert => "TRUNCATE_INSERT",
            LoadMode::Upsert => "UPSERT",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "insert" => Ok(LoadMode::Insert),
            "truncate_insert" | "trunc_insert" => Ok(LoadMode::TruncateInsert),
            "upsert" => Ok(LoadMode::Upsert),
            other => Err(format!("Unknown load mode: {other}")),
        }
    }
}
