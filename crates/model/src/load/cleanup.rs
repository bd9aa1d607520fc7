use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Decides whether staged objects are deleted when a run wraps up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanupPolicy {
    Always,
    Never,
    #[default]
    OnSuccess,
}

impl CleanupPolicy {
    /// Whether a wrap-up that ended with (`succeeded == false`) or without an
    /// error should delete the staged objects.
    pub fn should_delete(&self, succeeded: bool) -> bool {
        match self {
            CleanupPolicy::Always => true,
            CleanupPolicy::Never => false,
            CleanupPolicy::OnSuccess => succeeded,
        }
    }
}

impl FromStr for CleanupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALWAYS" => Ok(CleanupPolicy::Always),
            "NEVER" | "FALSE" => Ok(CleanupPolicy::Never),
            "ON_SUCCESS" | "SUCCESS" | "TRUE" => Ok(CleanupPolicy::OnSuccess),
            other => Err(format!("Unknown cleanup policy: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for CleanupPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Name(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(CleanupPolicy::OnSuccess),
            Repr::Flag(false) => Ok(CleanupPolicy::Never),
            Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}
