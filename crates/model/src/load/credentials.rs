use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials the warehouse uses to read staged objects.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CopyCredentials {
    Role {
        role: String,
    },
    AccessKeys {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
    },
}

impl CopyCredentials {
    /// The authorization string that goes inside `CREDENTIALS AS '...'`.
    pub fn authorization(&self) -> String {
        match self {
            CopyCredentials::Role { role } => format!("aws_iam_role={role}"),
            CopyCredentials::AccessKeys {
                access_key_id,
                secret_access_key,
                session_token: Some(token),
            } => format!(
                "aws_access_key_id={access_key_id};aws_secret_access_key={secret_access_key};token={token}"
            ),
            CopyCredentials::AccessKeys {
                access_key_id,
                secret_access_key,
                session_token: None,
            } => format!("aws_access_key_id={access_key_id};aws_secret_access_key={secret_access_key}"),
        }
    }
}

impl fmt::Debug for CopyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyCredentials::Role { role } => f.debug_struct("Role").field("role", role).finish(),
            CopyCredentials::AccessKeys {
                access_key_id,
                session_token,
                ..
            } => f
                .debug_struct("AccessKeys")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .field("session_token", &session_token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}
