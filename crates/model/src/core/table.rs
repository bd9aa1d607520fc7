use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Longest identifier the warehouse accepts, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 127;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Identifier is empty")]
    Empty,

    #[error("Identifier '{0}' exceeds {MAX_IDENTIFIER_LEN} bytes")]
    TooLong(String),

    #[error("Identifier '{0}' must start with a letter or underscore")]
    InvalidStart(String),

    #[error("Identifier '{ident}' contains invalid character '{ch}'")]
    InvalidChar { ident: String, ch: char },

    #[error("Table name '{0}' has more than two dot-separated parts")]
    TooManyParts(String),
}

/// Checks `ident` against the unquoted identifier grammar:
/// a letter or underscore followed by letters, digits, underscores or `$`.
pub fn validate_identifier(ident: &str) -> Result<(), IdentifierError> {
    let mut chars = ident.chars();
    let first = chars.next().ok_or(IdentifierError::Empty)?;

    if ident.len() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong(ident.to_string()));
    }

    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(IdentifierError::InvalidStart(ident.to_string()));
    }

    if let Some(ch) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '$')) {
        return Err(IdentifierError::InvalidChar {
            ident: ident.to_string(),
            ch,
        });
    }

    Ok(())
}

/// A `{schema, table}` pair. The schema is optional; an unqualified table
/// resolves through the warehouse search path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableName {
    pub schema: Option<String>,
    pub table: String,
}

impl TableName {
    pub fn new(schema: Option<&str>, table: &str) -> Self {
        Self {
            schema: schema.filter(|s| !s.is_empty()).map(str::to_string),
            table: table.to_string(),
        }
    }

    /// Parses `table` or `schema.table`. Parts are not validated here, see
    /// [`TableName::validate`].
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('.').collect();
        match parts.as_slice() {
            [table] => Ok(Self::new(None, table)),
            [schema, table] => Ok(Self::new(Some(schema), table)),
            _ => Err(IdentifierError::TooManyParts(raw.to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), IdentifierError> {
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }
        validate_identifier(&self.table)
    }

    /// `schema.table`, or just `table` when no schema is set.
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.table),
            None => self.table.clone(),
        }
    }

    /// Fills the parts missing from `self` with the ones from `fallback`.
    pub fn or_parts_of(&self, fallback: &TableName) -> TableName {
        TableName {
            schema: self.schema.clone().or_else(|| fallback.schema.clone()),
            table: if self.table.is_empty() {
                fallback.table.clone()
            } else {
                self.table.clone()
            },
        }
    }

    pub fn with_table(&self, table: impl Into<String>) -> TableName {
        TableName {
            schema: self.schema.clone(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

impl FromStr for TableName {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for TableName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Dotted(String),
            Parts {
                #[serde(default)]
                schema: Option<String>,
                #[serde(default)]
                table: String,
            },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Dotted(raw) => TableName::parse(&raw).map_err(serde::de::Error::custom),
            Repr::Parts { schema, table } => Ok(TableName::new(schema.as_deref(), &table)),
        }
    }
}
