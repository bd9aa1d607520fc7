//! Defines the `Dialect` trait for warehouse-specific SQL syntax.

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Wraps a string literal in single quotes, escaping embedded quotes.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Returns the name of the dialect.
    fn name(&self) -> String;
}

/// Redshift speaks the Postgres dialect for identifiers and literals.
#[derive(Debug, Clone, Copy, Default)]
pub struct Redshift;

impl Dialect for Redshift {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', "\"\""))
    }

    fn name(&self) -> String {
        "Redshift".into()
    }
}
