//! Defines the AST for the warehouse bulk-load (`COPY ... FROM`) statement.

use crate::query::ast::common::TableRef;

#[derive(Debug, Clone)]
pub struct Copy {
    pub table: TableRef,
    /// Object URL the rows are read from.
    pub source: String,
    /// Value of the `CREDENTIALS AS` clause.
    pub authorization: Option<String>,
    pub options: Vec<CopyOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOption {
    pub key: String,
    /// Rendered verbatim; literals must already be quoted.
    pub value: Option<String>,
}
