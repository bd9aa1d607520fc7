use crate::query::ast::common::TableRef;

/// `INSERT INTO <target> SELECT * FROM <source>`
#[derive(Debug, Clone)]
pub struct InsertSelect {
    pub target: TableRef,
    pub source: TableRef,
}
