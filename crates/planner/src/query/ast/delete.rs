use crate::query::ast::common::TableRef;

#[derive(Debug, Clone)]
pub struct Delete {
    pub table: TableRef,
    pub filter: Option<KeyMatch>,
}

/// `<column> IN (SELECT <column> FROM <source>)`
#[derive(Debug, Clone)]
pub struct KeyMatch {
    pub column: String,
    pub source: TableRef,
}
