use crate::query::ast::common::TableRef;

/// `CREATE TABLE <table> (LIKE <like>)`: copies the column layout of an
/// existing table.
#[derive(Debug, Clone)]
pub struct CreateTableLike {
    pub table: TableRef,
    pub like: TableRef,
}
