use crate::query::ast::common::TableRef;

/// `DROP TABLE`. Only ever used on the upsert temp table, so `missing_ok`
/// is set wherever the table may not have been created yet.
#[derive(Debug, Clone)]
pub struct DropTable {
    pub table: TableRef,
    pub missing_ok: bool,
}
