use model::core::table::TableName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl From<&TableName> for TableRef {
    fn from(table: &TableName) -> Self {
        TableRef {
            schema: table.schema.clone(),
            name: table.table.clone(),
        }
    }
}
