//! Defines the core rendering trait and context for converting AST to SQL.

use crate::query::{ast::common::TableRef, dialect::Dialect};

pub mod copy;
pub mod create_table;
pub mod delete;
pub mod drop_table;
pub mod insert;
pub mod transaction;
pub mod truncate;

/// A trait for any AST node that can be rendered into a SQL string.
pub trait Render {
    fn render(&self, renderer: &mut Renderer);
}

/// A context that holds the state during the rendering process.
///
/// It accumulates the SQL string and provides access to the dialect for
/// syntax-specific details. Load statements carry no bind parameters;
/// every value is validated or quoted as a literal when rendered.
pub struct Renderer<'a> {
    pub sql: String,
    pub dialect: &'a dyn Dialect,
}

impl<'a> Renderer<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self {
            sql: String::new(),
            dialect,
        }
    }

    /// Consumes the renderer and returns the final SQL string.
    pub fn finish(self) -> String {
        self.sql
    }

    pub fn push_identifier(&mut self, ident: &str) {
        let quoted = self.dialect.quote_identifier(ident);
        self.sql.push_str(&quoted);
    }

    pub fn push_literal(&mut self, value: &str) {
        let quoted = self.dialect.quote_literal(value);
        self.sql.push_str(&quoted);
    }

    pub fn render_table_ref(&mut self, table: &TableRef) {
        if let Some(schema) = &table.schema {
            self.push_identifier(schema);
            self.sql.push('.');
        }
        self.push_identifier(&table.name);
    }
}
