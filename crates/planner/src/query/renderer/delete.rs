use crate::query::{
    ast::delete::Delete,
    renderer::{Render, Renderer},
};

impl Render for Delete {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("DELETE FROM ");
        r.render_table_ref(&self.table);

        if let Some(filter) = &self.filter {
            r.sql.push_str(" WHERE ");
            r.push_identifier(&filter.column);
            r.sql.push_str(" IN (SELECT ");
            r.push_identifier(&filter.column);
            r.sql.push_str(" FROM ");
            r.render_table_ref(&filter.source);
            r.sql.push(')');
        }
        r.sql.push(';');
    }
}
