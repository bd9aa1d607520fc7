use crate::query::{
    ast::insert::InsertSelect,
    renderer::{Render, Renderer},
};

impl Render for InsertSelect {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("INSERT INTO ");
        r.render_table_ref(&self.target);
        r.sql.push_str(" SELECT * FROM ");
        r.render_table_ref(&self.source);
        r.sql.push(';');
    }
}
