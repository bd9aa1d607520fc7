use crate::query::{
    ast::drop_table::DropTable,
    renderer::{Render, Renderer},
};

impl Render for DropTable {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str(if self.missing_ok {
            "DROP TABLE IF EXISTS "
        } else {
            "DROP TABLE "
        });
        r.render_table_ref(&self.table);
        r.sql.push(';');
    }
}
