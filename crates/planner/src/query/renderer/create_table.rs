use crate::query::{
    ast::create_table::CreateTableLike,
    renderer::{Render, Renderer},
};

impl Render for CreateTableLike {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("CREATE TABLE ");
        r.render_table_ref(&self.table);
        r.sql.push_str(" (LIKE ");
        r.render_table_ref(&self.like);
        r.sql.push_str(");");
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        ast::{common::TableRef, create_table::CreateTableLike},
        dialect::Redshift,
        to_sql,
    };

    #[test]
    fn test_render_create_like() {
        let ast = CreateTableLike {
            table: TableRef {
                schema: Some("s".to_string()),
                name: "t_temp".to_string(),
            },
            like: TableRef {
                schema: Some("s".to_string()),
                name: "t".to_string(),
            },
        };
        assert_eq!(
            to_sql(&ast, &Redshift),
            r#"CREATE TABLE "s"."t_temp" (LIKE "s"."t");"#
        );
    }
}
