use crate::query::{
    ast::copy::Copy,
    renderer::{Render, Renderer},
};

impl Render for Copy {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str("COPY ");
        r.render_table_ref(&self.table);

        r.sql.push_str("\nFROM ");
        r.push_literal(&self.source);

        if let Some(auth) = &self.authorization {
            r.sql.push_str("\nCREDENTIALS AS ");
            r.push_literal(auth);
        }

        for option in &self.options {
            r.sql.push('\n');
            r.sql.push_str(&option.key);
            if let Some(value) = &option.value {
                r.sql.push(' ');
                r.sql.push_str(value);
            }
        }
        r.sql.push(';');
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        ast::common::TableRef, builder::copy::CopyBuilder, dialect::Redshift, to_sql,
    };
    use model::load::CopyOptions;

    #[test]
    fn test_render_manifest_copy() {
        let ast = CopyBuilder::new(
            TableRef {
                schema: Some("tests".to_string()),
                name: "rs_loader".to_string(),
            },
            "s3://bucket/prefix_manifest.json",
        )
        .credentials("aws_iam_role=arn:aws:iam::1:role/r")
        .manifest()
        .load_options(&CopyOptions::default(), &Redshift)
        .build();

        let sql = to_sql(&ast, &Redshift);
        assert_eq!(
            sql,
            "COPY \"tests\".\"rs_loader\"\n\
             FROM 's3://bucket/prefix_manifest.json'\n\
             CREDENTIALS AS 'aws_iam_role=arn:aws:iam::1:role/r'\n\
             MANIFEST\n\
             JSON 'auto'\n\
             ENCODING UTF8\n\
             TIMEFORMAT 'auto'\n\
             TRUNCATECOLUMNS\n\
             MAXERROR 0;"
        );
    }
}
