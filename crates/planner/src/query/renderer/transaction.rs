use crate::query::{
    ast::transaction::TransactionControl,
    renderer::{Render, Renderer},
};

impl Render for TransactionControl {
    fn render(&self, r: &mut Renderer) {
        r.sql.push_str(match self {
            TransactionControl::Begin => "BEGIN TRANSACTION;",
            TransactionControl::Commit => "COMMIT TRANSACTION;",
            TransactionControl::Rollback => "ROLLBACK;",
        });
    }
}
