pub mod common;
pub mod copy;
pub mod create_table;
pub mod delete;
pub mod drop_table;
pub mod insert;
pub mod transaction;
pub mod truncate;
