pub mod error;
pub mod executor;
pub mod observer;
pub mod retry;
