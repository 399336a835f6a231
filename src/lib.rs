pub mod admin;
pub mod args;
pub mod config;
pub mod r#const;
pub mod error;
pub mod forward;
pub mod metrics;
