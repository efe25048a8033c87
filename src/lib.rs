//! Batch notifier: filter records, send one message per case, write the outcome back.

pub mod clients;
pub mod config;
pub mod dates;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod record;
pub mod template;
