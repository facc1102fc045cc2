//! Solar Quote: quote funnel service with lead storage, webhook fan-out
//! and an admin back office.

pub mod admin;
pub mod app;
pub mod config;
pub mod error;
pub mod funnel;
pub mod store;
pub mod submission;
