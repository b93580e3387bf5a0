//! Library crate for audit-dash: the dashboard controller and its pieces.
pub mod backend;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod poller;
pub mod report;
pub mod terminal;
pub mod types;
pub mod view;
