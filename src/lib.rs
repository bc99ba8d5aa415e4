pub mod address;
pub mod app;
pub mod charset;
pub mod cli;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod fragment;
pub mod imap;
pub mod mailbox;
pub mod mime;
pub mod sanitize;
pub mod service;
pub mod types;
