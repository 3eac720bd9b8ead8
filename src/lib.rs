pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod output;
pub mod prompt;
pub mod selection;
pub mod session;
pub mod transfer;
