pub mod aggregate;
pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod export;
pub mod ingest;
pub mod output;
pub mod presentation;
pub mod store;
pub mod tui;
pub mod view;
