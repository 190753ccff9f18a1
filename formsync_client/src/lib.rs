//! Keeps a device's form catalog in step with its forms directory and with
//! an OpenRosa form server.

pub mod change_lock;
pub mod config;
pub mod data_service;
pub mod deletion;
pub mod details_fetcher;
pub mod disk_sync;
pub mod downloader;
pub mod error;
pub mod form_source;
pub mod metadata;
pub mod project;
pub mod repository;
pub mod server_sync;
