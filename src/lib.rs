pub mod app;
pub mod auth;
pub mod auth_handlers;
pub mod catalog;
pub mod config;
pub mod error;
pub mod generation;
pub mod handlers;
pub mod rate_limit;
pub mod store;
pub mod upstream;
