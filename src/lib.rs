pub mod client;
pub mod config;
pub mod handlers;
pub mod models;
pub mod relay;
