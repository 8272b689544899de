pub mod cache;
pub mod config;
pub mod display;
pub mod jobs;
pub mod notify;
pub mod render;
pub mod server;
