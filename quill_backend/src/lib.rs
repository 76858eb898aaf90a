pub mod api;
pub mod blog;
pub mod config;
pub mod gateway;
pub mod models;
pub mod session;
pub mod telemetry;
pub mod thread;
pub mod upstream;
pub mod utils;
