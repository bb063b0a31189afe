// src/lib.rs
pub mod config;
pub mod health;
pub mod metrics;
pub mod poller;
pub mod retry;
pub mod server;
pub mod varnish;
