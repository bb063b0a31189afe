// src/retry/mod.rs
mod strategy;

pub use strategy::{ReconnectPolicy, RECONNECT_DELAY};
