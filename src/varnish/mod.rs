// src/varnish/mod.rs
mod auth;
mod client;
mod error;
mod response;

pub use auth::{authenticate, challenge_response, Secret};
pub use client::VarnishClient;
pub use error::VarnishError;
pub use response::{encode_header, parse_header, Response, STATUS_AUTH, STATUS_OK};
