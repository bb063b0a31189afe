// src/poller/mod.rs
mod connector;
mod scheduler;
mod supervisor;

pub use connector::{Connector, TcpConnector};
pub use scheduler::{Scheduler, TokioScheduler};
pub use supervisor::{PollSettings, Supervisor};
