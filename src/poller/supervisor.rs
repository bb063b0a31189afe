// src/poller/supervisor.rs
use super::connector::Connector;
use super::scheduler::Scheduler;
use crate::config::VarnishConfig;
use crate::health::{Aggregator, Snapshot};
use crate::metrics::BackendStateCollector;
use crate::retry::{ReconnectPolicy, RECONNECT_DELAY};
use crate::varnish::{authenticate, Secret, VarnishClient, VarnishError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const LIST_COMMAND: &str = "backend.list";

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub reset_on_scan: bool,
    pub reconnect_delay: Duration,
}

impl PollSettings {
    pub fn from_config(config: &VarnishConfig) -> Self {
        Self {
            interval: config.interval(),
            reset_on_scan: config.reset,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

enum PollState<S> {
    Disconnected,
    Authenticating(VarnishClient<S>),
    Polling(VarnishClient<S>),
}

/// Drives the connect, authenticate, poll-forever cycle against Varnish and
/// publishes every successful listing.
pub struct Supervisor<C, T> {
    connector: C,
    scheduler: T,
    secret: Secret,
    aggregator: Aggregator,
    collector: Arc<BackendStateCollector>,
    settings: PollSettings,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<C, T> Supervisor<C, T>
where
    C: Connector,
    T: Scheduler,
{
    pub fn new(
        connector: C,
        scheduler: T,
        secret: Secret,
        aggregator: Aggregator,
        collector: Arc<BackendStateCollector>,
        settings: PollSettings,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            connector,
            scheduler,
            secret,
            aggregator,
            collector,
            settings,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Runs until `shutdown` is called. Transient failures never end the loop.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        if *shutdown_rx.borrow() {
            return;
        }

        let mut policy = ReconnectPolicy::new(self.settings.reconnect_delay);
        let mut state = PollState::Disconnected;

        info!(
            "Starting Varnish poller with interval: {:?}",
            self.settings.interval
        );

        loop {
            state = tokio::select! {
                next = self.step(state, &mut policy) => next,
                _ = shutdown_rx.changed() => {
                    info!("Varnish poller shutting down");
                    break;
                }
            };
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn step(
        &self,
        state: PollState<C::Stream>,
        policy: &mut ReconnectPolicy,
    ) -> PollState<C::Stream> {
        match state {
            PollState::Disconnected => self.connect(policy).await,
            PollState::Authenticating(mut client) => {
                match authenticate(&mut client, &self.secret).await {
                    Ok(()) => PollState::Polling(client),
                    Err(e) => {
                        warn!("Authentication failed: {}", e);
                        PollState::Disconnected
                    }
                }
            }
            PollState::Polling(mut client) => match self.poll(&mut client).await {
                Ok(snapshot) => {
                    debug!(
                        backends = snapshot.total(),
                        "Published backend states: {:?}", snapshot
                    );
                    debug!("Sleeping for {:?}", self.settings.interval);
                    self.scheduler.sleep(self.settings.interval).await;
                    PollState::Polling(client)
                }
                Err(e) => {
                    warn!("Polling Varnish failed: {}", e);
                    PollState::Disconnected
                }
            },
        }
    }

    async fn connect(&self, policy: &mut ReconnectPolicy) -> PollState<C::Stream> {
        if let Some(delay) = policy.next_delay() {
            debug!("Sleeping {:?} before connecting", delay);
            self.scheduler.sleep(delay).await;
        }

        debug!(attempt = policy.attempts(), "Connecting to Varnish");
        match self.connector.connect().await {
            Ok(stream) => PollState::Authenticating(VarnishClient::new(stream)),
            Err(e) => {
                warn!("Connection failed: {}", e);
                PollState::Disconnected
            }
        }
    }

    async fn poll(&self, client: &mut VarnishClient<C::Stream>) -> Result<Snapshot, VarnishError> {
        debug!("Getting list from Varnish");
        let response = client.command_for_success(LIST_COMMAND, &[]).await?;
        let snapshot = self.aggregator.aggregate(&response.body);
        self.collector.publish(&snapshot, self.settings.reset_on_scan);
        Ok(snapshot)
    }
}
