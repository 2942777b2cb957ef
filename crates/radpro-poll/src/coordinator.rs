//! Polling coordinator
//!
//! The coordinator owns the link to one device and drives poll cycles on a
//! fixed cadence. Each cycle reads whatever slow fields are due, then the
//! pulse counter, derives rates and publishes a new [`DeviceSnapshot`].
//!
//! Failures never escape the loop: a failed cycle flags the snapshot as
//! unavailable, and connection-level failures drop the link so that the next
//! cycle reconnects through the [`Connector`].

use radpro_protocol::DeviceIdentity;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::DeviceClient;
use crate::config::PollerConfig;
use crate::connector::Connector;
use crate::error::{ExchangeError, PollError};
use crate::metrics::MetricsEngine;
use crate::schedule::RefreshSchedule;
use crate::snapshot::{DeviceSnapshot, SnapshotPublisher, SnapshotReader};

/// Where the coordinator is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// Waiting for the next tick
    Idle,
    /// A cycle is in flight
    Polling,
    /// The last cycle completed
    Updated,
    /// The last cycle failed
    Degraded,
}

/// Result of one poll cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// New metrics were published
    Published(DeviceSnapshot),
    /// The cycle succeeded but produced no metrics (baseline, counter reset
    /// or clock glitch); the snapshot was left untouched
    NoMetrics,
    /// The cycle failed and the snapshot was flagged unavailable
    Degraded(PollError),
}

/// Control messages for [`Coordinator::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorCommand {
    /// Re-read every slow field on the next cycle
    RefreshNow,
    /// Stop polling and close the link
    Shutdown,
}

/// Slow fields kept between their refreshes
#[derive(Debug, Default)]
struct CachedFields {
    identity: Option<DeviceIdentity>,
    sensitivity: Option<f64>,
    battery_voltage: Option<f64>,
}

impl CachedFields {
    async fn refresh_sensitivity<S>(&mut self, client: &DeviceClient<S>) -> Result<(), ExchangeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match client.read_tube_sensitivity().await {
            Ok(value) => {
                debug!("Tube sensitivity {}", value);
                self.sensitivity = Some(value);
            }
            Err(e) if e.is_connection_level() => return Err(e),
            Err(e) => warn!("{}; keeping {:?}", e, self.sensitivity),
        }
        Ok(())
    }

    /// Re-read device id and battery voltage
    ///
    /// Returns `true` when a different device answered than the one cached;
    /// the cached sensitivity and battery voltage belong to the old device
    /// and are dropped in that case.
    async fn refresh_device_info<S>(&mut self, client: &DeviceClient<S>) -> Result<bool, ExchangeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut replaced = false;
        match client.read_device_id().await {
            Ok(identity) => {
                if self.identity.as_ref() != Some(&identity) {
                    info!(
                        "Device {} ({})",
                        identity.device_id,
                        identity.hardware_id.as_deref().unwrap_or("unknown hardware")
                    );
                }
                if let Some(previous) = &self.identity {
                    if previous.device_id != identity.device_id {
                        warn!(
                            "Device changed from {} to {}",
                            previous.device_id, identity.device_id
                        );
                        self.sensitivity = None;
                        self.battery_voltage = None;
                        replaced = true;
                    }
                }
                self.identity = Some(identity);
            }
            Err(e) if e.is_connection_level() => return Err(e),
            Err(e) => warn!("{}; keeping cached identity", e),
        }

        match client.read_battery_voltage().await {
            Ok(value) => {
                debug!("Battery voltage {}", value);
                self.battery_voltage = Some(value);
            }
            Err(e) if e.is_connection_level() => return Err(e),
            Err(e) => warn!("{}; keeping {:?}", e, self.battery_voltage),
        }
        Ok(replaced)
    }
}

/// Drives poll cycles against one device
pub struct Coordinator<C: Connector> {
    config: PollerConfig,
    connector: C,
    client: Option<DeviceClient<C::Io>>,
    engine: MetricsEngine,
    schedule: RefreshSchedule,
    cache: CachedFields,
    publisher: SnapshotPublisher,
    phase: PollPhase,
}

impl<C: Connector> Coordinator<C> {
    pub fn new(config: PollerConfig, connector: C) -> Result<Self, PollError> {
        config.validate()?;
        Ok(Self {
            engine: MetricsEngine::new(config.averaging_window),
            schedule: RefreshSchedule::from_config(&config),
            config,
            connector,
            client: None,
            cache: CachedFields::default(),
            publisher: SnapshotPublisher::new(),
            phase: PollPhase::Idle,
        })
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// A reader for published snapshots
    pub fn subscribe(&self) -> SnapshotReader {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        self.publisher.current()
    }

    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connect and read every slow field once
    ///
    /// Slow-field failures are logged and left for later cycles; only a
    /// connection failure is returned.
    pub async fn setup(&mut self) -> Result<(), PollError> {
        let result = self.initial_read().await;
        if let Err(e) = &result {
            if e.is_connection_level() {
                self.disconnect().await;
            }
            self.publisher.mark_unavailable(e.to_string());
        }
        result
    }

    /// Run one poll cycle
    pub async fn poll_once(&mut self) -> CycleOutcome {
        self.phase = PollPhase::Polling;

        match self.run_cycle().await {
            Ok(Some(snapshot)) => {
                self.phase = PollPhase::Updated;
                self.publisher.publish(snapshot.clone());
                CycleOutcome::Published(snapshot)
            }
            Ok(None) => {
                self.phase = PollPhase::Updated;
                CycleOutcome::NoMetrics
            }
            Err(e) => {
                warn!("Poll cycle failed: {}", e);
                if e.is_connection_level() {
                    self.disconnect().await;
                }
                self.phase = PollPhase::Degraded;
                self.publisher.mark_unavailable(e.to_string());
                CycleOutcome::Degraded(e)
            }
        }
    }

    /// Make every slow field due in the next cycle
    pub fn refresh_now(&mut self) {
        self.schedule.force();
    }

    /// Close the link; polling can resume later by reconnecting
    pub async fn close(&mut self) {
        self.disconnect().await;
        self.phase = PollPhase::Idle;
    }

    /// Poll on the configured cadence until shut down
    ///
    /// A shutdown arriving mid-cycle cancels the cycle; the link is closed
    /// before this returns.
    pub async fn run(mut self, mut commands: mpsc::Receiver<CoordinatorCommand>) {
        info!(
            "Polling every {:?} (sensitivity every {} cycles, device info every {} cycles)",
            self.config.scan_interval,
            self.config.sensitivity_period(),
            self.config.device_info_period()
        );

        let mut refresh = false;
        let stopped = tokio::select! {
            result = self.setup() => {
                if let Err(e) = result {
                    warn!("Initial connection failed: {}; retrying every cycle", e);
                }
                false
            }
            _ = wait_for_shutdown(&mut commands, &mut refresh) => true,
        };
        if refresh {
            self.schedule.force();
        }

        if !stopped {
            let mut ticker = interval(self.config.scan_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately and setup just read the device
            ticker.tick().await;

            loop {
                self.phase = PollPhase::Idle;

                let shutdown = tokio::select! {
                    _ = ticker.tick() => false,
                    command = commands.recv() => match command {
                        Some(CoordinatorCommand::RefreshNow) => {
                            self.schedule.force();
                            continue;
                        }
                        Some(CoordinatorCommand::Shutdown) | None => true,
                    },
                };
                if shutdown {
                    break;
                }

                let mut refresh = false;
                let cancelled = tokio::select! {
                    outcome = self.poll_once() => {
                        if let CycleOutcome::Published(snapshot) = &outcome {
                            debug!(
                                "cps={:?} cpm={:?} dose_rate={:?}",
                                snapshot.cps, snapshot.cpm, snapshot.dose_rate
                            );
                        }
                        false
                    }
                    _ = wait_for_shutdown(&mut commands, &mut refresh) => true,
                };
                if refresh {
                    self.schedule.force();
                }
                if cancelled {
                    info!("Shutdown requested during a poll cycle");
                    break;
                }
            }
        }

        self.close().await;
        info!("Polling stopped");
    }

    async fn ensure_connected(&mut self) -> Result<(), PollError> {
        if self.client.is_none() {
            let transport = self.connector.connect().await?;
            info!("Connected to {}", transport.descriptor().path);
            self.client = Some(DeviceClient::new(transport, self.config.exchange_delay));
            // Whatever answers on the new link has to identify itself again
            self.schedule.force();
        }
        Ok(())
    }

    async fn initial_read(&mut self) -> Result<(), PollError> {
        self.ensure_connected().await?;
        let client = self.client.as_ref().ok_or(PollError::NotConnected)?;
        if self.cache.refresh_device_info(client).await? {
            self.engine.reset();
        }
        self.cache.refresh_sensitivity(client).await?;
        Ok(())
    }

    async fn run_cycle(&mut self) -> Result<Option<DeviceSnapshot>, PollError> {
        self.ensure_connected().await?;
        let plan = self.schedule.next_cycle();
        let client = self.client.as_ref().ok_or(PollError::NotConnected)?;

        if plan.device_info || self.cache.identity.is_none() {
            if self.cache.refresh_device_info(client).await? {
                self.engine.reset();
            }
        }
        if plan.sensitivity || self.cache.sensitivity.is_none() {
            self.cache.refresh_sensitivity(client).await?;
        }

        let sample = client.read_pulse_count().await?;
        let Some(pulse_count) = sample.value.as_count() else {
            return Ok(None);
        };
        let Some(metrics) = self.engine.update(&sample, self.cache.sensitivity) else {
            return Ok(None);
        };

        Ok(Some(DeviceSnapshot::from_cycle(
            metrics,
            pulse_count,
            self.cache.identity.clone(),
            self.cache.sensitivity,
            self.cache.battery_voltage,
        )))
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            client.close().await;
            info!("Disconnected from {}", client.port());
        }
    }
}

/// Resolve once a shutdown is requested, noting any refresh requests seen
async fn wait_for_shutdown(
    commands: &mut mpsc::Receiver<CoordinatorCommand>,
    refresh: &mut bool,
) {
    loop {
        match commands.recv().await {
            Some(CoordinatorCommand::RefreshNow) => *refresh = true,
            Some(CoordinatorCommand::Shutdown) | None => return,
        }
    }
}
