//! Rad Pro polling stack
//!
//! This crate turns a Rad Pro device on a serial port into a stream of
//! published readings:
//!
//! - [`Transport`] moves request/response lines over an open link
//! - [`DeviceClient`] performs typed, serialized exchanges
//! - [`MetricsEngine`] derives count rates and dose rate from the pulse counter
//! - [`Coordinator`] runs poll cycles on a fixed cadence, refreshes slow
//!   fields on their own schedule, reconnects after failures, and publishes
//!   [`DeviceSnapshot`]s that any number of [`SnapshotReader`]s can observe
//!
//! # Example
//!
//! ```rust,no_run
//! use radpro_poll::{Coordinator, CoordinatorCommand, PollerConfig, SerialConnector, SerialSettings};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), radpro_poll::PollError> {
//! let connector = SerialConnector::new(SerialSettings::default());
//! let coordinator = Coordinator::new(PollerConfig::default(), connector)?;
//! let mut reader = coordinator.subscribe();
//!
//! let (tx, rx) = mpsc::channel(4);
//! let task = tokio::spawn(coordinator.run(rx));
//!
//! if let Some(snapshot) = reader.changed().await {
//!     println!("{:?} µSv/h", snapshot.dose_rate);
//! }
//!
//! let _ = tx.send(CoordinatorCommand::Shutdown).await;
//! let _ = task.await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connector;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod schedule;
pub mod snapshot;
pub mod transport;

pub use client::{DeviceClient, RawSample};
pub use config::{
    PollerConfig, PortSetting, SerialSettings, DEFAULT_AVERAGING_WINDOW_S,
    DEFAULT_DEVICEINFO_INTERVAL_S, DEFAULT_EXCHANGE_DELAY_MS, DEFAULT_SCAN_INTERVAL_S,
    DEFAULT_SENSITIVITY_INTERVAL_S, DEFAULT_TIMEOUT_MS, MAX_AVERAGING_WINDOW_S,
};
pub use connector::{Connector, PortAccess, SerialConnector, SystemPorts};
pub use coordinator::{Coordinator, CoordinatorCommand, CycleOutcome, PollPhase};
pub use error::{ExchangeError, ExchangeFailure, PollError, TransportError};
pub use metrics::{DerivedMetrics, MetricsEngine, RateState};
pub use schedule::{RefreshPlan, RefreshSchedule};
pub use snapshot::{DeviceSnapshot, SnapshotReader};
pub use transport::{ConnectionDescriptor, Transport};
