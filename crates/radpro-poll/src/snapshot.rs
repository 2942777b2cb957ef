//! Published device state

use std::time::SystemTime;

use radpro_protocol::DeviceIdentity;
use serde::Serialize;
use tokio::sync::watch;

use crate::metrics::DerivedMetrics;

/// Latest known state of the device, replaced as a whole on every update
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub cps: Option<f64>,
    pub cpm: Option<f64>,
    /// µSv/h
    pub dose_rate: Option<f64>,
    pub pulse_count: Option<u64>,
    pub identity: Option<DeviceIdentity>,
    pub tube_sensitivity: Option<f64>,
    pub battery_voltage: Option<f64>,
    pub last_update: Option<SystemTime>,
    /// False after a failed cycle until the next successful one
    pub available: bool,
    pub last_error: Option<String>,
}

impl DeviceSnapshot {
    /// Assemble a fresh snapshot from one successful cycle
    pub fn from_cycle(
        metrics: DerivedMetrics,
        pulse_count: u64,
        identity: Option<DeviceIdentity>,
        tube_sensitivity: Option<f64>,
        battery_voltage: Option<f64>,
    ) -> Self {
        Self {
            cps: Some(metrics.cps),
            cpm: Some(metrics.cpm),
            dose_rate: metrics.dose_rate,
            pulse_count: Some(pulse_count),
            identity,
            tube_sensitivity,
            battery_voltage,
            last_update: Some(SystemTime::now()),
            available: true,
            last_error: None,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.device_id.as_str())
    }
}

/// Read side of the published snapshot; cheap to clone
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<DeviceSnapshot>,
}

impl SnapshotReader {
    /// The latest snapshot, never a partially updated one
    pub fn current(&self) -> DeviceSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published change
    ///
    /// Returns `None` once the coordinator is gone.
    pub async fn changed(&mut self) -> Option<DeviceSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Write side, owned by the coordinator
#[derive(Debug)]
pub(crate) struct SnapshotPublisher {
    tx: watch::Sender<DeviceSnapshot>,
}

impl SnapshotPublisher {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(DeviceSnapshot::default());
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn current(&self) -> DeviceSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn publish(&self, snapshot: DeviceSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Flag the device unavailable, keeping the last good values
    pub(crate) fn mark_unavailable(&self, error: String) {
        self.tx.send_modify(|s| {
            s.available = false;
            s.last_error = Some(error);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readers_see_whole_snapshots() {
        let publisher = SnapshotPublisher::new();
        let mut reader = publisher.subscribe();
        assert_eq!(reader.current(), DeviceSnapshot::default());

        let metrics = DerivedMetrics {
            cps: 5.0,
            cpm: 300.0,
            dose_rate: Some(1.95),
        };
        publisher.publish(DeviceSnapshot::from_cycle(metrics, 1005, None, Some(153.8), None));

        let seen = reader.changed().await.unwrap();
        assert_eq!(seen.cpm, Some(300.0));
        assert_eq!(seen.pulse_count, Some(1005));
        assert!(seen.available);
    }

    #[tokio::test]
    async fn test_unavailable_keeps_values() {
        let publisher = SnapshotPublisher::new();
        let reader = publisher.subscribe();
        let metrics = DerivedMetrics {
            cps: 1.0,
            cpm: 60.0,
            dose_rate: None,
        };
        publisher.publish(DeviceSnapshot::from_cycle(metrics, 10, None, None, None));
        publisher.mark_unavailable("device disconnected".into());

        let snapshot = reader.current();
        assert!(!snapshot.available);
        assert_eq!(snapshot.cps, Some(1.0));
        assert_eq!(snapshot.last_error.as_deref(), Some("device disconnected"));
        assert_eq!(publisher.current(), snapshot);
    }

    #[tokio::test]
    async fn test_changed_ends_with_publisher() {
        let publisher = SnapshotPublisher::new();
        let mut reader = publisher.subscribe();
        drop(publisher);
        assert_eq!(reader.changed().await, None);
    }
}
