//! Rad Pro Monitor
//!
//! A headless monitor that polls a Rad Pro Geiger counter over its USB serial
//! link and reports count rates, dose rate and device status until Ctrl-C.

mod demo;
mod settings;

use anyhow::Context;
use clap::Parser;
use radpro_poll::{
    Connector, Coordinator, CoordinatorCommand, DeviceSnapshot, SerialConnector,
};
use settings::Settings;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Poll a Rad Pro radiation detector and report its readings
#[derive(Debug, Parser)]
#[command(name = "radpro-monitor", version, about)]
struct Args {
    /// Serial port path, or "auto" to probe for the device
    #[arg(long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Seconds between poll cycles
    #[arg(long, value_name = "SECONDS")]
    scan_interval: Option<u64>,

    /// Poll a virtual device instead of real hardware
    #[arg(long)]
    simulate: bool,

    /// Write the resulting settings back to the settings file
    #[arg(long)]
    save: bool,

    /// Print each snapshot as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(port) = &self.port {
            settings.port = port.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            settings.baud_rate = baud_rate;
        }
        if let Some(scan_interval) = self.scan_interval {
            settings.scan_interval_s = scan_interval;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so that --json output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "radpro_monitor=info,radpro_poll=info,radpro_detect=info,radpro_protocol=info,radpro_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut settings = Settings::load();
    args.apply(&mut settings);
    settings.validate()?;

    if args.save {
        let path = settings.save().context("saving settings")?;
        info!("Saved settings to {}", path.display());
    }

    info!("Starting Rad Pro Monitor");

    let config = settings.poller_config();
    if args.simulate {
        let connector = demo::SimulatedConnector::new(settings.serial_settings().timeout);
        monitor(Coordinator::new(config, connector)?, args.json).await
    } else {
        let connector = SerialConnector::new(settings.serial_settings());
        monitor(Coordinator::new(config, connector)?, args.json).await
    }
}

/// Run `coordinator` and report every published change until Ctrl-C
async fn monitor<C>(coordinator: Coordinator<C>, json: bool) -> anyhow::Result<()>
where
    C: Connector + 'static,
    C::Io: 'static,
{
    let mut reader = coordinator.subscribe();
    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(coordinator.run(rx));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down");
                break;
            }
            changed = reader.changed() => match changed {
                Some(snapshot) => report(&snapshot, json)?,
                None => break,
            },
        }
    }

    // The receiver is gone if the coordinator already stopped
    let _ = tx.send(CoordinatorCommand::Shutdown).await;
    task.await.context("polling task failed")?;
    Ok(())
}

fn report(snapshot: &DeviceSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    if !snapshot.available {
        warn!(
            "Device unavailable: {}",
            snapshot.last_error.as_deref().unwrap_or("unknown error")
        );
        return Ok(());
    }

    info!(
        "{} cps={} cpm={} dose={} battery={}",
        snapshot.device_id().unwrap_or("device"),
        fmt_value(snapshot.cps, 3, ""),
        fmt_value(snapshot.cpm, 1, ""),
        fmt_value(snapshot.dose_rate, 3, " µSv/h"),
        fmt_value(snapshot.battery_voltage, 2, " V"),
    );
    Ok(())
}

fn fmt_value(value: Option<f64>, decimals: usize, unit: &str) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}{unit}"),
        None => "-".to_string(),
    }
}
