pub mod config;
pub mod device;
pub mod hardware;
pub mod mqtt;
pub mod network;
pub mod scheduler;

#[cfg(test)]
mod testing;

use crate::config::AgentConfig;
use crate::device::{DeviceStateMachine, Peripherals};
use crate::hardware::dht::IioDhtSensor;
use crate::hardware::gpio::GpioActuators;
use crate::hardware::simulated::{SimulatedActuators, SimulatedSensor};
use crate::mqtt::mqtt_handler::MqttHandler;
use crate::network::nmcli::NmcliLink;
use crate::network::simulated::SimulatedLink;
use crate::scheduler::clock::{Clock, SystemClock};
use crate::scheduler::DeviceLoop;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "roomnode")]
#[command(author, version, about = "Room controller agent: sensor telemetry and remote actuators over MQTT", long_about = None)]
struct Cli {
    /// Config file, defaults to <config dir>/roomnode/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulate actuators, sensor and Wi-Fi; the broker stays real
    #[arg(short, long)]
    simulate: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup()?;

    if cli.print_default_config {
        println!("{}", AgentConfig::default().to_toml()?);
        return Ok(());
    }

    let mut config = AgentConfig::load(cli.config.as_deref())?;
    if cli.simulate {
        config.simulation.enabled = true;
    }

    // rumqttc's blocking client drives its own runtime, so the device loop
    // gets a plain thread and this runtime only watches for signals.
    let cancel = CancellationToken::new();
    let (done_tx, mut done_rx) = oneshot::channel::<Result<()>>();
    let loop_cancel = cancel.clone();
    let worker = std::thread::Builder::new()
        .name("device-loop".to_string())
        .spawn(move || {
            let result = run_device(config, &loop_cancel);
            if done_tx.send(result).is_err() {
                error!("Device loop finished after main exited");
            }
        })
        .map_err(|e| eyre!("Failed to spawn device loop: {}", e))?;

    let outcome = tokio::select! {
        result = &mut done_rx => result,
        signal = shutdown_signal() => {
            signal?;
            cancel.cancel();
            (&mut done_rx).await
        }
    };

    if worker.join().is_err() {
        error!("Device loop panicked");
    }
    outcome.map_err(|_| eyre!("Device loop exited without reporting a result"))?
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

fn run_device(config: AgentConfig, cancel: &CancellationToken) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::start());
    let peripherals = build_peripherals(&config)?;
    let device = DeviceStateMachine::new(
        config.identity(),
        peripherals,
        clock.clone(),
        config.reconnect_policy(),
    );

    DeviceLoop::create(device, &config.timing, clock)
        .boot()
        .run(cancel);
    Ok(())
}

fn build_peripherals(config: &AgentConfig) -> Result<Peripherals> {
    let channel = Box::new(MqttHandler::new(config.mqtt.clone(), config.client_id()));

    if config.simulation.enabled {
        info!("Simulation mode: actuators, sensor and Wi-Fi are simulated");
        return Ok(Peripherals {
            actuators: Box::new(SimulatedActuators::default()),
            sensor: Box::new(SimulatedSensor::new(
                config.simulation.sensor_failure_rate,
            )),
            link: Box::new(SimulatedLink::new()),
            channel,
        });
    }

    let actuators = GpioActuators::open(&config.pins)
        .map_err(|e| eyre!("Failed to open GPIO outputs: {}", e))?;
    Ok(Peripherals {
        actuators: Box::new(actuators),
        sensor: Box::new(IioDhtSensor::new(&config.sensor.iio_device)),
        link: Box::new(NmcliLink::new(&config.wifi)),
        channel,
    })
}
