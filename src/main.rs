use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use emi_mqtt_bridge::{
    acquisition::Acquisition,
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    logging::{LogFormat, init_logging},
    publish::MqttBroker,
    serial::{SerialInterface, available_ports},
    transport::{ModbusRtu, RegisterTransport},
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "emi-mqtt-bridge", version, about = "Poll an EMI meter over Modbus RTU and publish readings to MQTT")]
struct Cli {
    /// Settings file.
    #[arg(short, long, env = "EMI_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter, overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll and publish until stopped (default).
    Run,
    /// Read the meter clock once and print it.
    Clock,
    /// List the serial ports on this machine.
    Ports,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&cli.config),
        Command::Clock => clock(&cli.config),
        Command::Ports => ports(),
    }
}

fn open_meter(config: &AppConfig) -> anyhow::Result<ModbusRtu<SerialInterface>> {
    let port = SerialInterface::open(&config.modbus)
        .with_context(|| format!("cannot open {}", config.modbus.device))?;
    Ok(ModbusRtu::new(port, config.modbus.slave_id).with_debug(config.modbus.debug))
}

fn run(path: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load(path)?;
    let descriptors = config.descriptors()?;
    info!(
        config = %path.display(),
        device = %config.modbus.device,
        broker = %config.emi_config.mqtt_configuration.host,
        "Configuration loaded"
    );

    let meter = open_meter(&config)?;
    let broker = MqttBroker::new(&config.emi_config.mqtt_configuration);
    Acquisition::new(descriptors, meter, broker, config.acquisition.timing()).run()
}

fn clock(path: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load(path)?;
    let mut meter = open_meter(&config)?;

    let clock = meter.read_clock().context("reading meter clock")?;
    let time = clock.to_utc().context("meter clock holds an invalid time")?;
    println!("Meter time: {}", time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
    println!("Deviation:  {} min", clock.deviation);
    if clock.status.daylight_saving_active() {
        println!("Daylight saving active");
    }
    Ok(())
}

fn ports() -> anyhow::Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found!");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}
