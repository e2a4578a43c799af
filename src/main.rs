use ams_han_mqtt::constants::{
    AMPERE_SENSOR_IDX, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_TOPIC, USAGE_SENSOR_IDX,
    VOLT_SENSOR_IDX,
};
use ams_han_mqtt::{
    init_logger, FrameDecoder, MqttConfig, Parity, Pipeline, Publisher, SensorIds, SerialConfig,
    Telemetry,
};
use anyhow::Context;
use clap::Parser;
use log::info;
use std::time::Duration;

/// Time the publish worker gets to flush queued updates on exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "ams-han-mqtt")]
#[command(about = "Publish AMS/HAN smart meter readings to MQTT as Domoticz updates")]
struct Cli {
    /// url for the mqtt broker
    #[arg(short = 'm', long, env = "AMS_MQTT_URL", default_value = "tcp://localhost:1883")]
    mqtt_url: String,

    /// Mbus serial adapter address (e.g. /dev/ttyUSB0)
    #[arg(short = 'a', long, env = "AMS_SERIAL_ADDRESS", default_value = "/dev/ttyUSB0")]
    address: String,

    /// baud rate
    #[arg(short = 'b', long, default_value_t = 2400)]
    baudrate: u32,

    /// data bits
    #[arg(short = 'd', long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(5..=8))]
    databits: u8,

    /// stop bits
    #[arg(short = 's', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    stopbits: u8,

    /// parity (N/E/O)
    #[arg(short = 'p', long, default_value = "E")]
    parity: Parity,

    /// verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// topic commands are published to
    #[arg(long, default_value = DEFAULT_TOPIC)]
    topic: String,

    #[arg(long, default_value_t = AMPERE_SENSOR_IDX)]
    current_idx: u32,

    #[arg(long, default_value_t = VOLT_SENSOR_IDX)]
    voltage_idx: u32,

    #[arg(long, default_value_t = USAGE_SENSOR_IDX)]
    usage_idx: u32,
}

impl Cli {
    fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            address: self.address.clone(),
            baudrate: self.baudrate,
            data_bits: self.databits,
            stop_bits: self.stopbits,
            parity: self.parity,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }

    fn sensor_ids(&self) -> SensorIds {
        SensorIds {
            current: self.current_idx,
            voltage: self.voltage_idx,
            usage: self.usage_idx,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let mqtt = MqttConfig::new(cli.mqtt_url.clone()).with_topic(cli.topic.clone());
    let publisher = Publisher::connect(&mqtt)
        .await
        .with_context(|| format!("connecting to MQTT broker {}", mqtt.url))?;

    let serial = cli.serial_config();
    let source = match serial.open() {
        Ok(source) => source,
        Err(e) => {
            publisher.shutdown(SHUTDOWN_GRACE).await;
            return Err(e).with_context(|| format!("opening serial port {}", serial.address));
        }
    };
    info!("connected");

    let mut pipeline = Pipeline::new(
        FrameDecoder::new(source, cli.verbose),
        Telemetry::new(cli.sensor_ids()),
        cli.verbose,
    );
    let err = pipeline.run(&publisher).await;

    publisher.shutdown(SHUTDOWN_GRACE).await;
    info!("Stopped: {:?}", pipeline.stats());

    Err(err).context("meter stream ended")
}
