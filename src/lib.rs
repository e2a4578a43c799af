//! # ams-han-mqtt - AMS/HAN Smart Meter to MQTT Bridge
//!
//! Reads the push telegrams of an AMS/HAN smart meter from an M-Bus serial
//! adapter and publishes the readings as Domoticz `udevice` commands on an MQTT
//! broker.
//!
//! ## Pipeline
//!
//! ```text
//! serial port -> ByteSource -> FrameDecoder -> Telemetry -> Publisher -> broker
//! ```
//!
//! - [`ams::serial`] streams bytes from the serial adapter on a reader task
//! - [`ams::decoder`] assembles HDLC frames, checks them and decodes the lists
//! - [`telemetry`] turns three phase readings into current, voltage and usage updates
//! - [`publisher`] queues serialized updates for a publish worker backed by `rumqttc`
//! - [`pipeline`] ties them together
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ams_han_mqtt::{
//!     FrameDecoder, MqttConfig, Pipeline, Publisher, SensorIds, SerialConfig, Telemetry,
//! };
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), ams_han_mqtt::AmsError> {
//! let publisher = Publisher::connect(&MqttConfig::new("tcp://localhost:1883")).await?;
//! let source = SerialConfig::default().open()?;
//! let mut pipeline = Pipeline::new(
//!     FrameDecoder::new(source, false),
//!     Telemetry::new(SensorIds::default()),
//!     false,
//! );
//! let err = pipeline.run(&publisher).await;
//! publisher.shutdown(Duration::from_secs(5)).await;
//! Err(err)
//! # }
//! ```

pub mod ams;
pub mod constants;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod publisher;
pub mod telemetry;
pub mod util;

pub use crate::error::AmsError;
pub use crate::logging::init_logger;

pub use ams::{AmsMessage, ByteSource, FrameDecoder, Parity, SerialConfig};
pub use pipeline::{Pipeline, PipelineStats};
pub use publisher::{BrokerClient, ConnectionMonitor, MqttConfig, Publisher};
pub use telemetry::{SensorIds, SensorUpdate, Telemetry};
