//! # MQTT Publisher
//!
//! Decouples telemetry processing from the broker round trip. [`Publisher::publish`]
//! serializes an update and puts it on a bounded queue. A worker task drains
//! the queue in order and hands each payload to the broker client.
//!
//! With `rumqttc` the connection is driven by a second task polling the event
//! loop. Polling after a failure reconnects, so reconnection is left entirely
//! to the client. [`ConnectionMonitor`] counts lost connections for the logs.

use crate::constants::{CLIENT_ID_PREFIX, DEFAULT_TOPIC, OUTBOUND_QUEUE_CAPACITY};
use crate::error::AmsError;
use crate::telemetry::SensorUpdate;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use url::Url;

/// Default MQTT port when the broker URL has none
const DEFAULT_MQTT_PORT: u16 = 1883;

/// Pause between event loop polls after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Time the event loop gets to send the final DISCONNECT
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub url: String,
    pub client_id: String,
    pub topic: String,
    pub keep_alive: Duration,
    pub queue_capacity: usize,
}

impl MqttConfig {
    /// Settings for `url` with a freshly generated client id.
    pub fn new(url: impl Into<String>) -> Self {
        MqttConfig {
            url: url.into(),
            client_id: generate_client_id(),
            topic: DEFAULT_TOPIC.to_string(),
            keep_alive: Duration::from_secs(30),
            queue_capacity: OUTBOUND_QUEUE_CAPACITY,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Host and port from a `tcp://` or `mqtt://` broker URL.
    pub fn broker_address(&self) -> Result<(String, u16), AmsError> {
        let url = Url::parse(&self.url)
            .map_err(|e| AmsError::Config(format!("invalid broker url '{}': {}", self.url, e)))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            other => {
                return Err(AmsError::Config(format!(
                    "unsupported broker scheme '{}' (use tcp:// or mqtt://)",
                    other
                )))
            }
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AmsError::Config(format!("broker url '{}' has no host", self.url)))?;

        Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
    }
}

/// Client id that stays unique across restarts.
pub fn generate_client_id() -> String {
    format!("{}{}", CLIENT_ID_PREFIX, Utc::now().timestamp_subsec_nanos())
}

/// The part of a broker client the publish worker needs.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), AmsError>;
    async fn disconnect(&self) -> Result<(), AmsError>;
}

#[async_trait]
impl BrokerClient for AsyncClient {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), AmsError> {
        self.publish_bytes(topic, QoS::ExactlyOnce, false, payload)
            .await
            .map_err(|e| AmsError::Broker(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), AmsError> {
        AsyncClient::disconnect(self)
            .await
            .map_err(|e| AmsError::Broker(e.to_string()))
    }
}

/// Tracks connection state and counts every connected to disconnected
/// transition once, however many reconnect attempts follow.
#[derive(Debug, Default)]
pub struct ConnectionMonitor {
    connected: bool,
    lost: u64,
}

impl ConnectionMonitor {
    pub fn on_connected(&mut self) {
        self.connected = true;
        info!("Connected to MQTT broker!");
    }

    /// Records a connection error. Returns the running loss count when this
    /// error ended an established connection.
    pub fn on_connection_error(&mut self, err: &dyn fmt::Display) -> Option<u64> {
        if !self.connected {
            debug!("MQTT reconnect attempt failed: {}", err);
            return None;
        }
        self.connected = false;
        self.lost += 1;
        warn!("MQTT connection lost ({} times): {}", self.lost, err);
        Some(self.lost)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn lost_count(&self) -> u64 {
        self.lost
    }
}

/// Handle to the outbound queue and its worker.
pub struct Publisher {
    queue: mpsc::Sender<Bytes>,
    worker: JoinHandle<()>,
    event_loop: Option<JoinHandle<()>>,
}

impl Publisher {
    /// Connects to the broker and starts publishing.
    ///
    /// Fails if the first connection attempt does not succeed; later losses are
    /// handled by reconnecting.
    pub async fn connect(config: &MqttConfig) -> Result<Self, AmsError> {
        let (host, port) = config.broker_address()?;
        let mut options = MqttOptions::new(&config.client_id, host, port);
        options.set_keep_alive(config.keep_alive);

        let (client, mut event_loop) = AsyncClient::new(options, config.queue_capacity);
        let mut monitor = ConnectionMonitor::default();

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    monitor.on_connected();
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(AmsError::Broker(format!(
                        "could not connect to {}: {}",
                        config.url, e
                    )))
                }
            }
        }
        debug!("MQTT client id {}", config.client_id);

        let driver = tokio::spawn(drive_event_loop(event_loop, monitor));
        let mut publisher = Publisher::start(client, config.topic.clone(), config.queue_capacity);
        publisher.event_loop = Some(driver);
        Ok(publisher)
    }

    /// Starts a publish worker on top of any broker client.
    pub fn start<C: BrokerClient>(client: C, topic: String, capacity: usize) -> Self {
        let (queue, rx) = mpsc::channel(capacity);
        let worker = tokio::spawn(publish_worker(client, topic, rx));
        Publisher {
            queue,
            worker,
            event_loop: None,
        }
    }

    /// Serializes `update` and queues it for delivery.
    ///
    /// Waits only while the queue is full. An update that fails to serialize
    /// is logged and dropped.
    pub async fn publish(&self, update: &SensorUpdate) -> Result<(), AmsError> {
        let payload = serde_json::to_vec(update).map_err(|e| {
            error!("Couldn't marshal command: {:?}", update);
            AmsError::from(e)
        })?;
        self.enqueue(Bytes::from(payload)).await
    }

    /// Queues an already serialized payload.
    pub async fn enqueue(&self, payload: Bytes) -> Result<(), AmsError> {
        self.queue
            .send(payload)
            .await
            .map_err(|_| AmsError::QueueClosed)
    }

    /// Closes the queue and gives the worker `grace` to deliver what is left.
    pub async fn shutdown(self, grace: Duration) {
        let Publisher {
            queue,
            worker,
            event_loop,
        } = self;
        drop(queue);

        match timeout(grace, worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Publish worker failed: {}", e),
            Err(_) => warn!("Publish worker did not drain within {:?}", grace),
        }

        if let Some(mut driver) = event_loop {
            if timeout(DISCONNECT_GRACE, &mut driver).await.is_err() {
                driver.abort();
            }
        }
    }
}

async fn publish_worker<C: BrokerClient>(client: C, topic: String, mut rx: mpsc::Receiver<Bytes>) {
    while let Some(payload) = rx.recv().await {
        if let Err(e) = client.publish(&topic, payload).await {
            error!("Failed to publish to {}: {}", topic, e);
        }
    }

    if let Err(e) = client.disconnect().await {
        debug!("MQTT disconnect failed: {}", e);
    }
    info!("Publish worker stopped");
}

async fn drive_event_loop(mut event_loop: EventLoop, mut monitor: ConnectionMonitor) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => monitor.on_connected(),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                monitor.on_connection_error(&e);
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
    debug!(
        "MQTT event loop stopped after {} lost connections",
        monitor.lost_count()
    );
}
