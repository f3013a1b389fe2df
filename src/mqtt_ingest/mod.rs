//! MqttIngest - broker subscription feeding the adapter
//!
//! ## Responsibilities
//!
//! - Maintain the broker connection (resubscribe on every ConnAck)
//! - Hand each published payload to the EventAdapter
//! - Publish accepted events on the EventHub
//!
//! Connection errors are logged and retried after a short delay; there is
//! no replay of messages missed while disconnected.

use crate::error::{Error, Result};
use crate::event_adapter::EventAdapter;
use crate::event_hub::EventHub;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const CHANNEL_CAPACITY: usize = 64;

/// MqttIngest instance
pub struct MqttIngest {
    broker_url: String,
    topics: Vec<String>,
    adapter: Arc<EventAdapter>,
    hub: Arc<EventHub>,
}

impl MqttIngest {
    /// Create new MqttIngest
    pub fn new(
        broker_url: String,
        topics: Vec<String>,
        adapter: Arc<EventAdapter>,
        hub: Arc<EventHub>,
    ) -> Self {
        Self {
            broker_url,
            topics,
            adapter,
            hub,
        }
    }

    /// Spawn the ingest loop
    pub fn start(self) -> Result<JoinHandle<()>> {
        let (host, port) = parse_broker_url(&self.broker_url)?;

        let mut options = MqttOptions::new(
            format!("exhibit-kiosk-{}", uuid::Uuid::new_v4().simple()),
            host,
            port,
        );
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);

        Ok(tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!(broker = %self.broker_url, "MQTT connected");
                        for topic in &self.topics {
                            match client.subscribe(topic, QoS::AtMostOnce).await {
                                Ok(()) => tracing::info!(topic = %topic, "MQTT subscribed"),
                                Err(e) => {
                                    tracing::error!(topic = %topic, error = %e, "MQTT subscribe failed")
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Some(event) =
                            self.adapter.normalize(&publish.topic, &publish.payload).await
                        {
                            self.hub.publish(event);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "MQTT connection error, retrying");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        }))
    }
}

/// Parse a `mqtt://host:port` URL into (host, port).
fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let rest = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::Config(format!("Invalid MQTT port in {}", url)))?;
            (host, port)
        }
        None => (rest, 1883),
    };

    if host.is_empty() {
        return Err(Error::Config(format!("Invalid MQTT URL: {}", url)));
    }
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url() {
        assert_eq!(
            parse_broker_url("mqtt://localhost:1883").unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_url("broker.local").unwrap(),
            ("broker.local".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_url("tcp://10.0.0.5:8883").unwrap(),
            ("10.0.0.5".to_string(), 8883)
        );
    }

    #[test]
    fn test_parse_broker_url_rejects_garbage() {
        assert!(parse_broker_url("mqtt://:1883").is_err());
        assert!(parse_broker_url("mqtt://host:notaport").is_err());
    }
}
