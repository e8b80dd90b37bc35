//! Publishing readings to the message broker.

use std::time::{Duration, Instant};

use rumqttc::{Client, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use tracing::{debug, trace, warn};

use crate::{config::MqttConfiguration, error::PublishError};

/// The publish capability the acquisition loop needs from a broker.
pub trait Broker {
    fn connect(&mut self) -> Result<(), PublishError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// Best-effort: failures are logged, never returned.
    fn disconnect(&mut self);
}

/// A broker connection held open for one batch of readings.
///
/// Dropping an open session disconnects it.
pub struct PublishSession<'a, B: Broker + ?Sized> {
    broker: &'a mut B,
    open: bool,
}

impl<'a, B: Broker + ?Sized> PublishSession<'a, B> {
    pub fn open(broker: &'a mut B) -> Result<Self, PublishError> {
        broker.connect()?;
        Ok(Self { broker, open: true })
    }

    /// Send one message. A failure leaves the session open.
    pub fn publish(&mut self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.broker.publish(topic, payload.as_bytes())
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.open {
            self.open = false;
            self.broker.disconnect();
        }
    }
}

impl<B: Broker + ?Sized> Drop for PublishSession<'_, B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// MQTT broker reached through `rumqttc`'s blocking client.
pub struct MqttBroker {
    options: MqttOptions,
    /// Upper bound on every exchange with the broker.
    timeout: Duration,
    session: Option<(Client, Connection)>,
}

impl MqttBroker {
    pub fn new(config: &MqttConfiguration) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive));
        options.set_clean_session(true);
        if !config.username.is_empty() {
            options.set_credentials(&config.username, &config.password);
        }
        Self {
            options,
            timeout: Duration::from_millis(config.timeout_ms),
            session: None,
        }
    }
}

/// Poll the connection until `until` picks an event, an error occurs or time
/// runs out.
fn drive<T>(
    connection: &mut Connection,
    timeout: Duration,
    mut until: impl FnMut(&Event) -> Option<T>,
) -> Result<T, String> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(format!("no answer from broker within {timeout:?}"));
        }
        match connection.recv_timeout(remaining) {
            Ok(Ok(event)) => {
                trace!(?event, "mqtt event");
                if let Some(found) = until(&event) {
                    return Ok(found);
                }
            }
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => return Err(format!("no answer from broker within {timeout:?}")),
        }
    }
}

impl Broker for MqttBroker {
    fn connect(&mut self) -> Result<(), PublishError> {
        let (host, port) = self.options.broker_address();
        let (client, mut connection) = Client::new(self.options.clone(), 10);

        drive(&mut connection, self.timeout, |event| {
            matches!(event, Event::Incoming(Packet::ConnAck(_))).then_some(())
        })
        .map_err(|e| PublishError::Connect(format!("{host}:{port}: {e}")))?;

        debug!(%host, port, "Connected to broker");
        self.session = Some((client, connection));
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let (client, connection) = self.session.as_mut().ok_or(PublishError::NotConnected)?;

        client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| PublishError::Send(e.to_string()))?;

        drive(connection, self.timeout, |event| {
            matches!(event, Event::Incoming(Packet::PubAck(_))).then_some(())
        })
        .map_err(|e| PublishError::Send(format!("{topic}: {e}")))
    }

    fn disconnect(&mut self) {
        let Some((client, mut connection)) = self.session.take() else {
            return;
        };
        if let Err(e) = client.disconnect() {
            warn!(error = %e, "Unable to request broker disconnect");
            return;
        }
        // Drain until the DISCONNECT packet has gone out.
        let sent = drive(&mut connection, self.timeout, |event| {
            matches!(event, Event::Outgoing(Outgoing::Disconnect)).then_some(())
        });
        if let Err(e) = sent {
            debug!(error = %e, "Broker disconnect not confirmed");
        }
    }
}
