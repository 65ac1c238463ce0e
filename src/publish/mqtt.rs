use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::Publish;
use super::link::{ConnectionState, Link};
use crate::config::BrokerConfig;
use crate::error::{ConnectionError, PublishError};

/// Bounded request channel between [`AsyncClient`] and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// How long `disconnect` waits for the event-loop task to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A single MQTT session with the broker.
///
/// [`connect`](Self::connect) performs the handshake in the caller's task and
/// then hands the event loop to a background task. That task runs the
/// lifecycle callbacks and reconnects after an unexpected disconnect.
pub struct MqttPublisher {
    client: AsyncClient,
    link: Arc<Link>,
    eventloop: Mutex<Option<EventLoop>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    broker: String,
    connect_timeout: Duration,
    reconnect_delay: Duration,
}

impl fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttPublisher")
            .field("broker", &self.broker)
            .field("state", &self.link.state())
            .finish_non_exhaustive()
    }
}

impl MqttPublisher {
    /// Prepares the session. Nothing touches the network until `connect`.
    pub fn new(config: &BrokerConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options
            .set_credentials(&config.username, &config.password)
            .set_keep_alive(config.keep_alive)
            .set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        Self {
            client,
            link: Arc::new(Link::default()),
            eventloop: Mutex::new(Some(eventloop)),
            worker: Mutex::new(None),
            broker: format!("{}:{}", config.host, config.port),
            connect_timeout: config.connect_timeout,
            reconnect_delay: config.reconnect_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Opens the session and waits for the broker's CONNACK.
    ///
    /// On success the event loop moves to a background task. On failure it
    /// is kept, so `connect` may be called again.
    #[instrument(skip(self), fields(broker = %self.broker))]
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut slot = self.eventloop.lock().await;
        let Some(mut eventloop) = slot.take() else {
            return Err(ConnectionError::AlreadyStarted);
        };

        self.link.set(ConnectionState::Connecting);
        info!("Connecting to MQTT broker");

        let handshake =
            tokio::time::timeout(self.connect_timeout, await_connack(&mut eventloop)).await;
        let outcome = match handshake {
            Err(_) => Err(ConnectionError::Timeout {
                secs: self.connect_timeout.as_secs(),
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(code)) => {
                if self.link.on_connect(code) {
                    Ok(())
                } else {
                    Err(ConnectionError::Refused(format!("{code:?}")))
                }
            }
        };

        if let Err(e) = outcome {
            self.link.set(ConnectionState::Disconnected);
            *slot = Some(eventloop);
            return Err(e);
        }

        let task = tokio::spawn(drive(eventloop, self.link.clone(), self.reconnect_delay));
        *self.worker.lock().await = Some(task);
        Ok(())
    }

    /// Closes the session and stops the event-loop task. Only used at shutdown.
    #[instrument(skip(self), fields(broker = %self.broker))]
    pub async fn disconnect(&self) {
        self.link.begin_close();
        self.link.set(ConnectionState::Disconnected);

        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "DISCONNECT could not be queued");
        }

        let Some(task) = self.worker.lock().await.take() else {
            return;
        };
        let abort = task.abort_handle();
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(_) => info!("MQTT session closed"),
            Err(_) => {
                warn!("MQTT event loop did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

impl Publish for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        if !self.link.is_connected() {
            return Err(PublishError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError::Rejected(e.to_string()))
    }
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<ConnectReturnCode, ConnectionError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack.code),
            Ok(_) => {}
            Err(rumqttc::ConnectionError::ConnectionRefused(code)) => {
                return Err(ConnectionError::Refused(format!("{code:?}")));
            }
            Err(e) => return Err(ConnectionError::Transport(e.to_string())),
        }
    }
}

/// Background task: drives network I/O and delivers lifecycle callbacks.
///
/// Polling again after an error is the reconnect attempt. The first poll
/// after a lost session reconnects immediately. If that fails, the task waits
/// `reconnect_delay` before trying again.
async fn drive(mut eventloop: EventLoop, link: Arc<Link>, reconnect_delay: Duration) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                link.on_connect(ack.code);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                link.on_disconnect("broker sent DISCONNECT");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) if link.is_closing() => break,
            Ok(_) => {}
            Err(e) => {
                if link.is_closing() {
                    break;
                }
                let reason = e.to_string();
                if link.on_disconnect(&reason) == ConnectionState::Connected {
                    continue;
                }

                warn!(error = %reason, delay = ?reconnect_delay, "MQTT reconnect failed");
                link.set(ConnectionState::Disconnected);
                tokio::time::sleep(reconnect_delay).await;
                if link.is_closing() {
                    break;
                }
                link.set(ConnectionState::Connecting);
            }
        }
    }
    link.set(ConnectionState::Disconnected);
    debug!("MQTT event loop stopped");
}
