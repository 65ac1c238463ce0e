//! Publishing ETA values to the MQTT broker.
//!
//! [`Publish`] is the capability the update cycle depends on.
//! [`MqttPublisher`] implements it on a single rumqttc session and owns the
//! reconnect policy. Values are best-effort: a publish while the session is
//! down fails immediately and the value is dropped.

mod link;
mod mqtt;

pub use link::ConnectionState;
pub use mqtt::MqttPublisher;

use crate::error::PublishError;

pub trait Publish: Send + Sync {
    /// Sends `payload` to `topic` without waiting for delivery.
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;

    /// Publishes an ETA in its canonical decimal form (`-1`, `0`, `240`, ...).
    fn publish_eta(&self, topic: &str, eta: i64) -> Result<(), PublishError> {
        self.publish(topic, &eta.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl Publish for Recorder {
        fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
            self.0
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_publish_eta_formats_decimal() {
        let rec = Recorder::default();
        rec.publish_eta("a", 240).unwrap();
        rec.publish_eta("b", -1).unwrap();
        let sent = rec.0.lock().unwrap();
        assert_eq!(sent[0], ("a".to_string(), "240".to_string()));
        assert_eq!(sent[1], ("b".to_string(), "-1".to_string()));
    }
}
