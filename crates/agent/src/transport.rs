//! Outbound side of the MQTT client.
//!
//! The control loop is the only thing polling the rumqttc event loop, so
//! awaiting on the request channel from inside a handler could stall it.
//! Everything here goes through the non-blocking `try_*` calls instead.

use rumqttc::{AsyncClient, QoS};

use crate::error::ErrorKind;

pub trait Publisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ErrorKind>;
    fn subscribe(&self, topic: &str) -> Result<(), ErrorKind>;
}

impl Publisher for AsyncClient {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ErrorKind> {
        self.try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| ErrorKind::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn subscribe(&self, topic: &str) -> Result<(), ErrorKind> {
        self.try_subscribe(topic, QoS::AtLeastOnce)
            .map_err(|e| ErrorKind::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Serialise `msg` as JSON and publish it.
pub fn publish_json<T: serde::Serialize>(
    publisher: &dyn Publisher,
    topic: &str,
    msg: &T,
) -> Result<(), ErrorKind> {
    let payload = serde_json::to_vec(msg).map_err(|e| ErrorKind::PublishFailed {
        topic: topic.to_string(),
        reason: e.to_string(),
    })?;
    publisher.publish(topic, payload)
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    pub(crate) published: std::cell::RefCell<Vec<(String, serde_json::Value)>>,
    pub(crate) subscribed: std::cell::RefCell<Vec<String>>,
    pub(crate) fail: bool,
}

#[cfg(test)]
impl RecordingPublisher {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn on_topic(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published
            .borrow()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[cfg(test)]
impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ErrorKind> {
        if self.fail {
            return Err(ErrorKind::PublishFailed {
                topic: topic.to_string(),
                reason: "test".into(),
            });
        }
        let value = serde_json::from_slice(&payload).expect("publishers send JSON");
        self.published.borrow_mut().push((topic.to_string(), value));
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<(), ErrorKind> {
        if self.fail {
            return Err(ErrorKind::PublishFailed {
                topic: topic.to_string(),
                reason: "test".into(),
            });
        }
        self.subscribed.borrow_mut().push(topic.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A client whose event loop is never polled: requests pile up in the
    /// bounded channel until it is full.
    fn test_mqtt(cap: usize) -> (AsyncClient, rumqttc::EventLoop) {
        let opts = rumqttc::MqttOptions::new("test-agent", "127.0.0.1", 1883);
        AsyncClient::new(opts, cap)
    }

    #[test]
    fn client_publish_enqueues() {
        let (client, _el) = test_mqtt(4);
        Publisher::publish(&client, "1/device", b"{}".to_vec()).unwrap();
        Publisher::subscribe(&client, "1/device").unwrap();
    }

    #[test]
    fn client_publish_fails_when_queue_full() {
        let (client, _el) = test_mqtt(1);
        Publisher::publish(&client, "1/device", b"{}".to_vec()).unwrap();
        let err = Publisher::publish(&client, "1/device", b"{}".to_vec()).unwrap_err();
        assert!(matches!(err, ErrorKind::PublishFailed { .. }));
    }

    #[test]
    fn publish_json_serialises() {
        let p = RecordingPublisher::default();
        publish_json(&p, "1/id", &serde_json::json!({"espID": "1"})).unwrap();
        assert_eq!(p.on_topic("1/id"), vec![serde_json::json!({"espID": "1"})]);
    }
}
