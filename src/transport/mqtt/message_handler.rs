//! Pure routing of rumqttc events for the MQTT client
//!
//! This module contains pure functions translating MQTT v5 events and event
//! loop errors into the hub's [`TransportEvent`]s.

use crate::protocol::{InboundMessage, QosLevel};
use crate::transport::TransportEvent;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, ConnectionError, Event};

/// MQTT v5 "unspecified error" reason code, used when no broker code is available
pub const UNSPECIFIED_ERROR_CODE: u8 = 0x80;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    code: connack.code as u8,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                    qos: Self::map_qos(publish.qos),
                    retain: publish.retain,
                },
                Packet::Disconnect(disconnect) => EventRoute::Disconnected {
                    code: disconnect.reason_code as u8,
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Transport event to report for a route, if any
    pub fn transport_event(route: EventRoute) -> Option<TransportEvent> {
        match route {
            EventRoute::ConnectionAcknowledged { code } => Some(TransportEvent::ConnectResult {
                code,
                reason: if code == 0 {
                    "Connection accepted".to_string()
                } else {
                    format!("Connection refused with code {code:#04x}")
                },
            }),
            EventRoute::MessageReceived {
                topic,
                payload,
                qos,
                retain,
            } => {
                let mut message = InboundMessage::new(topic, payload).with_retain(retain);
                message.qos = qos;
                Some(TransportEvent::Message(message))
            }
            EventRoute::Disconnected { code } => Some(TransportEvent::Disconnected {
                code,
                reason: "Broker sent DISCONNECT".to_string(),
            }),
            EventRoute::SubscriptionConfirmed { .. }
            | EventRoute::InfrastructureEvent(_)
            | EventRoute::OutgoingEvent => None,
        }
    }

    /// Transport event for an event loop error
    ///
    /// Before the broker acknowledged the connection the error is the result of
    /// the connect attempt, afterwards it is a lost connection.
    pub fn error_event(error: &ConnectionError, acknowledged: bool) -> TransportEvent {
        let code = match error {
            ConnectionError::ConnectionRefused(code) => *code as u8,
            _ => UNSPECIFIED_ERROR_CODE,
        };
        let reason = error.to_string();

        if acknowledged {
            TransportEvent::Disconnected { code, reason }
        } else {
            TransportEvent::ConnectResult { code, reason }
        }
    }

    pub fn map_qos(qos: QoS) -> QosLevel {
        match qos {
            QoS::AtMostOnce => QosLevel::AtMostOnce,
            QoS::AtLeastOnce => QosLevel::AtLeastOnce,
            QoS::ExactlyOnce => QosLevel::ExactlyOnce,
        }
    }

    pub fn to_rumqttc_qos(qos: QosLevel) -> QoS {
        match qos {
            QosLevel::AtMostOnce => QoS::AtMostOnce,
            QosLevel::AtLeastOnce => QoS::AtLeastOnce,
            QosLevel::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Broker answered the CONNECT packet
    ConnectionAcknowledged { code: u8 },
    /// Message received on subscribed topic
    MessageReceived {
        topic: String,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    },
    /// MQTT broker disconnected
    Disconnected { code: u8 },
    SubscriptionConfirmed { packet_id: u16 },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

impl EventRoute {
    /// Whether this route marks the connection as acknowledged by the broker
    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, EventRoute::ConnectionAcknowledged { code: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::v5::mqttbytes::v5::{
        ConnAck, ConnectReturnCode, Disconnect, DisconnectReasonCode, Publish,
    };

    fn publish_event(payload: &'static str, retain: bool) -> Event {
        Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain,
            topic: Bytes::from("server/system/temp/value"),
            pkid: 1,
            payload: Bytes::from(payload),
            properties: None,
        }))
    }

    #[test]
    fn test_connack_routes_to_connect_result() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));

        let route = MessageHandler::route_mqtt_event(&connack);
        assert!(route.is_acknowledgement());
        assert!(matches!(
            MessageHandler::transport_event(route),
            Some(TransportEvent::ConnectResult { code: 0, .. })
        ));
    }

    #[test]
    fn test_refused_connack_is_not_an_acknowledgement() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::NotAuthorized,
            properties: None,
        }));

        let route = MessageHandler::route_mqtt_event(&connack);
        assert!(!route.is_acknowledgement());
        match MessageHandler::transport_event(route) {
            Some(TransportEvent::ConnectResult { code, .. }) => assert_ne!(code, 0),
            other => panic!("Expected ConnectResult, got {other:?}"),
        }
    }

    #[test]
    fn test_disconnect_routes_to_disconnected() {
        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::ServerShuttingDown,
            properties: None,
        }));

        match MessageHandler::transport_event(MessageHandler::route_mqtt_event(&disconnect)) {
            Some(TransportEvent::Disconnected { code, .. }) => assert_ne!(code, 0),
            other => panic!("Expected Disconnected, got {other:?}"),
        }
    }

    #[test]
    fn test_publish_routes_to_message() {
        let route = MessageHandler::route_mqtt_event(&publish_event("41.5", true));

        match MessageHandler::transport_event(route) {
            Some(TransportEvent::Message(message)) => {
                assert_eq!(message.topic, "server/system/temp/value");
                assert_eq!(message.payload.as_deref(), Some(b"41.5".as_slice()));
                assert_eq!(message.qos, QosLevel::AtLeastOnce);
                assert!(message.retain);
            }
            other => panic!("Expected Message, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_publish_has_absent_payload() {
        let route = MessageHandler::route_mqtt_event(&publish_event("", false));

        match MessageHandler::transport_event(route) {
            Some(TransportEvent::Message(message)) => assert!(message.payload.is_none()),
            other => panic!("Expected Message, got {other:?}"),
        }
    }

    #[test]
    fn test_error_event_depends_on_acknowledgement() {
        let refused = ConnectionError::ConnectionRefused(ConnectReturnCode::BadUserNamePassword);
        match MessageHandler::error_event(&refused, false) {
            TransportEvent::ConnectResult { code, .. } => {
                assert_ne!(code, 0);
                assert_ne!(code, UNSPECIFIED_ERROR_CODE);
            }
            other => panic!("Expected ConnectResult, got {other:?}"),
        }

        let io = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(matches!(
            MessageHandler::error_event(&io, true),
            TransportEvent::Disconnected {
                code: UNSPECIFIED_ERROR_CODE,
                ..
            }
        ));
    }

    #[test]
    fn test_qos_mapping() {
        for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
            assert_eq!(
                MessageHandler::to_rumqttc_qos(MessageHandler::map_qos(qos)),
                qos
            );
        }
    }
}
