//! Surface-side request correlation.
//!
//! Requests are matched to responses by action name in FIFO order. Reads
//! may be re-issued freely; a second mutating request is refused with
//! [`BridgeError::Busy`] until the first one's result arrives.

use super::messages::{
    InboundMessage, OutboundMessage, APPLY_PARAMS_RESULT, TIMELINE_OPERATION_RESULT,
};
use super::{BridgeError, BridgeResult};
use log::{debug, warn};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRequest {
    action: &'static str,
    response: &'static str,
    mutating: bool,
}

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: InboundMessage,
    /// Request this message answered; `None` for unsolicited pushes.
    pub request: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct BridgeClient {
    pending: VecDeque<PendingRequest>,
}

impl BridgeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `message` as sent and returns it.
    pub fn send(&mut self, message: OutboundMessage) -> BridgeResult<OutboundMessage> {
        let mutating = message.is_mutating();
        if mutating {
            if let Some(pending) = self.in_flight_mutation() {
                warn!(
                    "event=bridge_send module=bridge status=busy action={} pending={}",
                    message.action(),
                    pending
                );
                return Err(BridgeError::Busy { pending });
            }
        }
        self.pending.push_back(PendingRequest {
            action: message.action(),
            response: message.response_action(),
            mutating,
        });
        debug!(
            "event=bridge_send module=bridge status=ok action={} pending={}",
            message.action(),
            self.pending.len()
        );
        Ok(message)
    }

    /// Decodes and correlates one inbound envelope.
    pub fn receive(&mut self, raw: &str) -> BridgeResult<Delivery> {
        let message = InboundMessage::from_json(raw)?;
        self.correlate(message)
    }

    pub fn correlate(&mut self, message: InboundMessage) -> BridgeResult<Delivery> {
        let position = match &message {
            InboundMessage::RequestFailed { action, .. } => self
                .pending
                .iter()
                .position(|pending| pending.action == action.as_str()),
            other => self
                .pending
                .iter()
                .position(|pending| pending.response == other.action()),
        };

        match position.and_then(|index| self.pending.remove(index)) {
            Some(pending) => {
                debug!(
                    "event=bridge_receive module=bridge status=ok action={} request={}",
                    message.action(),
                    pending.action
                );
                Ok(Delivery {
                    message,
                    request: Some(pending.action),
                })
            }
            None if is_result(&message) => {
                warn!(
                    "event=bridge_receive module=bridge status=unexpected action={}",
                    message.action()
                );
                Err(BridgeError::Unexpected(message.action().to_string()))
            }
            None => Ok(Delivery {
                message,
                request: None,
            }),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight_mutation().is_some()
    }

    pub fn in_flight_mutation(&self) -> Option<&'static str> {
        self.pending
            .iter()
            .find(|pending| pending.mutating)
            .map(|pending| pending.action)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Stops listening; host-side work still runs to completion.
    pub fn close(&mut self) {
        self.pending.clear();
    }
}

fn is_result(message: &InboundMessage) -> bool {
    matches!(
        message.action(),
        APPLY_PARAMS_RESULT | TIMELINE_OPERATION_RESULT
    ) || matches!(message, InboundMessage::RequestFailed { .. })
}

#[cfg(test)]
mod tests {
    use super::BridgeClient;
    use crate::bridge::messages::{ApplyParamsResult, InboundMessage, OutboundMessage};
    use crate::bridge::BridgeError;
    use std::collections::BTreeMap;

    fn apply() -> OutboundMessage {
        OutboundMessage::ApplyParams(BTreeMap::from([(
            "FretCount".to_string(),
            "24".to_string(),
        )]))
    }

    fn apply_result(success: bool) -> InboundMessage {
        InboundMessage::ApplyParamsResult(ApplyParamsResult {
            success,
            message: String::new(),
            updated: 1,
            protected: 0,
            errors: Vec::new(),
        })
    }

    #[test]
    fn second_mutation_is_busy_until_result() {
        let mut client = BridgeClient::new();
        client.send(apply()).expect("first apply");
        assert!(matches!(
            client.send(OutboundMessage::ApplyTimelineChanges { changes: Vec::new() }),
            Err(BridgeError::Busy { pending: "APPLY_PARAMS" })
        ));
        client
            .send(OutboundMessage::GetTimelineItems {})
            .expect("reads are allowed");

        let delivery = client.correlate(apply_result(true)).expect("correlates");
        assert_eq!(delivery.request, Some("APPLY_PARAMS"));
        assert!(!client.is_busy());
        assert_eq!(client.pending_count(), 1);
    }

    #[test]
    fn uncorrelated_result_is_an_error_but_pushes_are_accepted() {
        let mut client = BridgeClient::new();
        assert!(matches!(
            client.correlate(apply_result(true)),
            Err(BridgeError::Unexpected(_))
        ));
        let delivery = client
            .receive(r#"{"action": "COMPUTING", "data": {}}"#)
            .expect("push accepted");
        assert_eq!(delivery.request, None);
    }

    #[test]
    fn request_failed_resolves_matching_request() {
        let mut client = BridgeClient::new();
        client.send(apply()).expect("apply");
        let delivery = client
            .receive(
                r#"{"action": "REQUEST_FAILED", "data": {"action": "APPLY_PARAMS", "message": "no design"}}"#,
            )
            .expect("correlates");
        assert_eq!(delivery.request, Some("APPLY_PARAMS"));
        assert!(!client.is_busy());
    }

    #[test]
    fn close_stops_listening() {
        let mut client = BridgeClient::new();
        client.send(apply()).expect("apply");
        client.close();
        assert!(!client.is_busy());
        assert!(client.correlate(apply_result(false)).is_err());
    }
}
