// Recent event history
// Bounded ring of event records, served by the control API

use chrono::{Local, SecondsFormat};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;

use super::{Observer, ServerEvent};
use crate::server::ConnectionId;

/// Serializable summary of one [`ServerEvent`]
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub time: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ConnectionId>,
    pub message: String,
}

impl EventRecord {
    /// `None` for payload events, which are too frequent to keep
    fn from_event(event: &ServerEvent) -> Option<Self> {
        let (kind, id, message) = match event {
            ServerEvent::ServerStateChanged { listening: true } => {
                ("server_started", None, "listener started".to_string())
            }
            ServerEvent::ServerStateChanged { listening: false } => {
                ("server_stopped", None, "listener released".to_string())
            }
            ServerEvent::ConnectionStateChanged {
                id,
                peer,
                connected: true,
                ..
            } => ("connected", Some(*id), format!("connected from {peer}")),
            ServerEvent::ConnectionStateChanged {
                id, peer, error, ..
            } => {
                let message = match error {
                    Some(e) => format!("{peer} disconnected: {e}"),
                    None => format!("{peer} disconnected"),
                };
                ("disconnected", Some(*id), message)
            }
            ServerEvent::DataReceived { .. } => return None,
            ServerEvent::Error { context, error } => {
                ("error", None, format!("[{context}] {error}"))
            }
        };

        Some(Self {
            time: Local::now().to_rfc3339_opts(SecondsFormat::Millis, false),
            kind,
            id,
            message,
        })
    }
}

/// Observer that keeps the last `capacity` event records
pub struct EventLog {
    records: Mutex<VecDeque<EventRecord>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Oldest first
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Observer for EventLog {
    fn notify(&self, event: &ServerEvent) {
        if self.capacity == 0 {
            return;
        }
        if let Some(record) = EventRecord::from_event(event) {
            let mut records = self.records.lock();
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorContext, ServerError};
    use bytes::Bytes;

    #[test]
    fn test_ring_drops_oldest() {
        let log = EventLog::new(2);
        for listening in [true, false, true] {
            log.notify(&ServerEvent::ServerStateChanged { listening });
        }

        let kinds: Vec<_> = log.records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec!["server_stopped", "server_started"]);
    }

    #[test]
    fn test_data_events_not_recorded() {
        let log = EventLog::new(4);
        log.notify(&ServerEvent::DataReceived {
            id: ConnectionId::new(1),
            data: Bytes::from_static(b"x"),
        });
        assert!(log.is_empty());
    }

    #[test]
    fn test_disconnect_record_carries_error() {
        let log = EventLog::new(4);
        log.notify(&ServerEvent::ConnectionStateChanged {
            id: ConnectionId::new(3),
            peer: "127.0.0.1:4000".parse().unwrap(),
            connected: false,
            error: Some(ServerError::AdmissionTimeout {
                capacity: 2,
                waited_ms: 3000,
            }),
        });
        log.notify(&ServerEvent::error(
            ErrorContext::Start,
            ServerError::Stop("listener close failed".to_string()),
        ));

        let records = log.records();
        assert_eq!(records[0].kind, "disconnected");
        assert_eq!(records[0].id, Some(ConnectionId::new(3)));
        assert!(records[0].message.contains("no free connection slot"));
        assert_eq!(records[1].message, "[start] stop: listener close failed");

        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["id"], 3);
    }
}
