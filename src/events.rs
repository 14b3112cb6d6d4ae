//! Device connect/disconnect notifications

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::device::DeviceInfo;

/// Broadcast channel capacity for device events
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Kind of membership change
///
/// Discriminants are part of the plugin ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DeviceEventType {
    Connected = 1,
    Disconnected = 2,
}

/// A membership change, as delivered to subscribers
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    pub event_type: DeviceEventType,
    pub device: Arc<DeviceInfo>,
}

/// Callback invoked from the discovery thread
pub type EventHandler = Box<dyn Fn(DeviceEventType, &Arc<DeviceInfo>) + Send + Sync>;

/// Fans events out to the handler and to broadcast subscribers
pub(crate) struct EventSink {
    handler: Option<EventHandler>,
    tx: broadcast::Sender<DeviceEvent>,
}

impl EventSink {
    pub(crate) fn new(handler: Option<EventHandler>) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { handler, tx }
    }

    pub(crate) fn emit(&self, event_type: DeviceEventType, device: &Arc<DeviceInfo>) {
        if let Some(handler) = &self.handler {
            handler(event_type, device);
        }
        // No subscribers is fine
        let _ = self.tx.send(DeviceEvent {
            event_type,
            device: Arc::clone(device),
        });
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("handler", &self.handler.is_some())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
