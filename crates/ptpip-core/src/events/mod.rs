//! Event system.
//!
//! The responder pushes unsolicited events on the event connection. They are
//! decoded by a background reader and fanned out to registered
//! [`EventListener`]s, one callback per event kind.

pub mod dispatcher;

pub use dispatcher::EventDispatcher;

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::PtpError;
use crate::protocol::{EventCode, EventPacket, EventParams, ProtocolError, PtpCode};

/// A decoded PTP event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: EventCode,
    /// PTP session the event belongs to (0 when no session is open).
    pub session_id: u32,
    pub transaction_id: u32,
    pub params: EventParams,
}

impl Event {
    /// Attach the session ID, which the PTP/IP Event packet does not carry.
    pub fn from_packet(packet: EventPacket, session_id: u32) -> Self {
        Self {
            code: packet.code,
            session_id,
            transaction_id: packet.transaction_id,
            params: packet.params,
        }
    }

    pub fn param(&self, index: usize) -> Option<u32> {
        self.params.get(index)
    }

    fn require(&self, index: usize) -> Result<u32, ProtocolError> {
        self.param(index)
            .ok_or(ProtocolError::MissingEventParameter {
                code: self.code,
                index,
            })
    }

    fn require_u16(&self, index: usize) -> Result<u16, ProtocolError> {
        let value = self.require(index)?;
        u16::try_from(value).map_err(|_| ProtocolError::EventParameterOutOfRange {
            code: self.code,
            index,
            value,
        })
    }
}

/// Receives decoded events.
///
/// Every method has an empty default, so listeners implement only what they
/// care about. Callbacks run on the dispatch thread, never on the thread
/// that issues operations.
#[allow(unused_variables)]
pub trait EventListener: Send + Sync {
    fn on_cancel_transaction(&self, transaction_id: u32) {}
    fn on_object_added(&self, object_handle: u32) {}
    fn on_object_removed(&self, object_handle: u32) {}
    fn on_store_added(&self, storage_id: u32) {}
    fn on_store_removed(&self, storage_id: u32) {}
    fn on_device_prop_changed(&self, prop_code: u16) {}
    fn on_object_info_changed(&self, object_handle: u32) {}
    fn on_device_info_changed(&self) {}
    fn on_request_object_transfer(&self, object_handle: u32) {}
    fn on_store_full(&self, storage_id: u32) {}
    fn on_device_reset(&self) {}
    fn on_storage_info_changed(&self, storage_id: u32) {}
    fn on_capture_complete(&self, transaction_id: u32) {}
    fn on_unreported_status(&self) {}

    /// Vendor-extended or otherwise unrecognized event code.
    fn on_vendor_event(&self, event: &Event) {}

    /// The event reader failed.
    fn on_error(&self, error: &PtpError) {}
}

/// Route one event to the matching callback.
pub(crate) fn deliver(listener: &dyn EventListener, event: &Event) -> Result<(), ProtocolError> {
    match event.code {
        EventCode::CancelTransaction => listener.on_cancel_transaction(event.transaction_id),
        EventCode::ObjectAdded => listener.on_object_added(event.require(0)?),
        EventCode::ObjectRemoved => listener.on_object_removed(event.require(0)?),
        EventCode::StoreAdded => listener.on_store_added(event.require(0)?),
        EventCode::StoreRemoved => listener.on_store_removed(event.require(0)?),
        EventCode::DevicePropChanged => listener.on_device_prop_changed(event.require_u16(0)?),
        EventCode::ObjectInfoChanged => listener.on_object_info_changed(event.require(0)?),
        EventCode::DeviceInfoChanged => listener.on_device_info_changed(),
        EventCode::RequestObjectTransfer => {
            listener.on_request_object_transfer(event.require(0)?)
        }
        EventCode::StoreFull => listener.on_store_full(event.require(0)?),
        EventCode::DeviceReset => listener.on_device_reset(),
        EventCode::StorageInfoChanged => listener.on_storage_info_changed(event.require(0)?),
        EventCode::CaptureComplete => listener.on_capture_complete(event.transaction_id),
        EventCode::UnreportedStatus => listener.on_unreported_status(),
        EventCode::Undefined | EventCode::Unrecognized(_) => listener.on_vendor_event(event),
    }
    Ok(())
}

/// Concurrency-safe set of listeners, compared by identity.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if this listener was already registered.
    pub fn add(&self, listener: Arc<dyn EventListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Returns `false` if this listener was not registered.
    pub fn remove(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current listeners; callbacks run on the copy, not under the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn EventListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

fn same_listener(a: &Arc<dyn EventListener>, b: &Arc<dyn EventListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Listener that logs events using tracing.
pub struct TracingListener;

impl EventListener for TracingListener {
    fn on_cancel_transaction(&self, transaction_id: u32) {
        tracing::info!(tx_id = transaction_id, "CancelTransaction");
    }

    fn on_object_added(&self, object_handle: u32) {
        tracing::info!(handle = %format!("0x{:08X}", object_handle), "ObjectAdded");
    }

    fn on_object_removed(&self, object_handle: u32) {
        tracing::info!(handle = %format!("0x{:08X}", object_handle), "ObjectRemoved");
    }

    fn on_store_added(&self, storage_id: u32) {
        tracing::info!(storage = %format!("0x{:08X}", storage_id), "StoreAdded");
    }

    fn on_store_removed(&self, storage_id: u32) {
        tracing::info!(storage = %format!("0x{:08X}", storage_id), "StoreRemoved");
    }

    fn on_device_prop_changed(&self, prop_code: u16) {
        tracing::info!(prop = %format!("0x{:04X}", prop_code), "DevicePropChanged");
    }

    fn on_object_info_changed(&self, object_handle: u32) {
        tracing::info!(handle = %format!("0x{:08X}", object_handle), "ObjectInfoChanged");
    }

    fn on_device_info_changed(&self) {
        tracing::info!("DeviceInfoChanged");
    }

    fn on_request_object_transfer(&self, object_handle: u32) {
        tracing::info!(handle = %format!("0x{:08X}", object_handle), "RequestObjectTransfer");
    }

    fn on_store_full(&self, storage_id: u32) {
        tracing::warn!(storage = %format!("0x{:08X}", storage_id), "StoreFull");
    }

    fn on_device_reset(&self) {
        tracing::warn!("DeviceReset");
    }

    fn on_storage_info_changed(&self, storage_id: u32) {
        tracing::info!(storage = %format!("0x{:08X}", storage_id), "StorageInfoChanged");
    }

    fn on_capture_complete(&self, transaction_id: u32) {
        tracing::info!(tx_id = transaction_id, "CaptureComplete");
    }

    fn on_unreported_status(&self) {
        tracing::info!("UnreportedStatus");
    }

    fn on_vendor_event(&self, event: &Event) {
        tracing::debug!(
            code = %format!("0x{:04X}", event.code.code()),
            tx_id = event.transaction_id,
            params = ?event.params.as_slice(),
            "Vendor event"
        );
    }

    fn on_error(&self, error: &PtpError) {
        tracing::error!(error = %error, "Event channel error");
    }
}
