//! The event stream hub: listener registry, dispatch, and connection lifecycle.
//!
//! The hub is responsible for:
//! - Owning at most one live server-push connection at a time
//! - Routing decoded frames to handlers keyed by logical event type
//! - Mirroring every dispatch to passive "any event" observers
//!
//! All dispatch is synchronous: a frame is fully delivered to every matching
//! handler before the transport hands over the next one. Registry mutation is
//! safe from handlers because dispatch runs against a snapshot.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use dashmap::DashMap;
use log::{debug, info, warn};
use serde_json::Value;

use streamhub_protocol::envelope::{self, GENERIC_EVENT};

use crate::config::HubConfig;
use crate::stream;

/// A registered callback for one logical event type.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// A passive observer receiving every dispatch as an `(event, payload)` pair.
pub type Observer = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Opaque identity of a single handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Opaque reference to the live push connection, owned exclusively by the hub.
///
/// Handles compare equal exactly when they refer to the same connection, so
/// repeated idempotent `connect` calls hand back equal handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    id: u64,
    url: String,
}

impl ConnectionHandle {
    /// Unique id of this connection within the hub's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The endpoint this connection streams from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

struct ActiveConnection {
    handle: ConnectionHandle,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Event stream hub.
///
/// One instance per process, constructed at the application entry point and
/// shared as `Arc<StreamHub>`. `close()` is the explicit teardown; there is
/// no implicit reinitialization.
pub struct StreamHub {
    config: HubConfig,

    /// Logical event type -> handler registrations.
    listeners: DashMap<String, Vec<(HandlerId, Handler)>>,

    /// Observers that see every dispatch regardless of event type.
    observers: DashMap<HandlerId, Observer>,

    next_handler_id: AtomicU64,
    next_conn_id: AtomicU64,

    conn: Mutex<Option<ActiveConnection>>,
}

impl StreamHub {
    /// Create a hub. No connection is opened until [`StreamHub::connect`].
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            listeners: DashMap::new(),
            observers: DashMap::new(),
            next_handler_id: AtomicU64::new(1),
            next_conn_id: AtomicU64::new(1),
            conn: Mutex::new(None),
        }
    }

    /// The configuration this hub was built with.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Open the push connection to the configured endpoint.
    ///
    /// Idempotent: if a connection is already active, the existing handle is
    /// returned and no new connection is opened. On construction failure the
    /// error is logged and `None` is returned; callers must treat that as
    /// "not connected" rather than an exception.
    pub fn connect(self: &Arc<Self>) -> Option<ConnectionHandle> {
        let url = self.config.stream_url.clone();
        self.connect_to(&url)
    }

    /// Open the push connection to an explicit endpoint.
    pub fn connect_to(self: &Arc<Self>, url: &str) -> Option<ConnectionHandle> {
        let mut conn = self.lock_conn();
        if let Some(active) = conn.as_ref() {
            debug!("connect: reusing active connection {}", active.handle.id);
            return Some(active.handle.clone());
        }

        let handle = ConnectionHandle {
            id: self.next_conn_id.fetch_add(1, Ordering::Relaxed),
            url: url.to_string(),
        };

        match stream::spawn(Arc::clone(self), handle.clone(), self.config.clone()) {
            Ok(task) => {
                info!("opened event stream connection {} to {}", handle.id, url);
                *conn = Some(ActiveConnection {
                    handle: handle.clone(),
                    task,
                });
                Some(handle)
            }
            Err(err) => {
                warn!("failed to open event stream to {url}: {err}");
                None
            }
        }
    }

    /// Tear down the active connection, if any. Safe to call when nothing is
    /// connected; registered handlers are unaffected.
    pub fn close(&self) {
        let mut conn = self.lock_conn();
        if let Some(active) = conn.take() {
            info!("closed event stream connection {}", active.handle.id);
        }
    }

    /// Whether a connection is currently active.
    pub fn is_connected(&self) -> bool {
        self.lock_conn().is_some()
    }

    /// Register `handler` for logical event `event`.
    ///
    /// Multiple handlers per event are allowed and all are invoked on
    /// dispatch. The returned [`Subscription`] removes exactly this
    /// registration when `unsubscribe` is called; dropping it without
    /// unsubscribing leaves the handler registered.
    pub fn on<F>(self: &Arc<Self>, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            hub: Arc::downgrade(self),
            target: Target::Event {
                event: event.to_string(),
                id,
            },
        }
    }

    /// Remove one handler registration for `event`. No-op when absent; the
    /// event entry is dropped entirely once its handler set is empty, so the
    /// registry does not accumulate dead keys.
    pub fn off(&self, event: &str, id: HandlerId) {
        if let Some(mut handlers) = self.listeners.get_mut(event) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
        }

        // Clean up empty entries
        self.listeners.retain(|_, handlers| !handlers.is_empty());
    }

    /// Register a passive observer that receives every dispatch, typed or
    /// generic, whether or not any typed handler exists for the event.
    pub fn on_any<F>(self: &Arc<Self>, observer: F) -> Subscription
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.observers.insert(id, Arc::new(observer));
        Subscription {
            hub: Arc::downgrade(self),
            target: Target::Any { id },
        }
    }

    /// Remove a passive observer. No-op when absent.
    pub fn off_any(&self, id: HandlerId) {
        self.observers.remove(&id);
    }

    /// Synchronously invoke every handler registered for `event`, then the
    /// passive observers. Works with no connection present, which is how
    /// cross-component signaling and test injection bypass the transport.
    pub fn emit(&self, event: &str, payload: &Value) {
        self.dispatch(event, payload);
    }

    /// Route a frame received on a named channel.
    ///
    /// Bodies that fail to decode (or decode to a falsy value) are dropped
    /// silently; malformed frames must never escape as errors. A decoded
    /// payload is dispatched under its resolved logical event type and, when
    /// that differs, additionally under the literal channel name so consumers
    /// can listen to "any message on this channel".
    pub fn route_channel_frame(&self, channel: &str, body: &str) {
        let Some(payload) = envelope::decode_body(body) else {
            debug!("dropping undecodable frame on channel {channel}");
            return;
        };

        let event = envelope::resolve_event_type(&payload, channel);
        self.dispatch(event, &payload);
        if event != channel {
            self.dispatch(channel, &payload);
        }
    }

    /// Route a frame that arrived without a channel tag.
    ///
    /// Unlike the channel path this never drops: bodies that fail to decode
    /// are delivered as raw text under the generic event type, favoring
    /// delivering something over dropping silently.
    pub fn route_generic_frame(&self, body: &str) {
        match serde_json::from_str::<Value>(body) {
            Ok(payload) => self.dispatch(GENERIC_EVENT, &payload),
            Err(err) => {
                debug!("generic frame is not JSON ({err}), passing through as text");
                self.dispatch(GENERIC_EVENT, &Value::String(body.to_string()));
            }
        }
    }

    fn dispatch(&self, event: &str, payload: &Value) {
        // Snapshot before invoking so handlers may subscribe/unsubscribe
        // reentrantly without holding a registry lock.
        let handlers: Vec<Handler> = self
            .listeners
            .get(event)
            .map(|entry| entry.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
                warn!("handler for event {event} panicked during dispatch");
            }
        }

        let observers: Vec<Observer> = self
            .observers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(event, payload))).is_err() {
                warn!("observer panicked during dispatch of {event}");
            }
        }

        debug!("dispatched event {event}");
    }

    fn lock_conn(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

enum Target {
    Event { event: String, id: HandlerId },
    Any { id: HandlerId },
}

/// Owned proof of one handler registration.
///
/// `unsubscribe` removes exactly the registration that produced it. The guard
/// is inert on drop: a subscription that is never unsubscribed simply stays
/// registered for the hub's lifetime.
#[must_use = "call unsubscribe() to remove the handler; dropping the guard keeps it registered"]
pub struct Subscription {
    hub: Weak<StreamHub>,
    target: Target,
}

impl Subscription {
    /// The registration this subscription refers to.
    pub fn handler_id(&self) -> HandlerId {
        match &self.target {
            Target::Event { id, .. } | Target::Any { id } => *id,
        }
    }

    /// Remove the handler registration. Idempotent by construction: the
    /// guard is consumed, and removal of an already-absent handler is a
    /// no-op on the hub side.
    pub fn unsubscribe(self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        match &self.target {
            Target::Event { event, id } => hub.off(event, *id),
            Target::Any { id } => hub.off_any(*id),
        }
    }
}
