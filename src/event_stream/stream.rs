//! Append-only event log with synchronous fan-out.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::events::{AssistantMessage, Event, EventPayload, EventType};

/// Callback invoked for every delivered event.
pub type EventListener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    id: u64,
    filter: Option<Vec<EventType>>,
    listener: EventListener,
}

impl Subscriber {
    fn accepts(&self, event_type: EventType) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |types| types.contains(&event_type))
    }
}

#[derive(Default)]
struct EventStreamInner {
    events: Mutex<Vec<Event>>,
    subscribers: Mutex<Vec<Subscriber>>,
    // Serializes append + notification so every subscriber sees append order.
    delivery: Mutex<()>,
    // Events sent by a listener while this stream is delivering on its thread.
    pending: Mutex<VecDeque<Event>>,
    next_subscriber_id: AtomicU64,
}

thread_local! {
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a stream as delivering on the current thread until dropped.
struct DeliveryMarker(usize);

impl DeliveryMarker {
    fn enter(key: usize) -> Self {
        DELIVERING.with(|active| active.borrow_mut().push(key));
        Self(key)
    }

    fn is_active(key: usize) -> bool {
        DELIVERING.with(|active| active.borrow().contains(&key))
    }
}

impl Drop for DeliveryMarker {
    fn drop(&mut self) {
        DELIVERING.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|key| *key == self.0) {
                active.remove(pos);
            }
        });
    }
}

/// The single source of truth for a session's execution state.
///
/// Events are never removed or edited. [`send_event`](Self::send_event)
/// returns only after every current subscriber has seen the event.
/// A listener may read the stream and may send events itself; those are
/// appended and delivered once the event being delivered has reached every
/// subscriber, in the order they were sent.
#[derive(Clone, Default)]
pub struct EventStream {
    inner: Arc<EventStreamInner>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("events", &self.len())
            .finish()
    }
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a payload with a fresh id and the current time.
    pub fn create_event(&self, payload: EventPayload) -> Event {
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            session_id: None,
            payload,
        }
    }

    /// Append an event and notify subscribers synchronously.
    pub fn send_event(&self, event: Event) {
        let key = Arc::as_ptr(&self.inner) as usize;
        if DeliveryMarker::is_active(key) {
            lock(&self.inner.pending).push_back(event);
            return;
        }

        let _delivery = lock(&self.inner.delivery);
        let _marker = DeliveryMarker::enter(key);
        let mut next = Some(event);
        while let Some(event) = next {
            self.deliver(event);
            next = lock(&self.inner.pending).pop_front();
        }
    }

    fn deliver(&self, event: Event) {
        let event_type = event.event_type();
        lock(&self.inner.events).push(event.clone());

        let listeners: Vec<EventListener> = lock(&self.inner.subscribers)
            .iter()
            .filter(|sub| sub.accepts(event_type))
            .map(|sub| sub.listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Create, append and return an event.
    pub fn emit(&self, payload: EventPayload) -> Event {
        let event = self.create_event(payload);
        self.send_event(event.clone());
        event
    }

    /// Like [`emit`](Self::emit), tagging the event with a run session.
    pub fn emit_in_session(&self, session_id: &str, payload: EventPayload) -> Event {
        let mut event = self.create_event(payload);
        event.session_id = Some(session_id.to_string());
        self.send_event(event.clone());
        event
    }

    /// Subscribe to every event.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add_subscriber(None, Arc::new(listener))
    }

    /// Subscribe to a subset of event types.
    pub fn subscribe_to_types<F>(&self, types: &[EventType], listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.add_subscriber(Some(types.to_vec()), Arc::new(listener))
    }

    fn add_subscriber(&self, filter: Option<Vec<EventType>>, listener: EventListener) -> Subscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.subscribers).push(Subscriber {
            id,
            filter,
            listener,
        });
        Subscription {
            id,
            stream: Arc::downgrade(&self.inner),
        }
    }

    /// Full ordered history.
    pub fn get_events(&self) -> Vec<Event> {
        lock(&self.inner.events).clone()
    }

    /// Ordered history restricted to `types`.
    pub fn get_events_by_type(&self, types: &[EventType]) -> Vec<Event> {
        lock(&self.inner.events)
            .iter()
            .filter(|event| types.contains(&event.event_type()))
            .cloned()
            .collect()
    }

    /// Most recent finalized assistant message, if any.
    pub fn latest_assistant_response(&self) -> Option<AssistantMessage> {
        lock(&self.inner.events)
            .iter()
            .rev()
            .find_map(|event| match &event.payload {
                EventPayload::AssistantMessage(message) => Some(message.clone()),
                _ => None,
            })
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }
}

/// Handle returned by the subscribe methods.
///
/// Dropping the handle keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to detach.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    stream: Weak<EventStreamInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.stream.upgrade() {
            lock(&inner.subscribers).retain(|sub| sub.id != self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
