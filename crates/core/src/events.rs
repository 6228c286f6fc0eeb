use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Named change notifications shared between the stores and their observers.
///
/// Topics carry no payload; subscribers re-read whatever state they care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SiteRegistryChanged,
    ActiveSiteChanged,
    ConversationChanged,
}

impl Topic {
    pub const ALL: [Topic; 3] = [
        Topic::SiteRegistryChanged,
        Topic::ActiveSiteChanged,
        Topic::ConversationChanged,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SiteRegistryChanged => "siteRegistryChanged",
            Self::ActiveSiteChanged => "activeSiteChanged",
            Self::ConversationChanged => "conversationChanged",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.name() == raw)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

type Handler = Arc<dyn Fn(Topic) + Send + Sync>;

struct Listener {
    id: u64,
    topic: Topic,
    handler: Handler,
}

#[derive(Default)]
struct BroadcasterInner {
    next_listener_id: AtomicU64,
    listeners: Mutex<Vec<Listener>>,
}

impl BroadcasterInner {
    fn listeners(&self) -> MutexGuard<'_, Vec<Listener>> {
        // A panicking handler never runs under this lock, so the list stays consistent.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, listener_id: u64) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != listener_id);
        listeners.len() != before
    }
}

/// Synchronous publish/subscribe fan-out.
///
/// `publish` snapshots the listeners registered for the topic and calls them in
/// registration order on the caller's thread. Listeners added or removed while a
/// dispatch is running only affect later publishes.
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    inner: Arc<BroadcasterInner>,
}

impl fmt::Debug for EventBroadcaster {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EventBroadcaster")
            .field("listener_count", &self.inner.listeners().len())
            .finish()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(Topic) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push(Listener {
            id,
            topic,
            handler: Arc::new(handler),
        });

        Subscription {
            id,
            topic,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    pub fn publish(&self, topic: Topic) {
        let handlers = self
            .inner
            .listeners()
            .iter()
            .filter(|listener| listener.topic == topic)
            .map(|listener| Arc::clone(&listener.handler))
            .collect::<Vec<_>>();

        tracing::trace!(topic = %topic, listener_count = handlers.len(), "publishing event");

        // The lock is released before dispatch so handlers may publish or (un)subscribe.
        for handler in handlers {
            handler(topic);
        }
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        self.inner
            .listeners()
            .iter()
            .filter(|listener| listener.topic == topic)
            .count()
    }
}

/// Registration handle returned by [`EventBroadcaster::subscribe`].
///
/// Dropping the handle unsubscribes; hold it for as long as the observer lives.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    id: u64,
    topic: Topic,
    broadcaster: Weak<BroadcasterInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            inner.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Handler) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = Arc::clone(&log);
            move |label: &'static str| -> Handler {
                let log = Arc::clone(&log);
                Arc::new(move |topic: Topic| {
                    log.lock()
                        .expect("log lock")
                        .push(format!("{label}:{topic}"));
                })
            }
        };
        (log, make)
    }

    #[test]
    fn subscribers_fire_in_registration_order() {
        let events = EventBroadcaster::new();
        let (log, make) = recorder();
        let first = make("first");
        let second = make("second");
        let _a = events.subscribe(Topic::SiteRegistryChanged, move |topic| first(topic));
        let _b = events.subscribe(Topic::SiteRegistryChanged, move |topic| second(topic));
        let _c = events.subscribe(Topic::ConversationChanged, |_| panic!("wrong topic"));

        events.publish(Topic::SiteRegistryChanged);

        assert_eq!(
            *log.lock().expect("log lock"),
            vec![
                "first:siteRegistryChanged".to_string(),
                "second:siteRegistryChanged".to_string()
            ]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let events = EventBroadcaster::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let subscription = events.subscribe(Topic::ActiveSiteChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        events.publish(Topic::ActiveSiteChanged);
        subscription.unsubscribe();
        events.publish(Topic::ActiveSiteChanged);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(events.listener_count(Topic::ActiveSiteChanged), 0);
    }

    #[test]
    fn unsubscribing_during_dispatch_keeps_current_pass() {
        let events = EventBroadcaster::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let later: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&later);
        let _first = events.subscribe(Topic::ConversationChanged, move |_| {
            // Drops the second subscription mid-dispatch.
            slot.lock().expect("slot lock").take();
        });
        let counter = Arc::clone(&hits);
        let second = events.subscribe(Topic::ConversationChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        *later.lock().expect("slot lock") = Some(second);

        events.publish(Topic::ConversationChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        events.publish(Topic::ConversationChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribing_during_dispatch_waits_for_next_publish() {
        let events = EventBroadcaster::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let inner_events = events.clone();
        let inner_hits = Arc::clone(&hits);
        let inner_added = Arc::clone(&added);
        let _outer = events.subscribe(Topic::SiteRegistryChanged, move |_| {
            let counter = Arc::clone(&inner_hits);
            let subscription = inner_events.subscribe(Topic::SiteRegistryChanged, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            inner_added.lock().expect("added lock").push(subscription);
        });

        events.publish(Topic::SiteRegistryChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        events.publish(Topic::SiteRegistryChanged);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn topic_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::parse(topic.name()), Some(topic));
        }
        assert_eq!(Topic::parse("somethingElse"), None);
    }
}
