//! Integration test: change-event delivery through the dispatcher.
//!
//! Walks the subscriber lifecycle on one service path:
//! 1. Subscribe a listener and observe an Add
//! 2. Observe an Update with new content
//! 3. Unsubscribe and confirm a Delete is not delivered
//!
//! Also checks fan-out order, failure containment and the no-subscriber case.

use std::sync::{Arc, Mutex};

use lodestar_remoting::{DataListener, Dispatcher, Event, EventType};

/// Listener that records every event and reports interest.
#[derive(Default)]
struct Recording {
    seen: Mutex<Vec<Event>>,
}

impl Recording {
    fn events(&self) -> Vec<Event> {
        self.seen.lock().expect("lock").clone()
    }
}

impl DataListener for Recording {
    fn data_change(&self, event: &Event) -> bool {
        self.seen.lock().expect("lock").push(event.clone());
        true
    }
}

/// Listener appending its tag to a shared order log.
struct Tagged {
    tag: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
}

impl DataListener for Tagged {
    fn data_change(&self, _event: &Event) -> bool {
        self.order.lock().expect("lock").push(self.tag);
        false
    }
}

struct Faulty;

impl DataListener for Faulty {
    #[allow(clippy::panic)]
    fn data_change(&self, event: &Event) -> bool {
        panic!("cannot handle {}", event.path());
    }
}

#[test]
fn subscriber_lifecycle_on_one_path() {
    let dispatcher = Dispatcher::new();
    let listener = Arc::new(Recording::default());
    dispatcher
        .subscribe("/services/foo", listener.clone())
        .expect("subscribe");

    // Step 1: Add
    let add = Event::new("/services/foo", EventType::Add, "v1=1.2.3.4:8080").expect("valid");
    let report = dispatcher.notify(&add).expect("notify");
    assert!(report.is_interested(), "listener should report interest");
    assert_eq!(listener.events(), vec![add.clone()]);

    // Step 2: Update
    let update =
        Event::new("/services/foo", EventType::Update, "v1=1.2.3.5:8080").expect("valid");
    dispatcher.notify(&update).expect("notify");
    assert_eq!(listener.events(), vec![add, update]);

    // Step 3: Unsubscribe, then Delete is not delivered
    assert!(dispatcher
        .unsubscribe("/services/foo", &listener)
        .expect("unsubscribe"));
    let delete = Event::new("/services/foo", EventType::Delete, "").expect("valid");
    let report = dispatcher.notify(&delete).expect("notify");
    assert_eq!(report.attempted(), 0);
    assert_eq!(listener.events().len(), 2, "no delivery after unsubscribe");
}

#[test]
fn fan_out_follows_registration_order() {
    let dispatcher = Dispatcher::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["l1", "l2"] {
        dispatcher
            .subscribe(
                "/services/foo",
                Arc::new(Tagged {
                    tag,
                    order: Arc::clone(&order),
                }),
            )
            .expect("subscribe");
    }

    let report = dispatcher
        .notify(&Event::added("/services/foo", "x").expect("valid"))
        .expect("notify");

    assert_eq!(*order.lock().expect("lock"), vec!["l1", "l2"]);
    assert_eq!(report.delivered, 2);
    // Both listeners ran even though neither reported interest.
    assert!(!report.is_interested());
}

#[test]
fn failing_listener_does_not_block_sibling() {
    let dispatcher = Dispatcher::new();
    let healthy = Arc::new(Recording::default());
    dispatcher
        .subscribe("/services/foo", Arc::new(Faulty))
        .expect("subscribe");
    dispatcher
        .subscribe("/services/foo", healthy.clone())
        .expect("subscribe");

    let event = Event::added("/services/foo", "x").expect("valid");
    let report = dispatcher.notify(&event).expect("notify must not fail");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(healthy.events(), vec![event.clone()]);

    // The dispatcher keeps working for later events.
    let next = Event::updated("/services/foo", "y").expect("valid");
    dispatcher.notify(&next).expect("notify");
    assert_eq!(healthy.events(), vec![event, next]);
}

#[test]
fn notify_without_subscribers_is_silent() {
    let dispatcher = Dispatcher::new();
    let report = dispatcher
        .notify(&Event::deleted("/services/unknown").expect("valid"))
        .expect("notify");
    assert_eq!(report.attempted(), 0);
    assert_eq!(dispatcher.total_listener_count(), 0);
}

#[test]
fn subtree_subscriber_sees_every_instance() {
    let dispatcher = Dispatcher::new();
    let exact = Arc::new(Recording::default());
    let subtree = Arc::new(Recording::default());
    dispatcher
        .subscribe("/services/foo/providers/a", exact.clone())
        .expect("subscribe");
    dispatcher
        .subscribe_subtree("/services/foo/providers", subtree.clone())
        .expect("subscribe");

    let a = Event::added("/services/foo/providers/a", "a").expect("valid");
    let b = Event::added("/services/foo/providers/b", "b").expect("valid");
    dispatcher.notify_all([&a, &b]).expect("notify");

    assert_eq!(exact.events(), vec![a.clone()]);
    assert_eq!(subtree.events(), vec![a, b]);
}

#[test]
fn events_cross_a_json_boundary_unchanged() {
    let event = Event::added("/services/foo", "v1=1.2.3.4:8080").expect("valid");
    let wire = serde_json::to_string(&event).expect("serialize");
    let back: Event = serde_json::from_str(&wire).expect("deserialize");
    assert_eq!(back, event);
    assert_eq!(back.to_string(), "Event{Action{add}, Content{v1=1.2.3.4:8080}}");
}
