//! Priority-ordered event bus.
//!
//! Listeners run strictly in sequence: higher priority first, registration
//! order among equal priorities. A listener that stops propagation prevents
//! the remaining listeners of that dispatch from running.
//!
//! Listener storage is a type map keyed by the event type, so each event has
//! its own statically typed listener list.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::Fault;

mod lifecycle;

pub use lifecycle::{ErrorEvent, Outcome, RedirectEvent, RequestEvent, ResponseEvent, RouteMatchedEvent};

/// A dispatchable event.
pub trait Event: 'static {
    /// Name listeners are registered and removed under.
    const NAME: &'static str;

    fn is_propagation_stopped(&self) -> bool;

    fn stop_propagation(&mut self);
}

/// Something that reacts to an event of type `E`.
///
/// Implemented for every `Fn(&mut E) -> Result<(), Fault>` closure.
pub trait Listener<E>: Send + Sync {
    fn handle(&self, event: &mut E) -> Result<(), Fault>;
}

impl<E, F> Listener<E> for F
where
    F: Fn(&mut E) -> Result<(), Fault> + Send + Sync,
{
    fn handle(&self, event: &mut E) -> Result<(), Fault> {
        self(event)
    }
}

/// Handle returned by [`EventBus::listen`], used to remove one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// How many listeners a dispatch may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    All,
    /// Stop after the first listener, whatever it does.
    FirstOnly,
}

struct Registered<E> {
    id: ListenerId,
    priority: i32,
    listener: Arc<dyn Listener<E>>,
}

// The listeners of one event type, kept sorted.
struct Listeners<E> {
    entries: Vec<Registered<E>>,
}

impl<E: 'static> Listeners<E> {
    fn insert(&mut self, registered: Registered<E>) {
        let at = self
            .entries
            .iter()
            .position(|r| r.priority < registered.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, registered);
    }
}

/// The event bus.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::events::{Dispatch, EventBus, RequestEvent};
///
/// let mut bus = EventBus::new();
/// bus.listen(0, |event: &mut RequestEvent| {
///     event.set_output("maintenance");
///     Ok(())
/// });
/// bus.listen(0, |_: &mut RequestEvent| panic!("never runs"));
///
/// let mut event = RequestEvent::new("GET", "/");
/// bus.dispatch(&mut event, Dispatch::All).unwrap();
/// assert!(event.outcome.output.is_some());
/// ```
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    names: HashMap<&'static str, TypeId>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure for `E`. Higher `priority` runs first.
    pub fn listen<E, F>(&mut self, priority: i32, f: F) -> ListenerId
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.listen_with(priority, f)
    }

    /// Registers a [`Listener`] implementation for `E`.
    pub fn listen_with<E, L>(&mut self, priority: i32, listener: L) -> ListenerId
    where
        E: Event,
        L: Listener<E> + 'static,
    {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.names.insert(E::NAME, TypeId::of::<E>());

        let registered = Registered {
            id,
            priority,
            listener: Arc::new(listener) as Arc<dyn Listener<E>>,
        };
        let slot = self
            .listeners
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Listeners::<E> { entries: Vec::new() }) as Box<dyn Any + Send + Sync>);
        if let Some(list) = slot.downcast_mut::<Listeners<E>>() {
            list.insert(registered);
        }

        debug!(event = E::NAME, priority, "listener registered");
        id
    }

    /// Removes every listener registered for the event called `name`.
    ///
    /// Returns `true` if the event had listeners.
    pub fn unlisten(&mut self, name: &str) -> bool {
        match self.names.remove(name) {
            Some(type_id) => self.listeners.remove(&type_id).is_some(),
            None => false,
        }
    }

    /// Removes a single listener of `E`.
    pub fn remove<E: Event>(&mut self, id: ListenerId) -> bool {
        let Some(list) = self.list_mut::<E>() else {
            return false;
        };
        let before = list.entries.len();
        list.entries.retain(|r| r.id != id);
        list.entries.len() < before
    }

    /// Returns `true` when `E` has at least one listener.
    pub fn has<E: Event>(&self) -> bool {
        self.list::<E>().is_some_and(|list| !list.entries.is_empty())
    }

    /// Runs the listeners of `E` in order.
    ///
    /// # Errors
    ///
    /// The first fault raised by a listener; later listeners do not run.
    pub fn dispatch<E: Event>(&self, event: &mut E, mode: Dispatch) -> Result<(), Fault> {
        let Some(list) = self.list::<E>() else {
            return Ok(());
        };

        for registered in &list.entries {
            if event.is_propagation_stopped() {
                debug!(event = E::NAME, "propagation stopped");
                break;
            }
            registered.listener.handle(event)?;
            if mode == Dispatch::FirstOnly {
                break;
            }
        }
        Ok(())
    }

    fn list<E: Event>(&self) -> Option<&Listeners<E>> {
        self.listeners
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_ref::<Listeners<E>>())
    }

    fn list_mut<E: Event>(&mut self) -> Option<&mut Listeners<E>> {
        self.listeners
            .get_mut(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_mut::<Listeners<E>>())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.names.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Tally {
        seen: Vec<&'static str>,
        stopped: bool,
    }

    impl Event for Tally {
        const NAME: &'static str = "tally";

        fn is_propagation_stopped(&self) -> bool {
            self.stopped
        }

        fn stop_propagation(&mut self) {
            self.stopped = true;
        }
    }

    fn push(tag: &'static str) -> impl Fn(&mut Tally) -> Result<(), Fault> + Send + Sync {
        move |p: &mut Tally| {
            p.seen.push(tag);
            Ok(())
        }
    }

    #[test]
    fn priority_then_registration_order() {
        let mut bus = EventBus::new();
        bus.listen(0, push("a"));
        bus.listen(10, push("b"));
        bus.listen(0, push("c"));
        bus.listen(10, push("d"));

        let mut tally = Tally::default();
        bus.dispatch(&mut tally, Dispatch::All).unwrap();
        assert_eq!(tally.seen, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn stop_propagation_halts_the_chain() {
        let mut bus = EventBus::new();
        bus.listen(0, |p: &mut Tally| {
            p.seen.push("first");
            p.stop_propagation();
            Ok(())
        });
        bus.listen(0, push("second"));

        let mut tally = Tally::default();
        bus.dispatch(&mut tally, Dispatch::All).unwrap();
        assert_eq!(tally.seen, vec!["first"]);
    }

    #[test]
    fn first_only_runs_one_listener() {
        let mut bus = EventBus::new();
        bus.listen(0, push("a"));
        bus.listen(0, push("b"));
        let mut tally = Tally::default();
        bus.dispatch(&mut tally, Dispatch::FirstOnly).unwrap();
        assert_eq!(tally.seen, vec!["a"]);
    }

    #[test]
    fn listener_fault_aborts_dispatch() {
        let mut bus = EventBus::new();
        bus.listen(0, |_: &mut Tally| Err(Fault::msg("nope")));
        bus.listen(0, push("after"));
        let mut tally = Tally::default();
        assert!(bus.dispatch(&mut tally, Dispatch::All).is_err());
        assert!(tally.seen.is_empty());
    }

    #[test]
    fn unlisten_by_name_and_by_id() {
        let calls = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();
        let counter = Arc::clone(&calls);
        let id = bus.listen(0, move |_: &mut Tally| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        assert!(bus.has::<Tally>());
        assert!(bus.remove::<Tally>(id));
        assert!(!bus.has::<Tally>());

        bus.listen(0, push("x"));
        assert!(bus.unlisten("tally"));
        assert!(!bus.unlisten("tally"));
        let mut tally = Tally::default();
        bus.dispatch(&mut tally, Dispatch::All).unwrap();
        assert!(tally.seen.is_empty());
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
