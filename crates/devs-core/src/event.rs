//! Events and the export/import points they flow between.
//!
//! An [`Event`] is a typed record stamped with its time of occurrence.  Its
//! payload is shared (`Arc`) so that fanning one output out to many sinks
//! never copies user data, and so events can cross into a real-time driver
//! thread through a channel.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::{Converter, Time};

// ── EventType ─────────────────────────────────────────────────────────────────

/// Name of a kind of event, e.g. `"SwitchOn"`.
///
/// Models declare the types they import and export; the composer checks every
/// connection against those declarations.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct EventType(Cow<'static, str>);

impl EventType {
    /// Event type from a string literal: usable in `const` items.
    pub const fn from_static(name: &'static str) -> Self {
        EventType(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        EventType(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for EventType {
    fn from(name: &'static str) -> Self {
        EventType::from_static(name)
    }
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// Shared, type-erased event payload.
pub type EventPayload = Arc<dyn Any + Send + Sync>;

/// One occurrence of an event type at a simulated instant.
#[derive(Clone)]
pub struct Event {
    event_type:         EventType,
    time_of_occurrence: Time,
    payload:            Option<EventPayload>,
}

impl Event {
    pub fn new(event_type: impl Into<EventType>, time_of_occurrence: Time) -> Self {
        Self {
            event_type: event_type.into(),
            time_of_occurrence,
            payload: None,
        }
    }

    /// Attach a payload, replacing any existing one.
    pub fn with_payload<T: Any + Send + Sync>(mut self, payload: T) -> Self {
        self.payload = Some(Arc::new(payload));
        self
    }

    #[inline]
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    #[inline]
    pub fn time_of_occurrence(&self) -> Time {
        self.time_of_occurrence
    }

    /// The payload downcast to `T`, `None` if absent or of another type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// The same occurrence relabelled as `event_type` (payload is shared).
    pub fn retyped(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    /// The same event stamped with another occurrence time.
    pub fn restamped(mut self, time: Time) -> Self {
        self.time_of_occurrence = time;
        self
    }

    /// Replace the payload by applying `f` to the current one.
    pub fn map_payload<T, U, F>(mut self, f: F) -> Self
    where
        T: Any,
        U: Any + Send + Sync,
        F: FnOnce(Option<&T>) -> U,
    {
        let next = f(self.payload::<T>());
        self.payload = Some(Arc::new(next));
        self
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("event_type", &self.event_type)
            .field("time_of_occurrence", &self.time_of_occurrence)
            .field("payload", &self.payload.as_ref().map(|_| "<payload>"))
            .finish()
    }
}

// ── Export / import points ────────────────────────────────────────────────────

/// A model able to export events of a given type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct EventSource {
    pub model_uri:  String,
    pub event_type: EventType,
}

impl EventSource {
    pub fn new(model_uri: impl Into<String>, event_type: impl Into<EventType>) -> Self {
        Self { model_uri: model_uri.into(), event_type: event_type.into() }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.model_uri, self.event_type)
    }
}

/// A model able to import events of a given type, with an optional converter
/// applied to events before they reach it.
#[derive(Clone, Debug)]
pub struct EventSink {
    pub model_uri:  String,
    pub event_type: EventType,
    pub converter:  Option<Converter>,
}

impl EventSink {
    pub fn new(model_uri: impl Into<String>, event_type: impl Into<EventType>) -> Self {
        Self { model_uri: model_uri.into(), event_type: event_type.into(), converter: None }
    }

    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    /// The sink's converter, identity when none was given.
    pub fn converter(&self) -> Converter {
        self.converter.clone().unwrap_or_default()
    }
}

impl fmt::Display for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.model_uri, self.event_type)
    }
}
