//! Event converters.
//!
//! A [`Converter`] maps an event of one type into an event of another (for
//! instance when a coupled model reexports a child's `Heat` event as its own
//! `Warm`).  Converters compose: `a.then(&b)` applies `a` first, then `b`.
//! The identity converter is represented without a closure so that a route
//! with no conversion anywhere along it is recognisably the identity after
//! composition.

use std::fmt;
use std::sync::Arc;

use crate::{Event, EventType};

type ConvertFn = dyn Fn(Event) -> Event + Send + Sync;

/// A pure `Event → Event` mapping.  Cheap to clone.
#[derive(Clone, Default)]
pub struct Converter {
    /// `None` is the identity.
    inner: Option<Arc<ConvertFn>>,
}

impl Converter {
    pub fn identity() -> Self {
        Self { inner: None }
    }

    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Event) -> Event + Send + Sync + 'static,
    {
        Self { inner: Some(Arc::new(f)) }
    }

    /// Relabel events as `target`, keeping time and payload.
    pub fn retype(target: impl Into<EventType>) -> Self {
        let target = target.into();
        Self::new(move |e| e.retyped(target.clone()))
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.inner.is_none()
    }

    #[inline]
    pub fn convert(&self, event: Event) -> Event {
        match &self.inner {
            None    => event,
            Some(f) => f(event),
        }
    }

    /// `next ∘ self`: apply `self`, then `next`.
    ///
    /// Identity on either side is eliminated, so composing identities yields
    /// the identity.
    pub fn then(&self, next: &Converter) -> Converter {
        match (&self.inner, &next.inner) {
            (None, None)    => Converter::identity(),
            (Some(_), None) => self.clone(),
            (None, Some(_)) => next.clone(),
            (Some(first), Some(second)) => {
                let first = Arc::clone(first);
                let second = Arc::clone(second);
                Converter::new(move |e| second(first(e)))
            }
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            f.write_str("Converter(identity)")
        } else {
            f.write_str("Converter(<fn>)")
        }
    }
}
