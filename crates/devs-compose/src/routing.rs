//! Routing resolution: flattening event links through reexport levels.
//!
//! Couplings describe links between *direct* submodels, some of which are
//! themselves coupled.  At composition time each link is resolved down to
//! the atomic leaves that actually produce and consume the event, and the
//! converters met along the way are composed into one.  At run time a
//! produced event is then delivered with one table lookup and one
//! converter call per consumer, whatever the depth of the tree.
//!
//! Converter direction:
//! - an [`AtomicSource`] converter maps the leaf's event into the event seen
//!   at the level where the source was resolved;
//! - an [`AtomicSink`] converter maps the event arriving at the resolution
//!   level into the event the leaf imports.

use devs_core::{Converter, Event, EventType, NodeId};

use crate::{CompositionError, CompositionResult, ModelTree, NodeKind};

#[cfg(feature = "fx-hash")]
type RouteMap<K, V> = rustc_hash::FxHashMap<K, V>;
#[cfg(not(feature = "fx-hash"))]
type RouteMap<K, V> = std::collections::HashMap<K, V>;

// ── Resolved endpoints ────────────────────────────────────────────────────────

/// The leaf that really produces an exported event.
#[derive(Clone, Debug)]
pub struct AtomicSource {
    pub leaf:       NodeId,
    pub event_type: EventType,
    pub converter:  Converter,
}

/// A leaf that really consumes an imported event.
#[derive(Clone, Debug)]
pub struct AtomicSink {
    pub leaf:       NodeId,
    pub event_type: EventType,
    pub converter:  Converter,
}

/// One resolved producer-leaf to consumer-leaf route.
#[derive(Clone, Debug)]
pub struct FlatSink {
    pub producer:    NodeId,
    pub source_type: EventType,
    pub sink_type:   EventType,
    pub consumer:    NodeId,
    /// `consumer ∘ connection ∘ producer`.
    pub converter:   Converter,
}

impl FlatSink {
    /// The event as the consumer receives it.
    #[inline]
    pub fn deliver(&self, event: Event) -> Event {
        self.converter.convert(event)
    }
}

/// A leaf output that leaves a coupled model as one of its own exports.
#[derive(Clone, Debug)]
pub struct ExportRoute {
    pub event_type: EventType,
    pub converter:  Converter,
}

// ── Tables ────────────────────────────────────────────────────────────────────

/// Flattened connection routes keyed by `(producer leaf, produced type)`.
#[derive(Default, Debug)]
pub struct RoutingTable {
    routes: RouteMap<(NodeId, EventType), Vec<FlatSink>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sink: FlatSink) {
        self.routes
            .entry((sink.producer, sink.source_type.clone()))
            .or_default()
            .push(sink);
    }

    /// Move every route of `other` into `self`.
    pub fn absorb(&mut self, other: RoutingTable) {
        for (key, mut sinks) in other.routes {
            self.routes.entry(key).or_default().append(&mut sinks);
        }
    }

    pub fn sinks_for(&self, producer: NodeId, event_type: &EventType) -> &[FlatSink] {
        self.routes
            .get(&(producer, event_type.clone()))
            .map_or(&[], Vec::as_slice)
    }

    /// Number of flattened sinks.
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlatSink> {
        self.routes.values().flatten()
    }
}

/// A coupled model's imported event types resolved to leaf sinks.
#[derive(Default, Debug)]
pub struct ImportRoutes {
    routes: RouteMap<EventType, Vec<AtomicSink>>,
}

impl ImportRoutes {
    pub fn insert(&mut self, event_type: EventType, sink: AtomicSink) {
        self.routes.entry(event_type).or_default().push(sink);
    }

    pub fn sinks_for(&self, event_type: &EventType) -> &[AtomicSink] {
        self.routes.get(event_type).map_or(&[], Vec::as_slice)
    }
}

/// Leaf outputs resolved to a coupled model's reexported event types.
#[derive(Default, Debug)]
pub struct ExportRoutes {
    routes: RouteMap<(NodeId, EventType), Vec<ExportRoute>>,
}

impl ExportRoutes {
    pub fn insert(&mut self, source: &AtomicSource, event_type: EventType) {
        self.routes
            .entry((source.leaf, source.event_type.clone()))
            .or_default()
            .push(ExportRoute { event_type, converter: source.converter.clone() });
    }

    pub fn routes_for(&self, producer: NodeId, event_type: &EventType) -> &[ExportRoute] {
        self.routes
            .get(&(producer, event_type.clone()))
            .map_or(&[], Vec::as_slice)
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Resolve the leaf producing `event_type` as exported by `node`.
pub fn event_atomic_source(
    tree: &ModelTree,
    node: NodeId,
    event_type: &EventType,
) -> CompositionResult<AtomicSource> {
    let n = tree.node(node);
    if !n.declarations.exports_event(event_type) {
        return Err(CompositionError::MissingExport {
            model:      n.uri.clone(),
            event_type: event_type.clone(),
        });
    }
    match &n.kind {
        NodeKind::Atomic(_) => Ok(AtomicSource {
            leaf:       node,
            event_type: event_type.clone(),
            converter:  Converter::identity(),
        }),
        NodeKind::Coupled(c) => {
            let reexport = c.coupling.reexport_of(event_type).ok_or_else(|| {
                CompositionError::MissingExport {
                    model:      n.uri.clone(),
                    event_type: event_type.clone(),
                }
            })?;
            let child = tree.require(&reexport.source.model_uri)?;
            let inner = event_atomic_source(tree, child, &reexport.source.event_type)?;
            Ok(AtomicSource {
                leaf:       inner.leaf,
                event_type: inner.event_type,
                converter:  inner.converter.then(&reexport.converter()),
            })
        }
    }
}

/// Resolve every leaf consuming `event_type` as imported by `node`.
pub fn event_atomic_sinks(
    tree: &ModelTree,
    node: NodeId,
    event_type: &EventType,
) -> CompositionResult<Vec<AtomicSink>> {
    let n = tree.node(node);
    if !n.declarations.imports_event(event_type) {
        return Err(CompositionError::MissingImport {
            model:      n.uri.clone(),
            event_type: event_type.clone(),
        });
    }
    match &n.kind {
        NodeKind::Atomic(_) => Ok(vec![AtomicSink {
            leaf:       node,
            event_type: event_type.clone(),
            converter:  Converter::identity(),
        }]),
        NodeKind::Coupled(c) => {
            let mut out = Vec::new();
            for edge in c.coupling.import_edges_of(event_type) {
                let child = tree.require(&edge.sink.model_uri)?;
                let outer = edge.sink.converter();
                for inner in event_atomic_sinks(tree, child, &edge.sink.event_type)? {
                    out.push(AtomicSink {
                        leaf:       inner.leaf,
                        event_type: inner.event_type,
                        converter:  outer.then(&inner.converter),
                    });
                }
            }
            Ok(out)
        }
    }
}

impl ModelTree {
    /// [`event_atomic_source`] by URI.
    pub fn event_atomic_source(&self, uri: &str, event_type: &EventType) -> CompositionResult<AtomicSource> {
        event_atomic_source(self, self.require(uri)?, event_type)
    }

    /// [`event_atomic_sinks`] by URI.
    pub fn event_atomic_sinks(&self, uri: &str, event_type: &EventType) -> CompositionResult<Vec<AtomicSink>> {
        event_atomic_sinks(self, self.require(uri)?, event_type)
    }
}
