//! Arena storage for the model tree.
//!
//! Every model, atomic or coupled, is a [`ModelNode`] in one `Vec` indexed by
//! [`NodeId`].  Parents own their children by id and children keep their
//! parent's id for upward notifications, so the tree holds no reference
//! cycles and can be walked in either direction without `Rc`.

use std::collections::{HashMap, HashSet};

use devs_core::{EventType, NodeId};
use devs_model::{AtomicModel, DeclaredModel, ModelDeclarations};

use crate::{
    AtomicSink, CompositionError, CompositionResult, Coupling, ExportRoute, ExportRoutes,
    FlatSink, ImportRoutes, RoutingTable,
};

// ── Nodes ─────────────────────────────────────────────────────────────────────

pub struct AtomicNode {
    pub model: Box<dyn AtomicModel>,
}

/// A coupled model after composition.
pub struct CoupledModel {
    /// The definition it was composed from.
    pub coupling:      Coupling,
    /// Submodels in definition order.
    pub children:      Vec<NodeId>,
    /// Flattened connection routes of this model and, once hoisted, of all
    /// its descendants.  Empty for every node but the topmost coupled model.
    pub routing:       RoutingTable,
    /// This model's imported event types resolved down to leaf sinks.
    pub import_routes: ImportRoutes,
    /// Leaf outputs that leave this model through a reexport.
    pub export_routes: ExportRoutes,
    /// HIOA children, producers before consumers.
    pub hioa_order:    Vec<NodeId>,
}

pub enum NodeKind {
    Atomic(AtomicNode),
    Coupled(CoupledModel),
}

pub struct ModelNode {
    pub uri:          String,
    pub parent:       Option<NodeId>,
    pub declarations: ModelDeclarations,
    /// Whether this model or any descendant carries HIOA variables.
    pub hioa:         bool,
    pub kind:         NodeKind,
}

impl ModelNode {
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, NodeKind::Atomic(_))
    }
}

// ── ModelTree ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ModelTree {
    nodes:  Vec<ModelNode>,
    by_uri: HashMap<String, NodeId>,
    /// Leaf imports that received a producer's value, as `(leaf, name)`.
    bound:  HashSet<(NodeId, String)>,
    root:   Option<NodeId>,
}

impl ModelTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf model with explicit declarations.
    pub fn add_atomic(
        &mut self,
        uri: impl Into<String>,
        declarations: ModelDeclarations,
        model: Box<dyn AtomicModel>,
    ) -> CompositionResult<NodeId> {
        let uri = uri.into();
        let hioa = declarations.is_hioa();
        self.push(ModelNode {
            uri,
            parent: None,
            declarations,
            hioa,
            kind: NodeKind::Atomic(AtomicNode { model }),
        })
    }

    /// Add a leaf model whose type declares itself.
    pub fn add_declared<M: DeclaredModel>(
        &mut self,
        uri: impl Into<String>,
        model: M,
    ) -> CompositionResult<NodeId> {
        self.add_atomic(uri, M::declarations(), Box::new(model))
    }

    pub(crate) fn push(&mut self, node: ModelNode) -> CompositionResult<NodeId> {
        if self.by_uri.contains_key(&node.uri) {
            return Err(CompositionError::DuplicateUri(node.uri));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.by_uri.insert(node.uri.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn id_of(&self, uri: &str) -> Option<NodeId> {
        self.by_uri.get(uri).copied()
    }

    pub fn require(&self, uri: &str) -> CompositionResult<NodeId> {
        self.id_of(uri)
            .ok_or_else(|| CompositionError::UnknownModel(uri.to_owned()))
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &ModelNode {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut ModelNode {
        &mut self.nodes[id.index()]
    }

    #[inline]
    pub fn uri(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].uri
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// Children of a coupled model; empty for a leaf.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id.index()].kind {
            NodeKind::Coupled(c) => &c.children,
            NodeKind::Atomic(_)  => &[],
        }
    }

    pub fn is_atomic(&self, id: NodeId) -> bool {
        self.nodes[id.index()].is_atomic()
    }

    pub fn atomic(&self, id: NodeId) -> Option<&dyn AtomicModel> {
        match &self.nodes[id.index()].kind {
            NodeKind::Atomic(a)  => Some(a.model.as_ref()),
            NodeKind::Coupled(_) => None,
        }
    }

    pub fn atomic_mut(&mut self, id: NodeId) -> Option<&mut dyn AtomicModel> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Atomic(a)  => Some(a.model.as_mut()),
            NodeKind::Coupled(_) => None,
        }
    }

    pub fn coupled(&self, id: NodeId) -> Option<&CoupledModel> {
        match &self.nodes[id.index()].kind {
            NodeKind::Coupled(c) => Some(c),
            NodeKind::Atomic(_)  => None,
        }
    }

    pub(crate) fn coupled_mut(&mut self, id: NodeId) -> Option<&mut CoupledModel> {
        match &mut self.nodes[id.index()].kind {
            NodeKind::Coupled(c) => Some(c),
            NodeKind::Atomic(_)  => None,
        }
    }

    /// `id` followed by its ancestors up to the topmost one.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&n| self.parent(n))
    }

    /// The descendant of `ancestor` named `uri` (including `ancestor` itself).
    pub fn find_descendant(&self, ancestor: NodeId, uri: &str) -> Option<NodeId> {
        let id = self.id_of(uri)?;
        self.ancestors(id).any(|a| a == ancestor).then_some(id)
    }

    /// Leaves under `id`, depth-first in child order.
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if self.is_atomic(n) {
                out.push(n);
            } else {
                stack.extend(self.children(n).iter().rev());
            }
        }
        out
    }

    // ── Root and routing ──────────────────────────────────────────────────

    /// The root chosen by [`seal`][Self::seal].
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Fix `root_uri` as the root and check the whole tree is runnable:
    /// every model is reachable from the root, every leaf import is bound
    /// and every owned variable has a value.
    pub fn seal(&mut self, root_uri: &str) -> CompositionResult<NodeId> {
        let root = self.require(root_uri)?;
        if let Some(parent) = self.parent(root) {
            return Err(CompositionError::AlreadyParented {
                model:  root_uri.to_owned(),
                parent: self.uri(parent).to_owned(),
            });
        }
        for id in self.ids() {
            if self.ancestors(id).last() != Some(root) {
                return Err(CompositionError::Unreachable {
                    root:  root_uri.to_owned(),
                    model: self.uri(id).to_owned(),
                });
            }
        }
        self.check_bindings()?;
        self.root = Some(root);
        tracing::debug!(root = root_uri, models = self.len(), "model tree sealed");
        Ok(root)
    }

    /// Flattened routes of the root, or an empty table for an atomic root.
    pub fn routing(&self) -> Option<&RoutingTable> {
        self.root.and_then(|r| self.coupled(r)).map(|c| &c.routing)
    }

    /// Where an event of `event_type` produced by leaf `producer` goes.
    pub fn routes_from(&self, producer: NodeId, event_type: &EventType) -> &[FlatSink] {
        self.routing()
            .map_or(&[], |table| table.sinks_for(producer, event_type))
    }

    /// Leaf sinks of an event type imported by the root.
    pub fn root_import_sinks(&self, event_type: &EventType) -> &[AtomicSink] {
        self.root
            .and_then(|r| self.coupled(r))
            .map_or(&[], |c| c.import_routes.sinks_for(event_type))
    }

    /// Root-level exports for an output of leaf `producer`.
    pub fn root_exports(&self, producer: NodeId, event_type: &EventType) -> &[ExportRoute] {
        self.root
            .and_then(|r| self.coupled(r))
            .map_or(&[], |c| c.export_routes.routes_for(producer, event_type))
    }

    pub(crate) fn mark_bound(&mut self, leaf: NodeId, name: &str) {
        self.bound.insert((leaf, name.to_owned()));
    }

    pub fn is_bound(&self, leaf: NodeId, name: &str) -> bool {
        self.bound.contains(&(leaf, name.to_owned()))
    }
}
