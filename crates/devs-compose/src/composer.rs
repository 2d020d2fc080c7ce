//! Building one coupled model from already-present submodels.

use std::collections::HashSet;

use devs_core::{EventType, NodeId, VariableDescriptor, Visibility};
use devs_model::ModelDeclarations;

use crate::binding::{hioa_order, resolve_bindings};
use crate::routing::{event_atomic_sinks, event_atomic_source};
use crate::{
    CompositionError, CompositionResult, CoupledModel, Coupling, ExportRoutes, FlatSink,
    ImportRoutes, ModelNode, ModelTree, NodeKind, RoutingTable,
};

/// Composes coupled models into a [`ModelTree`].
///
/// [`compose`][Self::compose] runs in two phases.  The first validates the
/// coupling and resolves every route and binding against the current tree
/// without modifying it, so a rejected coupling leaves the tree exactly as it
/// was.  The second installs the new node, links the children to it, hoists
/// their routing tables and wires variables.
pub struct ModelComposer;

impl ModelComposer {
    pub fn compose(tree: &mut ModelTree, coupling: Coupling) -> CompositionResult<NodeId> {
        if tree.id_of(&coupling.uri).is_some() {
            return Err(CompositionError::DuplicateUri(coupling.uri));
        }
        let children = Self::check_submodels(tree, &coupling)?;
        Self::check_events(tree, &coupling)?;
        Self::check_variables(tree, &coupling)?;

        let routing = Self::flatten_connections(tree, &coupling)?;
        let import_routes = Self::flatten_imports(tree, &coupling)?;
        let export_routes = Self::flatten_reexports(tree, &coupling)?;
        let hioa_order = hioa_order(tree, &coupling, &children)?;
        let wiring = resolve_bindings(tree, &coupling)?;
        for (value, (leaf, name)) in &wiring {
            tree.check_leaf_slot(*leaf, name, value)?;
        }
        let declarations = Self::declarations_of(&coupling)?;
        let hioa = declarations.is_hioa() || children.iter().any(|&c| tree.node(c).hioa);

        // ── Mutation phase ────────────────────────────────────────────────
        for (value, (leaf, name)) in &wiring {
            tree.bind_leaf(*leaf, name, value)?;
        }
        let uri = coupling.uri.clone();
        let route_count = routing.len();
        let id = tree.push(ModelNode {
            uri: uri.clone(),
            parent: None,
            declarations,
            hioa,
            kind: NodeKind::Coupled(CoupledModel {
                coupling,
                children: children.clone(),
                routing,
                import_routes,
                export_routes,
                hioa_order,
            }),
        })?;

        let mut hoisted = RoutingTable::new();
        for &child in &children {
            tree.node_mut(child).parent = Some(id);
            if let Some(c) = tree.coupled_mut(child) {
                hoisted.absorb(std::mem::take(&mut c.routing));
            }
        }
        if let Some(c) = tree.coupled_mut(id) {
            c.routing.absorb(hoisted);
        }

        tracing::debug!(
            coupled = %uri,
            submodels = children.len(),
            routes = route_count,
            bindings = wiring.len(),
            hioa,
            "composed coupled model"
        );
        Ok(id)
    }

    // ── Validation ────────────────────────────────────────────────────────

    fn check_submodels(tree: &ModelTree, coupling: &Coupling) -> CompositionResult<Vec<NodeId>> {
        let mut seen = HashSet::new();
        let mut children = Vec::with_capacity(coupling.submodels.len());
        for uri in &coupling.submodels {
            let id = tree.require(uri)?;
            if !seen.insert(id) {
                return Err(CompositionError::DuplicateSubmodel {
                    coupled: coupling.uri.clone(),
                    model:   uri.clone(),
                });
            }
            if let Some(parent) = tree.parent(id) {
                return Err(CompositionError::AlreadyParented {
                    model:  uri.clone(),
                    parent: tree.uri(parent).to_owned(),
                });
            }
            children.push(id);
        }
        Ok(children)
    }

    fn submodel(tree: &ModelTree, coupling: &Coupling, uri: &str) -> CompositionResult<NodeId> {
        if !coupling.submodels.iter().any(|s| s == uri) {
            return Err(CompositionError::NotASubmodel {
                coupled: coupling.uri.clone(),
                model:   uri.to_owned(),
            });
        }
        tree.require(uri)
    }

    fn check_import(tree: &ModelTree, coupling: &Coupling, uri: &str, et: &EventType) -> CompositionResult<()> {
        let id = Self::submodel(tree, coupling, uri)?;
        if !tree.node(id).declarations.imports_event(et) {
            return Err(CompositionError::MissingImport { model: uri.to_owned(), event_type: et.clone() });
        }
        Ok(())
    }

    fn check_export(tree: &ModelTree, coupling: &Coupling, uri: &str, et: &EventType) -> CompositionResult<()> {
        let id = Self::submodel(tree, coupling, uri)?;
        if !tree.node(id).declarations.exports_event(et) {
            return Err(CompositionError::MissingExport { model: uri.to_owned(), event_type: et.clone() });
        }
        Ok(())
    }

    fn check_type_change(model: &str, from: &EventType, to: &EventType, has_converter: bool) -> CompositionResult<()> {
        if from != to && !has_converter {
            return Err(CompositionError::UnconvertedTypeChange {
                model: model.to_owned(),
                from:  from.clone(),
                to:    to.clone(),
            });
        }
        Ok(())
    }

    fn check_events(tree: &ModelTree, coupling: &Coupling) -> CompositionResult<()> {
        for edge in &coupling.imported {
            Self::check_import(tree, coupling, &edge.sink.model_uri, &edge.sink.event_type)?;
            Self::check_type_change(
                &edge.sink.model_uri,
                &edge.event_type,
                &edge.sink.event_type,
                edge.sink.converter.is_some(),
            )?;
        }

        let mut origins = HashSet::new();
        for re in &coupling.reexported {
            if !origins.insert(&re.event_type) {
                return Err(CompositionError::NonUniqueReexport {
                    coupled:    coupling.uri.clone(),
                    event_type: re.event_type.clone(),
                });
            }
            Self::check_export(tree, coupling, &re.source.model_uri, &re.source.event_type)?;
            Self::check_type_change(
                &coupling.uri,
                &re.source.event_type,
                &re.event_type,
                re.converter.is_some(),
            )?;
        }

        for conn in &coupling.connections {
            if conn.sink.model_uri == conn.source.model_uri {
                return Err(CompositionError::SelfLoop {
                    model:      conn.source.model_uri.clone(),
                    event_type: conn.source.event_type.clone(),
                });
            }
            Self::check_export(tree, coupling, &conn.source.model_uri, &conn.source.event_type)?;
            Self::check_import(tree, coupling, &conn.sink.model_uri, &conn.sink.event_type)?;
            Self::check_type_change(
                &conn.sink.model_uri,
                &conn.source.event_type,
                &conn.sink.event_type,
                conn.sink.converter.is_some(),
            )?;
        }
        Ok(())
    }

    fn check_variable(
        tree: &ModelTree,
        coupling: &Coupling,
        uri: &str,
        name: &str,
        ty: devs_core::VariableType,
        visibility: Visibility,
    ) -> CompositionResult<()> {
        let id = Self::submodel(tree, coupling, uri)?;
        if !tree.node(id).declarations.declares_variable(name, ty, visibility) {
            return Err(CompositionError::MissingVariable {
                model: uri.to_owned(),
                name: name.to_owned(),
                visibility,
                ty: ty.name(),
            });
        }
        Ok(())
    }

    fn check_variables(tree: &ModelTree, coupling: &Coupling) -> CompositionResult<()> {
        for v in &coupling.imported_vars {
            Self::check_variable(tree, coupling, &v.sink.model_uri, &v.sink.name, v.sink.ty, Visibility::Imported)?;
        }

        let mut origins = HashSet::new();
        for v in &coupling.reexported_vars {
            if !origins.insert(&v.name) {
                return Err(CompositionError::NonUniqueVariableReexport {
                    coupled: coupling.uri.clone(),
                    name:    v.name.clone(),
                });
            }
            Self::check_variable(tree, coupling, &v.source.model_uri, &v.source.name, v.source.ty, Visibility::Exported)?;
        }

        let mut sinks = HashSet::new();
        for b in &coupling.bindings {
            if b.source.model_uri == b.sink.model_uri {
                return Err(CompositionError::SelfBinding {
                    model: b.source.model_uri.clone(),
                    name:  b.source.name.clone(),
                });
            }
            Self::check_variable(tree, coupling, &b.source.model_uri, &b.source.name, b.source.ty, Visibility::Exported)?;
            Self::check_variable(tree, coupling, &b.sink.model_uri, &b.sink.name, b.sink.ty, Visibility::Imported)?;
            if !sinks.insert((&b.sink.model_uri, &b.sink.name)) {
                return Err(CompositionError::DuplicateBinding {
                    model: b.sink.model_uri.clone(),
                    name:  b.sink.name.clone(),
                });
            }
        }
        Ok(())
    }

    // ── Flattening ────────────────────────────────────────────────────────

    fn flatten_connections(tree: &ModelTree, coupling: &Coupling) -> CompositionResult<RoutingTable> {
        let mut table = RoutingTable::new();
        for conn in &coupling.connections {
            let producer = tree.require(&conn.source.model_uri)?;
            let source = event_atomic_source(tree, producer, &conn.source.event_type)?;
            let consumer = tree.require(&conn.sink.model_uri)?;
            let through = source.converter.then(&conn.sink.converter());
            for sink in event_atomic_sinks(tree, consumer, &conn.sink.event_type)? {
                table.insert(FlatSink {
                    producer:    source.leaf,
                    source_type: source.event_type.clone(),
                    sink_type:   sink.event_type,
                    consumer:    sink.leaf,
                    converter:   through.then(&sink.converter),
                });
            }
        }
        Ok(table)
    }

    fn flatten_imports(tree: &ModelTree, coupling: &Coupling) -> CompositionResult<ImportRoutes> {
        let mut routes = ImportRoutes::default();
        for edge in &coupling.imported {
            let child = tree.require(&edge.sink.model_uri)?;
            let outer = edge.sink.converter();
            for sink in event_atomic_sinks(tree, child, &edge.sink.event_type)? {
                routes.insert(edge.event_type.clone(), crate::AtomicSink {
                    leaf:       sink.leaf,
                    event_type: sink.event_type,
                    converter:  outer.then(&sink.converter),
                });
            }
        }
        Ok(routes)
    }

    fn flatten_reexports(tree: &ModelTree, coupling: &Coupling) -> CompositionResult<ExportRoutes> {
        let mut routes = ExportRoutes::default();
        for re in &coupling.reexported {
            let child = tree.require(&re.source.model_uri)?;
            let inner = event_atomic_source(tree, child, &re.source.event_type)?;
            let source = crate::AtomicSource {
                converter: inner.converter.then(&re.converter()),
                ..inner
            };
            routes.insert(&source, re.event_type.clone());
        }
        Ok(routes)
    }

    /// What the new coupled model declares to its own future parent.
    fn declarations_of(coupling: &Coupling) -> CompositionResult<ModelDeclarations> {
        let mut decls = ModelDeclarations::new();
        for edge in &coupling.imported {
            decls = decls.with_import(edge.event_type.clone());
        }
        for re in &coupling.reexported {
            decls = decls.with_export(re.event_type.clone());
        }
        for v in &coupling.imported_vars {
            if let Some(existing) = decls.variable(&v.name) {
                if existing.ty != v.sink.ty {
                    return Err(CompositionError::ConflictingVariableType {
                        coupled: coupling.uri.clone(),
                        name:    v.name.clone(),
                    });
                }
            }
            decls = decls.with_variable(VariableDescriptor::new(v.name.clone(), v.sink.ty, Visibility::Imported));
        }
        for v in &coupling.reexported_vars {
            decls = decls.with_variable(VariableDescriptor::new(v.name.clone(), v.source.ty, Visibility::Exported));
        }
        Ok(decls)
    }
}
