//! Variable rewiring and HIOA dependency ordering.
//!
//! Variable links are resolved like event links (see [`crate::routing`]) but
//! carry value cells instead of converters: the consumer leaf's import slot
//! receives the producer leaf's own [`AnyValue`], so reads never copy or
//! poll.

use std::collections::HashMap;

use devs_core::{AnyValue, CoreError, NodeId, VariableType, Visibility};
use devs_model::ModelError;

use crate::{CompositionError, CompositionResult, Coupling, ModelTree, NodeKind};

/// A leaf variable: `(leaf, variable name in the leaf)`.
pub type LeafVariable = (NodeId, String);

fn missing(tree: &ModelTree, node: NodeId, name: &str, ty: VariableType, visibility: Visibility) -> CompositionError {
    CompositionError::MissingVariable {
        model: tree.uri(node).to_owned(),
        name: name.to_owned(),
        visibility,
        ty: ty.name(),
    }
}

/// Resolve the leaf owning the variable `name` exported by `node`.
pub fn variable_atomic_source(
    tree: &ModelTree,
    node: NodeId,
    name: &str,
    ty: VariableType,
) -> CompositionResult<LeafVariable> {
    let n = tree.node(node);
    if !n.declarations.declares_variable(name, ty, Visibility::Exported) {
        return Err(missing(tree, node, name, ty, Visibility::Exported));
    }
    match &n.kind {
        NodeKind::Atomic(_) => Ok((node, name.to_owned())),
        NodeKind::Coupled(c) => {
            let re = c
                .coupling
                .reexported_var(name, ty)
                .ok_or_else(|| missing(tree, node, name, ty, Visibility::Exported))?;
            let child = tree.require(&re.source.model_uri)?;
            variable_atomic_source(tree, child, &re.source.name, ty)
        }
    }
}

/// Resolve every leaf import fed by the variable `name` imported by `node`.
pub fn variable_atomic_sinks(
    tree: &ModelTree,
    node: NodeId,
    name: &str,
    ty: VariableType,
) -> CompositionResult<Vec<LeafVariable>> {
    let n = tree.node(node);
    if !n.declarations.declares_variable(name, ty, Visibility::Imported) {
        return Err(missing(tree, node, name, ty, Visibility::Imported));
    }
    match &n.kind {
        NodeKind::Atomic(_) => Ok(vec![(node, name.to_owned())]),
        NodeKind::Coupled(c) => {
            let mut out = Vec::new();
            for sink in c.coupling.imported_var_sinks(name, ty) {
                let child = tree.require(&sink.model_uri)?;
                out.extend(variable_atomic_sinks(tree, child, &sink.name, ty)?);
            }
            Ok(out)
        }
    }
}

/// Resolve every binding of `coupling` to `(producer value, consumer leaf)`
/// pairs, without touching any model.
pub(crate) fn resolve_bindings(
    tree: &ModelTree,
    coupling: &Coupling,
) -> CompositionResult<Vec<(AnyValue, LeafVariable)>> {
    let mut wiring = Vec::new();
    for binding in &coupling.bindings {
        let ty = binding.source.ty;
        let producer = tree.require(&binding.source.model_uri)?;
        let (leaf, leaf_name) = variable_atomic_source(tree, producer, &binding.source.name, ty)?;
        let value = leaf_value(tree, leaf, &leaf_name, ty)?;
        let consumer = tree.require(&binding.sink.model_uri)?;
        for target in variable_atomic_sinks(tree, consumer, &binding.sink.name, ty)? {
            wiring.push((value.clone(), target));
        }
    }
    Ok(wiring)
}

fn leaf_value(tree: &ModelTree, leaf: NodeId, name: &str, ty: VariableType) -> CompositionResult<AnyValue> {
    let value = tree
        .atomic(leaf)
        .and_then(|m| m.value_of(name))
        .filter(|v| v.ty() == ty)
        .ok_or_else(|| CompositionError::MissingValue {
            model: tree.uri(leaf).to_owned(),
            name:  name.to_owned(),
        })?;
    Ok(value)
}

/// Order the HIOA children of `coupling` so every producer precedes its
/// consumers.  Independent children keep their definition order.
pub(crate) fn hioa_order(
    tree: &ModelTree,
    coupling: &Coupling,
    children: &[NodeId],
) -> CompositionResult<Vec<NodeId>> {
    let hioa: Vec<NodeId> = children.iter().copied().filter(|&c| tree.node(c).hioa).collect();
    let position: HashMap<NodeId, usize> = hioa.iter().enumerate().map(|(i, &c)| (c, i)).collect();

    let mut indegree = vec![0usize; hioa.len()];
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); hioa.len()];
    for binding in &coupling.bindings {
        let src = tree.require(&binding.source.model_uri)?;
        let dst = tree.require(&binding.sink.model_uri)?;
        if let (Some(&s), Some(&d)) = (position.get(&src), position.get(&dst)) {
            if !consumers[s].contains(&d) {
                consumers[s].push(d);
                indegree[d] += 1;
            }
        }
    }

    // Kahn's algorithm, always taking the earliest ready child.
    let mut done = vec![false; hioa.len()];
    let mut order = Vec::with_capacity(hioa.len());
    while order.len() < hioa.len() {
        let Some(next) = (0..hioa.len()).find(|&i| !done[i] && indegree[i] == 0) else {
            let models = (0..hioa.len())
                .filter(|&i| !done[i])
                .map(|i| tree.uri(hioa[i]).to_owned())
                .collect();
            return Err(CompositionError::HioaCycle { coupled: coupling.uri.clone(), models });
        };
        done[next] = true;
        order.push(hioa[next]);
        for &d in &consumers[next] {
            indegree[d] -= 1;
        }
    }
    Ok(order)
}

impl ModelTree {
    /// Fail unless `leaf` has an import slot `name` accepting `value`.
    /// Nothing is bound, so callers check every slot before binding any.
    pub(crate) fn check_leaf_slot(&self, leaf: NodeId, name: &str, value: &AnyValue) -> CompositionResult<()> {
        let uri = self.uri(leaf);
        let model = self
            .atomic(leaf)
            .ok_or_else(|| CompositionError::NotAtomic(uri.to_owned()))?;
        let source = match model.import_type(name) {
            None => ModelError::UnknownVariable { model: uri.to_owned(), name: name.to_owned() },
            Some(ty) if ty != value.ty() => {
                CoreError::ValueTypeMismatch { expected: ty.name(), found: value.ty().name() }.into()
            }
            Some(_) => return Ok(()),
        };
        Err(CompositionError::Model { model: uri.to_owned(), source })
    }

    /// Install `value` into the import slot `name` of `leaf`.
    pub(crate) fn bind_leaf(&mut self, leaf: NodeId, name: &str, value: &AnyValue) -> CompositionResult<()> {
        let uri = self.uri(leaf).to_owned();
        let model = self
            .atomic_mut(leaf)
            .ok_or_else(|| CompositionError::NotAtomic(uri.clone()))?;
        model
            .bind_imported(name, value)
            .map_err(|source| CompositionError::Model { model: uri, source })?;
        self.mark_bound(leaf, name);
        Ok(())
    }

    /// The live value cell of the variable `name` exported by `model_uri`,
    /// resolved through reexports to the owning leaf.
    pub fn exported_value(&self, model_uri: &str, name: &str, ty: VariableType) -> CompositionResult<AnyValue> {
        let (leaf, leaf_name) = variable_atomic_source(self, self.require(model_uri)?, name, ty)?;
        leaf_value(self, leaf, &leaf_name, ty)
    }

    /// Install `value` into every leaf import reached from the variable
    /// `name` imported by `model_uri`.
    pub fn bind_imported(
        &mut self,
        model_uri: &str,
        name: &str,
        ty: VariableType,
        value: &AnyValue,
    ) -> CompositionResult<()> {
        if value.ty() != ty {
            return Err(missing(self, self.require(model_uri)?, name, value.ty(), Visibility::Imported));
        }
        let targets = variable_atomic_sinks(self, self.require(model_uri)?, name, ty)?;
        for (leaf, leaf_name) in &targets {
            self.check_leaf_slot(*leaf, leaf_name, value)?;
        }
        for (leaf, leaf_name) in targets {
            self.bind_leaf(leaf, &leaf_name, value)?;
        }
        Ok(())
    }

    /// Every leaf import is bound and every owned variable has a value of
    /// its declared type.
    pub fn check_bindings(&self) -> CompositionResult<()> {
        for id in self.ids().filter(|&id| self.is_atomic(id)) {
            for var in self.node(id).declarations.variables() {
                match var.visibility {
                    Visibility::Imported if !self.is_bound(id, &var.name) => {
                        return Err(CompositionError::UnboundImport {
                            model: self.uri(id).to_owned(),
                            name:  var.name.clone(),
                        });
                    }
                    Visibility::Imported => {}
                    Visibility::Exported | Visibility::Internal => {
                        leaf_value(self, id, &var.name, var.ty)?;
                    }
                }
            }
        }
        Ok(())
    }
}
