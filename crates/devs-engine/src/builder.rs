use devs_compose::ModelTree;
use devs_core::{NodeId, SimRng};

use crate::kernel::{EngineSlot, Kernel};
use crate::{
    AtomicEngine, CoordinationEngine, EngineError, EngineResult, NoopObserver, SeededRandomSelect,
    SimObserver, SimulationConfig, Simulator, TieBreakPolicy,
};

type PolicyFactory = Box<dyn Fn(NodeId) -> Box<dyn TieBreakPolicy>>;

/// Fluent builder for a [`Simulator`].
///
/// # Required
/// - A sealed [`ModelTree`] (see [`ModelTree::seal`]).
///
/// # Optional (have defaults)
/// - `config`    : [`SimulationConfig::default`]
/// - `seed`      : shorthand for `config.seed`
/// - `tie_break` : one [`SeededRandomSelect`] per coordinator, seeded from
///   `config.seed` and the coordinator's node id
/// - `observer`  : [`NoopObserver`]
///
/// # Example
///
/// ```rust,ignore
/// let sim = SimulatorBuilder::new(tree)
///     .seed(42)
///     .tie_break(|_| LexicographicSelect)
///     .build()?;
/// ```
pub struct SimulatorBuilder {
    tree:      ModelTree,
    config:    SimulationConfig,
    tie_break: Option<PolicyFactory>,
    observer:  Box<dyn SimObserver>,
}

impl SimulatorBuilder {
    pub fn new(tree: ModelTree) -> Self {
        Self {
            tree,
            config: SimulationConfig::default(),
            tie_break: None,
            observer: Box::new(NoopObserver),
        }
    }

    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Build each coordinator's tie-break policy from its node id.
    pub fn tie_break<F, P>(mut self, factory: F) -> Self
    where
        F: Fn(NodeId) -> P + 'static,
        P: TieBreakPolicy + 'static,
    {
        self.tie_break = Some(Box::new(move |id| Box::new(factory(id))));
        self
    }

    pub fn observer(mut self, observer: impl SimObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn build(self) -> EngineResult<Simulator> {
        let root = self.tree.root().ok_or(EngineError::NotSealed)?;

        // ── One engine per node ───────────────────────────────────────────
        let seed = self.config.seed;
        let policy = |id: NodeId| -> Box<dyn TieBreakPolicy> {
            match &self.tie_break {
                Some(factory) => factory(id),
                None => Box::new(SeededRandomSelect::new(SimRng::for_node(seed, id))),
            }
        };
        let engines = self
            .tree
            .ids()
            .map(|id| {
                if self.tree.is_atomic(id) {
                    Ok(EngineSlot::Atomic(AtomicEngine::new(self.tree.uri(id))))
                } else {
                    CoordinationEngine::from_tree(&self.tree, id, policy(id)).map(EngineSlot::Coordinator)
                }
            })
            .collect::<EngineResult<Vec<_>>>()?;

        tracing::debug!(
            root = self.tree.uri(root),
            engines = engines.len(),
            seed,
            "simulator built"
        );
        Ok(Simulator::new(Kernel {
            tree: self.tree,
            engines,
            root,
            config: self.config,
            observer: self.observer,
            outbox: Vec::new(),
        }))
    }
}
