//! The engine driving one coupled model.
//!
//! A coordinator keeps, for every child, the simulated time elapsed since
//! that child's last event.  Virtual synchrony holds outside a step:
//!
//! ```text
//! child.time_of_last_event + elapsed[child] == coordinator.time_of_last_event
//! ```
//!
//! so the coordinator's own next event is `min(child.next_time_advance -
//! elapsed[child])` after its last one.  Children tied on that minimum are
//! separated by a [`TieBreakPolicy`].
//!
//! The recursive step protocol lives on the crate-private kernel (see the
//! `impl Kernel` block below) because a step walks down into child engines
//! and up into parents' active sets.

use std::collections::BTreeSet;

use devs_compose::ModelTree;
use devs_core::{Duration, NodeId, Time};

use crate::kernel::Kernel;
use crate::{
    CollisionPolicy, EngineClock, EngineError, EngineResult, ProtocolState, SimulationEngine,
    StepKind, TieBreakPolicy,
};

pub struct CoordinationEngine {
    uri:        String,
    clock:      EngineClock,
    state:      ProtocolState,
    children:   Vec<NodeId>,
    child_uris: Vec<String>,
    /// Per child: whether it carries HIOA variables.
    hioa:       Vec<bool>,
    /// Indices of HIOA children, producers before consumers.
    hioa_order: Vec<usize>,
    elapsed:    Vec<Duration>,
    /// Index of the child holding the next event.
    next:       Option<usize>,
    /// Indices of children with external events waiting.
    active:     BTreeSet<usize>,
    tie_break:  Box<dyn TieBreakPolicy>,
}

impl CoordinationEngine {
    /// The engine for the coupled model `id` of `tree`.
    pub fn from_tree(tree: &ModelTree, id: NodeId, tie_break: Box<dyn TieBreakPolicy>) -> EngineResult<Self> {
        let coupled = tree
            .coupled(id)
            .ok_or_else(|| EngineError::NotCoupled(tree.uri(id).to_owned()))?;
        let children = coupled.children.clone();
        let hioa_order = coupled
            .hioa_order
            .iter()
            .filter_map(|c| children.iter().position(|x| x == c))
            .collect();
        Ok(Self {
            uri: tree.uri(id).to_owned(),
            clock: EngineClock::unstarted(),
            state: ProtocolState::Uninitialised,
            child_uris: children.iter().map(|&c| tree.uri(c).to_owned()).collect(),
            hioa: children.iter().map(|&c| tree.node(c).hioa).collect(),
            hioa_order,
            elapsed: vec![Duration::default(); children.len()],
            next: None,
            active: BTreeSet::new(),
            tie_break,
            children,
        })
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Time elapsed since `child`'s last event, as seen by this coordinator.
    pub fn elapsed_of(&self, child: NodeId) -> Option<Duration> {
        self.position(child).map(|i| self.elapsed[i])
    }

    /// The child that holds the next event, if any is scheduled.
    pub fn next_child(&self) -> Option<NodeId> {
        self.next.map(|i| self.children[i])
    }

    /// Children with external events waiting, in definition order.
    pub fn active_children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.active.iter().map(|&i| self.children[i])
    }

    /// Record that the child `child_uri` has external events to consume.
    pub fn has_received_external_events(&mut self, child_uri: &str) -> EngineResult<()> {
        let i = self.position_of_uri(child_uri)?;
        self.active.insert(i);
        Ok(())
    }

    /// Record that the child `child_uri` consumed its external events.
    /// Returns whether the active set is now empty.
    pub fn has_performed_external_events(&mut self, child_uri: &str) -> EngineResult<bool> {
        let i = self.position_of_uri(child_uri)?;
        self.active.remove(&i);
        Ok(self.active.is_empty())
    }

    fn position(&self, child: NodeId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    fn position_of_uri(&self, child_uri: &str) -> EngineResult<usize> {
        self.child_uris
            .iter()
            .position(|u| u == child_uri)
            .ok_or_else(|| EngineError::NotAChild {
                coordinator: self.uri.clone(),
                child:       child_uri.to_owned(),
            })
    }

    fn require_child(&self, child: NodeId) -> EngineResult<usize> {
        self.position(child).ok_or_else(|| EngineError::NotAChild {
            coordinator: self.uri.clone(),
            child:       format!("{child:?}"),
        })
    }

    /// HIOA children in dependency order, then the rest in definition order.
    fn initialisation_order(&self) -> Vec<NodeId> {
        let rest = (0..self.children.len()).filter(|i| !self.hioa[*i]);
        self.hioa_order
            .iter()
            .copied()
            .chain(rest)
            .map(|i| self.children[i])
            .collect()
    }

    /// Move the last-event time to `now` and age every child by the same span.
    fn begin_round(&mut self, now: Time, operation: &'static str) -> EngineResult<()> {
        self.clock.check_within(&self.uri, operation, now)?;
        let advance = now - self.clock.time_of_last_event;
        for e in &mut self.elapsed {
            *e += advance;
        }
        self.clock.time_of_last_event = now;
        Ok(())
    }

    fn mark_synchronised(&mut self, i: usize) {
        self.elapsed[i] = Duration::zero(self.clock.time_of_last_event.unit());
    }

    /// Pick the child with the smallest remaining time and reschedule.
    ///
    /// With `keep_current`, the previous choice survives as long as it is
    /// still among the earliest children.
    fn choose_next(&mut self, remaining: &[Duration], keep_current: bool) -> EngineResult<()> {
        let earliest = remaining.iter().copied().min().unwrap_or(Duration::INFINITY);
        self.next = if earliest.is_infinite() {
            None
        } else {
            let candidates: Vec<usize> = (0..remaining.len()).filter(|&i| remaining[i] == earliest).collect();
            match self.next {
                Some(current) if keep_current && candidates.contains(&current) => Some(current),
                _ if candidates.len() == 1 => Some(candidates[0]),
                _ => {
                    let uris: Vec<&str> = candidates.iter().map(|&i| self.child_uris[i].as_str()).collect();
                    let pick = self.tie_break.select(&uris);
                    let chosen = candidates.get(pick).copied().ok_or(EngineError::InvalidSelection {
                        coordinator: self.uri.clone(),
                        index:       pick,
                        candidates:  candidates.len(),
                    })?;
                    Some(chosen)
                }
            }
        };
        self.clock.schedule(self.clock.time_of_last_event, earliest);
        Ok(())
    }
}

impl SimulationEngine for CoordinationEngine {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn clock(&self) -> &EngineClock {
        &self.clock
    }

    fn state(&self) -> ProtocolState {
        self.state
    }

    fn has_pending_external_events(&self) -> bool {
        !self.active.is_empty()
    }
}

impl std::fmt::Debug for CoordinationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationEngine")
            .field("uri", &self.uri)
            .field("clock", &self.clock)
            .field("state", &self.state)
            .field("next", &self.next_child())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

// ── Step protocol ─────────────────────────────────────────────────────────────

impl Kernel {
    pub(crate) fn coordinator_initialise(&mut self, id: NodeId, start: Time) -> EngineResult<()> {
        let order = {
            let c = self.coordinator(id)?;
            c.state.require(&c.uri, "initialise", ProtocolState::Uninitialised)?;
            c.initialisation_order()
        };
        for child in order {
            self.initialise(child, start)?;
        }
        let c = self.coordinator_mut(id)?;
        c.clock.time_of_last_event = start;
        for i in 0..c.elapsed.len() {
            c.mark_synchronised(i);
        }
        self.reschedule(id, false)?;
        self.coordinator_mut(id)?.state.finish();
        self.check_coordinator(id, "initialise")
    }

    pub(crate) fn coordinator_produce_output(&mut self, id: NodeId, current: Time) -> EngineResult<()> {
        let winner = {
            let c = self.coordinator_mut(id)?;
            if current != c.clock.time_of_next_event {
                return Err(EngineError::TimeOutOfRange {
                    uri:       c.uri.clone(),
                    operation: "produce_output",
                    time:      current,
                    earliest:  c.clock.time_of_next_event,
                    latest:    c.clock.time_of_next_event,
                });
            }
            c.state.begin(&c.uri, "produce_output", ProtocolState::ProduceOutput)?;
            c.next_child()
                .ok_or_else(|| EngineError::NoScheduledEvent { uri: c.uri.clone() })?
        };
        self.produce_output(winner, current)?;
        self.coordinator_mut(id)?.state.finish();
        Ok(())
    }

    /// Step the child holding the next event.  When that child is HIOA,
    /// every other HIOA child is brought to the same instant by a causal
    /// step, producers before consumers.  Then deliver external events.
    pub(crate) fn coordinator_internal_step(&mut self, id: NodeId) -> EngineResult<()> {
        let (now, winner, children, hioa_order, winner_is_hioa) = {
            let c = self.coordinator_mut(id)?;
            c.state.begin(&c.uri, "internal_event_step", ProtocolState::InternalStep)?;
            let now = c.clock.time_of_next_event;
            let winner = c
                .next
                .filter(|_| !now.is_infinite())
                .ok_or_else(|| EngineError::NoScheduledEvent { uri: c.uri.clone() })?;
            c.begin_round(now, "internal_event_step")?;
            (now, winner, c.children.clone(), c.hioa_order.clone(), c.hioa[winner])
        };

        if winner_is_hioa {
            for j in hioa_order {
                if j == winner {
                    self.internal_step(children[j])?;
                } else {
                    self.causal_step(children[j], now)?;
                }
                self.coordinator_mut(id)?.mark_synchronised(j);
            }
        } else {
            self.internal_step(children[winner])?;
            self.coordinator_mut(id)?.mark_synchronised(winner);
        }

        self.deliver_external(id, now)?;
        self.reschedule(id, false)?;
        self.finish_coordinator_step(id, StepKind::Internal, now, "internal_event_step")
    }

    pub(crate) fn coordinator_external_step(&mut self, id: NodeId, elapsed: Duration) -> EngineResult<()> {
        let now = {
            let c = self.coordinator_mut(id)?;
            let now = c.clock.time_of_last_event + elapsed;
            c.clock.check_within(&c.uri, "external_event_step", now)?;
            c.state.begin(&c.uri, "external_event_step", ProtocolState::ExternalStep)?;
            c.begin_round(now, "external_event_step")?;
            now
        };
        self.deliver_external(id, now)?;
        self.reschedule(id, true)?;
        self.finish_coordinator_step(id, StepKind::External, now, "external_event_step")
    }

    /// Bring every HIOA child to `now`; non-HIOA children only age.
    pub(crate) fn coordinator_causal_step(&mut self, id: NodeId, now: Time) -> EngineResult<()> {
        let (children, hioa_order) = {
            let c = self.coordinator_mut(id)?;
            c.state.begin(&c.uri, "causal_event_step", ProtocolState::CausalStep)?;
            c.begin_round(now, "causal_event_step")?;
            (c.children.clone(), c.hioa_order.clone())
        };
        for j in hioa_order {
            self.causal_step(children[j], now)?;
            self.coordinator_mut(id)?.mark_synchronised(j);
        }
        self.reschedule(id, true)?;
        self.finish_coordinator_step(id, StepKind::Causal, now, "causal_event_step")
    }

    pub(crate) fn coordinator_end_simulation(&mut self, id: NodeId, end: Time) -> EngineResult<()> {
        let children = {
            let c = self.coordinator(id)?;
            c.state.require(&c.uri, "end_simulation", ProtocolState::AwaitNextEvent)?;
            c.children.clone()
        };
        for child in children {
            self.end_simulation(child, end)?;
        }
        self.coordinator_mut(id)?.state = ProtocolState::Ended;
        Ok(())
    }

    /// External step of every active child, in definition order.  A HIOA
    /// child first has the HIOA producers ahead of it causal-stepped to
    /// `now`, so it reads current values.
    ///
    /// A child whose own next event falls on `now` collides with its inputs.
    /// Under [`CollisionPolicy::InternalFirst`] it emits its output and takes
    /// its internal step first, then the external step with zero elapsed
    /// time.  Output routed during that internal step may activate further
    /// children, so the active set is drained rather than snapshotted.
    fn deliver_external(&mut self, id: NodeId, now: Time) -> EngineResult<()> {
        let (children, hioa, hioa_order) = {
            let c = self.coordinator(id)?;
            (c.children.clone(), c.hioa.clone(), c.hioa_order.clone())
        };
        while let Some(i) = self.coordinator_mut(id)?.active.pop_first() {
            let child = children[i];
            if !self.engine(child).has_pending_external_events() {
                continue;
            }
            if hioa[i] {
                for &j in hioa_order.iter().take_while(|&&j| j != i) {
                    if !self.coordinator(id)?.elapsed[j].is_zero() {
                        self.causal_step(children[j], now)?;
                        self.coordinator_mut(id)?.mark_synchronised(j);
                    }
                }
            }
            let elapsed = self.coordinator(id)?.elapsed[i];
            if self.engine(child).next_time_advance() == elapsed {
                match self.config.collisions {
                    CollisionPolicy::Reject => return self.confluent_step(child, elapsed),
                    CollisionPolicy::InternalFirst => {
                        self.produce_output(child, now)?;
                        self.internal_step(child)?;
                        self.coordinator_mut(id)?.mark_synchronised(i);
                    }
                }
            }
            if self.engine(child).has_pending_external_events() {
                let elapsed = self.coordinator(id)?.elapsed[i];
                self.external_step(child, elapsed)?;
                self.coordinator_mut(id)?.mark_synchronised(i);
            }
        }
        Ok(())
    }

    /// Recompute the next event from every child's remaining time.
    fn reschedule(&mut self, id: NodeId, keep_current: bool) -> EngineResult<()> {
        let remaining = {
            let c = self.coordinator(id)?;
            c.children
                .iter()
                .zip(&c.elapsed)
                .map(|(&child, &elapsed)| {
                    let advance = self.engine(child).next_time_advance();
                    advance.checked_sub(elapsed).ok_or_else(|| EngineError::ClockInconsistency {
                        uri:       self.tree.uri(child).to_owned(),
                        operation: "reschedule",
                        expected:  elapsed,
                        actual:    advance,
                    })
                })
                .collect::<EngineResult<Vec<_>>>()?
        };
        self.coordinator_mut(id)?.choose_next(&remaining, keep_current)
    }

    fn finish_coordinator_step(
        &mut self,
        id: NodeId,
        kind: StepKind,
        now: Time,
        operation: &'static str,
    ) -> EngineResult<()> {
        self.coordinator_mut(id)?.state.finish();
        if self.config.check_invariants {
            self.check_coordinator(id, operation)?;
        }
        if !self.engine(id).has_pending_external_events() {
            self.notify_performed(id)?;
        }
        self.record(id, kind, now);
        Ok(())
    }

    /// Clock consistency of `id` and virtual synchrony with its children.
    fn check_coordinator(&self, id: NodeId, operation: &'static str) -> EngineResult<()> {
        let c = self.coordinator(id)?;
        c.clock.check(&c.uri, operation)?;
        for (i, &child) in c.children.iter().enumerate() {
            let child_time = self.engine(child).time_of_last_event();
            if child_time + c.elapsed[i] != c.clock.time_of_last_event {
                return Err(EngineError::VirtualSynchrony {
                    coordinator: c.uri.clone(),
                    child:       c.child_uris[i].clone(),
                    child_time,
                    expected:    c.clock.time_of_last_event,
                });
            }
        }
        Ok(())
    }

    /// Mark `child` active in its parent and every ancestor above.
    pub(crate) fn notify_received(&mut self, child: NodeId) -> EngineResult<()> {
        let mut current = child;
        while let Some(parent) = self.tree.parent(current) {
            let c = self.coordinator_mut(parent)?;
            let i = c.require_child(current)?;
            c.active.insert(i);
            current = parent;
        }
        Ok(())
    }

    /// Remove `child` from its parent's active set, and the parent from its
    /// own parent's once it has nothing left to deliver.
    pub(crate) fn notify_performed(&mut self, child: NodeId) -> EngineResult<()> {
        let mut current = child;
        while let Some(parent) = self.tree.parent(current) {
            let c = self.coordinator_mut(parent)?;
            let i = c.require_child(current)?;
            c.active.remove(&i);
            if !c.active.is_empty() {
                break;
            }
            current = parent;
        }
        Ok(())
    }
}
