//! Snapshot bounding
//!
//! Replaces every scan of a multi-version entity with a sub-plan that only
//! yields the rows visible to the reading transaction. The replacement is
//! written in the scan's native language (see
//! `tessera_concurrency::statements::snapshot_scan`) and planned by the
//! query-processing collaborator through [`QueryPlanner`].
//!
//! The pass runs in two phases and never mutates a node it is visiting:
//!
//! 1. **Analysis** walks the tree and produces one [`DeferredInstruction`]
//!    per versioned scan, targeted at the scan's node id and carrying the
//!    planned replacement.
//! 2. **Rebuild** reconstructs the tree bottom-up. When a parent whose
//!    direct input is targeted is rebuilt, the instruction is applied to
//!    that parent (the input is swapped for the replacement) and reset.
//!    A filter directly above a scan therefore stays above the bounded scan.
//!
//! ```text
//! NotTargeted -> Targeted -> Applied -> Reset
//! ```
//!
//! An instruction is applied to exactly one parent; applying it again is
//! an error, and an instruction left pending after the root is an error.

use crate::node::{NodeId, Operator, PlanNode, PlanRoot};
use std::collections::{BTreeMap, BTreeSet};
use tessera_concurrency::statements;
use tessera_concurrency::Snapshot;
use tessera_core::{Error, QueryRequest, Result};
use tracing::debug;

/// Turns a generated statement into a plan
pub trait QueryPlanner: Send + Sync {
    /// Parse and plan `request`
    fn plan(&self, request: &QueryRequest) -> Result<PlanNode>;
}

/// Planner that keeps the statement as an opaque [`Operator::Native`] leaf
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePlanner;

impl QueryPlanner for NativePlanner {
    fn plan(&self, request: &QueryRequest) -> Result<PlanNode> {
        Ok(PlanNode::leaf(Operator::Native {
            request: request.clone(),
        }))
    }
}

/// Lifecycle of a deferred instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionState {
    /// No insertion point yet
    NotTargeted,
    /// Insertion point found, waiting for the parent
    Targeted,
    /// Spliced into its parent
    Applied,
    /// Finished
    Reset,
}

/// A replacement recorded during analysis and applied during rebuild
#[derive(Debug)]
pub struct DeferredInstruction {
    state: InstructionState,
    target: Option<NodeId>,
    replacement: Option<PlanNode>,
}

impl Default for DeferredInstruction {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredInstruction {
    /// Create an untargeted instruction
    pub fn new() -> Self {
        DeferredInstruction {
            state: InstructionState::NotTargeted,
            target: None,
            replacement: None,
        }
    }

    /// Current state
    pub fn state(&self) -> InstructionState {
        self.state
    }

    /// Node the instruction replaces
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// NotTargeted -> Targeted
    pub fn set_target(&mut self, target: NodeId, replacement: PlanNode) -> Result<()> {
        if self.state != InstructionState::NotTargeted {
            return Err(Error::invalid_state(format!(
                "deferred instruction already {:?}",
                self.state
            )));
        }
        self.target = Some(target);
        self.replacement = Some(replacement);
        self.state = InstructionState::Targeted;
        Ok(())
    }

    /// Whether `parent` has the target as a direct input
    pub fn targets_input_of(&self, parent: &PlanNode) -> bool {
        self.state == InstructionState::Targeted
            && parent
                .inputs()
                .iter()
                .any(|input| Some(input.id()) == self.target)
    }

    /// Targeted -> Applied: rebuild `parent` with the target input replaced
    pub fn apply(&mut self, parent: PlanNode) -> Result<PlanNode> {
        let target = match (self.state, self.target) {
            (InstructionState::Targeted, Some(target)) => target,
            (state, _) => {
                return Err(Error::invalid_state(format!(
                    "cannot apply deferred instruction in state {:?}",
                    state
                )))
            }
        };
        let mut replacement = self.replacement.take();
        let (id, op, inputs) = parent.into_parts();
        let inputs = inputs
            .into_iter()
            .map(|input| {
                if input.id() == target {
                    replacement.take().unwrap_or(input)
                } else {
                    input
                }
            })
            .collect();
        self.state = InstructionState::Applied;
        Ok(PlanNode::from_parts(id, op, inputs))
    }

    /// Targeted -> Applied for a target that is the root itself
    pub fn apply_at_root(&mut self, root: PlanNode) -> Result<PlanNode> {
        if self.state != InstructionState::Targeted || self.target != Some(root.id()) {
            return Err(Error::invalid_state("deferred instruction does not target the root"));
        }
        self.state = InstructionState::Applied;
        Ok(self.replacement.take().unwrap_or(root))
    }

    /// Applied -> Reset
    pub fn reset(&mut self) {
        if self.state == InstructionState::Applied {
            self.state = InstructionState::Reset;
            self.target = None;
        }
    }
}

/// Analysis phase: one targeted instruction per versioned scan
pub fn plan_instructions(
    root: &PlanNode,
    snapshot: &Snapshot,
    planner: &dyn QueryPlanner,
) -> Result<Vec<DeferredInstruction>> {
    let mut seen = BTreeSet::new();
    let mut instructions = Vec::new();
    for node in root.walk() {
        if !seen.insert(node.id()) {
            return Err(Error::invalid_state(format!(
                "plan node {} is reachable more than once",
                node.id()
            )));
        }
        let Operator::Scan { entity } = node.op() else {
            continue;
        };
        if !entity.mvcc {
            continue;
        }
        let request = statements::snapshot_scan(entity, snapshot)?;
        let replacement = planner.plan(&request)?;
        let mut instruction = DeferredInstruction::new();
        instruction.set_target(node.id(), replacement)?;
        debug!(node = %node.id(), entity = %entity, snapshot = snapshot.sequence(), "scan targeted for snapshot bound");
        instructions.push(instruction);
    }
    Ok(instructions)
}

fn rebuild(node: PlanNode, pending: &mut BTreeMap<NodeId, DeferredInstruction>) -> Result<PlanNode> {
    let (id, op, inputs) = node.into_parts();
    let inputs = inputs
        .into_iter()
        .map(|input| rebuild(input, pending))
        .collect::<Result<Vec<_>>>()?;
    let mut node = PlanNode::from_parts(id, op, inputs);

    let targeted: Vec<NodeId> = node
        .inputs()
        .iter()
        .map(PlanNode::id)
        .filter(|input| pending.contains_key(input))
        .collect();
    for target in targeted {
        if let Some(mut instruction) = pending.remove(&target) {
            if instruction.targets_input_of(&node) {
                node = instruction.apply(node)?;
                instruction.reset();
                debug!(parent = %node.id(), target = %target, "snapshot bound applied");
            }
        }
    }
    Ok(node)
}

/// Bound every versioned scan of `root` to `snapshot`
pub fn bound_to_snapshot(
    root: PlanRoot,
    snapshot: &Snapshot,
    planner: &dyn QueryPlanner,
) -> Result<PlanRoot> {
    let instructions = plan_instructions(&root.node, snapshot, planner)?;
    if instructions.is_empty() {
        return Ok(root);
    }

    let mut pending: BTreeMap<NodeId, DeferredInstruction> = instructions
        .into_iter()
        .filter_map(|instruction| instruction.target().map(|target| (target, instruction)))
        .collect();

    let root_id = root.node.id();
    let mut node = rebuild(root.node, &mut pending)?;
    if let Some(mut instruction) = pending.remove(&root_id) {
        node = instruction.apply_at_root(node)?;
        instruction.reset();
    }

    if !pending.is_empty() {
        return Err(Error::invalid_state(format!(
            "{} snapshot bound(s) left pending at the root",
            pending.len()
        )));
    }
    Ok(PlanRoot { node, kind: root.kind })
}
