//! Plan rewriter
//!
//! Runs the MVCC passes over a statement plan of one transaction, in order:
//!
//! 1. identifier collection under versioned UPDATE / DELETE
//! 2. identifier injection and the versioned write rewrite
//! 3. snapshot bounding of versioned scans
//!
//! Collection runs first so collectors sit directly under the original
//! modify node; injection then rewrites that node without moving them.

use crate::bound::{bound_to_snapshot, QueryPlanner};
use crate::collect::collect_identifiers;
use crate::inject::{inject_identifiers, IdentifierSources};
use crate::node::PlanRoot;
use std::sync::Arc;
use tessera_concurrency::TransactionContext;
use tessera_core::Result;
use tracing::{debug, trace};

/// Rewrites statement plans for a transaction
#[derive(Clone)]
pub struct PlanRewriter {
    sources: Arc<dyn IdentifierSources>,
    planner: Arc<dyn QueryPlanner>,
}

impl PlanRewriter {
    /// Create a rewriter drawing identities from `sources` and planning
    /// snapshot scans with `planner`
    pub fn new(sources: Arc<dyn IdentifierSources>, planner: Arc<dyn QueryPlanner>) -> Self {
        PlanRewriter { sources, planner }
    }

    /// Rewrite `root` for `txn`
    ///
    /// Fails if the transaction is no longer active, if the statement writes
    /// a reserved field, if identity allocation fails, or if a scan cannot be
    /// bounded (graph entities). Identities reserved before a failure stay
    /// recorded on the transaction and are released when it aborts.
    pub fn rewrite(&self, root: PlanRoot, txn: &mut TransactionContext) -> Result<PlanRoot> {
        txn.ensure_active()?;
        trace!(txn = %txn.txn_id, plan = %root.node.explain(), "rewriting plan");

        let kind = root.kind;
        let collected = collect_identifiers(root.node, txn);
        let injected = inject_identifiers(PlanRoot::new(collected, kind), self.sources.as_ref(), txn)?;
        let bounded = bound_to_snapshot(injected, &txn.snapshot(), self.planner.as_ref())?;

        debug!(
            txn = %txn.txn_id,
            from = ?kind,
            to = ?bounded.kind,
            "plan rewritten"
        );
        Ok(bounded)
    }
}

impl std::fmt::Debug for PlanRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanRewriter").finish_non_exhaustive()
    }
}
