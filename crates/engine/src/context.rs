//! Process-wide MVCC context
//!
//! A [`Context`] owns everything the MVCC core shares between transactions:
//! the identifier allocator, the per-entity registries, the commit log, the
//! transaction manager, the plan rewriter and the lock table. It is opened
//! once per data directory and handed around as `Arc<Context>`.
//!
//! ```text
//! open(dir) ─► tessera.toml ─► allocator.load() ─► ready
//!                                                   │
//!   begin ─► rewrite* ─► commit | rollback          │
//!                                                   ▼
//!                                shutdown ─► allocator.shutdown()
//! ```

use crate::config::{TesseraConfig, CONFIG_FILE_NAME};
use crate::sequence::LocalSequenceGenerator;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_concurrency::{
    CommitInstantsLog, Lockable, LockableResource, TransactionContext, TransactionManager,
};
use tessera_core::{
    EntityId, EntityRef, Error, IdentifierSource, QueryProcessor, Result, SequenceGenerator,
    UnassignedIdentifierScan,
};
use tessera_plan::{IdentifierSources, NativePlanner, PlanRewriter, PlanRoot, QueryPlanner};
use tessera_storage::{EntityRegistries, IdentifierAllocator};
use tracing::{debug, info, warn};

/// External systems the context works against
#[derive(Clone)]
pub struct Collaborators {
    /// Executes generated statements
    pub processor: Arc<dyn QueryProcessor>,
    /// Plans generated snapshot scans
    pub planner: Arc<dyn QueryPlanner>,
    /// Global start / commit sequence
    pub sequences: Arc<dyn SequenceGenerator>,
    /// Storage scan used once the identifier counter is exhausted
    pub scanner: Option<Arc<dyn UnassignedIdentifierScan>>,
}

impl Collaborators {
    /// Use `processor`, keeping planned scans native and sequences in-process
    pub fn new(processor: Arc<dyn QueryProcessor>) -> Self {
        Collaborators {
            processor,
            planner: Arc::new(NativePlanner),
            sequences: Arc::new(LocalSequenceGenerator::new()),
            scanner: None,
        }
    }

    /// Plan snapshot scans with `planner`
    pub fn with_planner(mut self, planner: Arc<dyn QueryPlanner>) -> Self {
        self.planner = planner;
        self
    }

    /// Draw sequence numbers from `sequences`
    pub fn with_sequences(mut self, sequences: Arc<dyn SequenceGenerator>) -> Self {
        self.sequences = sequences;
        self
    }

    /// Fall back to `scanner` once the counter is exhausted
    pub fn with_scanner(mut self, scanner: Arc<dyn UnassignedIdentifierScan>) -> Self {
        self.scanner = Some(scanner);
        self
    }
}

/// Picks the global allocator or an entity's registry
struct ConfiguredSources {
    allocator: Arc<IdentifierAllocator>,
    registries: Arc<EntityRegistries>,
    entity_scoped: bool,
}

impl IdentifierSources for ConfiguredSources {
    fn source_for(&self, entity: &EntityRef) -> Arc<dyn IdentifierSource> {
        if self.entity_scoped {
            self.registries.scoped(entity.id) as Arc<dyn IdentifierSource>
        } else {
            self.allocator.clone() as Arc<dyn IdentifierSource>
        }
    }
}

/// Key of the lock table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Namespace(String),
    Entity(EntityId),
}

/// Shared MVCC state of one data directory
pub struct Context {
    data_dir: PathBuf,
    config: TesseraConfig,
    sources: Arc<ConfiguredSources>,
    manager: TransactionManager,
    rewriter: PlanRewriter,
    locks: DashMap<LockKey, Arc<LockableResource>>,
    accepting_transactions: AtomicBool,
}

impl Context {
    /// Open the context stored in `dir`
    ///
    /// Creates the directory and a default `tessera.toml` when missing,
    /// then restores the allocator state.
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid, the directory cannot be created or
    /// the allocator state is corrupt.
    pub fn open(dir: impl AsRef<Path>, collaborators: Collaborators) -> Result<Arc<Self>> {
        let data_dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        TesseraConfig::write_default_if_missing(&config_path)?;
        let config = TesseraConfig::from_file(&config_path)?;
        Self::open_with_config(data_dir, config, collaborators)
    }

    /// Open with an explicit configuration, writing it to `tessera.toml`
    pub fn open_with_config(
        dir: impl AsRef<Path>,
        config: TesseraConfig,
        collaborators: Collaborators,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let data_dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        config.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;

        let mut allocator = IdentifierAllocator::with_state_file(
            config.allocator_options(),
            data_dir.join(&config.state_file),
        );
        if let Some(scanner) = collaborators.scanner {
            allocator = allocator.with_scanner(scanner);
        }
        allocator.load()?;

        let sources = Arc::new(ConfiguredSources {
            allocator: Arc::new(allocator),
            registries: Arc::new(EntityRegistries::new(config.max_identifier)),
            entity_scoped: config.entity_scoped_identifiers,
        });
        let manager = TransactionManager::new(
            collaborators.processor,
            collaborators.sequences,
            Arc::new(CommitInstantsLog::new()),
        );
        let rewriter = PlanRewriter::new(sources.clone(), collaborators.planner);

        info!(
            path = %data_dir.display(),
            max_identifier = config.max_identifier,
            queue_size = config.queue_size,
            entity_scoped = config.entity_scoped_identifiers,
            "Opened MVCC context"
        );

        Ok(Arc::new(Context {
            data_dir,
            config,
            sources,
            manager,
            rewriter,
            locks: DashMap::new(),
            accepting_transactions: AtomicBool::new(true),
        }))
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Active configuration
    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    /// Global identifier allocator
    pub fn allocator(&self) -> &Arc<IdentifierAllocator> {
        &self.sources.allocator
    }

    /// Per-entity identifier registries
    pub fn registries(&self) -> &Arc<EntityRegistries> {
        &self.sources.registries
    }

    /// Identifier source new identities of `entity` are drawn from
    pub fn identifier_source(&self, entity: &EntityRef) -> Arc<dyn IdentifierSource> {
        self.sources.source_for(entity)
    }

    /// Commit instants log shared by all transactions
    pub fn commit_log(&self) -> &Arc<CommitInstantsLog> {
        self.manager.commit_log()
    }

    /// Whether `begin` still accepts transactions
    pub fn is_open(&self) -> bool {
        self.accepting_transactions.load(Ordering::SeqCst)
    }

    /// Start a transaction
    pub fn begin(&self) -> Result<TransactionContext> {
        if !self.is_open() {
            return Err(Error::invalid_state("context is shut down"));
        }
        Ok(self.manager.begin())
    }

    /// Rewrite a statement plan for `txn`
    pub fn rewrite(&self, root: PlanRoot, txn: &mut TransactionContext) -> Result<PlanRoot> {
        self.rewriter.rewrite(root, txn)
    }

    /// Commit `txn` and release its locks
    ///
    /// A write conflict surfaces as [`Error::WriteConflict`]; the transaction
    /// is rolled back in that case.
    pub fn commit(&self, txn: &mut TransactionContext) -> Result<Option<i64>> {
        let outcome = self.manager.commit(txn);
        self.release_locks(txn);
        Ok(outcome?)
    }

    /// Roll back `txn` and release its locks
    pub fn rollback(&self, txn: &mut TransactionContext) -> Result<()> {
        let outcome = self.manager.rollback(txn);
        self.release_locks(txn);
        outcome
    }

    /// Lock of a namespace
    pub fn namespace_lock(&self, namespace: &str) -> Arc<LockableResource> {
        self.locks
            .entry(LockKey::Namespace(namespace.to_string()))
            .or_insert_with(|| {
                Arc::new(LockableResource::new(namespace).with_timeout(self.config.lock_timeout()))
            })
            .clone()
    }

    /// Lock of an entity, nested in its namespace lock
    pub fn entity_lock(&self, entity: &EntityRef) -> Arc<LockableResource> {
        let key = LockKey::Entity(entity.id);
        if let Some(lock) = self.locks.get(&key) {
            return lock.clone();
        }
        // Resolve the parent before taking the entry so no shard is held twice
        let parent = self.namespace_lock(&entity.namespace);
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(LockableResource::child_of(entity.to_string(), parent)))
            .clone()
    }

    fn release_locks(&self, txn: &TransactionContext) {
        let held: Vec<Arc<LockableResource>> = self
            .locks
            .iter()
            .filter(|entry| entry.value().is_held_by(txn.txn_id))
            .map(|entry| entry.value().clone())
            .collect();
        for lock in &held {
            lock.release(txn.txn_id);
        }
        if !held.is_empty() {
            debug!(txn = %txn.txn_id, released = held.len(), "locks released");
        }
    }

    /// Return entry ids of permanently removed records to their scope
    pub fn release_identifiers(&self, entity: &EntityRef, ids: &[i64]) {
        self.identifier_source(entity).release_identifiers(ids);
    }

    /// Forget the identifier registry of a dropped entity
    pub fn drop_entity(&self, entity: &EntityRef) -> bool {
        self.locks.remove(&LockKey::Entity(entity.id));
        self.sources.registries.drop_entity(entity.id)
    }

    /// Stop accepting transactions and persist the allocator state
    pub fn shutdown(&self) -> Result<()> {
        if !self.accepting_transactions.swap(false, Ordering::SeqCst) {
            warn!(path = %self.data_dir.display(), "Context already shut down");
            return Ok(());
        }
        self.sources.allocator.shutdown()?;
        info!(path = %self.data_dir.display(), "MVCC context shut down");
        Ok(())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("data_dir", &self.data_dir)
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
