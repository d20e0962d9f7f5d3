//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tessera::crates::concurrency::statements::supersede_statements;
pub use tessera::{
    select_visible, Collaborators, Context, DataModel, EntityRef, Error, Expr, ModifyOperation,
    Operator, PlanNode, PlanRoot, PreparedQuery, QueryProcessor, QueryRequest, Result, RowBatch,
    Snapshot, StatementKind, TesseraConfig, TransactionContext, Value, Version,
    VersionedIdentity, IDENTIFIER_KEY, VERSION_KEY,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ============================================================================
// MemoryBackend - relational rows held in memory
// ============================================================================

/// One stored row: owning entity, `_eid`, `_vid`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StoredRow {
    entity_id: i64,
    eid: i64,
    vid: i64,
}

/// A relational backend that understands the statements the core generates
/// for validation, publish, revert and discard.
///
/// Rows are written directly by the tests (standing in for executing the
/// rewritten plans); every other statement returns an empty batch.
#[derive(Default)]
pub struct MemoryBackend {
    entities: Mutex<Vec<EntityRef>>,
    rows: Mutex<Vec<StoredRow>>,
    executed: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

struct Ready(RowBatch);

impl PreparedQuery for Ready {
    fn execute(&mut self) -> Result<RowBatch> {
        Ok(std::mem::take(&mut self.0))
    }
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `entity` addressable by its qualified name.
    pub fn register(&self, entity: &EntityRef) {
        self.entities.lock().push(entity.clone());
    }

    /// Store a row with the given `_eid` / `_vid`.
    pub fn insert(&self, entity: &EntityRef, eid: i64, vid: i64) {
        self.rows.lock().push(StoredRow {
            entity_id: entity.id,
            eid,
            vid,
        });
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.failures.lock().push(pattern.to_string());
    }

    /// Texts of every statement that ran.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// `_vid` values stored for one `|_eid|`.
    pub fn versions_of(&self, entity: &EntityRef, eid: i64) -> Vec<i64> {
        self.rows
            .lock()
            .iter()
            .filter(|row| row.entity_id == entity.id && row.eid.abs() == eid)
            .map(|row| row.vid)
            .collect()
    }

    /// Entry ids visible in `snapshot`.
    pub fn visible(&self, entity: &EntityRef, snapshot: &Snapshot) -> Vec<i64> {
        let rows: Vec<VersionedIdentity> = self
            .rows
            .lock()
            .iter()
            .filter(|row| row.entity_id == entity.id)
            .map(|row| VersionedIdentity::new(row.entity_id, row.eid, Version::from_raw(row.vid)))
            .collect();
        select_visible(rows, snapshot)
            .into_iter()
            .map(|row| row.entry_id())
            .collect()
    }

    fn entity_named(&self, name: &str) -> Option<i64> {
        self.entities
            .lock()
            .iter()
            .find(|entity| entity.to_string() == name)
            .map(|entity| entity.id)
    }

    fn run(&self, text: &str) -> Result<RowBatch> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            // UPDATE e SET _vid = to WHERE _vid = from
            ["UPDATE", entity, "SET", _, "=", to, "WHERE", _, "=", from] => {
                let entity_id = self.entity(entity)?;
                let (to, from) = (number(to)?, number(from)?);
                for row in self.rows.lock().iter_mut() {
                    if row.entity_id == entity_id && row.vid == from {
                        row.vid = to;
                    }
                }
                Ok(RowBatch::empty())
            }
            // DELETE FROM e WHERE _vid = tag AND ABS(_eid) IN (ids)
            ["DELETE", "FROM", entity, "WHERE", _, "=", tag, "AND", ..] => {
                let entity_id = self.entity(entity)?;
                let tag = number(tag)?;
                let ids = listed_ids(text).unwrap_or_default();
                self.rows.lock().retain(|row| {
                    !(row.entity_id == entity_id && row.vid == tag && ids.contains(&row.eid.abs()))
                });
                Ok(RowBatch::empty())
            }
            // DELETE FROM e WHERE _vid = tag
            ["DELETE", "FROM", entity, "WHERE", _, "=", tag] => {
                let entity_id = self.entity(entity)?;
                let tag = number(tag)?;
                self.rows
                    .lock()
                    .retain(|row| !(row.entity_id == entity_id && row.vid == tag));
                Ok(RowBatch::empty())
            }
            ["SELECT", "MAX(_vid)", "AS", "max_vid", "FROM", entity, ..] => {
                let entity_id = self.entity(entity)?;
                let ids = listed_ids(text);
                let max = self
                    .rows
                    .lock()
                    .iter()
                    .filter(|row| row.entity_id == entity_id && row.vid > 0)
                    .filter(|row| ids.as_ref().map_or(true, |ids| ids.contains(&row.eid.abs())))
                    .map(|row| row.vid)
                    .max();
                Ok(RowBatch::scalar(
                    "max_vid",
                    max.map(Value::Int).unwrap_or(Value::Null),
                ))
            }
            _ => Ok(RowBatch::empty()),
        }
    }

    fn entity(&self, name: &str) -> Result<i64> {
        self.entity_named(name)
            .ok_or_else(|| Error::backend(format!("unknown entity {}", name)))
    }
}

/// Identities of an `IN (..)` list, if the statement has one
fn listed_ids(text: &str) -> Option<BTreeSet<i64>> {
    text.split_once("IN (")
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(list, _)| {
            list.split(',')
                .filter_map(|id| id.trim().parse::<i64>().ok())
                .collect()
        })
}

fn number(token: &str) -> Result<i64> {
    token
        .parse()
        .map_err(|_| Error::backend(format!("not a number: {}", token)))
}

impl QueryProcessor for MemoryBackend {
    fn prepare(&self, request: &QueryRequest) -> Result<Box<dyn PreparedQuery>> {
        if self
            .failures
            .lock()
            .iter()
            .any(|pattern| request.text.contains(pattern.as_str()))
        {
            return Err(Error::backend(format!("injected failure: {}", request.text)));
        }
        self.executed.lock().push(request.text.clone());
        Ok(Box::new(Ready(self.run(&request.text)?)))
    }
}

// ============================================================================
// TestContext - Context over a MemoryBackend in a temp dir
// ============================================================================

pub struct TestContext {
    pub context: Arc<Context>,
    pub backend: Arc<MemoryBackend>,
    pub dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(TesseraConfig::default())
    }

    pub fn with_config(config: TesseraConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let backend = MemoryBackend::new();
        let context = Context::open_with_config(
            dir.path(),
            config,
            Collaborators::new(backend.clone()),
        )
        .expect("Failed to open context");
        TestContext {
            context,
            backend,
            dir,
        }
    }

    /// A registered relational entity.
    pub fn table(&self, id: i64, name: &str) -> EntityRef {
        let entity = EntityRef::new(id, "public", name, DataModel::Relational);
        self.backend.register(&entity);
        entity
    }

    /// Execute the write of a rewritten plan against the backend.
    ///
    /// Literal rows are stored as they are. Versioned UPDATE / DELETE plans
    /// first replace the transaction's own rows of `targets`, then store one
    /// row per entry in `targets` and feed the collectors, which is what an
    /// executor running the plan would do.
    pub fn execute_write(&self, plan: &PlanRoot, targets: &[i64]) {
        let Operator::Modify { entity, .. } = plan.node.op() else {
            panic!("not a write plan:\n{}", plan.node.explain());
        };
        let mut input = &plan.node.inputs()[0];
        if let Operator::SupersedeOwnVersions { entity, version } = input.op() {
            let ids: BTreeSet<i64> = targets.iter().copied().collect();
            for request in supersede_statements(entity, *version, &ids) {
                self.backend
                    .execute(&request)
                    .expect("supersede own versions");
            }
            input = &input.inputs()[0];
        }
        match input.op() {
            Operator::Values { fields, rows } => {
                let eid_at = position(fields, IDENTIFIER_KEY);
                let vid_at = position(fields, VERSION_KEY);
                for row in rows {
                    let eid = row[eid_at].as_i64().expect("stamped _eid");
                    let vid = row[vid_at].as_i64().expect("stamped _vid");
                    self.backend.insert(entity, eid, vid);
                }
            }
            Operator::Extend { assignments } => {
                let tombstone = assignments
                    .iter()
                    .any(|(field, expr)| field == IDENTIFIER_KEY && matches!(expr, Expr::Negate(_)));
                let vid = assignments
                    .iter()
                    .find_map(|(field, expr)| match expr {
                        Expr::Literal(value) if field == VERSION_KEY => value.as_i64(),
                        _ => None,
                    })
                    .expect("versioned write assigns _vid");
                if let Some(collector) = input.find(|node| {
                    matches!(node.op(), Operator::IdentifierCollector { .. })
                }) {
                    if let Operator::IdentifierCollector { sink, .. } = collector.op() {
                        sink.record_all(targets.iter().copied());
                    }
                }
                for &eid in targets {
                    let eid = if tombstone { -eid } else { eid };
                    self.backend.insert(entity, eid, vid);
                }
            }
            other => panic!("unsupported write input {}", other.name()),
        }
    }
}

fn position(fields: &[String], name: &str) -> usize {
    fields
        .iter()
        .position(|field| field == name)
        .unwrap_or_else(|| panic!("missing column {}", name))
}

// ============================================================================
// Plan builders
// ============================================================================

/// `INSERT INTO entity (fields) VALUES rows`
pub fn insert_values(entity: &EntityRef, fields: &[&str], rows: Vec<Vec<Value>>) -> PlanRoot {
    PlanRoot::new(
        PlanNode::unary(
            Operator::Modify {
                entity: entity.clone(),
                operation: ModifyOperation::Insert,
                updates: Vec::new(),
            },
            PlanNode::leaf(Operator::Values {
                fields: fields.iter().map(|f| f.to_string()).collect(),
                rows,
            }),
        ),
        StatementKind::Insert,
    )
}

/// `UPDATE entity SET updates WHERE true` or `DELETE FROM entity WHERE true`
pub fn modify_all(
    entity: &EntityRef,
    operation: ModifyOperation,
    updates: Vec<(String, Expr)>,
) -> PlanRoot {
    let kind = match operation {
        ModifyOperation::Insert => StatementKind::Insert,
        ModifyOperation::Update => StatementKind::Update,
        ModifyOperation::Delete => StatementKind::Delete,
    };
    PlanRoot::new(
        PlanNode::unary(
            Operator::Modify {
                entity: entity.clone(),
                operation,
                updates,
            },
            PlanNode::unary(
                Operator::Filter {
                    condition: Expr::literal(true),
                },
                PlanNode::scan(entity.clone()),
            ),
        ),
        kind,
    )
}

/// `SELECT * FROM entity`
pub fn select_all(entity: &EntityRef) -> PlanRoot {
    PlanRoot::new(PlanNode::scan(entity.clone()), StatementKind::Select)
}

/// `_eid` values stamped on the literal rows of a rewritten INSERT.
pub fn stamped_ids(plan: &PlanRoot) -> Vec<i64> {
    let input = &plan.node.inputs()[0];
    let Operator::Values { fields, rows } = input.op() else {
        panic!("expected literal rows, got {}", input.op().name());
    };
    let eid_at = position(fields, IDENTIFIER_KEY);
    rows.iter()
        .map(|row| row[eid_at].as_i64().expect("stamped _eid"))
        .collect()
}

/// Insert and commit `count` rows, returning their identities.
pub fn seed(t: &TestContext, entity: &EntityRef, count: usize) -> Vec<i64> {
    let mut txn = t.context.begin().expect("begin");
    let rows = (0..count).map(|i| vec![Value::Int(i as i64)]).collect();
    let plan = t
        .context
        .rewrite(insert_values(entity, &["n"], rows), &mut txn)
        .expect("rewrite seed insert");
    t.execute_write(&plan, &[]);
    t.context.commit(&mut txn).expect("commit seed insert");
    stamped_ids(&plan)
}

/// Rewrite an UPDATE of `targets` for `txn` and execute it.
pub fn update(t: &TestContext, txn: &mut TransactionContext, entity: &EntityRef, targets: &[i64]) {
    let plan = modify_all(
        entity,
        ModifyOperation::Update,
        vec![("n".to_string(), Expr::literal(99i64))],
    );
    let plan = t.context.rewrite(plan, txn).expect("rewrite update");
    t.execute_write(&plan, targets);
}

/// Rewrite a DELETE of `targets` for `txn` and execute it.
pub fn delete(t: &TestContext, txn: &mut TransactionContext, entity: &EntityRef, targets: &[i64]) {
    let plan = modify_all(entity, ModifyOperation::Delete, Vec::new());
    let plan = t.context.rewrite(plan, txn).expect("rewrite delete");
    t.execute_write(&plan, targets);
}
