//! Publication of provisional versions
//!
//! Publishing turns every row tagged `-start_seq` into a committed row at a
//! fresh commit sequence number. Across a multi-entity write set it is
//! all-or-nothing: when entity `k` fails, entities `0..=k` are retagged back
//! to `-start_seq` before the error is returned, and the commit sequence is
//! handed back to the generator once no row carries it any more.

use crate::statements;
use crate::write_set::WriteSet;
use tessera_core::{EntityRef, Error, QueryProcessor, QueryRequest, Result, SequenceGenerator};
use tracing::{debug, error, info, warn};

fn run_all(processor: &dyn QueryProcessor, entity: &EntityRef, requests: Vec<QueryRequest>) -> Result<()> {
    for request in requests {
        processor
            .execute(&request)
            .map_err(|e| Error::backend_with_source(format!("publish of {}", entity), e))?;
    }
    Ok(())
}

/// Publish the write set of the transaction started at `start_seq`
///
/// On success the start sequence is released to `sequences` and the new
/// commit sequence is returned.
pub fn publish_write_set(
    processor: &dyn QueryProcessor,
    sequences: &dyn SequenceGenerator,
    start_seq: i64,
    write_set: &WriteSet,
) -> Result<i64> {
    let commit_seq = sequences.next_number();
    let entities: Vec<&EntityRef> = write_set
        .entities()
        .map(|writes| &writes.entity)
        .filter(|entity| entity.mvcc)
        .collect();

    for (position, entity) in entities.iter().enumerate() {
        let published = statements::publish_statements(entity, start_seq, commit_seq);
        if let Err(e) = run_all(processor, entity, published) {
            error!(start_seq, commit_seq, entity = %entity, error = %e, "publish failed, compensating");
            if compensate(processor, &entities[..=position], start_seq, commit_seq) {
                sequences.release_number(commit_seq);
            }
            return Err(e);
        }
        debug!(start_seq, commit_seq, entity = %entity, "entity published");
    }

    sequences.release_number(start_seq);
    info!(start_seq, commit_seq, entities = entities.len(), "write set published");
    Ok(commit_seq)
}

/// Retag published entities back to `-start_seq`
///
/// Returns false when some rows may still carry `commit_seq`; the commit
/// sequence must then never be handed out again.
fn compensate(processor: &dyn QueryProcessor, entities: &[&EntityRef], start_seq: i64, commit_seq: i64) -> bool {
    let mut clean = true;
    for entity in entities {
        let reverted = statements::revert_statements(entity, start_seq, commit_seq);
        if let Err(e) = run_all(processor, entity, reverted) {
            warn!(start_seq, commit_seq, entity = %entity, error = %e, "compensation failed");
            clean = false;
        }
    }
    clean
}
