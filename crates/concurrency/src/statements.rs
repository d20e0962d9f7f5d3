//! Statement templates per data model
//!
//! Every commit-path and read-path rewrite is expressed once per data model
//! in the backend's native language. Each builder matches [`DataModel`]
//! exhaustively, so a new data model does not compile until it has a case
//! (or an explicit [`Error::Unsupported`]) in every builder.
//!
//! | builder | relational (SQL) | document (MQL) | graph (Cypher) |
//! |---|---|---|---|
//! | [`max_committed_version`] | `SELECT MAX(_vid)` | `$group/$max` | `max(n._vid)` nodes + edges |
//! | [`publish_statements`] | `UPDATE .. SET _vid` | `updateMany` | `SET n._vid` nodes + edges |
//! | [`revert_statements`] | `UPDATE .. SET _vid` | `updateMany` | `SET n._vid` nodes + edges |
//! | [`discard_statements`] | `DELETE` | `deleteMany` | `DELETE` edges, then nodes |
//! | [`supersede_statements`] | `DELETE .. IN` | `deleteMany` + `$in` | `DELETE` edges, then nodes |
//! | [`snapshot_scan`] | self-join on max rank | `$sort/$group/$first` | unsupported |

use crate::snapshot::Snapshot;
use crate::write_set::EntityWrites;
use serde_json::json;
use std::collections::BTreeSet;
use tessera_core::reserved::{IDENTIFIER_KEY, VERSION_KEY};
use tessera_core::{DataModel, EntityRef, Error, QueryLanguage, QueryRequest, Result, Version};

/// Rank given to a provisional version in snapshot scans
///
/// A reader only ever sees its own provisional version, which must win over
/// every committed version of the same identity.
pub const PROVISIONAL_RANK: i64 = i64::MAX;

fn sql(entity: &EntityRef, text: String) -> QueryRequest {
    QueryRequest::internal(QueryLanguage::Sql, entity.namespace.clone(), text)
}

fn mql(entity: &EntityRef, text: String) -> QueryRequest {
    QueryRequest::internal(QueryLanguage::Mql, entity.namespace.clone(), text)
}

fn cypher(entity: &EntityRef, text: String) -> QueryRequest {
    QueryRequest::internal(QueryLanguage::Cypher, entity.namespace.clone(), text)
}

fn id_list(ids: &BTreeSet<i64>, separator: &str) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Statements returning the largest committed version among the written identities
///
/// Each statement yields a single scalar (possibly null when nothing matches).
pub fn max_committed_version(writes: &EntityWrites) -> Vec<QueryRequest> {
    let entity = &writes.entity;
    let ids = writes.scope.entries();
    match entity.model {
        DataModel::Relational => {
            let mut text = format!(
                "SELECT MAX({vid}) AS max_vid FROM {entity} WHERE {vid} > 0",
                vid = VERSION_KEY,
                entity = entity,
            );
            if let Some(ids) = ids {
                text.push_str(&format!(
                    " AND ABS({}) IN ({})",
                    IDENTIFIER_KEY,
                    id_list(ids, ", ")
                ));
            }
            vec![sql(entity, text)]
        }
        DataModel::Document => {
            let mut filter = json!({ VERSION_KEY: { "$gt": 0 } });
            if let Some(ids) = ids {
                let ids: Vec<i64> = ids.iter().copied().collect();
                filter["$expr"] = json!({ "$in": [{ "$abs": format!("${}", IDENTIFIER_KEY) }, ids] });
            }
            let pipeline = json!([
                { "$match": filter },
                { "$group": { "_id": null, "max_vid": { "$max": format!("${}", VERSION_KEY) } } }
            ]);
            vec![mql(
                entity,
                format!("db.{}.aggregate({})", entity.name, pipeline),
            )]
        }
        DataModel::Graph => {
            let id_filter = ids
                .map(|ids| format!(" AND abs(x.{}) IN [{}]", IDENTIFIER_KEY, id_list(ids, ", ")))
                .unwrap_or_default();
            graph_patterns()
                .iter()
                .map(|pattern| {
                    cypher(
                        entity,
                        format!(
                            "MATCH {pattern} WHERE x.{vid} > 0{ids} RETURN max(x.{vid}) AS max_vid",
                            pattern = pattern,
                            vid = VERSION_KEY,
                            ids = id_filter,
                        ),
                    )
                })
                .collect()
        }
    }
}

/// Statements rewriting the provisional tag of `start_seq` to `commit_seq`
pub fn publish_statements(entity: &EntityRef, start_seq: i64, commit_seq: i64) -> Vec<QueryRequest> {
    retag(entity, -start_seq, commit_seq)
}

/// Statements undoing [`publish_statements`]
pub fn revert_statements(entity: &EntityRef, start_seq: i64, commit_seq: i64) -> Vec<QueryRequest> {
    retag(entity, commit_seq, -start_seq)
}

fn retag(entity: &EntityRef, from: i64, to: i64) -> Vec<QueryRequest> {
    match entity.model {
        DataModel::Relational => vec![sql(
            entity,
            format!(
                "UPDATE {entity} SET {vid} = {to} WHERE {vid} = {from}",
                entity = entity,
                vid = VERSION_KEY,
                to = to,
                from = from,
            ),
        )],
        DataModel::Document => {
            let filter = json!({ VERSION_KEY: from });
            let update = json!({ "$set": { VERSION_KEY: to } });
            vec![mql(
                entity,
                format!("db.{}.updateMany({}, {})", entity.name, filter, update),
            )]
        }
        DataModel::Graph => graph_patterns()
            .iter()
            .map(|pattern| {
                cypher(
                    entity,
                    format!(
                        "MATCH {pattern} WHERE x.{vid} = {from} SET x.{vid} = {to}",
                        pattern = pattern,
                        vid = VERSION_KEY,
                        from = from,
                        to = to,
                    ),
                )
            })
            .collect(),
    }
}

/// Statements deleting every provisional version written by `start_seq`
pub fn discard_statements(entity: &EntityRef, start_seq: i64) -> Vec<QueryRequest> {
    let tag = -start_seq;
    match entity.model {
        DataModel::Relational => vec![sql(
            entity,
            format!("DELETE FROM {} WHERE {} = {}", entity, VERSION_KEY, tag),
        )],
        DataModel::Document => vec![mql(
            entity,
            format!("db.{}.deleteMany({})", entity.name, json!({ VERSION_KEY: tag })),
        )],
        // Edges first so node deletion never trips over dangling relationships
        DataModel::Graph => vec![
            cypher(
                entity,
                format!("MATCH ()-[x]->() WHERE x.{} = {} DELETE x", VERSION_KEY, tag),
            ),
            cypher(
                entity,
                format!("MATCH (x) WHERE x.{} = {} DETACH DELETE x", VERSION_KEY, tag),
            ),
        ],
    }
}

/// Statements deleting the rows stamped `version` for the identities `ids`
///
/// Run before a record the transaction already wrote is written again, so
/// the new row replaces the earlier one instead of tying with it.
pub fn supersede_statements(entity: &EntityRef, version: Version, ids: &BTreeSet<i64>) -> Vec<QueryRequest> {
    if ids.is_empty() {
        return Vec::new();
    }
    let tag = version.as_i64();
    match entity.model {
        DataModel::Relational => vec![sql(
            entity,
            format!(
                "DELETE FROM {entity} WHERE {vid} = {tag} AND ABS({eid}) IN ({ids})",
                entity = entity,
                vid = VERSION_KEY,
                tag = tag,
                eid = IDENTIFIER_KEY,
                ids = id_list(ids, ", "),
            ),
        )],
        DataModel::Document => {
            let ids: Vec<i64> = ids.iter().copied().collect();
            let filter = json!({
                VERSION_KEY: tag,
                "$expr": { "$in": [{ "$abs": format!("${}", IDENTIFIER_KEY) }, ids] }
            });
            vec![mql(
                entity,
                format!("db.{}.deleteMany({})", entity.name, filter),
            )]
        }
        DataModel::Graph => {
            let ids = id_list(ids, ", ");
            vec![
                cypher(
                    entity,
                    format!(
                        "MATCH ()-[x]->() WHERE x.{vid} = {tag} AND abs(x.{eid}) IN [{ids}] DELETE x",
                        vid = VERSION_KEY,
                        tag = tag,
                        eid = IDENTIFIER_KEY,
                        ids = ids,
                    ),
                ),
                cypher(
                    entity,
                    format!(
                        "MATCH (x) WHERE x.{vid} = {tag} AND abs(x.{eid}) IN [{ids}] DETACH DELETE x",
                        vid = VERSION_KEY,
                        tag = tag,
                        eid = IDENTIFIER_KEY,
                        ids = ids,
                    ),
                ),
            ]
        }
    }
}

/// Scan of `entity` bounded to what `snapshot` may see
///
/// Returns at most one row per identity: the visible version with the
/// highest rank, excluding identities whose winning version is a tombstone.
/// Ranks are unique per identity since [`supersede_statements`] runs before
/// every rewrite of an own row.
pub fn snapshot_scan(entity: &EntityRef, snapshot: &Snapshot) -> Result<QueryRequest> {
    let seq = snapshot.sequence();
    let tag = snapshot.own_tag().as_i64();
    match entity.model {
        DataModel::Relational => {
            let visible = |alias: &str| {
                format!(
                    "(({a}{vid} > 0 AND {a}{vid} <= {seq}) OR {a}{vid} = {tag})",
                    a = alias,
                    vid = VERSION_KEY,
                    seq = seq,
                    tag = tag,
                )
            };
            let rank = |alias: &str| {
                format!(
                    "CASE WHEN {a}{vid} < 0 THEN {max} ELSE {a}{vid} END",
                    a = alias,
                    vid = VERSION_KEY,
                    max = PROVISIONAL_RANK,
                )
            };
            let text = format!(
                "SELECT t.* FROM {entity} AS t \
                 JOIN (SELECT ABS({eid}) AS eid, MAX({inner_rank}) AS max_rank \
                 FROM {entity} WHERE {inner_visible} GROUP BY ABS({eid})) AS v \
                 ON ABS(t.{eid}) = v.eid AND {outer_rank} = v.max_rank \
                 WHERE {outer_visible} AND t.{eid} > 0",
                entity = entity,
                eid = IDENTIFIER_KEY,
                inner_rank = rank(""),
                inner_visible = visible(""),
                outer_rank = rank("t."),
                outer_visible = visible("t."),
            );
            Ok(sql(entity, text))
        }
        DataModel::Document => {
            let vid = format!("${}", VERSION_KEY);
            let pipeline = json!([
                { "$match": { "$or": [
                    { VERSION_KEY: { "$gt": 0, "$lte": seq } },
                    { VERSION_KEY: tag }
                ] } },
                { "$addFields": { "__rank": {
                    "$cond": [{ "$lt": [vid, 0] }, PROVISIONAL_RANK, vid]
                } } },
                { "$sort": { "__rank": -1 } },
                { "$group": {
                    "_id": { "$abs": format!("${}", IDENTIFIER_KEY) },
                    "doc": { "$first": "$$ROOT" }
                } },
                { "$replaceRoot": { "newRoot": "$doc" } },
                { "$match": { IDENTIFIER_KEY: { "$gt": 0 } } },
                { "$project": { "__rank": 0 } }
            ]);
            Ok(mql(
                entity,
                format!("db.{}.aggregate({})", entity.name, pipeline),
            ))
        }
        DataModel::Graph => Err(Error::unsupported(entity.model, "snapshot bounding")),
    }
}

fn graph_patterns() -> [&'static str; 2] {
    ["(x)", "()-[x]->()"]
}
