//! SQLite-backed [`NetworkSource`] over the biographical tables.

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, Params};
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

use crate::db::Db;
use crate::error::{BionetError, Result};
use crate::network::model::{EdgeRow, PersonId, PersonRecord, RelationType};
use crate::network::query::ExploreContext;
use crate::network::source::NetworkSource;

/// Ids bound per statement. Each id is bound once (`?N` placeholders are
/// reused for both endpoint columns), well under SQLite's variable limit.
pub const MAX_BATCH_IDS: usize = 10_000;

/// Physical layout of one relation family.
struct RelationTable {
    table: &'static str,
    source_col: &'static str,
    target_col: &'static str,
    code_col: &'static str,
    codes_table: &'static str,
}

fn relation_table(relation: RelationType) -> RelationTable {
    match relation {
        RelationType::Kinship => RelationTable {
            table: "kinship",
            source_col: "person_id",
            target_col: "kin_person_id",
            code_col: "kin_code",
            codes_table: "kinship_codes",
        },
        RelationType::Association => RelationTable {
            table: "associations",
            source_col: "person_id",
            target_col: "assoc_person_id",
            code_col: "assoc_code",
            codes_table: "association_codes",
        },
        RelationType::Office => RelationTable {
            table: "office_colleagues",
            source_col: "person_id",
            target_col: "colleague_id",
            code_col: "office_code",
            codes_table: "office_codes",
        },
    }
}

/// `?1,?2,...,?n`
fn numbered_placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(",")
}

/// How the endpoint columns are matched against the bound id list.
#[derive(Clone, Copy)]
enum EndpointMatch {
    Either,
    Both,
}

fn edge_query(relation: RelationType, n: usize, matching: EndpointMatch) -> String {
    let t = relation_table(relation);
    let ids = numbered_placeholders(n);
    let joiner = match matching {
        EndpointMatch::Either => "OR",
        EndpointMatch::Both => "AND",
    };
    format!(
        "SELECT r.{src}, r.{dst}, r.{code}, COALESCE(c.label, '') \
         FROM {table} r \
         LEFT JOIN {codes} c ON c.{code} = r.{code} \
         WHERE r.{src} IN ({ids}) {joiner} r.{dst} IN ({ids}) \
         ORDER BY r.rowid",
        src = t.source_col,
        dst = t.target_col,
        code = t.code_col,
        table = t.table,
        codes = t.codes_table,
        ids = ids,
        joiner = joiner,
    )
}

/// Like [`edge_query`] with `Both`, but matching against the staged
/// `temp.member_ids` table instead of bound parameters.
fn staged_edge_query(relation: RelationType) -> String {
    let t = relation_table(relation);
    format!(
        "SELECT r.{src}, r.{dst}, r.{code}, COALESCE(c.label, '') \
         FROM {table} r \
         LEFT JOIN {codes} c ON c.{code} = r.{code} \
         WHERE r.{src} IN (SELECT id FROM temp.member_ids) \
         AND r.{dst} IN (SELECT id FROM temp.member_ids) \
         ORDER BY r.rowid",
        src = t.source_col,
        dst = t.target_col,
        code = t.code_col,
        table = t.table,
        codes = t.codes_table,
    )
}

fn query_edges(
    conn: &Connection,
    relation: RelationType,
    ids: &[PersonId],
    matching: EndpointMatch,
) -> Result<Vec<EdgeRow>> {
    let sql = edge_query(relation, ids.len(), matching);
    collect_edges(conn, &sql, params_from_iter(ids.iter()), relation)
}

/// Rows of `relation` touching `frontier`, one statement per type and chunk.
/// Stops between statements once `cancel` fires.
fn query_frontier(
    conn: &Connection,
    relation_types: &[RelationType],
    frontier: &[PersonId],
    cancel: &CancellationToken,
) -> Result<Vec<EdgeRow>> {
    let mut rows = Vec::new();
    // One statement per requested type; unrequested tables are never read.
    for relation in relation_types {
        for chunk in frontier.chunks(MAX_BATCH_IDS) {
            if cancel.is_cancelled() {
                return Err(BionetError::Cancelled);
            }
            rows.extend(query_edges(conn, *relation, chunk, EndpointMatch::Either)?);
        }
    }
    Ok(rows)
}

/// Rows of `relation` with both endpoints in `ids`.
///
/// Sets too large to bind are written to a connection-local temp table
/// first, so member count is never limited by SQLite's variable cap.
fn query_within(conn: &mut Connection, relation: RelationType, ids: &[PersonId]) -> Result<Vec<EdgeRow>> {
    if ids.len() <= MAX_BATCH_IDS {
        return query_edges(conn, relation, ids, EndpointMatch::Both);
    }

    let tx = conn.transaction()?;
    tx.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS member_ids (id INTEGER PRIMARY KEY); \
         DELETE FROM temp.member_ids;",
    )?;
    {
        let mut insert = tx.prepare_cached("INSERT OR IGNORE INTO temp.member_ids (id) VALUES (?1)")?;
        for id in ids {
            insert.execute([id])?;
        }
    }
    let rows = collect_edges(&tx, &staged_edge_query(relation), params![], relation)?;
    tx.commit()?;
    log::debug!("Staged {} members for the {} lookup", ids.len(), relation);
    Ok(rows)
}

fn collect_edges<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    relation: RelationType,
) -> Result<Vec<EdgeRow>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok(EdgeRow {
            source: row.get(0)?,
            target: row.get(1)?,
            relation,
            code: row.get(2)?,
            label: row.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn query_persons(conn: &Connection, ids: &[PersonId]) -> Result<Vec<PersonRecord>> {
    let sql = format!(
        "SELECT person_id, name, name_chn, index_year, dynasty \
         FROM persons WHERE person_id IN ({})",
        numbered_placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok(PersonRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            name_chn: row.get(2)?,
            index_year: row.get(3)?,
            dynasty: row.get(4)?,
            alt_names: Vec::new(),
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn query_alt_names(conn: &Connection, ids: &[PersonId]) -> Result<HashMap<PersonId, Vec<String>>> {
    let sql = format!(
        "SELECT person_id, alt_name FROM person_alt_names \
         WHERE person_id IN ({}) ORDER BY rowid",
        numbered_placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, PersonId>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut out: HashMap<PersonId, Vec<String>> = HashMap::new();
    for row in rows {
        let (id, alt) = row?;
        out.entry(id).or_default().push(alt);
    }
    Ok(out)
}

/// Reads persons and relations straight from the migrated schema.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    db: Db,
}

impl SqliteSource {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn load_person_chunk(
        &self,
        ids: Vec<PersonId>,
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>> {
        let person_ids = ids.clone();
        let persons = self
            .db
            .with_connection_cancellable(ctx.token(), move |conn| query_persons(conn, &person_ids));
        let alt_names = self
            .db
            .with_connection_cancellable(ctx.token(), move |conn| query_alt_names(conn, &ids));

        // Independent lookups, so they run side by side.
        let (persons, alt_names) = tokio::join!(persons, alt_names);
        let mut persons = persons?;
        let mut alt_names = alt_names?;
        for person in &mut persons {
            if let Some(names) = alt_names.remove(&person.id) {
                person.alt_names = names;
            }
        }
        Ok(persons)
    }
}

#[async_trait]
impl NetworkSource for SqliteSource {
    async fn fetch_nodes_batch(
        &self,
        ids: &[PersonId],
        ctx: &ExploreContext,
    ) -> Result<Vec<PersonRecord>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_IDS) {
            out.extend(self.load_person_chunk(chunk.to_vec(), ctx).await?);
        }
        log::debug!("Loaded {} of {} person records", out.len(), ids.len());
        Ok(out)
    }

    async fn fetch_edges_batch(
        &self,
        frontier: &[PersonId],
        relation_types: &[RelationType],
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        if frontier.is_empty() || relation_types.is_empty() {
            return Ok(Vec::new());
        }

        let frontier_size = frontier.len();
        let frontier = frontier.to_vec();
        let relation_types = relation_types.to_vec();
        let cancel = ctx.token().clone();
        let rows = self
            .db
            .with_connection_cancellable(ctx.token(), move |conn| {
                query_frontier(conn, &relation_types, &frontier, &cancel)
            })
            .await?;
        log::debug!("Fetched {} edge rows for a frontier of {}", rows.len(), frontier_size);
        Ok(rows)
    }

    async fn fetch_edges_within(
        &self,
        members: &HashSet<PersonId>,
        relation: RelationType,
        ctx: &ExploreContext,
    ) -> Result<Vec<EdgeRow>> {
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<PersonId> = members.iter().copied().collect();
        ids.sort_unstable();
        self.db
            .with_connection_cancellable(ctx.token(), move |conn| query_within(conn, relation, &ids))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use tempfile::TempDir;

    async fn setup_test_db() -> (SqliteSource, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        db.with_connection(|conn| {
            migrate::run_migrations(conn)?;
            conn.execute_batch(
                "INSERT INTO persons (person_id, name, name_chn, index_year, dynasty) VALUES
                    (1762, 'Wang Anshi', '王安石', 1021, 'Song'),
                    (1763, 'Wang Yi', '王益', 994, 'Song'),
                    (3767, 'Su Shi', '蘇軾', 1037, 'Song');
                 INSERT INTO person_alt_names (person_id, alt_name, alt_type) VALUES
                    (1762, 'Jiefu', 'courtesy'),
                    (1762, 'Banshan', 'style');
                 INSERT INTO kinship_codes (kin_code, label) VALUES (75, 'son'), (28, 'father');
                 INSERT INTO association_codes (assoc_code, label) VALUES (9, 'friend');",
            )?;
            conn.execute(
                "INSERT INTO kinship (person_id, kin_person_id, kin_code) VALUES (?1, ?2, ?3)",
                params![1763, 1762, 75],
            )?;
            conn.execute(
                "INSERT INTO kinship (person_id, kin_person_id, kin_code) VALUES (?1, ?2, ?3)",
                params![1762, 1763, 28],
            )?;
            conn.execute(
                "INSERT INTO associations (person_id, assoc_person_id, assoc_code) VALUES (?1, ?2, ?3)",
                params![1762, 3767, 9],
            )?;
            conn.execute(
                "INSERT INTO office_colleagues (person_id, colleague_id, office_code) VALUES (?1, ?2, ?3)",
                params![3767, 9999, 4],
            )?;
            Ok::<(), BionetError>(())
        })
        .await
        .unwrap();
        (SqliteSource::new(db), temp_dir)
    }

    #[test]
    fn test_edge_query_reuses_placeholders() {
        let sql = edge_query(RelationType::Kinship, 3, EndpointMatch::Either);
        assert!(sql.contains("r.person_id IN (?1,?2,?3) OR r.kin_person_id IN (?1,?2,?3)"));
        assert!(sql.contains("FROM kinship r"));
        assert!(!sql.contains("associations"));

        let sql = edge_query(RelationType::Office, 2, EndpointMatch::Both);
        assert!(sql.contains("r.person_id IN (?1,?2) AND r.colleague_id IN (?1,?2)"));
    }

    #[tokio::test]
    async fn test_fetch_nodes_with_alt_names() {
        let (source, _temp) = setup_test_db().await;
        let records = source
            .fetch_nodes_batch(&[1762, 3767, 424242], &ExploreContext::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        let wang = records.iter().find(|r| r.id == 1762).unwrap();
        assert_eq!(wang.name_chn.as_deref(), Some("王安石"));
        assert_eq!(wang.index_year, Some(1021));
        assert_eq!(wang.alt_names, vec!["Jiefu", "Banshan"]);
        let su = records.iter().find(|r| r.id == 3767).unwrap();
        assert!(su.alt_names.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_edges_either_direction() {
        let (source, _temp) = setup_test_db().await;
        let rows = source
            .fetch_edges_batch(&[1762], &[RelationType::Kinship], &ExploreContext::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.relation == RelationType::Kinship));
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["son", "father"]);
    }

    #[tokio::test]
    async fn test_fetch_edges_type_filter_in_sql() {
        let (source, _temp) = setup_test_db().await;
        let ctx = ExploreContext::new();
        let rows = source
            .fetch_edges_batch(&[1762, 3767], &[RelationType::Association], &ctx)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "friend");

        let rows = source
            .fetch_edges_batch(&[3767], &RelationType::ALL, &ctx)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        // Office code without a label row comes back with an empty label.
        let office = rows.iter().find(|r| r.relation == RelationType::Office).unwrap();
        assert_eq!(office.label, "");
        assert_eq!(office.target, 9999);
    }

    #[tokio::test]
    async fn test_fetch_edges_within_requires_both_endpoints() {
        let (source, _temp) = setup_test_db().await;
        let ctx = ExploreContext::new();
        let members: HashSet<PersonId> = [1762, 1763].into_iter().collect();
        let rows = source
            .fetch_edges_within(&members, RelationType::Kinship, &ctx)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let members: HashSet<PersonId> = [3767].into_iter().collect();
        let rows = source
            .fetch_edges_within(&members, RelationType::Office, &ctx)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_edges_within_large_member_set() {
        let (source, _temp) = setup_test_db().await;
        let ctx = ExploreContext::new();
        // Far more ids than SQLite accepts as bound parameters.
        let mut members: HashSet<PersonId> = (100_000..140_000).collect();
        members.extend([1762, 1763, 3767]);

        let rows = source
            .fetch_edges_within(&members, RelationType::Kinship, &ctx)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        let rows = source
            .fetch_edges_within(&members, RelationType::Association, &ctx)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "friend");
    }

    #[tokio::test]
    async fn test_frontier_query_stops_once_cancelled() {
        let (source, _temp) = setup_test_db().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = source
            .db
            .with_connection(move |conn| {
                query_frontier(conn, &RelationType::ALL, &[1762], &cancel)
            })
            .await;
        assert!(matches!(result, Err(BionetError::Cancelled)));
    }

    #[tokio::test]
    async fn test_empty_inputs_skip_queries() {
        let (source, _temp) = setup_test_db().await;
        let ctx = ExploreContext::new();
        assert!(source.fetch_nodes_batch(&[], &ctx).await.unwrap().is_empty());
        assert!(source
            .fetch_edges_batch(&[], &RelationType::ALL, &ctx)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts() {
        let (source, _temp) = setup_test_db().await;
        let ctx = ExploreContext::new();
        ctx.cancel();
        let result = source.fetch_edges_batch(&[1762], &RelationType::ALL, &ctx).await;
        assert!(matches!(result, Err(BionetError::Cancelled)));
    }
}
