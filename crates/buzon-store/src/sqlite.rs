//! `SQLite` storage backend
//!
//! One connection per store instance, guarded by a mutex. Several instances
//! may share a database file; WAL mode plus a busy timeout lets them
//! interleave, and every multi-statement write runs in a `BEGIN IMMEDIATE`
//! transaction so the write lock is taken before anything is read.

// SQLite stores integers as i64; seq, counters and consecutive numbers are
// always positive and far below i64::MAX.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation
)]

use crate::error::{StoreError, StoreResult};
use crate::model::{
    CaseFilter, CaseRecord, CounterKey, HistoryDraft, HistoryRecord, NewCase, SubmitterProfile,
    SubmitterRecord,
};
use crate::spi::{CaseRepository, CounterStore, HistoryStore, IdentityStore};
use buzon_model::{CaseId, CaseStatus, Folio, SubmitterId, Year};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Default wait for a competing writer
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CASE_COLUMNS: &str = "id, folio, kind, category, channel, year, consecutive, submitter_id, \
     description, area_involved, improvement_proposal, received_at, status, status_seq";

const HISTORY_COLUMNS: &str =
    "seq, case_id, to_status, actor, notes, priority, occurred_at, resolved_at, prev_hash, hash";

const IDENTITY_COLUMNS: &str = "id, email, confidential, display_name, phone, affiliation, gender, \
     age_range, campus, created_at, updated_at";

/// `SQLite`-backed [`Datastore`](crate::Datastore)
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema applied.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open with a custom busy timeout
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA_SQL)?;
        tracing::debug!(path = %path.display(), "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, mainly for tests
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

fn conversion_error(idx: usize, ty: Type, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn text_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, Type::Text, e))
}

fn opt_text_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, Type::Text, e)))
        .transpose()
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(raw).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, raw))
}

fn opt_time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<i64> = row.get(idx)?;
    raw.map(|v| DateTime::from_timestamp_micros(v).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, v)))
        .transpose()
}

fn digest_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<[u8; 32]> {
    let raw: Vec<u8> = row.get(idx)?;
    raw.try_into().map_err(|bytes: Vec<u8>| {
        conversion_error(
            idx,
            Type::Blob,
            StoreError::Corrupt(format!("digest of {} bytes", bytes.len())),
        )
    })
}

fn year_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Year> {
    let raw: i64 = row.get(idx)?;
    let narrow = u16::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, raw))?;
    Year::new(narrow).map_err(|e| conversion_error(idx, Type::Integer, e))
}

fn case_from_row(row: &Row<'_>) -> rusqlite::Result<CaseRecord> {
    Ok(CaseRecord {
        id: text_col(row, 0)?,
        folio: Folio::from_issued(row.get::<_, String>(1)?),
        kind: text_col(row, 2)?,
        category: buzon_model::CategoryId(row.get(3)?),
        channel: text_col(row, 4)?,
        year: year_col(row, 5)?,
        consecutive: row.get::<_, i64>(6)? as u64,
        submitter: opt_text_col(row, 7)?,
        description: row.get(8)?,
        area_involved: row.get(9)?,
        improvement_proposal: row.get(10)?,
        received_at: time_col(row, 11)?,
        status: text_col(row, 12)?,
        status_seq: row.get::<_, i64>(13)? as u64,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        seq: row.get::<_, i64>(0)? as u64,
        case_id: text_col(row, 1)?,
        to_status: text_col(row, 2)?,
        actor: row.get(3)?,
        notes: row.get(4)?,
        priority: opt_text_col(row, 5)?,
        occurred_at: time_col(row, 6)?,
        resolved_at: opt_time_col(row, 7)?,
        prev_hash: digest_col(row, 8)?,
        hash: digest_col(row, 9)?,
    })
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<SubmitterRecord> {
    Ok(SubmitterRecord {
        id: text_col(row, 0)?,
        email: row.get(1)?,
        confidential: row.get(2)?,
        profile: SubmitterProfile {
            display_name: row.get(3)?,
            phone: row.get(4)?,
            affiliation: row.get(5)?,
            gender: row.get(6)?,
            age_range: row.get(7)?,
            campus: row.get(8)?,
        },
        created_at: time_col(row, 9)?,
        updated_at: time_col(row, 10)?,
    })
}

fn find_identity_in(
    conn: &Connection,
    email: &str,
    confidential: bool,
) -> StoreResult<Option<SubmitterRecord>> {
    let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = ?1 AND confidential = ?2");
    Ok(conn
        .query_row(&sql, params![email, confidential], identity_from_row)
        .optional()?)
}

fn head_in(conn: &Connection, case_id: CaseId) -> StoreResult<Option<HistoryRecord>> {
    let sql = format!("SELECT {HISTORY_COLUMNS} FROM history WHERE case_id = ?1 ORDER BY seq DESC LIMIT 1");
    Ok(conn
        .query_row(&sql, params![case_id.to_string()], history_from_row)
        .optional()?)
}

fn next_seq_in(conn: &Connection) -> StoreResult<u64> {
    let last: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) FROM history", [], |r| r.get(0))?;
    Ok(last as u64 + 1)
}

fn insert_history_in(conn: &Connection, entry: &HistoryRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO history (seq, case_id, to_status, actor, notes, priority, occurred_at, resolved_at, prev_hash, hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.seq as i64,
            entry.case_id.to_string(),
            entry.to_status.as_str(),
            entry.actor,
            entry.notes,
            entry.priority.map(|p| p.as_str()),
            micros(entry.occurred_at),
            entry.resolved_at.map(micros),
            entry.prev_hash.as_slice(),
            entry.hash.as_slice(),
        ],
    )?;
    Ok(())
}

/// Unique-index clash on `cases.folio`; other constraint failures are not duplicates
fn is_duplicate_folio(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(message))
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && message.contains("cases.folio")
    )
}

impl CounterStore for SqliteStore {
    fn supports_atomic_increment(&self) -> bool {
        true
    }

    fn increment_counter(&self, key: CounterKey) -> StoreResult<u64> {
        self.write(|tx| {
            let allocated: i64 = tx.query_row(
                "INSERT INTO counters (channel, year, next_value) VALUES (?1, ?2, 2)
                 ON CONFLICT (channel, year) DO UPDATE SET next_value = next_value + 1
                 RETURNING next_value - 1",
                params![key.channel.as_str(), key.year.value()],
                |r| r.get(0),
            )?;
            Ok(allocated as u64)
        })
    }

    fn load_counter(&self, key: CounterKey) -> StoreResult<Option<u64>> {
        let conn = self.conn.lock();
        let next: Option<i64> = conn
            .query_row(
                "SELECT next_value FROM counters WHERE channel = ?1 AND year = ?2",
                params![key.channel.as_str(), key.year.value()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(next.map(|v| v as u64))
    }

    fn compare_and_swap_counter(
        &self,
        key: CounterKey,
        expected: Option<u64>,
        new: u64,
    ) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed = match expected {
            Some(current) => conn.execute(
                "UPDATE counters SET next_value = ?3
                 WHERE channel = ?1 AND year = ?2 AND next_value = ?4",
                params![key.channel.as_str(), key.year.value(), new as i64, current as i64],
            )?,
            None => conn.execute(
                "INSERT INTO counters (channel, year, next_value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (channel, year) DO NOTHING",
                params![key.channel.as_str(), key.year.value(), new as i64],
            )?,
        };
        Ok(changed == 1)
    }
}

impl IdentityStore for SqliteStore {
    fn find_identity(&self, email: &str, confidential: bool) -> StoreResult<Option<SubmitterRecord>> {
        let conn = self.conn.lock();
        find_identity_in(&conn, email, confidential)
    }

    fn upsert_identity(
        &self,
        email: &str,
        confidential: bool,
        profile: &SubmitterProfile,
        at: DateTime<Utc>,
    ) -> StoreResult<SubmitterRecord> {
        self.write(|tx| {
            let record = match find_identity_in(tx, email, confidential)? {
                Some(mut existing) => {
                    existing.profile.merge_from(profile);
                    existing.updated_at = at;
                    tx.execute(
                        "UPDATE identities SET display_name = ?2, phone = ?3, affiliation = ?4,
                             gender = ?5, age_range = ?6, campus = ?7, updated_at = ?8
                         WHERE id = ?1",
                        params![
                            existing.id.to_string(),
                            existing.profile.display_name,
                            existing.profile.phone,
                            existing.profile.affiliation,
                            existing.profile.gender,
                            existing.profile.age_range,
                            existing.profile.campus,
                            micros(at),
                        ],
                    )?;
                    existing
                }
                None => {
                    let record = SubmitterRecord {
                        id: SubmitterId::new(),
                        email: email.to_string(),
                        confidential,
                        profile: profile.clone(),
                        created_at: at,
                        updated_at: at,
                    };
                    tx.execute(
                        &format!(
                            "INSERT INTO identities ({IDENTITY_COLUMNS})
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                        ),
                        params![
                            record.id.to_string(),
                            record.email,
                            record.confidential,
                            record.profile.display_name,
                            record.profile.phone,
                            record.profile.affiliation,
                            record.profile.gender,
                            record.profile.age_range,
                            record.profile.campus,
                            micros(at),
                            micros(at),
                        ],
                    )?;
                    record
                }
            };
            Ok(record)
        })
    }

    fn get_identity(&self, id: SubmitterId) -> StoreResult<Option<SubmitterRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id.to_string()], identity_from_row)
            .optional()?)
    }

    fn identities_by_email(&self, email: &str) -> StoreResult<Vec<SubmitterRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE email = ?1 ORDER BY created_at");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![email], identity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl CaseRepository for SqliteStore {
    fn insert_case(
        &self,
        case: NewCase,
        initial: HistoryDraft,
    ) -> StoreResult<(CaseRecord, HistoryRecord)> {
        self.write(|tx| {
            let entry = HistoryRecord::seal(initial, next_seq_in(tx)?, None);
            let record = CaseRecord::from_new(case, entry.to_status, entry.seq);

            let inserted = tx.execute(
                &format!(
                    "INSERT INTO cases ({CASE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    record.id.to_string(),
                    record.folio.as_str(),
                    record.kind.as_str(),
                    record.category.0,
                    record.channel.as_str(),
                    record.year.value(),
                    record.consecutive as i64,
                    record.submitter.map(|s| s.to_string()),
                    record.description,
                    record.area_involved,
                    record.improvement_proposal,
                    micros(record.received_at),
                    record.status.as_str(),
                    record.status_seq as i64,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_duplicate_folio(&e) => {
                    return Err(StoreError::DuplicateFolio(record.folio.into_string()));
                }
                Err(e) => return Err(e.into()),
            }

            insert_history_in(tx, &entry)?;
            Ok((record, entry))
        })
    }

    fn get_case(&self, id: CaseId) -> StoreResult<Option<CaseRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![id.to_string()], case_from_row)
            .optional()?)
    }

    fn get_case_by_folio(&self, folio: &str) -> StoreResult<Option<CaseRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {CASE_COLUMNS} FROM cases WHERE folio = ?1");
        Ok(conn.query_row(&sql, params![folio], case_from_row).optional()?)
    }

    fn list_cases_by_submitters(&self, submitters: &[SubmitterId]) -> StoreResult<Vec<CaseRecord>> {
        if submitters.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; submitters.len()].join(", ");
        let sql = format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE submitter_id IN ({placeholders})
             ORDER BY received_at DESC, id DESC"
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(submitters.iter().map(ToString::to_string)), case_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn list_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<CaseRecord>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if let Some(kind) = filter.kind {
            clauses.push("kind = ?");
            args.push(Value::Text(kind.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            args.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(channel) = filter.channel {
            clauses.push("channel = ?");
            args.push(Value::Text(channel.as_str().to_string()));
        }
        if let Some(category) = filter.category {
            clauses.push("category = ?");
            args.push(Value::Integer(i64::from(category.0)));
        }
        if let Some(year) = filter.year {
            clauses.push("year = ?");
            args.push(Value::Integer(i64::from(year.value())));
        }
        if let Some(from) = filter.received_from {
            clauses.push("received_at >= ?");
            args.push(Value::Integer(micros(from)));
        }
        if let Some(to) = filter.received_to {
            clauses.push("received_at < ?");
            args.push(Value::Integer(micros(to)));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = filter.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        args.push(Value::Integer(limit));
        args.push(Value::Integer(i64::try_from(filter.offset).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT {CASE_COLUMNS} FROM cases {where_clause}
             ORDER BY received_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), case_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update_cached_status(&self, id: CaseId, status: CaseStatus, seq: u64) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE cases SET status = ?2, status_seq = ?3 WHERE id = ?1 AND status_seq < ?3",
            params![id.to_string(), status.as_str(), seq as i64],
        )?;
        if changed > 0 {
            return Ok(true);
        }
        let exists = conn
            .query_row("SELECT 1 FROM cases WHERE id = ?1", params![id.to_string()], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            Ok(false)
        } else {
            Err(StoreError::CaseNotFound(id))
        }
    }
}

impl HistoryStore for SqliteStore {
    fn append_history(
        &self,
        draft: HistoryDraft,
        expected_head: Option<u64>,
    ) -> StoreResult<HistoryRecord> {
        let case_id = draft.case_id;
        self.write(|tx| {
            let known: Option<i64> = tx
                .query_row("SELECT 1 FROM cases WHERE id = ?1", params![case_id.to_string()], |r| r.get(0))
                .optional()?;
            if known.is_none() {
                return Err(StoreError::CaseNotFound(case_id));
            }

            let head = head_in(tx, case_id)?;
            let actual = head.as_ref().map(|e| e.seq);
            if actual != expected_head {
                return Err(StoreError::HeadMoved {
                    case_id,
                    expected: expected_head,
                    actual,
                });
            }

            let entry = HistoryRecord::seal(draft, next_seq_in(tx)?, head.as_ref());
            insert_history_in(tx, &entry)?;
            Ok(entry)
        })
    }

    fn list_history(&self, case_id: CaseId) -> StoreResult<Vec<HistoryRecord>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {HISTORY_COLUMNS} FROM history WHERE case_id = ?1 ORDER BY occurred_at, seq");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![case_id.to_string()], history_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn history_head(&self, case_id: CaseId) -> StoreResult<Option<HistoryRecord>> {
        let conn = self.conn.lock();
        head_in(&conn, case_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::now;
    use buzon_model::{CaseKind, CategoryId, Channel, Priority};
    use pretty_assertions::assert_eq;

    fn sample(folio: &str, submitter: Option<SubmitterId>) -> (NewCase, HistoryDraft) {
        let id = CaseId::new();
        let received_at = now();
        (
            NewCase {
                id,
                folio: Folio::from_issued(folio),
                kind: CaseKind::Suggestion,
                category: CategoryId(3),
                channel: Channel::Physical,
                year: Year::new(2025).unwrap(),
                consecutive: 1,
                submitter,
                description: "more benches".into(),
                area_involved: Some("library".into()),
                improvement_proposal: Some("add ten".into()),
                received_at,
            },
            HistoryDraft {
                case_id: id,
                to_status: CaseStatus::Received,
                actor: None,
                notes: String::new(),
                priority: None,
                occurred_at: received_at,
                resolved_at: None,
            },
        )
    }

    #[test]
    fn case_round_trips_through_rows() {
        let store = SqliteStore::in_memory().unwrap();
        let submitter = store
            .upsert_identity("luis@uni.mx", false, &SubmitterProfile::default(), now())
            .unwrap();
        let (case, draft) = sample("P0001-INF-UNACH-25", Some(submitter.id));
        let (record, entry) = store.insert_case(case, draft).unwrap();

        assert_eq!(store.get_case(record.id).unwrap(), Some(record.clone()));
        assert_eq!(store.get_case_by_folio("P0001-INF-UNACH-25").unwrap(), Some(record.clone()));
        assert_eq!(store.list_history(record.id).unwrap(), vec![entry.clone()]);
        assert_eq!(store.history_head(record.id).unwrap(), Some(entry));
        assert_eq!(
            store.list_cases_by_submitters(&[submitter.id]).unwrap(),
            vec![record]
        );
    }

    #[test]
    fn counters_increment_atomically() {
        let store = SqliteStore::in_memory().unwrap();
        let key = CounterKey::new(Channel::Digital, Year::new(2025).unwrap());
        assert_eq!(store.load_counter(key).unwrap(), None);
        assert_eq!(store.increment_counter(key).unwrap(), 1);
        assert_eq!(store.increment_counter(key).unwrap(), 2);
        assert_eq!(store.load_counter(key).unwrap(), Some(3));

        assert!(!store.compare_and_swap_counter(key, Some(2), 9).unwrap());
        assert!(store.compare_and_swap_counter(key, Some(3), 4).unwrap());
        assert!(!store.compare_and_swap_counter(key, None, 4).unwrap());
    }

    #[test]
    fn duplicate_folio_rolls_back() {
        let store = SqliteStore::in_memory().unwrap();
        let (case, draft) = sample("P0002-INF-UNACH-25", None);
        store.insert_case(case, draft).unwrap();
        let (dup, dup_draft) = sample("P0002-INF-UNACH-25", None);
        let dup_id = dup.id;
        assert!(matches!(
            store.insert_case(dup, dup_draft),
            Err(StoreError::DuplicateFolio(_))
        ));
        assert!(store.list_history(dup_id).unwrap().is_empty());
    }

    #[test]
    fn other_constraint_failures_are_not_duplicate_folios() {
        let store = SqliteStore::in_memory().unwrap();
        let (orphan, orphan_draft) = sample("P0004-INF-UNACH-25", Some(SubmitterId::new()));
        let err = store.insert_case(orphan, orphan_draft).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)), "{err}");

        let (case, draft) = sample("P0005-INF-UNACH-25", None);
        let (record, _) = store.insert_case(case, draft).unwrap();
        let (mut clash, mut clash_draft) = sample("P0006-INF-UNACH-25", None);
        clash.id = record.id;
        clash_draft.case_id = record.id;
        let err = store.insert_case(clash, clash_draft).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)), "{err}");
        assert!(store.get_case_by_folio("P0006-INF-UNACH-25").unwrap().is_none());
    }

    #[test]
    fn conditional_append_and_priority_column() {
        let store = SqliteStore::in_memory().unwrap();
        let (case, draft) = sample("P0003-INF-UNACH-25", None);
        let (record, first) = store.insert_case(case, draft.clone()).unwrap();

        let mut next = draft;
        next.to_status = CaseStatus::Addressed;
        next.notes = "benches ordered".into();
        next.priority = Some(Priority::High);
        next.occurred_at = now();
        next.resolved_at = Some(next.occurred_at);
        let second = store.append_history(next.clone(), Some(first.seq)).unwrap();
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(second.priority, Some(Priority::High));

        assert!(matches!(
            store.append_history(next, Some(first.seq)),
            Err(StoreError::HeadMoved { .. })
        ));
        assert!(store
            .update_cached_status(record.id, CaseStatus::Addressed, second.seq)
            .unwrap());
        assert!(!store
            .update_cached_status(record.id, CaseStatus::Addressed, second.seq)
            .unwrap());
        assert!(matches!(
            store.update_cached_status(CaseId::new(), CaseStatus::Closed, 99),
            Err(StoreError::CaseNotFound(_))
        ));
    }

    #[test]
    fn history_rejects_updates() {
        let store = SqliteStore::in_memory().unwrap();
        let (case, draft) = sample("P0004-INF-UNACH-25", None);
        store.insert_case(case, draft).unwrap();
        let conn = store.conn.lock();
        assert!(conn.execute("UPDATE history SET notes = 'x'", []).is_err());
        assert!(conn.execute("DELETE FROM history", []).is_err());
    }

    #[test]
    fn filter_and_paging() {
        let store = SqliteStore::in_memory().unwrap();
        for n in 1..=5 {
            let (case, draft) = sample(&format!("P000{n}-INF-UNACH-25"), None);
            store.insert_case(case, draft).unwrap();
        }
        let all = store.list_cases(&CaseFilter::default()).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].received_at >= w[1].received_at));

        let page = store.list_cases(&CaseFilter::default().with_page(2, 1)).unwrap();
        assert_eq!(page, all[1..3].to_vec());

        let none = store
            .list_cases(&CaseFilter::default().with_kind(CaseKind::Commendation))
            .unwrap();
        assert!(none.is_empty());
    }
}
