//! SQLite-backed append-only result log.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

/// Number of results returned by [`Store::recent`] when no limit is given.
pub const DEFAULT_RECENT_LIMIT: usize = 100;

/// Fixed-width so that lexical order matches chronological order.
const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

const SELECT_COLUMNS: &str = "SELECT timestamp, success, status_code, response_time, error FROM probe_results";

/// Database error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Running totals kept next to the connection so that statistics never lag
/// behind what `recent()` can see.
#[derive(Debug, Default)]
struct Aggregate {
    total: u64,
    successes: u64,
    response_time_sum: f64,
    last: Option<ProbeResult>,
}

impl Aggregate {
    fn load(conn: &Connection) -> Result<Self, StoreError> {
        let (total, successes, response_time_sum): (i64, i64, f64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(success), 0), COALESCE(SUM(response_time), 0.0) FROM probe_results",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let last = conn
            .query_row(
                &format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT 1"),
                [],
                read_result,
            )
            .optional()?;

        Ok(Self {
            total: total as u64,
            successes: successes as u64,
            response_time_sum,
            last,
        })
    }

    fn record(&mut self, result: &ProbeResult) {
        self.total += 1;
        if result.success {
            self.successes += 1;
        }
        self.response_time_sum += result.response_time;
        self.last = Some(result.clone());
    }

    fn snapshot(&self) -> MonitorState {
        if self.total == 0 {
            return MonitorState::default();
        }
        MonitorState {
            total_checks: self.total,
            successful_checks: self.successes,
            uptime_percentage: 100.0 * self.successes as f64 / self.total as f64,
            average_response_time: Some(self.response_time_sum / self.total as f64),
            last_result: self.last.clone(),
        }
    }
}

struct Inner {
    conn: Connection,
    aggregate: Aggregate,
}

/// Thread-safe result store.
///
/// Appends, reads and retention all go through one short critical section,
/// which gives a total append order and snapshot reads. Nothing slow (such as
/// a network call) ever runs while the lock is held.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<Inner>>,
}

impl Store {
    /// Open the store at `path`, creating the file and schema if missing.
    ///
    /// Existing data is never touched by initialisation.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))?;

        let aggregate = Aggregate::load(&conn)?;
        tracing::debug!("Store: opened {} with {} results", path.display(), aggregate.total);

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { conn, aggregate })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves Inner consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist a result and fold it into the running statistics.
    ///
    /// Returns the sequence id assigned to the record.
    pub fn append(&self, result: &ProbeResult) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        inner.conn.execute(
            "INSERT INTO probe_results (timestamp, success, status_code, response_time, error) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                result.timestamp.format(TIME_FORMAT).to_string(),
                result.success,
                result.status_code,
                result.response_time,
                result.error,
            ],
        )?;
        let id = inner.conn.last_insert_rowid();
        inner.aggregate.record(result);
        Ok(id)
    }

    /// Up to `limit` most recent results, newest first.
    pub fn recent(&self, limit: Option<usize>) -> Result<Vec<ProbeResult>, StoreError> {
        let inner = self.lock();
        query_recent(&inner.conn, limit.unwrap_or(DEFAULT_RECENT_LIMIT))
    }

    /// Current aggregate statistics.
    pub fn statistics(&self) -> MonitorState {
        self.lock().aggregate.snapshot()
    }

    /// Statistics together with the `limit` newest results, read under one lock.
    pub fn status_snapshot(
        &self,
        limit: usize,
    ) -> Result<(MonitorState, Vec<ProbeResult>), StoreError> {
        let inner = self.lock();
        let recent = query_recent(&inner.conn, limit)?;
        Ok((inner.aggregate.snapshot(), recent))
    }

    /// Remove results older than `max_age`.
    ///
    /// Only a prefix of the log is removed: everything up to and including
    /// the newest record whose timestamp is before the cutoff. Returns the
    /// number of deleted rows.
    pub fn apply_retention(&self, max_age: ChronoDuration) -> Result<usize, StoreError> {
        let cutoff = (Utc::now() - max_age).format(TIME_FORMAT).to_string();

        let mut inner = self.lock();
        let tx = inner.conn.unchecked_transaction()?;
        let boundary: Option<i64> = tx.query_row(
            "SELECT MAX(id) FROM probe_results WHERE timestamp < ?1",
            params![cutoff],
            |row| row.get(0),
        )?;
        let Some(boundary) = boundary else {
            return Ok(0);
        };

        let deleted = tx.execute("DELETE FROM probe_results WHERE id <= ?1", params![boundary])?;
        let aggregate = Aggregate::load(&tx)?;
        tx.commit()?;
        inner.aggregate = aggregate;

        Ok(deleted)
    }
}

fn query_recent(conn: &Connection, limit: usize) -> Result<Vec<ProbeResult>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"))?;
    let results = stmt
        .query_map(params![limit as i64], read_result)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(results)
}

fn read_result(row: &Row<'_>) -> rusqlite::Result<ProbeResult> {
    let timestamp: String = row.get(0)?;
    Ok(ProbeResult {
        timestamp: parse_db_time(&timestamp)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        success: row.get(1)?,
        status_code: row.get(2)?,
        response_time: row.get(3)?,
        error: row.get(4)?,
    })
}

/// Parse a timestamp written with [`TIME_FORMAT`].
fn parse_db_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn result_at(timestamp: DateTime<Utc>, success: bool) -> ProbeResult {
        if success {
            ProbeResult::from_status(timestamp, 200, 0.15, true)
        } else {
            ProbeResult::failed(timestamp, 10.0, "timeout")
        }
    }

    fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("results.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_empty_statistics() {
        let (_dir, store) = temp_store();
        let stats = store.statistics();
        assert_eq!(stats.total_checks, 0);
        assert_eq!(stats.uptime_percentage, 100.0);
        assert!(stats.average_response_time.is_none());
        assert!(stats.last_result.is_none());
        assert!(store.recent(None).unwrap().is_empty());
    }

    #[test]
    fn test_statistics_track_appends() {
        let (_dir, store) = temp_store();
        let pattern = [true, false, true, true, false, true, true];
        for (i, success) in pattern.iter().enumerate() {
            let ts = Utc::now() + ChronoDuration::milliseconds(i as i64);
            store.append(&result_at(ts, *success)).unwrap();

            let n = i + 1;
            let successes = pattern[..n].iter().filter(|s| **s).count();
            let stats = store.statistics();
            assert_eq!(stats.total_checks, n as u64);
            assert_eq!(stats.successful_checks, successes as u64);
            assert!((stats.uptime_percentage - 100.0 * successes as f64 / n as f64).abs() < 1e-9);
        }

        let stats = store.statistics();
        let expected_avg = (5.0 * 0.15 + 2.0 * 10.0) / 7.0;
        assert!((stats.average_response_time.unwrap() - expected_avg).abs() < 1e-9);
        assert_eq!(stats.last_result, store.recent(Some(1)).unwrap().into_iter().next());
    }

    #[test]
    fn test_append_then_read_back_is_identical() {
        let (_dir, store) = temp_store();
        let appended = ProbeResult::from_status(Utc::now(), 503, 0.123456, false);
        store.append(&appended).unwrap();

        let back = store.recent(Some(1)).unwrap();
        assert_eq!(back, vec![appended]);
    }

    #[test]
    fn test_recent_is_newest_first_and_bounded() {
        let (_dir, store) = temp_store();
        let base = Utc::now();
        let all: Vec<_> = (0..12)
            .map(|i| result_at(base + ChronoDuration::seconds(i), i % 3 != 0))
            .collect();
        for r in &all {
            store.append(r).unwrap();
        }

        for limit in [0usize, 1, 5, 12, 50] {
            let recent = store.recent(Some(limit)).unwrap();
            assert!(recent.len() <= limit);
            let expected: Vec<_> = all.iter().rev().take(limit).cloned().collect();
            assert_eq!(recent, expected);
        }
    }

    #[test]
    fn test_recent_default_limit() {
        let (_dir, store) = temp_store();
        let base = Utc::now();
        for i in 0..(DEFAULT_RECENT_LIMIT as i64 + 5) {
            store.append(&result_at(base + ChronoDuration::milliseconds(i), true)).unwrap();
        }
        assert_eq!(store.recent(None).unwrap().len(), DEFAULT_RECENT_LIMIT);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("results.db");
        let base = Utc::now();
        let appended: Vec<_> = (0..5)
            .map(|i| result_at(base + ChronoDuration::seconds(i), i != 2))
            .collect();

        {
            let store = Store::open(&path).unwrap();
            for r in &appended {
                store.append(r).unwrap();
            }
        }

        let reopened = Store::open(&path).unwrap();
        let recent = reopened.recent(Some(10)).unwrap();
        let expected: Vec<_> = appended.iter().rev().cloned().collect();
        assert_eq!(recent, expected);

        let stats = reopened.statistics();
        assert_eq!(stats.total_checks, 5);
        assert_eq!(stats.successful_checks, 4);
        assert_eq!(stats.last_result.as_ref(), appended.last());
    }

    #[test]
    fn test_retention_removes_only_old_prefix() {
        let (_dir, store) = temp_store();
        let now = Utc::now();
        store.append(&result_at(now - ChronoDuration::days(40), false)).unwrap();
        store.append(&result_at(now - ChronoDuration::days(31), true)).unwrap();
        let fresh = result_at(now - ChronoDuration::days(1), true);
        store.append(&fresh).unwrap();

        let deleted = store.apply_retention(ChronoDuration::days(30)).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.recent(None).unwrap(), vec![fresh.clone()]);

        let stats = store.statistics();
        assert_eq!(stats.total_checks, 1);
        assert_eq!(stats.uptime_percentage, 100.0);
        assert_eq!(stats.last_result, Some(fresh));

        assert_eq!(store.apply_retention(ChronoDuration::days(30)).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_appends_are_all_recorded() {
        let (_dir, store) = temp_store();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        let ts = Utc::now() + ChronoDuration::milliseconds(t * 100 + i);
                        store.append(&result_at(ts, i % 2 == 0)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let stats = store.statistics();
        assert_eq!(stats.total_checks, 40);
        assert_eq!(stats.successful_checks, 20);
        assert_eq!(store.recent(Some(100)).unwrap().len(), 40);
    }

    #[test]
    fn test_status_snapshot_is_consistent_under_concurrent_appends() {
        let (_dir, store) = temp_store();
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let ts = Utc::now() + ChronoDuration::milliseconds(i);
                    store.append(&result_at(ts, i % 3 != 0)).unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let (stats, checks) = store.status_snapshot(10).unwrap();
            assert_eq!(stats.last_result.as_ref(), checks.first());
            assert_eq!(checks.len() as u64, stats.total_checks.min(10));
        }
        writer.join().unwrap();

        let (stats, checks) = store.status_snapshot(10).unwrap();
        assert_eq!(stats.total_checks, 500);
        assert_eq!(stats.last_result.as_ref(), checks.first());
        assert!(store.status_snapshot(0).unwrap().1.is_empty());
    }
}
