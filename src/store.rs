use rusqlite::{Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::record::ResultRecord;

pub const DB_FILE: &str = "results.sqlite3";
const UNIQUE_INDEX: &str = "idx_unique_result";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare workspace: {0}")]
    Io(#[from] std::io::Error),
    #[error("results table has duplicate rows and no unique index; run results.deduplicate first")]
    ConstraintMissing,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required parameter: {0}")]
    Missing(&'static str),
}

/// Exact-match lookup key. Construction fails if any field is blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub registration_number: String,
    pub class_name: String,
    pub batch: String,
}

impl SearchQuery {
    pub fn new(
        registration_number: Option<&str>,
        class_name: Option<&str>,
        batch: Option<&str>,
    ) -> Result<Self, ValidationError> {
        fn required(v: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
            match v.map(str::trim) {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                _ => Err(ValidationError::Missing(field)),
            }
        }
        Ok(SearchQuery {
            registration_number: required(registration_number, "reg")?,
            class_name: required(class_name, "className")?,
            batch: required(batch, "batch")?,
        })
    }
}

/// SQLite-backed result table. The natural key
/// `(registration_number, class, batch, subject, exam_date)` is enforced by
/// a unique index.
pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    pub fn open(workspace: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(workspace)?;
        let conn = Connection::open(workspace.join(DB_FILE))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS results(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                registration_number TEXT NOT NULL,
                student_name TEXT NOT NULL,
                class TEXT NOT NULL,
                batch TEXT NOT NULL,
                subject TEXT NOT NULL,
                marks REAL NOT NULL,
                grade TEXT NOT NULL,
                exam_date TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_results_lookup ON results(registration_number, class, batch)",
            [],
        )?;

        let store = ResultStore { conn };
        // Databases written before the invariant existed may hold duplicates;
        // they stay readable until deduplicate() repairs them.
        match store.create_unique_index() {
            Ok(()) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                log::warn!("results table contains duplicate natural keys; unique index not created");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(store)
    }

    fn create_unique_index(&self) -> rusqlite::Result<()> {
        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_unique_result
             ON results(registration_number, class, batch, subject, exam_date)",
            [],
        )?;
        Ok(())
    }

    pub fn has_unique_index(&self) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?",
                [UNIQUE_INDEX],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Applies every record in one transaction; a record whose natural key
    /// already exists replaces the stored one.
    pub fn upsert_batch(&mut self, records: &[ResultRecord]) -> Result<usize, StoreError> {
        if !self.has_unique_index()? {
            return Err(StoreError::ConstraintMissing);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO results(
                    registration_number, student_name, class, batch, subject, marks, grade, exam_date
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(registration_number, class, batch, subject, exam_date) DO UPDATE SET
                    student_name = excluded.student_name,
                    marks = excluded.marks,
                    grade = excluded.grade",
            )?;
            for r in records {
                stmt.execute((
                    &r.registration_number,
                    &r.student_name,
                    &r.class_name,
                    &r.batch,
                    &r.subject,
                    r.marks,
                    &r.grade,
                    &r.exam_date,
                ))?;
            }
        }
        // Dropping an uncommitted transaction rolls it back.
        tx.commit()?;
        Ok(records.len())
    }

    /// All subject/exam rows for one student in one class and batch.
    pub fn query(&self, q: &SearchQuery) -> Result<Vec<ResultRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT registration_number, student_name, class, batch, subject, marks, grade, exam_date
             FROM results
             WHERE registration_number = ? AND class = ? AND batch = ?
             ORDER BY subject, exam_date, id",
        )?;
        let rows = stmt
            .query_map(
                (&q.registration_number, &q.class_name, &q.batch),
                |row| {
                    Ok(ResultRecord {
                        registration_number: row.get(0)?,
                        student_name: row.get(1)?,
                        class_name: row.get(2)?,
                        batch: row.get(3)?,
                        subject: row.get(4)?,
                        marks: row.get(5)?,
                        grade: row.get(6)?,
                        exam_date: row.get(7)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM results", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Deletes every record. Returns how many were removed.
    pub fn clear_all(&mut self) -> Result<usize, StoreError> {
        Ok(self.conn.execute("DELETE FROM results", [])?)
    }

    /// Keeps the lowest-id row per natural key, drops the rest and installs
    /// the unique index. Running it again removes nothing.
    pub fn deduplicate(&mut self) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM results
             WHERE id NOT IN (
               SELECT MIN(id)
               FROM results
               GROUP BY registration_number, class, batch, subject, exam_date
             )",
            [],
        )?;
        tx.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_unique_result
             ON results(registration_number, class, batch, subject, exam_date)",
            [],
        )?;
        tx.commit()?;
        if removed > 0 {
            log::info!("deduplicate removed {} duplicate result rows", removed);
        }
        Ok(removed)
    }
}
