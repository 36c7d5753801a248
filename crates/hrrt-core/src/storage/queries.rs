use super::models::*;
use super::sqlite::Index;
use crate::error::Error;
use crate::grammar::{ScanDateTime, ScanType};
use crate::model::{Checksums, ScanFile, Subject};
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use tracing::debug;

const FILE_COLUMNS: &str = "id, scan_id, file_path, file_name, file_size, file_modified, \
     hostname, file_crc32, file_md5, file_class, archive_class";

fn file_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        scan_id: row.get(1)?,
        file_path: row.get(2)?,
        file_name: row.get(3)?,
        file_size: row.get(4)?,
        file_modified: row.get(5)?,
        hostname: row.get(6)?,
        file_crc32: row.get(7)?,
        file_md5: row.get(8)?,
        file_class: row.get(9)?,
        archive_class: row.get(10)?,
    })
}

// Upserts that touch no columns still return the existing id, so a
// concurrent insert of the same key never produces a duplicate row.

fn upsert_subject(conn: &Connection, subject: &Subject) -> Result<i64> {
    let key = subject.key();
    conn.query_row(
        "INSERT INTO subject (name_last, name_first, history) VALUES (?1, ?2, ?3) \
         ON CONFLICT(name_last, name_first, history) DO UPDATE SET name_last = excluded.name_last \
         RETURNING id",
        params![key.name_last, key.name_first, key.history],
        |row| row.get(0),
    )
}

fn upsert_scan(
    conn: &Connection,
    subject_id: i64,
    datetime: ScanDateTime,
    scan_type: ScanType,
) -> Result<i64> {
    conn.query_row(
        "INSERT INTO scan (subject_id, scan_datetime, scan_type) VALUES (?1, ?2, ?3) \
         ON CONFLICT(subject_id, scan_datetime, scan_type) DO UPDATE SET scan_type = excluded.scan_type \
         RETURNING id",
        params![subject_id, datetime.index_value(), scan_type.as_str()],
        |row| row.get(0),
    )
}

fn insert_file_row(conn: &Connection, scan_id: i64, file: &ScanFile) -> Result<bool, Error> {
    let required = file.required_fields().ok_or_else(|| {
        Error::Other(format!(
            "{} has no physical attributes to index",
            file.full_path().display()
        ))
    })?;
    let inserted = conn.execute(
        "INSERT INTO file \
         (scan_id, file_path, file_name, file_size, file_modified, hostname, \
          file_crc32, file_md5, file_class, archive_class) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT(file_path, file_name, file_size, file_modified, hostname) DO NOTHING",
        params![
            scan_id,
            required.file_path,
            required.file_name,
            required.file_size,
            required.file_modified,
            required.hostname,
            file.checksums.crc32,
            file.checksums.md5,
            file.class.as_str(),
            file.archive_format.as_str(),
        ],
    )?;
    Ok(inserted == 1)
}

impl Index {
    // ── Subjects and scans ───────────────────────────────────────

    pub fn find_or_create_subject(&self, subject: &Subject) -> Result<i64> {
        upsert_subject(&self.connection(), subject)
    }

    pub fn find_or_create_scan(
        &self,
        subject_id: i64,
        datetime: ScanDateTime,
        scan_type: ScanType,
    ) -> Result<i64> {
        upsert_scan(&self.connection(), subject_id, datetime, scan_type)
    }

    pub fn find_subject(&self, subject: &Subject) -> Result<Option<SubjectRecord>> {
        let key = subject.key();
        self.connection()
            .query_row(
                "SELECT id, name_last, name_first, history FROM subject \
                 WHERE name_last = ?1 AND name_first = ?2 AND history = ?3",
                params![key.name_last, key.name_first, key.history],
                |row| {
                    Ok(SubjectRecord {
                        id: row.get(0)?,
                        name_last: row.get(1)?,
                        name_first: row.get(2)?,
                        history: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    pub fn scans_for_subject(&self, subject_id: i64) -> Result<Vec<ScanRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(
            "SELECT id, subject_id, scan_datetime, scan_type FROM scan \
             WHERE subject_id = ?1 ORDER BY scan_datetime, scan_type",
        )?;
        let scans = stmt
            .query_map(params![subject_id], |row| {
                Ok(ScanRecord {
                    id: row.get(0)?,
                    subject_id: row.get(1)?,
                    scan_datetime: row.get(2)?,
                    scan_type: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(scans)
    }

    // ── Files ────────────────────────────────────────────────────

    /// Look a file up by its natural key. More than one match means the
    /// unique constraint has been bypassed and nothing can be trusted.
    pub fn find_file(&self, required: &RequiredFields) -> Result<Option<FileRecord>, Error> {
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM file \
             WHERE file_path = ?1 AND file_name = ?2 AND file_size = ?3 \
               AND file_modified = ?4 AND hostname = ?5",
            FILE_COLUMNS
        ))?;
        let mut matches = stmt
            .query_map(
                params![
                    required.file_path,
                    required.file_name,
                    required.file_size,
                    required.file_modified,
                    required.hostname,
                ],
                file_from_row,
            )?
            .collect::<Result<Vec<_>>>()?;

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(Error::Consistency(format!(
                "{} index records for {}/{} on {}",
                n, required.file_path, required.file_name, required.hostname
            ))),
        }
    }

    /// Insert a file together with its subject and scan, creating whichever
    /// of those is missing, in one transaction. Returns false when the file
    /// was already recorded.
    pub fn record_file(&self, file: &ScanFile) -> Result<bool, Error> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;
        let subject_id = upsert_subject(&tx, &file.subject)?;
        let scan_id = upsert_scan(&tx, subject_id, file.datetime, file.scan_type)?;
        let inserted = insert_file_row(&tx, scan_id, file)?;
        tx.commit()?;
        if inserted {
            debug!(
                "Indexed {} (subject {}, scan {})",
                file.full_path().display(),
                subject_id,
                scan_id
            );
        }
        Ok(inserted)
    }

    /// Fill in checksums on a record that lacks them.
    pub fn update_file_checksums(&self, file_id: i64, checksums: &Checksums) -> Result<usize> {
        self.connection().execute(
            "UPDATE file SET file_crc32 = COALESCE(?1, file_crc32), \
             file_md5 = COALESCE(?2, file_md5) WHERE id = ?3",
            params![checksums.crc32, checksums.md5, file_id],
        )
    }

    pub fn files_for_host(&self, hostname: &str) -> Result<Vec<FileRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file WHERE hostname = ?1 ORDER BY file_path, file_name",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![hostname], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn files_for_scan(&self, scan_id: i64) -> Result<Vec<FileRecord>> {
        let conn = self.connection();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM file WHERE scan_id = ?1 ORDER BY file_class",
            FILE_COLUMNS
        ))?;
        let files = stmt
            .query_map(params![scan_id], file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn delete_file(&self, file_id: i64) -> Result<usize> {
        self.connection()
            .execute("DELETE FROM file WHERE id = ?1", params![file_id])
    }

    // ── Orphans ──────────────────────────────────────────────────

    pub fn delete_orphan_scans(&self) -> Result<usize> {
        let deleted = self.connection().execute(
            "DELETE FROM scan WHERE NOT EXISTS \
             (SELECT 1 FROM file WHERE file.scan_id = scan.id)",
            [],
        )?;
        debug!("Deleted {} orphan scans", deleted);
        Ok(deleted)
    }

    pub fn delete_orphan_subjects(&self) -> Result<usize> {
        let deleted = self.connection().execute(
            "DELETE FROM subject WHERE NOT EXISTS \
             (SELECT 1 FROM scan WHERE scan.subject_id = subject.id)",
            [],
        )?;
        debug!("Deleted {} orphan subjects", deleted);
        Ok(deleted)
    }

    // ── Stats ────────────────────────────────────────────────────

    pub fn counts(&self) -> Result<IndexCounts> {
        let conn = self.connection();
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
        };
        Ok(IndexCounts {
            subjects: count("subject")?,
            scans: count("scan")?,
            files: count("file")?,
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        let counts = self.counts()?;
        Ok(counts.subjects == 0 && counts.scans == 0 && counts.files == 0)
    }
}
