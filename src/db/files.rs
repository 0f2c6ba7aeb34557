//! Files, tasks, and genes.

use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    common::GenomeReference,
    db::{
        model::{FileRecord, FileStatus, Task, TaskStatus},
        variants::insert_gene_data,
        Store,
    },
    err::StorageError,
    seqvars::normalize::GeneData,
};

/// Current time as RFC 3339 timestamp.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Parse a stored text column into `T`.
pub(crate) fn parse_column<T: std::str::FromStr>(
    column: &'static str,
    value: String,
) -> Result<T, StorageError> {
    match value.parse::<T>() {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(StorageError::InvalidValue { column, value }),
    }
}

/// Outcome of registering an uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// The file was new; a task was started.
    Created(Task),
    /// The file was known but not processed; its derived rows were cleared and
    /// a new task was started.
    Retried(Task),
    /// The file was processed before; nothing was written.
    AlreadyProcessed,
    /// A task of the file is still running; nothing was written.
    InProgress(Task),
}

const FILE_COLUMNS: &str = "hash, name, path, reference, created_at, status";

type RawFile = (String, String, String, String, String, String);

fn raw_file(row: &rusqlite::Row) -> rusqlite::Result<RawFile> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn file_from_raw(raw: RawFile) -> Result<FileRecord, StorageError> {
    let (hash, name, path, reference, created_at, status) = raw;
    Ok(FileRecord {
        hash,
        name,
        path,
        reference: parse_column::<GenomeReference>("files.reference", reference)?,
        created_at,
        status: parse_column::<FileStatus>("files.status", status)?,
    })
}

type RawTask = (i64, String, String, String, Option<String>);

fn raw_task(row: &rusqlite::Row) -> rusqlite::Result<RawTask> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn task_from_raw(raw: RawTask) -> Result<Task, StorageError> {
    let (id, created_at, file_hash, status, message) = raw;
    Ok(Task {
        id,
        created_at,
        file_hash,
        status: parse_column::<TaskStatus>("tasks.status", status)?,
        message,
    })
}

fn query_file(conn: &Connection, hash: &str) -> Result<Option<FileRecord>, StorageError> {
    let raw = conn
        .query_row(
            &format!("SELECT {} FROM files WHERE hash = ?1", FILE_COLUMNS),
            [hash],
            raw_file,
        )
        .optional()?;
    raw.map(file_from_raw).transpose()
}

fn insert_task(conn: &Connection, file_hash: &str) -> Result<Task, StorageError> {
    let task = Task {
        id: 0,
        created_at: now_rfc3339(),
        file_hash: file_hash.to_string(),
        status: TaskStatus::Running,
        message: None,
    };
    conn.execute(
        "INSERT INTO tasks (created_at, file_hash, status) VALUES (?1, ?2, ?3)",
        params![&task.created_at, &task.file_hash, task.status.to_string()],
    )?;
    Ok(Task {
        id: conn.last_insert_rowid(),
        ..task
    })
}

fn query_running_task(conn: &Connection, file_hash: &str) -> Result<Option<Task>, StorageError> {
    let raw = conn
        .query_row(
            "SELECT id, created_at, file_hash, status, message FROM tasks \
             WHERE file_hash = ?1 AND status = ?2 ORDER BY id ASC LIMIT 1",
            params![file_hash, TaskStatus::Running.to_string()],
            raw_task,
        )
        .optional()?;
    raw.map(task_from_raw).transpose()
}

/// Remove genes, variants, and annotations of a file, children first.
fn delete_derived_rows(conn: &Connection, hash: &str) -> Result<(), StorageError> {
    for table in ["annotations", "variants", "genes"] {
        conn.execute(&format!("DELETE FROM {} WHERE file_hash = ?1", table), [hash])?;
    }
    Ok(())
}

impl Store {
    /// Insert a new file record.
    pub fn save_file(&self, file: &FileRecord) -> Result<(), StorageError> {
        self.write(|tx| {
            tx.execute(
                &format!(
                    "INSERT INTO files ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    FILE_COLUMNS
                ),
                params![
                    &file.hash,
                    &file.name,
                    &file.path,
                    file.reference.to_string(),
                    &file.created_at,
                    file.status.to_string(),
                ],
            )?;
            Ok(())
        })
    }

    /// Register an upload and start a task for it, unless it was processed
    /// before or one of its tasks is still running.
    ///
    /// The checks and the writes happen under one write lock, so two concurrent
    /// uploads of the same content cannot both start a task.
    pub fn register_file(&self, file: &FileRecord) -> Result<Registration, StorageError> {
        self.write(|tx| match query_file(tx, &file.hash)? {
            Some(existing) if existing.status == FileStatus::Processed => {
                Ok(Registration::AlreadyProcessed)
            }
            Some(_) => {
                if let Some(running) = query_running_task(tx, &file.hash)? {
                    return Ok(Registration::InProgress(running));
                }
                delete_derived_rows(tx, &file.hash)?;
                tx.execute(
                    "UPDATE files SET name = ?2, path = ?3, reference = ?4 WHERE hash = ?1",
                    params![
                        &file.hash,
                        &file.name,
                        &file.path,
                        file.reference.to_string()
                    ],
                )?;
                Ok(Registration::Retried(insert_task(tx, &file.hash)?))
            }
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO files ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        FILE_COLUMNS
                    ),
                    params![
                        &file.hash,
                        &file.name,
                        &file.path,
                        file.reference.to_string(),
                        &file.created_at,
                        FileStatus::Unprocessed.to_string(),
                    ],
                )?;
                Ok(Registration::Created(insert_task(tx, &file.hash)?))
            }
        })
    }

    /// Look up a file by content hash.
    pub fn get_file(&self, hash: &str) -> Result<Option<FileRecord>, StorageError> {
        self.read(|conn| query_file(conn, hash))
    }

    /// All files, oldest first.
    pub fn get_files(&self) -> Result<Vec<FileRecord>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM files ORDER BY created_at ASC, name ASC",
                FILE_COLUMNS
            ))?;
            let raws = stmt
                .query_map([], raw_file)?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(file_from_raw).collect()
        })
    }

    /// Delete a file with its tasks, genes, variants, and annotations.
    ///
    /// Returns `false` if there is no such file.
    pub fn delete_file(&self, hash: &str) -> Result<bool, StorageError> {
        self.write(|tx| {
            delete_derived_rows(tx, hash)?;
            tx.execute("DELETE FROM tasks WHERE file_hash = ?1", [hash])?;
            let deleted = tx.execute("DELETE FROM files WHERE hash = ?1", [hash])?;
            Ok(deleted > 0)
        })
    }

    /// Start a new task for an existing file.
    pub fn create_task(&self, file_hash: &str) -> Result<Task, StorageError> {
        self.write(|tx| insert_task(tx, file_hash))
    }

    /// Record the final state of a task.
    pub fn finish_task(
        &self,
        id: i64,
        status: TaskStatus,
        message: Option<&str>,
    ) -> Result<(), StorageError> {
        self.write(|tx| {
            tx.execute(
                "UPDATE tasks SET status = ?2, message = ?3 WHERE id = ?1",
                params![id, status.to_string(), message],
            )?;
            Ok(())
        })
    }

    /// Tasks of a file in creation order.
    pub fn get_tasks(&self, file_hash: &str) -> Result<Vec<Task>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, file_hash, status, message FROM tasks \
                 WHERE file_hash = ?1 ORDER BY id ASC",
            )?;
            let raws = stmt
                .query_map([file_hash], raw_task)?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(task_from_raw).collect()
        })
    }

    /// Genes extracted from a file, sorted by symbol.
    pub fn get_genes(&self, file_hash: &str) -> Result<Vec<String>, StorageError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT gene_hgnc FROM genes WHERE file_hash = ?1 ORDER BY gene_hgnc ASC",
            )?;
            let genes = stmt
                .query_map([file_hash], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(genes)
        })
    }

    /// Store one gene with all its variants and annotations atomically.
    pub fn save_gene_data(&self, file_hash: &str, data: &GeneData) -> Result<(), StorageError> {
        self.write(|tx| insert_gene_data(tx, file_hash, data))
    }

    /// Store all genes of a file and mark it processed, in one transaction.
    ///
    /// Either all genes become visible together with the status flip or
    /// nothing is written.
    pub fn complete_file(&self, file_hash: &str, genes: &[GeneData]) -> Result<(), StorageError> {
        self.write(|tx| {
            for data in genes {
                insert_gene_data(tx, file_hash, data)?;
            }
            let updated = tx.execute(
                "UPDATE files SET status = ?2 WHERE hash = ?1",
                params![file_hash, FileStatus::Processed.to_string()],
            )?;
            if updated == 0 {
                return Err(StorageError::InvalidValue {
                    column: "files.hash",
                    value: file_hash.to_string(),
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::Registration;
    use crate::{
        common::GenomeReference,
        db::{
            model::{FileRecord, FileStatus, TaskStatus},
            test::open_store,
        },
        seqvars::normalize::normalize_file,
    };

    pub fn file_record(hash: &str) -> FileRecord {
        FileRecord {
            hash: hash.to_string(),
            name: "example.vcf".into(),
            path: "tests/seqvars/example.vcf".into(),
            reference: GenomeReference::Grch38,
            created_at: "2024-01-02T03:04:05+00:00".into(),
            status: FileStatus::Unprocessed,
        }
    }

    #[test]
    fn get_file_not_found() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);

        assert_eq!(store.get_file("0123")?, None);

        Ok(())
    }

    #[test]
    fn save_and_get_file() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);

        store.save_file(&file_record("abc"))?;

        assert_eq!(store.get_file("abc")?, Some(file_record("abc")));
        assert_eq!(store.get_files()?, vec![file_record("abc")]);
        assert!(store.save_file(&file_record("abc")).is_err());

        Ok(())
    }

    #[test]
    fn register_is_idempotent_once_processed() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);

        let task = match store.register_file(&file_record("abc"))? {
            Registration::Created(task) => task,
            other => panic!("unexpected registration: {:?}", other),
        };
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.file_hash, "abc");

        // Unprocessed files may be submitted again once their task finished.
        store.finish_task(task.id, TaskStatus::Failed, Some("annotation failed"))?;
        let retry = store.register_file(&file_record("abc"))?;
        assert!(matches!(retry, Registration::Retried(ref t) if t.id > task.id));

        store.complete_file("abc", &[])?;
        assert_eq!(
            store.register_file(&file_record("abc"))?,
            Registration::AlreadyProcessed
        );
        assert_eq!(store.get_tasks("abc")?.len(), 2);
        assert_eq!(
            store.get_file("abc")?.map(|f| f.status),
            Some(FileStatus::Processed)
        );

        Ok(())
    }

    #[test]
    fn register_while_running_starts_no_task() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);

        let first = match store.register_file(&file_record("abc"))? {
            Registration::Created(task) => task,
            other => panic!("unexpected registration: {:?}", other),
        };
        store.save_gene_data("abc", &normalize_file("IL9R", "tests/seqvars/IL9R.vcf")?)?;

        assert_eq!(
            store.register_file(&file_record("abc"))?,
            Registration::InProgress(first.clone())
        );
        let running = store
            .get_tasks("abc")?
            .into_iter()
            .filter(|task| task.status == TaskStatus::Running)
            .count();
        assert_eq!(running, 1);
        assert_eq!(store.get_genes("abc")?, vec!["IL9R"]);

        store.finish_task(first.id, TaskStatus::Done, None)?;
        assert!(matches!(
            store.register_file(&file_record("abc"))?,
            Registration::Retried(_)
        ));

        Ok(())
    }

    #[test]
    fn retry_clears_derived_rows() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);
        if let Registration::Created(task) = store.register_file(&file_record("abc"))? {
            store.finish_task(task.id, TaskStatus::Failed, None)?;
        }
        store.save_gene_data("abc", &normalize_file("IL9R", "tests/seqvars/IL9R.vcf")?)?;
        assert_eq!(store.get_genes("abc")?, vec!["IL9R"]);

        store.register_file(&file_record("abc"))?;

        assert!(store.get_genes("abc")?.is_empty());
        store.save_gene_data("abc", &normalize_file("IL9R", "tests/seqvars/IL9R.vcf")?)?;
        assert_eq!(store.get_genes("abc")?, vec!["IL9R"]);

        Ok(())
    }

    #[test]
    fn finish_task_records_failure() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);
        store.save_file(&file_record("abc"))?;
        let task = store.create_task("abc")?;

        store.finish_task(task.id, TaskStatus::Failed, Some("annotation failed"))?;

        let tasks = store.get_tasks("abc")?;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert_eq!(tasks[0].message.as_deref(), Some("annotation failed"));

        Ok(())
    }

    #[test]
    fn complete_file_is_all_or_nothing() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);
        store.save_file(&file_record("abc"))?;
        let il9r = normalize_file("IL9R", "tests/seqvars/IL9R.vcf")?;

        // The second copy of the gene violates the primary key.
        let result = store.complete_file("abc", &[il9r.clone(), il9r.clone()]);

        assert!(result.is_err());
        assert!(store.get_genes("abc")?.is_empty());
        assert_eq!(
            store.get_file("abc")?.map(|f| f.status),
            Some(FileStatus::Unprocessed)
        );

        store.complete_file("abc", &[il9r])?;
        assert_eq!(store.get_genes("abc")?, vec!["IL9R"]);
        assert_eq!(
            store.get_file("abc")?.map(|f| f.status),
            Some(FileStatus::Processed)
        );

        Ok(())
    }

    #[test]
    fn delete_file_cascades() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let store = open_store(&tmp_dir);
        store.register_file(&file_record("abc"))?;
        store.register_file(&file_record("def"))?;
        let il9r = normalize_file("IL9R", "tests/seqvars/IL9R.vcf")?;
        store.complete_file("abc", &[il9r.clone()])?;
        store.complete_file("def", &[il9r])?;

        assert!(store.delete_file("abc")?);

        assert_eq!(store.get_file("abc")?, None);
        assert!(store.get_genes("abc")?.is_empty());
        assert!(store.get_tasks("abc")?.is_empty());
        assert!(store.get_variant("abc", "IL9R", 0)?.is_none());
        let counts = store.read(|conn| {
            Ok(conn.query_row(
                "SELECT (SELECT COUNT(*) FROM variants WHERE file_hash = 'abc'), \
                        (SELECT COUNT(*) FROM annotations WHERE file_hash = 'abc'), \
                        (SELECT COUNT(*) FROM annotations WHERE file_hash = 'def')",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )?)
        })?;
        assert_eq!(counts, (0, 0, 2));
        assert!(!store.delete_file("abc")?);

        Ok(())
    }
}
