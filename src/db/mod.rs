pub mod codec;
pub mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use self::codec::{bytes_to_vector, vector_to_bytes, Payload, Sealer};
use crate::embedding::l2_norm;
use crate::error::{MemoryError, Result};
use crate::memory::types::{MemoryEntry, Partition};

/// Open (or create) the database at the given path with the schema initialized.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::PersistenceFailure(format!(
                    "failed to create directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let conn = Connection::open(path).map_err(|e| {
        MemoryError::PersistenceFailure(format!("failed to open database at {}: {e}", path.display()))
    })?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_millis(5000))?;

    schema::init_schema(&conn)?;

    tracing::debug!(path = %path.display(), "database opened");
    Ok(conn)
}

/// Store-wide counters persisted next to the entries.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreMeta {
    pub dimension: usize,
    pub codec: String,
    pub total_stored: u64,
    pub total_evicted: u64,
    pub last_compression_at: Option<DateTime<Utc>>,
}

/// Everything needed to rebuild a store.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub entries: Vec<MemoryEntry>,
    pub meta: StoreMeta,
}

/// Replace all persisted state with `snapshot` in a single transaction.
pub fn write_snapshot(conn: &mut Connection, snapshot: &Snapshot, sealer: &Sealer) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM memories", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO memories (id, partition, payload, vector, importance, created_at, last_accessed_at, access_count) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for entry in &snapshot.entries {
            let payload = sealer.encode_payload(&Payload {
                content: entry.content.clone(),
                tags: entry.tags.clone(),
                context: entry.context.clone(),
            })?;
            stmt.execute(params![
                entry.id,
                entry.partition.as_str(),
                payload,
                vector_to_bytes(&entry.vector),
                entry.importance,
                format_timestamp(entry.created_at),
                format_timestamp(entry.last_accessed_at),
                i64::try_from(entry.access_count).unwrap_or(i64::MAX),
            ])?;
        }
    }

    let meta = &snapshot.meta;
    let pairs = [
        ("schema_version", schema::SCHEMA_VERSION.to_string()),
        ("dimension", meta.dimension.to_string()),
        ("codec", meta.codec.clone()),
        ("total_stored", meta.total_stored.to_string()),
        ("total_evicted", meta.total_evicted.to_string()),
        (
            "last_compression_at",
            meta.last_compression_at.map(format_timestamp).unwrap_or_default(),
        ),
        ("saved_at", format_timestamp(Utc::now())),
    ];
    for (key, value) in &pairs {
        tx.execute(
            "INSERT OR REPLACE INTO store_meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Read and verify a persisted snapshot.
///
/// Returns `Ok(None)` when nothing has ever been saved. Every row is decoded and checked;
/// the first failure aborts the whole read so a partial state is never returned.
pub fn read_snapshot(conn: &Connection, sealer: &Sealer, dimension: usize) -> Result<Option<Snapshot>> {
    let meta_rows: HashMap<String, String> = {
        let mut stmt = conn.prepare("SELECT key, value FROM store_meta")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        rows
    };

    let row_count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
    if !meta_rows.contains_key("dimension") {
        if row_count == 0 {
            return Ok(None);
        }
        return Err(corrupt("entries present without store metadata"));
    }

    let meta = parse_meta(&meta_rows)?;
    if meta.dimension != dimension {
        return Err(corrupt(format!(
            "stored vectors have dimension {}, store is configured for {dimension}",
            meta.dimension
        )));
    }
    if meta.codec != sealer.codec_name() {
        return Err(corrupt(format!(
            "state was saved with codec '{}' but store uses '{}'",
            meta.codec,
            sealer.codec_name()
        )));
    }

    struct RawRow {
        id: String,
        partition: String,
        payload: Vec<u8>,
        vector: Vec<u8>,
        importance: f64,
        created_at: String,
        last_accessed_at: String,
        access_count: i64,
    }

    let raw: Vec<RawRow> = {
        let mut stmt = conn.prepare(
            "SELECT id, partition, payload, vector, importance, created_at, last_accessed_at, access_count \
             FROM memories",
        )?;
        let collected = stmt
            .query_map([], |row| {
                Ok(RawRow {
                    id: row.get(0)?,
                    partition: row.get(1)?,
                    payload: row.get(2)?,
                    vector: row.get(3)?,
                    importance: row.get(4)?,
                    created_at: row.get(5)?,
                    last_accessed_at: row.get(6)?,
                    access_count: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        collected
    };

    let mut entries = Vec::with_capacity(raw.len());
    for row in raw {
        let partition: Partition = row
            .partition
            .parse()
            .map_err(|_| corrupt(format!("entry {} has unknown partition '{}'", row.id, row.partition)))?;
        let payload = sealer
            .decode_payload(&row.payload)
            .map_err(|e| corrupt(format!("entry {}: {e}", row.id)))?;
        let vector = bytes_to_vector(&row.vector, dimension)
            .map_err(|e| corrupt(format!("entry {}: {e}", row.id)))?;
        if (l2_norm(&vector) - 1.0).abs() > 1e-3 {
            return Err(corrupt(format!("entry {} has a non-normalized vector", row.id)));
        }
        if !(0.0..=1.0).contains(&row.importance) {
            return Err(corrupt(format!("entry {} has importance {}", row.id, row.importance)));
        }
        let access_count = u64::try_from(row.access_count)
            .map_err(|_| corrupt(format!("entry {} has negative access_count", row.id)))?;

        entries.push(MemoryEntry {
            created_at: parse_timestamp(&row.created_at)?,
            last_accessed_at: parse_timestamp(&row.last_accessed_at)?,
            id: row.id,
            content: payload.content,
            vector,
            partition,
            importance: row.importance,
            access_count,
            tags: payload.tags,
            context: payload.context,
        });
    }
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    Ok(Some(Snapshot { entries, meta }))
}

fn parse_meta(rows: &HashMap<String, String>) -> Result<StoreMeta> {
    fn get<'a>(rows: &'a HashMap<String, String>, key: &str) -> &'a str {
        rows.get(key).map(String::as_str).unwrap_or_default()
    }
    let number = |key: &str| -> Result<u64> {
        get(rows, key)
            .parse::<u64>()
            .map_err(|_| corrupt(format!("store_meta.{key} is not a number")))
    };

    let version = number("schema_version")?;
    if version > u64::from(schema::SCHEMA_VERSION) {
        return Err(corrupt(format!(
            "schema version {version} is newer than supported version {}",
            schema::SCHEMA_VERSION
        )));
    }

    let last_compression_at = match get(rows, "last_compression_at") {
        "" => None,
        ts => Some(parse_timestamp(ts)?),
    };

    Ok(StoreMeta {
        dimension: number("dimension")? as usize,
        codec: get(rows, "codec").to_string(),
        total_stored: number("total_stored")?,
        total_evicted: number("total_evicted")?,
        last_compression_at,
    })
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("bad timestamp '{s}': {e}")))
}

fn corrupt(msg: impl Into<String>) -> MemoryError {
    MemoryError::PersistenceFailure(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashedEmbedding};
    use serde_json::json;

    fn sample_entry(id: &str, partition: Partition) -> MemoryEntry {
        let content = json!({"id": id});
        let vector = HashedEmbedding::new(8).embed(&content).unwrap();
        let now = Utc::now();
        MemoryEntry {
            id: id.to_string(),
            content,
            vector,
            partition,
            importance: 0.25,
            created_at: now,
            last_accessed_at: now,
            access_count: 3,
            tags: ["t".to_string()].into_iter().collect(),
            context: Default::default(),
        }
    }

    fn snapshot(entries: Vec<MemoryEntry>) -> Snapshot {
        Snapshot {
            entries,
            meta: StoreMeta {
                dimension: 8,
                codec: "plain".into(),
                total_stored: 7,
                total_evicted: 2,
                last_compression_at: Some(Utc::now()),
            },
        }
    }

    #[test]
    fn empty_database_reads_as_none() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        assert!(read_snapshot(&conn, &Sealer::Plain, 8).unwrap().is_none());
    }

    #[test]
    fn snapshot_survives_write_and_read() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        let original = snapshot(vec![
            sample_entry("a", Partition::Semantic),
            sample_entry("b", Partition::Working),
        ]);
        write_snapshot(&mut conn, &original, &Sealer::Plain).unwrap();

        let back = read_snapshot(&conn, &Sealer::Plain, 8).unwrap().unwrap();
        assert_eq!(back.meta, original.meta);
        assert_eq!(back.entries.len(), 2);
        let a = back.entries.iter().find(|e| e.id == "a").unwrap();
        assert_eq!(a, &original.entries[0]);
    }

    #[test]
    fn write_replaces_previous_state() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        write_snapshot(&mut conn, &snapshot(vec![sample_entry("a", Partition::Semantic)]), &Sealer::Plain).unwrap();
        write_snapshot(&mut conn, &snapshot(vec![sample_entry("b", Partition::Episodic)]), &Sealer::Plain).unwrap();

        let back = read_snapshot(&conn, &Sealer::Plain, 8).unwrap().unwrap();
        let ids: Vec<&str> = back.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn dimension_and_codec_mismatch_fail() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        write_snapshot(&mut conn, &snapshot(vec![sample_entry("a", Partition::Semantic)]), &Sealer::Plain).unwrap();

        assert!(read_snapshot(&conn, &Sealer::Plain, 16).is_err());
        assert!(read_snapshot(&conn, &Sealer::from_secret(Some("k")), 8).is_err());
    }

    #[test]
    fn truncated_vector_fails_closed() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        write_snapshot(&mut conn, &snapshot(vec![sample_entry("a", Partition::Semantic)]), &Sealer::Plain).unwrap();
        conn.execute("UPDATE memories SET vector = x'0000803f' WHERE id = 'a'", [])
            .unwrap();

        let err = read_snapshot(&conn, &Sealer::Plain, 8).unwrap_err();
        assert!(matches!(err, MemoryError::PersistenceFailure(_)));
    }

    #[test]
    fn timestamps_use_fixed_width_format() {
        let ts = parse_timestamp("2026-01-02T03:04:05.000000006Z").unwrap();
        assert_eq!(format_timestamp(ts), "2026-01-02T03:04:05.000000006Z");
        assert!(parse_timestamp("yesterday").is_err());
    }
}
