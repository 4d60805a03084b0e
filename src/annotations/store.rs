use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use super::types::{AdAnnotation, AnnotationUpdate, FunnelStage, Verdict};

pub const ANNOTATIONS_DB_NAME: &str = "annotations.db";

/// SQLite store for per-ad annotations, keyed by `ad_id`.
/// All operations are synchronous (rusqlite is blocking).
pub struct AnnotationStore {
    conn: Connection,
}

impl AnnotationStore {
    /// Create or open the annotations database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self, String> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create data dir: {}", e))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| format!("Failed to open annotations db: {}", e))?;
        Self::init(conn, db_path)
    }

    pub fn in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory()
            .map_err(|e| format!("Failed to open annotations db: {}", e))?;
        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, db_path: &Path) -> Result<Self, String> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ad_annotations (
                ad_id TEXT PRIMARY KEY,
                notes TEXT NOT NULL DEFAULT '',
                hook TEXT NOT NULL DEFAULT '',
                verdict TEXT,
                funnel_stage TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )
        .map_err(|e| format!("Failed to create table: {}", e))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_annotations_verdict ON ad_annotations(verdict)",
            [],
        )
        .map_err(|e| format!("Failed to create verdict index: {}", e))?;

        info!("Opened annotations database at {:?}", db_path);
        Ok(Self { conn })
    }

    pub fn get(&self, ad_id: &str) -> Result<Option<AdAnnotation>, String> {
        self.conn
            .query_row(
                "SELECT ad_id, notes, hook, verdict, funnel_stage, updated_at
             FROM ad_annotations WHERE ad_id = ?1",
                params![ad_id],
                annotation_from_row,
            )
            .optional()
            .map_err(|e| format!("Failed to read annotation {}: {}", ad_id, e))
    }

    /// Merge `update` into the stored annotation (creating it if needed) and
    /// return the result.
    pub fn upsert(&self, ad_id: &str, update: &AnnotationUpdate) -> Result<AdAnnotation, String> {
        let current = self.get(ad_id)?;
        let notes = update
            .notes
            .clone()
            .or_else(|| current.as_ref().map(|a| a.notes.clone()))
            .unwrap_or_default();
        let hook = update
            .hook
            .clone()
            .or_else(|| current.as_ref().map(|a| a.hook.clone()))
            .unwrap_or_default();
        let verdict = update
            .verdict
            .unwrap_or_else(|| current.as_ref().and_then(|a| a.verdict));
        let funnel_stage = update
            .funnel_stage
            .unwrap_or_else(|| current.as_ref().and_then(|a| a.funnel_stage));

        self.conn
            .execute(
                "INSERT INTO ad_annotations (ad_id, notes, hook, verdict, funnel_stage, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
             ON CONFLICT(ad_id) DO UPDATE SET
                notes = excluded.notes,
                hook = excluded.hook,
                verdict = excluded.verdict,
                funnel_stage = excluded.funnel_stage,
                updated_at = excluded.updated_at",
                params![
                    ad_id,
                    notes,
                    hook,
                    verdict.map(Verdict::as_str),
                    funnel_stage.map(FunnelStage::as_str)
                ],
            )
            .map_err(|e| format!("Failed to save annotation {}: {}", ad_id, e))?;

        info!("Saved annotation for ad {}", ad_id);
        self.get(ad_id)?
            .ok_or_else(|| format!("Annotation {} missing after save", ad_id))
    }

    /// Annotations for the given ads, in no particular order.
    pub fn get_many(&self, ad_ids: &[&str]) -> Result<Vec<AdAnnotation>, String> {
        let mut found = Vec::with_capacity(ad_ids.len());
        for ad_id in ad_ids {
            if let Some(annotation) = self.get(ad_id)? {
                found.push(annotation);
            }
        }
        Ok(found)
    }

    /// All annotations, most recently updated first.
    pub fn list(&self) -> Result<Vec<AdAnnotation>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT ad_id, notes, hook, verdict, funnel_stage, updated_at
             FROM ad_annotations
             ORDER BY updated_at DESC, ad_id ASC",
            )
            .map_err(|e| format!("Failed to prepare query: {}", e))?;

        let rows = stmt
            .query_map([], annotation_from_row)
            .map_err(|e| format!("Failed to query annotations: {}", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Failed to collect annotations: {}", e))
    }

    pub fn list_by_verdict(&self, verdict: Verdict) -> Result<Vec<AdAnnotation>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT ad_id, notes, hook, verdict, funnel_stage, updated_at
             FROM ad_annotations WHERE verdict = ?1
             ORDER BY ad_id ASC",
            )
            .map_err(|e| format!("Failed to prepare query: {}", e))?;

        let rows = stmt
            .query_map(params![verdict.as_str()], annotation_from_row)
            .map_err(|e| format!("Failed to query annotations: {}", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Failed to collect annotations: {}", e))
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, ad_id: &str) -> Result<bool, String> {
        let removed = self
            .conn
            .execute("DELETE FROM ad_annotations WHERE ad_id = ?1", params![ad_id])
            .map_err(|e| format!("Failed to delete annotation {}: {}", ad_id, e))?;
        if removed > 0 {
            info!("Deleted annotation for ad {}", ad_id);
        }
        Ok(removed > 0)
    }
}

fn annotation_from_row(row: &Row<'_>) -> rusqlite::Result<AdAnnotation> {
    let ad_id: String = row.get(0)?;
    let verdict: Option<String> = row.get(3)?;
    let funnel_stage: Option<String> = row.get(4)?;

    Ok(AdAnnotation {
        verdict: verdict.as_deref().and_then(|raw| {
            let parsed = Verdict::parse(raw);
            if parsed.is_none() {
                warn!("Unknown verdict {:?} on ad {}", raw, ad_id);
            }
            parsed
        }),
        funnel_stage: funnel_stage.as_deref().and_then(FunnelStage::parse),
        notes: row.get(1)?,
        hook: row.get(2)?,
        updated_at: row.get(5)?,
        ad_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (AnnotationStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = AnnotationStore::new(&dir.path().join(ANNOTATIONS_DB_NAME)).unwrap();
        (store, dir)
    }

    #[test]
    fn test_upsert_creates_then_merges() {
        let (store, _dir) = create_test_store();

        let created = store
            .upsert(
                "ad-1",
                &AnnotationUpdate {
                    notes: Some("Strong first 3s".into()),
                    verdict: Some(Some(Verdict::Testing)),
                    ..AnnotationUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(created.notes, "Strong first 3s");
        assert_eq!(created.hook, "");
        assert_eq!(created.verdict, Some(Verdict::Testing));
        assert!(!created.updated_at.is_empty());

        let merged = store
            .upsert(
                "ad-1",
                &AnnotationUpdate {
                    hook: Some("Problem/solution".into()),
                    funnel_stage: Some(Some(FunnelStage::Tofu)),
                    ..AnnotationUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(merged.notes, "Strong first 3s");
        assert_eq!(merged.hook, "Problem/solution");
        assert_eq!(merged.verdict, Some(Verdict::Testing));
        assert_eq!(merged.funnel_stage, Some(FunnelStage::Tofu));
    }

    #[test]
    fn test_verdict_can_be_cleared() {
        let (store, _dir) = create_test_store();
        store
            .upsert(
                "ad-1",
                &AnnotationUpdate {
                    verdict: Some(Some(Verdict::Winner)),
                    ..AnnotationUpdate::default()
                },
            )
            .unwrap();
        let cleared = store
            .upsert(
                "ad-1",
                &AnnotationUpdate {
                    verdict: Some(None),
                    ..AnnotationUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.verdict, None);
    }

    #[test]
    fn test_get_missing_is_none() {
        let (store, _dir) = create_test_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_by_verdict_and_delete() {
        let store = AnnotationStore::in_memory().unwrap();
        for (ad_id, verdict) in [("a", Verdict::Winner), ("b", Verdict::Loser), ("c", Verdict::Winner)] {
            store
                .upsert(
                    ad_id,
                    &AnnotationUpdate {
                        verdict: Some(Some(verdict)),
                        ..AnnotationUpdate::default()
                    },
                )
                .unwrap();
        }

        let winners: Vec<String> = store
            .list_by_verdict(Verdict::Winner)
            .unwrap()
            .into_iter()
            .map(|a| a.ad_id)
            .collect();
        assert_eq!(winners, vec!["a", "c"]);
        assert_eq!(store.list().unwrap().len(), 3);

        assert!(store.delete("b").unwrap());
        assert!(!store.delete("b").unwrap());
        assert_eq!(store.get_many(&["a", "b", "c"]).unwrap().len(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(ANNOTATIONS_DB_NAME);
        {
            let store = AnnotationStore::new(&path).unwrap();
            store
                .upsert(
                    "ad-9",
                    &AnnotationUpdate {
                        notes: Some("keep".into()),
                        ..AnnotationUpdate::default()
                    },
                )
                .unwrap();
        }
        let reopened = AnnotationStore::new(&path).unwrap();
        assert_eq!(reopened.get("ad-9").unwrap().unwrap().notes, "keep");
    }
}
