// Archivo: stubs.rs
// Propósito: repositorio en memoria para pruebas, ejemplos y el binario de
// demostración. No es durable.
use crate::errors::{IngestError, Result};
use crate::repository::{IngestRepository, ModelWrite, PlayoutState};
use async_trait::async_trait;
use indexmap::IndexMap;
use rundown_model::{IngestRundown, OrphanedReason, RundownId, RundownModel, SofieCacheObject};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Repositorio en memoria que implementa `IngestRepository`.
///
/// Además del contrato expone helpers para pruebas: fijar el estado de
/// playout, contar escrituras del modelo y simular fallos al guardar las
/// caches.
pub struct InMemoryIngestRepository {
    /// Árboles del NRCS por `external_id` de rundown.
    nrcs: Mutex<HashMap<String, IngestRundown>>,
    /// Objetos de la cache normalizada por rundown, indexados por id de cache.
    sofie: Mutex<HashMap<String, IndexMap<String, SofieCacheObject>>>,
    models: Mutex<HashMap<RundownId, RundownModel>>,
    playout: Mutex<HashMap<RundownId, PlayoutState>>,
    model_commits: AtomicUsize,
    fail_cache_saves: AtomicBool,
    fail_cache_removals: AtomicBool,
}

impl InMemoryIngestRepository {
    pub fn new() -> Self {
        Self { nrcs: Mutex::new(HashMap::new()),
               sofie: Mutex::new(HashMap::new()),
               models: Mutex::new(HashMap::new()),
               playout: Mutex::new(HashMap::new()),
               model_commits: AtomicUsize::new(0),
               fail_cache_saves: AtomicBool::new(false),
               fail_cache_removals: AtomicBool::new(false) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `IngestError::Storage`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> std::result::Result<MutexGuard<'a, T>, IngestError> {
        m.lock().map_err(|e| IngestError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    /// Fija los punteros de playout de un rundown.
    pub fn set_playout_state(&self, rundown_id: &RundownId, state: PlayoutState) -> Result<()> {
        self.lock(&self.playout)?.insert(rundown_id.clone(), state);
        Ok(())
    }

    /// Número de escrituras aplicadas con `commit_model`.
    pub fn model_commits(&self) -> usize {
        self.model_commits.load(Ordering::SeqCst)
    }

    /// Hace fallar los guardados de ambas caches (no su borrado).
    pub fn set_fail_cache_saves(&self, fail: bool) {
        self.fail_cache_saves.store(fail, Ordering::SeqCst);
    }

    /// Hace fallar el borrado de ambas caches.
    pub fn set_fail_cache_removals(&self, fail: bool) {
        self.fail_cache_removals.store(fail, Ordering::SeqCst);
    }

    fn check_cache_removals(&self) -> Result<()> {
        if self.fail_cache_removals.load(Ordering::SeqCst) {
            return Err(IngestError::Storage("fallo simulado al borrar la cache".into()));
        }
        Ok(())
    }

    fn check_cache_saves(&self) -> Result<()> {
        if self.fail_cache_saves.load(Ordering::SeqCst) {
            return Err(IngestError::Storage("fallo simulado al guardar la cache".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryIngestRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestRepository for InMemoryIngestRepository {
    async fn load_nrcs_cache(&self, rundown_external_id: &str) -> Result<Option<IngestRundown>> {
        Ok(self.lock(&self.nrcs)?.get(rundown_external_id).cloned())
    }

    async fn save_nrcs_cache(&self, rundown: &IngestRundown) -> Result<()> {
        self.check_cache_saves()?;
        self.lock(&self.nrcs)?.insert(rundown.external_id.clone(), rundown.clone());
        Ok(())
    }

    async fn remove_nrcs_cache(&self, rundown_external_id: &str) -> Result<()> {
        self.check_cache_removals()?;
        self.lock(&self.nrcs)?.remove(rundown_external_id);
        Ok(())
    }

    async fn load_sofie_cache(&self, rundown_external_id: &str) -> Result<Vec<SofieCacheObject>> {
        Ok(self.lock(&self.sofie)?
               .get(rundown_external_id)
               .map(|objects| objects.values().cloned().collect())
               .unwrap_or_default())
    }

    async fn save_sofie_cache(&self, rundown_external_id: &str, changed: &[SofieCacheObject], removed_ids: &[String]) -> Result<()> {
        self.check_cache_saves()?;
        let mut sofie = self.lock(&self.sofie)?;
        let objects = sofie.entry(rundown_external_id.to_string()).or_default();
        for id in removed_ids {
            objects.shift_remove(id);
        }
        for object in changed {
            objects.insert(object.id().to_string(), object.clone());
        }
        Ok(())
    }

    async fn remove_sofie_cache(&self, rundown_external_id: &str) -> Result<()> {
        self.check_cache_removals()?;
        self.lock(&self.sofie)?.remove(rundown_external_id);
        Ok(())
    }

    async fn load_model(&self, rundown_id: &RundownId) -> Result<Option<RundownModel>> {
        Ok(self.lock(&self.models)?.get(rundown_id).cloned())
    }

    /// Aplica la escritura completa bajo un único lock: renombres, borrados,
    /// huérfanos, upserts y playout.
    async fn commit_model(&self, write: &ModelWrite) -> Result<()> {
        let mut models = self.lock(&self.models)?;
        if !models.contains_key(&write.rundown_id) {
            let rundown = write.rundown
                               .clone()
                               .ok_or_else(|| IngestError::Storage(format!("modelo {} inexistente y sin rundown", write.rundown_id)))?;
            models.insert(write.rundown_id.clone(), RundownModel::new(rundown));
        }
        let model = models.get_mut(&write.rundown_id)
                          .ok_or_else(|| IngestError::Storage(format!("modelo {} inexistente", write.rundown_id)))?;

        if let Some(rundown) = &write.rundown {
            model.rundown = rundown.clone();
        }
        for rename in &write.renamed_segments {
            if let Some(segment) = model.segments.iter_mut().find(|s| s.id == rename.from) {
                segment.id = rename.to.clone();
                segment.external_id = rename.new_external_id.clone();
            }
            for part in model.parts.iter_mut().filter(|p| p.segment_id == rename.from) {
                part.segment_id = rename.to.clone();
            }
        }
        model.segments.retain(|s| !write.removed_segment_ids.contains(&s.id));
        model.parts.retain(|p| !write.removed_part_ids.contains(&p.id));
        for segment in model.segments.iter_mut().filter(|s| write.orphaned_segment_ids.contains(&s.id)) {
            segment.orphaned = Some(OrphanedReason::Deleted);
        }
        for part in model.parts.iter_mut().filter(|p| write.orphaned_part_ids.contains(&p.id)) {
            part.orphaned = Some(OrphanedReason::Deleted);
        }
        for segment in &write.upsert_segments {
            match model.segments.iter().position(|s| s.id == segment.id) {
                Some(index) => model.segments[index] = segment.clone(),
                None => model.segments.push(segment.clone()),
            }
        }
        for part in &write.upsert_parts {
            match model.parts.iter().position(|p| p.id == part.id) {
                Some(index) => model.parts[index] = part.clone(),
                None => model.parts.push(part.clone()),
            }
        }
        if let Some(playout) = &write.playout {
            self.lock(&self.playout)?.insert(write.rundown_id.clone(), playout.clone());
        }
        self.model_commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove_model(&self, rundown_id: &RundownId) -> Result<()> {
        self.lock(&self.models)?.remove(rundown_id);
        self.lock(&self.playout)?.remove(rundown_id);
        Ok(())
    }

    async fn load_playout_state(&self, rundown_id: &RundownId) -> Result<PlayoutState> {
        Ok(self.lock(&self.playout)?.get(rundown_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rundown_model::{DbRundown, DbSegment, SegmentId};
    use serde_json::json;

    fn rundown_doc() -> DbRundown {
        DbRundown::from_ingest(&IngestRundown::new("rd", "Show", "external"), Utc::now(), Utc::now())
    }

    fn segment_doc(rundown_id: &RundownId, external_id: &str) -> DbSegment {
        DbSegment { id: SegmentId::derive(rundown_id, external_id),
                    rundown_id: rundown_id.clone(),
                    external_id: external_id.into(),
                    rank: 0.0,
                    name: external_id.into(),
                    payload: json!({}),
                    orphaned: None,
                    created_at: Utc::now(),
                    modified_at: Utc::now(),
                    generation: 0 }
    }

    #[test]
    fn commit_creates_model_and_renames_segments() -> Result<()> {
        let repo = InMemoryIngestRepository::new();
        let doc = rundown_doc();
        let rundown_id = doc.id.clone();
        let mut write = ModelWrite::new(rundown_id.clone());
        write.rundown = Some(doc);
        write.upsert_segments.push(segment_doc(&rundown_id, "s1"));
        tokio_test::block_on(repo.commit_model(&write))?;

        let mut rename = ModelWrite::new(rundown_id.clone());
        rename.renamed_segments.push(crate::repository::SegmentRename { from: SegmentId::derive(&rundown_id, "s1"),
                                                                        to: SegmentId::derive(&rundown_id, "s2"),
                                                                        new_external_id: "s2".into() });
        tokio_test::block_on(repo.commit_model(&rename))?;

        let model = tokio_test::block_on(repo.load_model(&rundown_id))?.ok_or(IngestError::Storage("sin modelo".into()))?;
        assert_eq!(model.segments[0].external_id, "s2");
        assert_eq!(model.segments[0].id, SegmentId::derive(&rundown_id, "s2"));
        assert_eq!(repo.model_commits(), 2);
        Ok(())
    }

    #[test]
    fn commit_without_rundown_on_missing_model_fails() {
        let repo = InMemoryIngestRepository::new();
        let write = ModelWrite::new(RundownId::from_external_id("nope"));
        let result = tokio_test::block_on(repo.commit_model(&write));
        assert!(matches!(result, Err(IngestError::Storage(_))));
        assert_eq!(repo.model_commits(), 0);
    }

    #[test]
    fn sofie_cache_applies_changes_and_removals() -> Result<()> {
        let repo = InMemoryIngestRepository::new();
        let rundown = IngestRundown::new("rd", "Show", "external");
        let object = SofieCacheObject::rundown(&rundown);
        tokio_test::block_on(repo.save_sofie_cache("rd", &[object.clone()], &[]))?;
        assert_eq!(tokio_test::block_on(repo.load_sofie_cache("rd"))?, vec![object.clone()]);
        tokio_test::block_on(repo.save_sofie_cache("rd", &[], &[object.id().to_string()]))?;
        assert!(tokio_test::block_on(repo.load_sofie_cache("rd"))?.is_empty());

        repo.set_fail_cache_saves(true);
        assert!(tokio_test::block_on(repo.save_nrcs_cache(&rundown)).is_err());
        Ok(())
    }
}
