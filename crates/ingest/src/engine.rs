// Archivo: engine.rs
// Propósito: `IngestEngine`, la orquestación de una operación de ingesta bajo
// el lock del rundown: cargar caches, transformar, drenar, calcular el diff
// del modelo y persistir.
//
// Cualquier error antes de `commit_model` aborta sin escrituras. Las caches
// sólo se guardan después de una escritura del modelo (o de comprobar que no
// hacía falta) y su fallo no se propaga.
use crate::commit::{check_tree_invariants, compute_model_diff, plan_model_write, plan_orphan_cleanup, CommitData, CommitPlan};
use crate::config::IngestConfig;
use crate::diff::compute_changes;
use crate::errors::{IngestError, NodeKind, Result, UserErrorKind};
use crate::lock::RundownLockManager;
use crate::mutable::MutableIngestRundown;
use crate::repository::{IngestRepository, ModelWrite};
use crate::transform::{DefaultIngestTransform, GroupingTransform, IngestTransform};
use chrono::Utc;
use rundown_model::{build_ingest_rundown, ChangeDescriptor, IngestRundown, RundownId, SegmentId, SofieCacheObject};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Nuevo árbol del NRCS producido por una operación, con una pista opcional
/// de lo que cambió.
#[derive(Debug, Clone)]
pub struct IngestUpdate {
    pub rundown: IngestRundown,
    pub hint: Option<ChangeDescriptor>,
}

impl IngestUpdate {
    pub fn new(rundown: IngestRundown) -> Self {
        Self { rundown, hint: None }
    }

    pub fn with_hint(mut self, hint: ChangeDescriptor) -> Self {
        self.hint = Some(hint);
        self
    }
}

/// Motor de ingesta.
///
/// Responsabilidades principales:
/// - Serializar las operaciones de un mismo rundown con `RundownLockManager`
/// - Derivar el `ChangeDescriptor` entre el snapshot anterior y el nuevo
/// - Ejecutar la lógica de transformación sobre el árbol mutable
/// - Traducir lo drenado a una única `ModelWrite` y guardar las caches
pub struct IngestEngine<R>
    where R: IngestRepository
{
    repo: Arc<R>,
    locks: RundownLockManager,
    config: IngestConfig,
    transform: Arc<dyn IngestTransform>,
}

impl<R> IngestEngine<R> where R: IngestRepository
{
    /// Crea el motor. Con `part_name_separator` configurado se usa
    /// `GroupingTransform`; si no, `DefaultIngestTransform`.
    pub fn new(repo: Arc<R>, config: IngestConfig) -> Self {
        let transform: Arc<dyn IngestTransform> = match &config.part_name_separator {
            Some(separator) => Arc::new(GroupingTransform::new(separator.clone())),
            None => Arc::new(DefaultIngestTransform::new()),
        };
        Self { repo, locks: RundownLockManager::new(), config, transform }
    }

    /// Sustituye la lógica de transformación.
    pub fn with_transform(mut self, transform: Arc<dyn IngestTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn locks(&self) -> &RundownLockManager {
        &self.locks
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Ejecuta una operación de ingesta completa bajo el lock del rundown.
    ///
    /// `operation` recibe el último árbol del NRCS (si existe) y devuelve el
    /// nuevo junto con una pista opcional. Un error de la operación o de la
    /// transformación aborta sin escribir nada.
    pub async fn run_ingest_operation<F>(&self, rundown_external_id: &str, operation: F) -> Result<CommitData>
        where F: FnOnce(Option<&IngestRundown>) -> Result<IngestUpdate> + Send
    {
        let _guard = self.locks.acquire(rundown_external_id).await;
        let span = info_span!("ingest", rundown = %rundown_external_id, op = %Uuid::new_v4());
        self.ingest_locked(rundown_external_id, operation).instrument(span).await
    }

    async fn ingest_locked<F>(&self, rundown_external_id: &str, operation: F) -> Result<CommitData>
        where F: FnOnce(Option<&IngestRundown>) -> Result<IngestUpdate> + Send
    {
        let previous = self.repo.load_nrcs_cache(rundown_external_id).await?;
        let IngestUpdate { rundown: nrcs, hint } = operation(previous.as_ref())?;
        if nrcs.external_id != rundown_external_id {
            return Err(IngestError::Invariant(format!("la operación sobre {} devolvió el rundown {}",
                                                      rundown_external_id, nrcs.external_id)));
        }
        nrcs.validate()?;
        let mut changes = compute_changes(previous.as_ref(), &nrcs, hint.as_ref());
        debug!(regenerate = changes.is_regenerate(),
               segments = changes.segment_changes.len(),
               renames = changes.renamed_segment_external_ids.len(),
               "descriptor de cambios calculado");

        let cached_objects = self.repo.load_sofie_cache(rundown_external_id).await?;
        let rundown_id = RundownId::from_external_id(rundown_external_id);
        let model = self.repo.load_model(&rundown_id).await?;
        let playout = self.repo.load_playout_state(&rundown_id).await?;

        let mut mutable = match build_ingest_rundown(&cached_objects)? {
            Some(cached) => MutableIngestRundown::new(cached, true),
            None => {
                if !changes.is_regenerate() {
                    debug!("sin cache normalizada: se fuerza la regeneración");
                    changes = ChangeDescriptor::regenerate(changes.source);
                }
                MutableIngestRundown::empty_for(&nrcs)
            }
        };

        self.transform.process_ingest_data(&mut mutable, &nrcs, previous.as_ref(), &changes).await?;

        let info = mutable.drain_changes();
        check_tree_invariants(&info)?;
        let removed_cache_ids: Vec<String> = cached_objects.iter()
                                                           .map(|o| o.id().to_string())
                                                           .filter(|id| !info.all_cache_object_ids.contains(id))
                                                           .collect();

        let diff = compute_model_diff(&info, model.as_ref());
        debug!(segments = diff.segments.len(),
               removed_segments = diff.removed_segments.len(),
               removed_parts = diff.removed_parts.len(),
               full = diff.full_regeneration,
               "diff del modelo");
        let CommitPlan { mut write, mut commit } = plan_model_write(&diff, &info, model.as_ref(), &playout, Utc::now())?;
        if self.config.cleanup_orphans_on_ingest {
            if let Some(model) = &model {
                let keep: HashSet<SegmentId> = write.upsert_segments.iter().map(|s| s.id.clone()).collect();
                plan_orphan_cleanup(model, &playout, &keep, &mut write, &mut commit);
            }
        }

        if write.is_empty() {
            debug!("modelo sin cambios");
        } else {
            self.repo.commit_model(&write).await?;
            info!(changed = commit.changed_segment_ids.len(),
                  removed = commit.removed_segment_ids.len(),
                  orphaned = commit.orphaned_segment_ids.len(),
                  renamed = commit.renamed_segments.len(),
                  "modelo actualizado");
        }

        self.save_caches(&nrcs, &info.changed_cache_objects, &removed_cache_ids).await;
        Ok(commit)
    }

    /// Guarda ambas caches en paralelo. Los fallos se registran y no se
    /// propagan: el modelo ya está escrito.
    async fn save_caches(&self, nrcs: &IngestRundown, changed: &[SofieCacheObject], removed_ids: &[String]) {
        let sofie = async {
            if changed.is_empty() && removed_ids.is_empty() {
                return Ok(());
            }
            self.repo.save_sofie_cache(&nrcs.external_id, changed, removed_ids).await
        };
        let (nrcs_result, sofie_result) = tokio::join!(self.repo.save_nrcs_cache(nrcs), sofie);
        if let Err(e) = nrcs_result {
            warn!(error = %e, "no se pudo guardar la cache del NRCS");
        }
        if let Err(e) = sofie_result {
            warn!(error = %e, "no se pudo guardar la cache normalizada");
        }
    }

    /// Borra el modelo y ambas caches del rundown. Una vez borrado el
    /// modelo, los fallos al borrar las caches sólo se registran.
    ///
    /// Sin `force`, un rundown en el aire se rechaza con
    /// `UserErrorKind::RundownOnAir` y no se toca nada.
    pub async fn remove_rundown(&self, rundown_external_id: &str, force: bool) -> Result<CommitData> {
        let _guard = self.locks.acquire(rundown_external_id).await;
        let span = info_span!("remove_rundown", rundown = %rundown_external_id, op = %Uuid::new_v4());
        self.remove_locked(rundown_external_id, force).instrument(span).await
    }

    async fn remove_locked(&self, rundown_external_id: &str, force: bool) -> Result<CommitData> {
        let rundown_id = RundownId::from_external_id(rundown_external_id);
        let playout = self.repo.load_playout_state(&rundown_id).await?;
        if playout.is_on_air() && !force {
            return Err(IngestError::user(UserErrorKind::RundownOnAir,
                                         format!("El rundown {} está en el aire", rundown_external_id)));
        }
        let model = self.repo.load_model(&rundown_id).await?;
        let nrcs = self.repo.load_nrcs_cache(rundown_external_id).await?;
        if model.is_none() && nrcs.is_none() {
            return Err(IngestError::not_found(NodeKind::Rundown, rundown_external_id));
        }

        self.repo.remove_model(&rundown_id).await?;
        let (nrcs_result, sofie_result) = tokio::join!(self.repo.remove_nrcs_cache(rundown_external_id),
                                                       self.repo.remove_sofie_cache(rundown_external_id));
        if let Err(e) = nrcs_result {
            warn!(error = %e, "no se pudo borrar la cache del NRCS");
        }
        if let Err(e) = sofie_result {
            warn!(error = %e, "no se pudo borrar la cache normalizada");
        }

        let mut commit = CommitData::new(rundown_id);
        if let Some(model) = model {
            commit.removed_segment_ids = model.segments.into_iter().map(|s| s.id).collect();
        }
        commit.remove_rundown = true;
        info!(forced = force && playout.is_on_air(), "rundown eliminado");
        Ok(commit)
    }

    /// Elimina los nodos huérfanos que playout ya no referencia.
    pub async fn cleanup_orphans(&self, rundown_external_id: &str) -> Result<CommitData> {
        let _guard = self.locks.acquire(rundown_external_id).await;
        let span = info_span!("cleanup_orphans", rundown = %rundown_external_id, op = %Uuid::new_v4());
        self.cleanup_locked(rundown_external_id).instrument(span).await
    }

    async fn cleanup_locked(&self, rundown_external_id: &str) -> Result<CommitData> {
        let rundown_id = RundownId::from_external_id(rundown_external_id);
        let model = self.repo
                        .load_model(&rundown_id)
                        .await?
                        .ok_or_else(|| IngestError::not_found(NodeKind::Rundown, rundown_external_id))?;
        let playout = self.repo.load_playout_state(&rundown_id).await?;

        let mut write = ModelWrite::new(rundown_id.clone());
        let mut commit = CommitData::new(rundown_id);
        plan_orphan_cleanup(&model, &playout, &HashSet::new(), &mut write, &mut commit);
        if !write.is_empty() {
            self.repo.commit_model(&write).await?;
            info!(segments = write.removed_segment_ids.len(), parts = write.removed_part_ids.len(), "huérfanos eliminados");
        }
        Ok(commit)
    }
}
