// Archivo: service.rs
// Propósito: `IngestService`, la capa que expone las operaciones de alto
// nivel del NRCS (snapshot completo y ediciones incrementales). Cada edición
// parte del último árbol del NRCS, lo modifica y construye una pista precisa
// para el motor.
use crate::commit::CommitData;
use crate::config::IngestConfig;
use crate::engine::{IngestEngine, IngestUpdate};
use crate::errors::{IngestError, NodeKind, Result};
use crate::repository::IngestRepository;
use crate::transform::IngestTransform;
use indexmap::IndexMap;
use rundown_model::{ChangeDescriptor, IngestChangeSource, IngestPart, IngestRundown, IngestSegment, PartChange, SegmentChange};
use std::sync::Arc;
use tracing::warn;

/// Servicio de alto nivel sobre el motor de ingesta.
///
/// Pensado para ser invocado desde el adaptador del NRCS o desde handlers de
/// usuario.
pub struct IngestService<R> where R: IngestRepository
{
    engine: Arc<IngestEngine<R>>,
}

impl<R> Clone for IngestService<R> where R: IngestRepository
{
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone() }
    }
}

fn require_existing(previous: Option<&IngestRundown>, rundown_external_id: &str) -> Result<IngestRundown> {
    previous.cloned().ok_or_else(|| IngestError::not_found(NodeKind::Rundown, rundown_external_id))
}

fn ingest_hint() -> ChangeDescriptor {
    ChangeDescriptor::new(IngestChangeSource::Ingest)
}

impl<R> IngestService<R> where R: IngestRepository + 'static
{
    /// Crea el servicio; el `IngestEngine` se construye internamente.
    pub fn new(repo: Arc<R>, config: IngestConfig) -> Self {
        Self { engine: Arc::new(IngestEngine::new(repo, config)) }
    }

    pub fn with_transform(repo: Arc<R>, config: IngestConfig, transform: Arc<dyn IngestTransform>) -> Self {
        Self { engine: Arc::new(IngestEngine::new(repo, config).with_transform(transform)) }
    }

    pub fn engine(&self) -> &Arc<IngestEngine<R>> {
        &self.engine
    }

    /// Ingesta de un snapshot completo, con una pista opcional del
    /// transporte.
    pub async fn ingest_rundown(&self, mut rundown: IngestRundown, hint: Option<ChangeDescriptor>) -> Result<CommitData> {
        rundown.sort_by_rank();
        let rundown_external_id = rundown.external_id.clone();
        self.engine
            .run_ingest_operation(&rundown_external_id, move |_| {
                let update = IngestUpdate::new(rundown);
                Ok(match hint {
                    Some(hint) => update.with_hint(hint),
                    None => update,
                })
            })
            .await
    }

    /// Inserta o reemplaza un segmento completo, situándolo según su `rank`.
    pub async fn update_segment(&self, rundown_external_id: &str, segment: IngestSegment) -> Result<CommitData> {
        self.engine
            .run_ingest_operation(rundown_external_id, move |previous| {
                let mut rundown = require_existing(previous, rundown_external_id)?;
                let segment_id = segment.external_id.clone();
                let order_before = rundown.segment_ids().join("\u{1f}");
                let rank_changed = rundown.segment(&segment_id).map(|s| s.rank != segment.rank).unwrap_or(true);
                rundown.segments.retain(|s| s.external_id != segment_id);
                rundown.segments.push(segment);
                rundown.sort_by_rank();

                let mut changes = ingest_hint().with_segment_change(segment_id, SegmentChange::InsertedOrUpdated);
                if rank_changed || rundown.segment_ids().join("\u{1f}") != order_before {
                    changes = changes.with_segment_order_changed();
                }
                Ok(IngestUpdate::new(rundown).with_hint(changes))
            })
            .await
    }

    pub async fn remove_segment(&self, rundown_external_id: &str, segment_external_id: &str) -> Result<CommitData> {
        self.engine
            .run_ingest_operation(rundown_external_id, move |previous| {
                let mut rundown = require_existing(previous, rundown_external_id)?;
                if rundown.segment(segment_external_id).is_none() {
                    return Err(IngestError::not_found(NodeKind::Segment, segment_external_id));
                }
                rundown.segments.retain(|s| s.external_id != segment_external_id);
                let changes = ingest_hint().with_segment_change(segment_external_id, SegmentChange::Deleted);
                Ok(IngestUpdate::new(rundown).with_hint(changes))
            })
            .await
    }

    /// Reasigna ranks de segmentos. Los ids desconocidos se ignoran con un
    /// aviso.
    pub async fn update_segment_ranks(&self, rundown_external_id: &str, ranks: IndexMap<String, f64>) -> Result<CommitData> {
        self.engine
            .run_ingest_operation(rundown_external_id, move |previous| {
                let mut rundown = require_existing(previous, rundown_external_id)?;
                for (segment_id, rank) in &ranks {
                    match rundown.segment_mut(segment_id) {
                        Some(segment) => segment.rank = *rank,
                        None => warn!(segment = %segment_id, "rank para un segmento inexistente; se ignora"),
                    }
                }
                rundown.sort_by_rank();
                Ok(IngestUpdate::new(rundown).with_hint(ingest_hint().with_segment_order_changed()))
            })
            .await
    }

    /// Cambia el `external_id` de un segmento conservando su identidad.
    pub async fn rename_segment(&self, rundown_external_id: &str, old_external_id: &str, new_external_id: &str) -> Result<CommitData> {
        self.engine
            .run_ingest_operation(rundown_external_id, move |previous| {
                let mut rundown = require_existing(previous, rundown_external_id)?;
                if old_external_id != new_external_id && rundown.segment(new_external_id).is_some() {
                    return Err(IngestError::AlreadyExists { kind: NodeKind::Segment, id: new_external_id.to_string() });
                }
                let segment = rundown.segment_mut(old_external_id)
                                     .ok_or_else(|| IngestError::not_found(NodeKind::Segment, old_external_id))?;
                segment.external_id = new_external_id.to_string();
                let changes = ingest_hint().with_renamed_segment(old_external_id, new_external_id);
                Ok(IngestUpdate::new(rundown).with_hint(changes))
            })
            .await
    }

    /// Inserta o reemplaza una parte. Si la parte estaba en otro segmento se
    /// trata como un movimiento.
    pub async fn update_part(&self, rundown_external_id: &str, segment_external_id: &str, part: IngestPart) -> Result<CommitData> {
        self.engine
            .run_ingest_operation(rundown_external_id, move |previous| {
                let mut rundown = require_existing(previous, rundown_external_id)?;
                if rundown.segment(segment_external_id).is_none() {
                    return Err(IngestError::not_found(NodeKind::Segment, segment_external_id));
                }
                let part_id = part.external_id.clone();
                let mut changes = ingest_hint();
                let owner = rundown.find_part(&part_id).map(|(s, _)| s.external_id.clone());
                let change = match owner {
                    Some(owner) if owner != segment_external_id => {
                        if let Some(old_segment) = rundown.segment_mut(&owner) {
                            old_segment.parts.retain(|p| p.external_id != part_id);
                        }
                        changes = changes.with_part_change(owner, part_id.clone(), PartChange::Deleted);
                        PartChange::Inserted
                    }
                    Some(_) => PartChange::Updated,
                    None => PartChange::Inserted,
                };

                let segment = rundown.segment_mut(segment_external_id)
                                     .ok_or_else(|| IngestError::not_found(NodeKind::Segment, segment_external_id))?;
                let rank_changed = segment.part(&part_id).map(|p| p.rank != part.rank).unwrap_or(false);
                segment.parts.retain(|p| p.external_id != part_id);
                segment.parts.push(part);
                segment.sort_parts();

                changes = changes.with_part_change(segment_external_id, part_id, change);
                if rank_changed {
                    if let Some(SegmentChange::Detail(detail)) = changes.segment_changes.get_mut(segment_external_id) {
                        detail.part_order_changed = true;
                    }
                }
                Ok(IngestUpdate::new(rundown).with_hint(changes))
            })
            .await
    }

    pub async fn remove_part(&self, rundown_external_id: &str, segment_external_id: &str, part_external_id: &str) -> Result<CommitData> {
        self.engine
            .run_ingest_operation(rundown_external_id, move |previous| {
                let mut rundown = require_existing(previous, rundown_external_id)?;
                let segment = rundown.segment_mut(segment_external_id)
                                     .ok_or_else(|| IngestError::not_found(NodeKind::Segment, segment_external_id))?;
                if segment.part(part_external_id).is_none() {
                    return Err(IngestError::not_found(NodeKind::Part, part_external_id));
                }
                segment.parts.retain(|p| p.external_id != part_external_id);
                let changes = ingest_hint().with_part_change(segment_external_id, part_external_id, PartChange::Deleted);
                Ok(IngestUpdate::new(rundown).with_hint(changes))
            })
            .await
    }

    pub async fn remove_rundown(&self, rundown_external_id: &str, force: bool) -> Result<CommitData> {
        self.engine.remove_rundown(rundown_external_id, force).await
    }

    pub async fn cleanup_orphans(&self, rundown_external_id: &str) -> Result<CommitData> {
        self.engine.cleanup_orphans(rundown_external_id).await
    }
}
