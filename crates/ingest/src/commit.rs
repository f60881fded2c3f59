// Archivo: commit.rs
// Propósito: a partir de lo drenado del árbol mutable y del modelo
// persistido, decidir qué se regenera, qué sólo cambia de rank, qué se borra y
// qué queda huérfano, y armar una única `ModelWrite`.
use crate::errors::{IngestError, Result};
use crate::mutable::RundownChangesInfo;
use crate::repository::{ModelWrite, PlayoutState, SegmentRename};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rundown_model::{DbPart, DbRundown, DbSegment, IngestPart, IngestSegment, PartId, RundownId, RundownModel, SegmentId};
use serde::Serialize;
use std::collections::HashSet;

/// Qué hay que hacer con un segmento persistido.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentUpdate {
    /// Reconstruir el segmento y todas sus partes.
    Regenerate,
    /// Regenerar sólo las partes indicadas y, si `reorder`, reescribir ranks.
    Parts { changed_part_ids: Vec<String>, reorder: bool },
    /// Sólo cambió la posición (o el id externo) del segmento.
    Rank(f64),
}

/// Diff entre el árbol drenado y el modelo persistido.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelDiff {
    pub rundown_changed: bool,
    pub full_regeneration: bool,
    /// Por `external_id` actual del segmento, en orden del rundown.
    pub segments: IndexMap<String, SegmentUpdate>,
    /// `external_id` original → actual, sólo para segmentos persistidos.
    pub renamed_segments: IndexMap<String, String>,
    pub removed_segments: Vec<String>,
    pub removed_parts: Vec<String>,
}

impl ModelDiff {
    pub fn is_empty(&self) -> bool {
        !self.rundown_changed
        && self.segments.is_empty()
        && self.renamed_segments.is_empty()
        && self.removed_segments.is_empty()
        && self.removed_parts.is_empty()
    }
}

/// Resultado de una operación de ingesta, pensado para los consumidores
/// (playout, UI).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitData {
    pub rundown_id: RundownId,
    pub changed_segment_ids: Vec<SegmentId>,
    pub removed_segment_ids: Vec<SegmentId>,
    pub renamed_segments: IndexMap<SegmentId, SegmentId>,
    pub orphaned_segment_ids: Vec<SegmentId>,
    pub remove_rundown: bool,
}

impl CommitData {
    pub fn new(rundown_id: RundownId) -> Self {
        Self { rundown_id,
               changed_segment_ids: Vec::new(),
               removed_segment_ids: Vec::new(),
               renamed_segments: IndexMap::new(),
               orphaned_segment_ids: Vec::new(),
               remove_rundown: false }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_segment_ids.is_empty()
        && self.removed_segment_ids.is_empty()
        && self.renamed_segments.is_empty()
        && self.orphaned_segment_ids.is_empty()
        && !self.remove_rundown
    }
}

/// Escritura planificada junto con el resumen para los consumidores.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitPlan {
    pub write: ModelWrite,
    pub commit: CommitData,
}

/// Comprueba que ninguna parte aparezca en dos segmentos del árbol drenado.
pub fn check_tree_invariants(info: &RundownChangesInfo) -> Result<()> {
    let mut seen = HashSet::new();
    for segment in &info.ingest_rundown.segments {
        for part in &segment.parts {
            if !seen.insert(part.external_id.as_str()) {
                return Err(IngestError::Invariant(format!("la parte {} aparece en más de un segmento", part.external_id)));
            }
        }
    }
    Ok(())
}

/// Decide, por segmento, regeneración completa, regeneración de partes o
/// sólo rank. Sin modelo previo (o con regeneración forzada) todo se
/// regenera.
pub fn compute_model_diff(info: &RundownChangesInfo, model: Option<&RundownModel>) -> ModelDiff {
    let rundown = &info.ingest_rundown;
    let rundown_id = RundownId::from_external_id(&rundown.external_id);
    let full_regeneration = info.regenerate_rundown || model.is_none();
    let mut diff = ModelDiff { rundown_changed: full_regeneration || info.rundown_fields_changed,
                               full_regeneration,
                               ..Default::default() };

    for (original, current) in &info.segment_external_id_changes {
        let persisted = model.and_then(|m| m.segment(&SegmentId::derive(&rundown_id, original)));
        if original != current && persisted.is_some() {
            diff.renamed_segments.insert(original.clone(), current.clone());
        }
    }

    for segment in &rundown.segments {
        let persisted = persisted_segment(model, &rundown_id, &diff.renamed_segments, &segment.external_id);
        let changes = info.segments.iter().find(|s| s.external_id() == segment.external_id);
        let update = match (persisted, changes) {
            _ if full_regeneration => Some(SegmentUpdate::Regenerate),
            (None, _) => Some(SegmentUpdate::Regenerate),
            (Some(p), _) if p.orphaned.is_some() => Some(SegmentUpdate::Regenerate),
            (Some(_), Some(c)) if c.is_new || c.fields_changed => Some(SegmentUpdate::Regenerate),
            (Some(_), Some(c)) if !c.changed_part_ids.is_empty() || c.part_order_changed => {
                Some(SegmentUpdate::Parts { changed_part_ids: c.changed_part_ids.clone(), reorder: c.part_order_changed })
            }
            (Some(_), Some(c)) if c.rank_changed || c.is_renamed() => Some(SegmentUpdate::Rank(segment.rank)),
            _ => None,
        };
        if let Some(update) = update {
            diff.segments.insert(segment.external_id.clone(), update);
        }
    }

    if let Some(model) = model {
        let current_segments: HashSet<&str> = rundown.segment_ids().into_iter().collect();
        let current_parts: HashSet<&str> = rundown.segments.iter().flat_map(|s| s.part_ids()).collect();
        for segment in model.sorted_segments() {
            if segment.orphaned.is_none()
               && !current_segments.contains(segment.external_id.as_str())
               && !diff.renamed_segments.contains_key(&segment.external_id)
            {
                diff.removed_segments.push(segment.external_id.clone());
            }
        }
        for part in &model.parts {
            if part.orphaned.is_none() && !current_parts.contains(part.external_id.as_str()) {
                diff.removed_parts.push(part.external_id.clone());
            }
        }
    }
    diff
}

fn persisted_segment<'a>(model: Option<&'a RundownModel>,
                         rundown_id: &RundownId,
                         renames: &IndexMap<String, String>,
                         external_id: &str)
                         -> Option<&'a DbSegment> {
    let model = model?;
    let original = renames.iter().find(|(_, current)| *current == external_id).map(|(original, _)| original.as_str());
    model.segment(&SegmentId::derive(rundown_id, original.unwrap_or(external_id)))
}

fn segment_doc(rundown_id: &RundownId,
               segment: &IngestSegment,
               persisted: Option<&DbSegment>,
               regenerate: bool,
               now: DateTime<Utc>)
               -> DbSegment {
    DbSegment { id: SegmentId::derive(rundown_id, &segment.external_id),
                rundown_id: rundown_id.clone(),
                external_id: segment.external_id.clone(),
                rank: segment.rank,
                name: segment.name.clone(),
                payload: segment.payload.clone(),
                orphaned: None,
                created_at: persisted.map(|p| p.created_at).unwrap_or(now),
                modified_at: now,
                generation: next_generation(persisted.map(|p| p.generation), regenerate) }
}

fn part_doc(rundown_id: &RundownId,
            segment_id: &SegmentId,
            part: &IngestPart,
            persisted: Option<&DbPart>,
            regenerate: bool,
            now: DateTime<Utc>)
            -> DbPart {
    DbPart { id: PartId::derive(rundown_id, &part.external_id),
             rundown_id: rundown_id.clone(),
             segment_id: segment_id.clone(),
             external_id: part.external_id.clone(),
             rank: part.rank,
             name: part.name.clone(),
             payload: part.payload.clone(),
             orphaned: None,
             created_at: persisted.map(|p| p.created_at).unwrap_or(now),
             modified_at: now,
             generation: next_generation(persisted.map(|p| p.generation), regenerate) }
}

fn next_generation(previous: Option<u64>, regenerate: bool) -> u64 {
    match previous {
        Some(generation) if regenerate => generation + 1,
        Some(generation) => generation,
        None => 0,
    }
}

/// Un segmento está en el aire si está encolado o contiene la parte actual o
/// la siguiente.
fn segment_on_air(model: &RundownModel, playout: &PlayoutState, segment_id: &SegmentId) -> bool {
    playout.queued_segment.as_ref() == Some(segment_id)
    || model.parts.iter().any(|p| &p.segment_id == segment_id && playout.references_part(&p.id))
}

/// Traduce el diff a una escritura única: renombres, borrados (o huérfanos si
/// están en el aire) y upserts.
pub fn plan_model_write(diff: &ModelDiff,
                        info: &RundownChangesInfo,
                        model: Option<&RundownModel>,
                        playout: &PlayoutState,
                        now: DateTime<Utc>)
                        -> Result<CommitPlan> {
    let rundown = &info.ingest_rundown;
    let rundown_id = RundownId::from_external_id(&rundown.external_id);
    let mut write = ModelWrite::new(rundown_id.clone());
    let mut commit = CommitData::new(rundown_id.clone());

    if diff.rundown_changed {
        let created_at = model.map(|m| m.rundown.created_at).unwrap_or(now);
        write.rundown = Some(DbRundown::from_ingest(rundown, created_at, now));
    }

    let mut rewritten_playout = playout.clone();
    for (original, current) in &diff.renamed_segments {
        let from = SegmentId::derive(&rundown_id, original);
        let to = SegmentId::derive(&rundown_id, current);
        if let Some(existing) = model.and_then(|m| m.segment(&to)) {
            if !diff.removed_segments.contains(&existing.external_id) {
                return Err(IngestError::Invariant(format!("el renombre {} -> {} pisa un segmento persistido", original, current)));
            }
        }
        if rewritten_playout.queued_segment.as_ref() == Some(&from) {
            rewritten_playout.queued_segment = Some(to.clone());
        }
        write.renamed_segments.push(SegmentRename { from: from.clone(), to: to.clone(), new_external_id: current.clone() });
        commit.renamed_segments.insert(from, to);
    }
    if &rewritten_playout != playout {
        write.playout = Some(rewritten_playout);
    }

    if let Some(model) = model {
        for external_id in &diff.removed_segments {
            let segment_id = SegmentId::derive(&rundown_id, external_id);
            if segment_on_air(model, playout, &segment_id) {
                write.orphaned_segment_ids.push(segment_id.clone());
                commit.orphaned_segment_ids.push(segment_id);
            } else {
                write.removed_segment_ids.push(segment_id.clone());
                commit.removed_segment_ids.push(segment_id);
            }
        }
        // Las partes de un segmento huérfano siguen en el aire con él.
        for external_id in &diff.removed_parts {
            let part_id = PartId::derive(&rundown_id, external_id);
            let in_orphaned_segment =
                model.part(&part_id).map(|p| write.orphaned_segment_ids.contains(&p.segment_id)).unwrap_or(false);
            if in_orphaned_segment || playout.references_part(&part_id) {
                write.orphaned_part_ids.push(part_id);
            } else {
                write.removed_part_ids.push(part_id);
            }
        }
    }

    for (external_id, update) in &diff.segments {
        let segment = rundown.segment(external_id)
                             .ok_or_else(|| IngestError::Invariant(format!("segmento planificado {} ausente del árbol", external_id)))?;
        let segment_id = SegmentId::derive(&rundown_id, external_id);
        let persisted = persisted_segment(model, &rundown_id, &diff.renamed_segments, external_id);
        let persisted_part = |part: &IngestPart| model.and_then(|m| m.part(&PartId::derive(&rundown_id, &part.external_id)));

        match update {
            SegmentUpdate::Regenerate => {
                write.upsert_segments.push(segment_doc(&rundown_id, segment, persisted, true, now));
                for part in &segment.parts {
                    write.upsert_parts.push(part_doc(&rundown_id, &segment_id, part, persisted_part(part), true, now));
                }
            }
            SegmentUpdate::Parts { changed_part_ids, reorder } => {
                let segment_moved = persisted.map(|p| p.rank != segment.rank || p.id != segment_id).unwrap_or(true);
                if segment_moved {
                    write.upsert_segments.push(segment_doc(&rundown_id, segment, persisted, false, now));
                }
                for part in &segment.parts {
                    let previous = persisted_part(part);
                    let changed = changed_part_ids.iter().any(|id| *id == part.external_id);
                    let relocated = previous.map(|p| p.segment_id != segment_id || (*reorder && p.rank != part.rank))
                                            .unwrap_or(true);
                    if changed || relocated {
                        write.upsert_parts.push(part_doc(&rundown_id, &segment_id, part, previous, changed, now));
                    }
                }
            }
            SegmentUpdate::Rank(_) => {
                write.upsert_segments.push(segment_doc(&rundown_id, segment, persisted, false, now));
            }
        }
        commit.changed_segment_ids.push(segment_id);
    }

    Ok(CommitPlan { write, commit })
}

/// Borra los nodos huérfanos que playout ya no referencia. Los ids de
/// `keep_segments` (p. ej. los que se regeneran en la misma escritura) no se
/// tocan.
pub fn plan_orphan_cleanup(model: &RundownModel,
                           playout: &PlayoutState,
                           keep_segments: &HashSet<SegmentId>,
                           write: &mut ModelWrite,
                           commit: &mut CommitData) {
    let mut removed_segments: HashSet<SegmentId> = HashSet::new();
    let mut kept_orphans: HashSet<&SegmentId> = HashSet::new();
    for segment in model.segments.iter().filter(|s| s.orphaned.is_some()) {
        if segment_on_air(model, playout, &segment.id) {
            kept_orphans.insert(&segment.id);
            continue;
        }
        if keep_segments.contains(&segment.id) {
            continue;
        }
        removed_segments.insert(segment.id.clone());
        write.removed_segment_ids.push(segment.id.clone());
        commit.removed_segment_ids.push(segment.id.clone());
    }
    let upserted: HashSet<&PartId> = write.upsert_parts.iter().map(|p| &p.id).collect();
    let mut parts = Vec::new();
    for part in &model.parts {
        let orphan = part.orphaned.is_some() || removed_segments.contains(&part.segment_id);
        if orphan
           && !kept_orphans.contains(&part.segment_id)
           && !upserted.contains(&part.id)
           && !playout.references_part(&part.id)
        {
            parts.push(part.id.clone());
        }
    }
    write.removed_part_ids.extend(parts);
}
