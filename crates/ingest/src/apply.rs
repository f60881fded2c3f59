// Archivo: apply.rs
// Propósito: aplicador por defecto. Traduce un `ChangeDescriptor` a llamadas
// sobre el árbol mutable, de forma determinista. Se usa tal cual cuando no hay
// lógica de transformación propia, o como librería desde una.
use crate::errors::{IngestError, NodeKind, Result};
use crate::mutable::{MutableIngestRundown, MutableIngestSegment};
use crate::reorder::reconcile_order;
use rundown_model::{ChangeDescriptor, IngestPart, IngestRundown, IngestSegment, PartChange, RundownChange, SegmentChange,
                    SegmentChangeDetail};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Callbacks que derivan el payload normalizado a partir del nuevo payload
/// del NRCS y del payload normalizado anterior (si existe).
///
/// Las implementaciones por defecto devuelven el payload nuevo sin cambios.
pub trait PayloadTransforms: Send + Sync {
    fn rundown_payload(&self, new: &JsonValue, _old: Option<&JsonValue>) -> JsonValue {
        new.clone()
    }

    fn segment_payload(&self, new: &JsonValue, _old: Option<&JsonValue>) -> JsonValue {
        new.clone()
    }

    fn part_payload(&self, new: &JsonValue, _old: Option<&JsonValue>) -> JsonValue {
        new.clone()
    }
}

/// Copia los payloads del NRCS tal cual.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPayloads;

impl PayloadTransforms for IdentityPayloads {}

/// Operación estructural emitida por el aplicador.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOp {
    RenameSegment { from: String, to: String },
    RemoveSegment { segment: String },
    ReplaceSegment { segment: String, before: Option<String> },
    UpdateSegment { segment: String },
    RemovePart { segment: String, part: String },
    ReplacePart { segment: String, part: String, before: Option<String> },
    UpdatePart { segment: String, part: String },
}

/// Resumen de lo que hizo `apply_default_changes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedChanges {
    pub ops: Vec<TreeOp>,
    pub segment_moves: usize,
    pub part_moves: usize,
    pub regenerated: bool,
}

impl AppliedChanges {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.segment_moves == 0 && self.part_moves == 0 && !self.regenerated
    }
}

/// Aplica `changes` (que describe el paso al árbol `nrcs`) sobre `mutable`.
///
/// Orden: renombres, borrados de segmentos, actualizaciones `Detail` (primero
/// todos los borrados de partes, luego inserciones y actualizaciones),
/// inserciones `InsertedOrUpdated` de atrás hacia delante y por último el
/// orden de segmentos.
pub fn apply_default_changes(mutable: &mut MutableIngestRundown,
                             nrcs: &IngestRundown,
                             changes: &ChangeDescriptor,
                             transforms: &dyn PayloadTransforms)
                             -> Result<AppliedChanges> {
    let mut applied = AppliedChanges::default();

    match changes.rundown_change {
        Some(RundownChange::Regenerate) => {
            apply_rundown_fields(mutable, nrcs, transforms);
            mutable.remove_all_segments();
            mutable.force_full_regenerate();
            for segment in &nrcs.segments {
                let data = transformed_segment(segment, None, transforms);
                mutable.replace_segment(data, None)?;
                applied.ops.push(TreeOp::ReplaceSegment { segment: segment.external_id.clone(), before: None });
            }
            applied.regenerated = true;
            debug!(rundown = %nrcs.external_id, segments = nrcs.segments.len(), "rundown regenerado por completo");
            return Ok(applied);
        }
        Some(RundownChange::PayloadChanged) => apply_rundown_fields(mutable, nrcs, transforms),
        None => {}
    }

    for (old_id, new_id) in &changes.renamed_segment_external_ids {
        if mutable.get_segment(old_id).is_none() {
            warn!(from = %old_id, to = %new_id, "renombre de segmento inexistente; se omite");
            continue;
        }
        mutable.change_segment_external_id(old_id, new_id)?;
        applied.ops.push(TreeOp::RenameSegment { from: old_id.clone(), to: new_id.clone() });
    }

    for (segment_id, change) in &changes.segment_changes {
        if *change == SegmentChange::Deleted && mutable.remove_segment(segment_id) {
            applied.ops.push(TreeOp::RemoveSegment { segment: segment_id.clone() });
        }
    }

    let mut inserted: Vec<&str> = Vec::new();
    let mut details: Vec<(&str, &SegmentChangeDetail)> = Vec::new();
    for (segment_id, change) in &changes.segment_changes {
        match change {
            SegmentChange::Deleted => {}
            SegmentChange::InsertedOrUpdated => inserted.push(segment_id.as_str()),
            SegmentChange::Detail(detail) => {
                if nrcs.segment(segment_id).is_none() {
                    return Err(IngestError::not_found(NodeKind::Segment, segment_id.as_str()));
                }
                if mutable.get_segment(segment_id).is_none() {
                    debug!(segment = %segment_id, "Detail sobre un segmento que no está en la cache; se inserta completo");
                    inserted.push(segment_id.as_str());
                } else {
                    details.push((segment_id.as_str(), detail));
                }
            }
        }
    }

    log_cross_segment_moves(&details);
    for (segment_id, detail) in &details {
        remove_deleted_parts(mutable, segment_id, detail, &mut applied);
    }
    for (segment_id, detail) in &details {
        apply_segment_detail(mutable, nrcs, segment_id, detail, transforms, &mut applied)?;
    }

    insert_segments(mutable, nrcs, &inserted, transforms, &mut applied)?;

    if changes.segment_order_changed {
        let order = nrcs.segment_ids();
        applied.segment_moves = reconcile_order(mutable, &order)?;
    }

    debug!(rundown = %nrcs.external_id,
           ops = applied.ops.len(),
           segment_moves = applied.segment_moves,
           part_moves = applied.part_moves,
           "cambios aplicados al árbol mutable");
    Ok(applied)
}

fn apply_rundown_fields(mutable: &mut MutableIngestRundown, nrcs: &IngestRundown, transforms: &dyn PayloadTransforms) {
    let payload = transforms.rundown_payload(&nrcs.payload, Some(mutable.payload()));
    mutable.replace_payload(payload);
    mutable.set_name(nrcs.name.clone());
    mutable.set_type_and_source(&nrcs.rundown_type, &nrcs.source);
}

fn transformed_segment(segment: &IngestSegment,
                       old: Option<&MutableIngestSegment>,
                       transforms: &dyn PayloadTransforms)
                       -> IngestSegment {
    let mut data = segment.clone();
    data.payload = transforms.segment_payload(&segment.payload, old.map(|s| s.payload()));
    for part in data.parts.iter_mut() {
        let old_part = old.and_then(|s| s.get_part(&part.external_id));
        part.payload = transforms.part_payload(&part.payload, old_part.map(|p| p.payload()));
    }
    data
}

fn transformed_part(part: &IngestPart, old: Option<&JsonValue>, transforms: &dyn PayloadTransforms) -> IngestPart {
    let mut data = part.clone();
    data.payload = transforms.part_payload(&part.payload, old);
    data
}

/// Primer id posterior a `position` en `order` que el árbol ya contiene.
fn next_known_anchor<'a>(order: &[&'a str], position: usize, known: impl Fn(&str) -> bool) -> Option<&'a str> {
    order.iter().skip(position + 1).find(|id| known(id)).copied()
}

fn log_cross_segment_moves(details: &[(&str, &SegmentChangeDetail)]) {
    let deleted: HashSet<&str> = details.iter()
                                        .flat_map(|(_, d)| d.part_changes.iter())
                                        .filter(|(_, c)| **c == PartChange::Deleted)
                                        .map(|(id, _)| id.as_str())
                                        .collect();
    for (segment_id, detail) in details {
        for (part_id, change) in &detail.part_changes {
            if *change == PartChange::Inserted && deleted.contains(part_id.as_str()) {
                debug!(part = %part_id, to = %segment_id, "parte movida entre segmentos");
            }
        }
    }
}

fn remove_deleted_parts(mutable: &mut MutableIngestRundown,
                        segment_id: &str,
                        detail: &SegmentChangeDetail,
                        applied: &mut AppliedChanges) {
    let Some(segment) = mutable.get_segment_mut(segment_id) else {
        return;
    };
    for (part_id, change) in &detail.part_changes {
        if *change == PartChange::Deleted && segment.remove_part(part_id) {
            applied.ops.push(TreeOp::RemovePart { segment: segment_id.to_string(), part: part_id.clone() });
        }
    }
}

fn apply_segment_detail(mutable: &mut MutableIngestRundown,
                        nrcs: &IngestRundown,
                        segment_id: &str,
                        detail: &SegmentChangeDetail,
                        transforms: &dyn PayloadTransforms,
                        applied: &mut AppliedChanges)
                        -> Result<()> {
    let new_segment = nrcs.segment(segment_id).ok_or_else(|| IngestError::not_found(NodeKind::Segment, segment_id))?;
    let segment = mutable.get_segment_mut(segment_id).ok_or_else(|| IngestError::not_found(NodeKind::Segment, segment_id))?;
    let new_order = new_segment.part_ids();

    // Partes a insertar, ordenadas de atrás hacia delante según el orden nuevo.
    let mut inserts: Vec<(usize, &IngestPart)> = Vec::new();
    for (part_id, change) in &detail.part_changes {
        match change {
            PartChange::Deleted => {}
            PartChange::Updated if segment.get_part(part_id).is_some() => {
                let data = new_segment.part(part_id).ok_or_else(|| IngestError::not_found(NodeKind::Part, part_id.as_str()))?;
                if let Some(part) = segment.get_part_mut(part_id) {
                    let payload = transforms.part_payload(&data.payload, Some(part.payload()));
                    part.set_name(data.name.clone());
                    part.replace_payload(payload);
                    applied.ops.push(TreeOp::UpdatePart { segment: segment_id.to_string(), part: part_id.clone() });
                }
            }
            PartChange::Updated | PartChange::Inserted => {
                let position = new_order.iter()
                                        .position(|id| *id == part_id.as_str())
                                        .ok_or_else(|| IngestError::not_found(NodeKind::Part, part_id.as_str()))?;
                inserts.push((position, &new_segment.parts[position]));
            }
        }
    }
    inserts.sort_by(|a, b| b.0.cmp(&a.0));
    for (position, data) in inserts {
        let before = next_known_anchor(&new_order, position, |id| segment.get_part(id).is_some());
        let old_payload = segment.get_part(&data.external_id).map(|p| p.payload().clone());
        segment.replace_part(transformed_part(data, old_payload.as_ref(), transforms), before)?;
        applied.ops.push(TreeOp::ReplacePart { segment: segment_id.to_string(),
                                               part: data.external_id.clone(),
                                               before: before.map(str::to_string) });
    }

    if detail.part_order_changed {
        applied.part_moves += reconcile_order(segment, &new_order)?;
    }

    if detail.payload_changed {
        let payload = transforms.segment_payload(&new_segment.payload, Some(segment.payload()));
        segment.replace_payload(payload);
        segment.set_name(new_segment.name.clone());
        applied.ops.push(TreeOp::UpdateSegment { segment: segment_id.to_string() });
    }
    Ok(())
}

fn insert_segments(mutable: &mut MutableIngestRundown,
                   nrcs: &IngestRundown,
                   inserted: &[&str],
                   transforms: &dyn PayloadTransforms,
                   applied: &mut AppliedChanges)
                   -> Result<()> {
    let order = nrcs.segment_ids();
    let mut positioned: Vec<usize> = Vec::with_capacity(inserted.len());
    for segment_id in inserted {
        let position = order.iter()
                            .position(|id| id == segment_id)
                            .ok_or_else(|| IngestError::not_found(NodeKind::Segment, *segment_id))?;
        positioned.push(position);
    }
    positioned.sort_unstable_by(|a, b| b.cmp(a));
    positioned.dedup();

    for position in positioned {
        let segment = &nrcs.segments[position];
        let before = next_known_anchor(&order, position, |id| mutable.get_segment(id).is_some());
        let data = transformed_segment(segment, mutable.get_segment(&segment.external_id), transforms);
        mutable.replace_segment(data, before)?;
        applied.ops.push(TreeOp::ReplaceSegment { segment: segment.external_id.clone(),
                                                  before: before.map(str::to_string) });
    }
    Ok(())
}
