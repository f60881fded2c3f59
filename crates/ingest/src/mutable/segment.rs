// Archivo: mutable/segment.rs
use super::part::MutableIngestPart;
use super::{index_of, move_after, move_before, set_payload_property, Keyed};
use crate::errors::{IngestError, NodeKind, Result};
use rundown_model::{part_cache_id, IngestPart, IngestSegment, SofieCacheObject};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// Segmento mutable con sus partes ordenadas.
#[derive(Debug, Clone)]
pub struct MutableIngestSegment {
    external_id: String,
    /// Id externo con el que se cargó el segmento en esta operación. Si
    /// difiere de `external_id` al drenar, se informa como renombre.
    original_external_id: String,
    name: String,
    payload: JsonValue,
    parts: Vec<MutableIngestPart>,
    fields_changed: bool,
    part_order_changed: bool,
    persisted_rank: Option<f64>,
    persisted_external_id: Option<String>,
}

/// Cambios de un segmento entregados por `drain_changes`.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentChangesInfo {
    /// Estado completo y actual del segmento (con partes y ranks
    /// posicionales).
    pub ingest_segment: IngestSegment,
    pub original_external_id: String,
    /// El segmento no existía en la cache.
    pub is_new: bool,
    /// Cambió el nombre o el payload del propio segmento.
    pub fields_changed: bool,
    pub part_order_changed: bool,
    /// Cambió la posición del segmento dentro del rundown.
    pub rank_changed: bool,
    /// Partes nuevas o con contenido distinto.
    pub changed_part_ids: Vec<String>,
    pub changed_cache_objects: Vec<SofieCacheObject>,
    pub all_cache_object_ids: BTreeSet<String>,
}

impl SegmentChangesInfo {
    pub fn external_id(&self) -> &str {
        &self.ingest_segment.external_id
    }

    pub fn is_renamed(&self) -> bool {
        self.original_external_id != self.ingest_segment.external_id
    }

    pub fn has_changes(&self) -> bool {
        self.is_new
        || self.fields_changed
        || self.part_order_changed
        || self.rank_changed
        || self.is_renamed()
        || !self.changed_part_ids.is_empty()
        || !self.changed_cache_objects.is_empty()
    }
}

impl Keyed for MutableIngestSegment {
    fn key(&self) -> &str {
        &self.external_id
    }
}

impl MutableIngestSegment {
    pub(super) fn new(segment: IngestSegment) -> Self {
        let parts = segment.parts.into_iter().map(MutableIngestPart::new).collect();
        Self { original_external_id: segment.external_id.clone(),
               external_id: segment.external_id,
               name: segment.name,
               payload: segment.payload,
               parts,
               fields_changed: true,
               part_order_changed: true,
               persisted_rank: None,
               persisted_external_id: None }
    }

    pub(super) fn from_cache(segment: IngestSegment) -> Self {
        let external_id = segment.external_id.clone();
        let parts = segment.parts.into_iter().map(|p| MutableIngestPart::from_cache(p, &external_id)).collect();
        Self { original_external_id: external_id.clone(),
               external_id: external_id.clone(),
               name: segment.name,
               payload: segment.payload,
               parts,
               fields_changed: false,
               part_order_changed: false,
               persisted_rank: Some(segment.rank),
               persisted_external_id: Some(external_id) }
    }

    /// Reemplaza el contenido conservando identidad y procedencia. Las partes
    /// que ya existían se actualizan en sitio; las que faltan se eliminan.
    pub(super) fn replace_data(&mut self, segment: IngestSegment) {
        self.set_name(segment.name);
        self.replace_payload(segment.payload);

        let mut previous: Vec<MutableIngestPart> = std::mem::take(&mut self.parts);
        let old_order: Vec<String> = previous.iter().map(|p| p.external_id().to_string()).collect();
        for part in segment.parts {
            match index_of(&previous, &part.external_id) {
                Some(index) => {
                    let mut existing = previous.remove(index);
                    existing.replace_data(part);
                    self.parts.push(existing);
                }
                None => self.parts.push(MutableIngestPart::new(part)),
            }
        }
        let new_order: Vec<&str> = self.parts.iter().map(|p| p.external_id()).collect();
        if new_order != old_order {
            self.part_order_changed = true;
        }
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn original_external_id(&self) -> &str {
        &self.original_external_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn parts(&self) -> &[MutableIngestPart] {
        &self.parts
    }

    pub fn part_ids(&self) -> Vec<&str> {
        self.parts.iter().map(|p| p.external_id()).collect()
    }

    pub fn get_part(&self, external_id: &str) -> Option<&MutableIngestPart> {
        self.parts.iter().find(|p| p.external_id() == external_id)
    }

    pub fn get_part_mut(&mut self, external_id: &str) -> Option<&mut MutableIngestPart> {
        self.parts.iter_mut().find(|p| p.external_id() == external_id)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.fields_changed = true;
        }
    }

    pub fn replace_payload(&mut self, payload: JsonValue) {
        if self.payload != payload {
            self.payload = payload;
            self.fields_changed = true;
        }
    }

    pub fn set_payload_property(&mut self, key: &str, value: Option<JsonValue>) {
        if set_payload_property(&mut self.payload, key, value) {
            self.fields_changed = true;
        }
    }

    /// Inserta o reemplaza una parte justo antes de `before` (`None` = al
    /// final). Una parte existente conserva su estado y sólo se marca si su
    /// contenido difiere.
    pub fn replace_part(&mut self, part: IngestPart, before: Option<&str>) -> Result<&mut MutableIngestPart> {
        let external_id = part.external_id.clone();
        if before == Some(external_id.as_str()) {
            return Err(IngestError::RelativeToSelf { kind: NodeKind::Part, id: external_id });
        }
        if let Some(target) = before {
            if index_of(&self.parts, target).is_none() {
                return Err(IngestError::not_found(NodeKind::Part, target));
            }
        }
        match index_of(&self.parts, &external_id) {
            Some(index) => self.parts[index].replace_data(part),
            None => {
                self.parts.push(MutableIngestPart::new(part));
                self.part_order_changed = true;
            }
        }
        if move_before(&mut self.parts, NodeKind::Part, &external_id, before)? {
            self.part_order_changed = true;
        }
        let index = index_of(&self.parts, &external_id).ok_or_else(|| IngestError::not_found(NodeKind::Part, &external_id))?;
        Ok(&mut self.parts[index])
    }

    /// Elimina una parte. Devuelve `false` si no existía.
    pub fn remove_part(&mut self, external_id: &str) -> bool {
        match index_of(&self.parts, external_id) {
            Some(index) => {
                self.parts.remove(index);
                self.part_order_changed = true;
                true
            }
            None => false,
        }
    }

    /// Devuelve si la posición cambió.
    pub fn move_part_before(&mut self, external_id: &str, before: Option<&str>) -> Result<bool> {
        let moved = move_before(&mut self.parts, NodeKind::Part, external_id, before)?;
        if moved {
            self.part_order_changed = true;
        }
        Ok(moved)
    }

    /// Devuelve si la posición cambió.
    pub fn move_part_after(&mut self, external_id: &str, after: Option<&str>) -> Result<bool> {
        let moved = move_after(&mut self.parts, NodeKind::Part, external_id, after)?;
        if moved {
            self.part_order_changed = true;
        }
        Ok(moved)
    }

    pub(super) fn set_external_id(&mut self, external_id: &str) {
        self.external_id = external_id.to_string();
    }

    pub(super) fn set_original_external_id(&mut self, original_external_id: &str) {
        self.original_external_id = original_external_id.to_string();
    }

    pub(super) fn to_ingest(&self, rank: f64) -> IngestSegment {
        let parts = self.parts.iter().enumerate().map(|(i, p)| p.to_ingest(i as f64)).collect();
        IngestSegment { external_id: self.external_id.clone(),
                        rank,
                        name: self.name.clone(),
                        payload: self.payload.clone(),
                        parts }
    }

    /// Entrega los cambios acumulados y limpia todos los bits de cambio.
    pub(super) fn drain_changes(&mut self, rundown_external_id: &str, rank: f64) -> SegmentChangesInfo {
        let ingest_segment = self.to_ingest(rank);
        let is_new = self.persisted_external_id.is_none();
        let cache_rekeyed = self.persisted_external_id.as_deref() != Some(self.external_id.as_str());
        let rank_changed = self.persisted_rank != Some(rank);

        let mut changed_cache_objects = Vec::new();
        let mut all_cache_object_ids = BTreeSet::new();
        let segment_object = SofieCacheObject::segment(rundown_external_id, &ingest_segment);
        all_cache_object_ids.insert(segment_object.id().to_string());
        if is_new || cache_rekeyed || self.fields_changed || rank_changed {
            changed_cache_objects.push(segment_object);
        }

        let mut changed_part_ids = Vec::new();
        for (part, data) in self.parts.iter_mut().zip(ingest_segment.parts.iter()) {
            all_cache_object_ids.insert(part_cache_id(rundown_external_id, &data.external_id));
            let moved_segment = part.persisted_segment.as_deref() != Some(self.external_id.as_str());
            if part.changed || moved_segment {
                changed_part_ids.push(data.external_id.clone());
            }
            if part.changed || moved_segment || part.persisted_rank != Some(data.rank) {
                changed_cache_objects.push(SofieCacheObject::part(rundown_external_id, &self.external_id, data));
            }
            part.changed = false;
            part.persisted_rank = Some(data.rank);
            part.persisted_segment = Some(self.external_id.clone());
        }

        let info = SegmentChangesInfo { ingest_segment,
                                        original_external_id: self.original_external_id.clone(),
                                        is_new,
                                        fields_changed: self.fields_changed,
                                        part_order_changed: self.part_order_changed,
                                        rank_changed,
                                        changed_part_ids,
                                        changed_cache_objects,
                                        all_cache_object_ids };

        self.fields_changed = false;
        self.part_order_changed = false;
        self.original_external_id = self.external_id.clone();
        self.persisted_external_id = Some(self.external_id.clone());
        self.persisted_rank = Some(rank);
        info
    }
}
