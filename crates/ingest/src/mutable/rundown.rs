// Archivo: mutable/rundown.rs
use super::segment::{MutableIngestSegment, SegmentChangesInfo};
use super::{index_of, move_after, move_before, set_payload_property};
use crate::errors::{IngestError, NodeKind, Result};
use indexmap::IndexMap;
use rundown_model::{rundown_cache_id, IngestRundown, IngestSegment, RundownSource, SofieCacheObject};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// Raíz del árbol mutable.
///
/// Pertenece en exclusiva a una operación de ingesta: se construye desde la
/// cache normalizada, la lógica de transformación lo edita de forma síncrona,
/// se drena una vez con `drain_changes` y se descarta.
#[derive(Debug, Clone)]
pub struct MutableIngestRundown {
    external_id: String,
    name: String,
    rundown_type: String,
    source: RundownSource,
    payload: JsonValue,
    segments: Vec<MutableIngestSegment>,
    fields_changed: bool,
    segment_order_changed: bool,
    regenerate: bool,
}

/// Resultado de `MutableIngestRundown::drain_changes`.
#[derive(Debug, Clone, PartialEq)]
pub struct RundownChangesInfo {
    /// Árbol completo y actual, con ranks posicionales.
    pub ingest_rundown: IngestRundown,
    /// Cambió el nombre, tipo, origen o payload del propio rundown.
    pub rundown_fields_changed: bool,
    pub regenerate_rundown: bool,
    pub segment_order_changed: bool,
    /// Sólo los segmentos con algún cambio, en orden.
    pub segments: Vec<SegmentChangesInfo>,
    /// Renombres de segmentos: id externo original → id externo actual.
    pub segment_external_id_changes: IndexMap<String, String>,
    pub changed_cache_objects: Vec<SofieCacheObject>,
    pub all_cache_object_ids: BTreeSet<String>,
}

impl RundownChangesInfo {
    pub fn has_changes(&self) -> bool {
        self.rundown_fields_changed
        || self.regenerate_rundown
        || self.segment_order_changed
        || !self.segments.is_empty()
        || !self.segment_external_id_changes.is_empty()
    }
}

impl MutableIngestRundown {
    /// Construye el árbol a partir de la cache normalizada. Si
    /// `is_existing` es `false` el rundown y todos sus nodos se consideran
    /// nuevos.
    pub fn new(rundown: IngestRundown, is_existing: bool) -> Self {
        let segments = if is_existing {
            rundown.segments.into_iter().map(MutableIngestSegment::from_cache).collect()
        } else {
            rundown.segments.into_iter().map(MutableIngestSegment::new).collect()
        };
        Self { external_id: rundown.external_id,
               name: rundown.name,
               rundown_type: rundown.rundown_type,
               source: rundown.source,
               payload: rundown.payload,
               segments,
               fields_changed: !is_existing,
               segment_order_changed: !is_existing,
               regenerate: false }
    }

    /// Árbol vacío para un rundown que todavía no tiene cache.
    pub fn empty_for(nrcs: &IngestRundown) -> Self {
        let mut rundown = nrcs.without_segments();
        rundown.payload = JsonValue::Null;
        Self::new(rundown, false)
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rundown_type(&self) -> &str {
        &self.rundown_type
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn segments(&self) -> &[MutableIngestSegment] {
        &self.segments
    }

    pub fn segment_ids(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.external_id()).collect()
    }

    pub fn get_segment(&self, external_id: &str) -> Option<&MutableIngestSegment> {
        self.segments.iter().find(|s| s.external_id() == external_id)
    }

    pub fn get_segment_mut(&mut self, external_id: &str) -> Option<&mut MutableIngestSegment> {
        self.segments.iter_mut().find(|s| s.external_id() == external_id)
    }

    pub fn is_regenerate_forced(&self) -> bool {
        self.regenerate
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.fields_changed = true;
        }
    }

    /// Actualiza tipo y origen desde el árbol del NRCS.
    pub fn set_type_and_source(&mut self, rundown_type: &str, source: &RundownSource) {
        if self.rundown_type != rundown_type || &self.source != source {
            self.rundown_type = rundown_type.to_string();
            self.source = source.clone();
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

    /// Fuerza la regeneración completa del rundown en el commit.
    pub fn force_full_regenerate(&mut self) {
        self.regenerate = true;
    }

    pub fn remove_all_segments(&mut self) {
        if !self.segments.is_empty() {
            self.segments.clear();
            self.segment_order_changed = true;
        }
    }

    /// Inserta o reemplaza un segmento justo antes de `before` (`None` = al
    /// final) y devuelve el segmento mutable resultante.
    ///
    /// Un segmento existente conserva su procedencia y el estado de cache de
    /// sus partes; sólo se marca lo que realmente difiere.
    pub fn replace_segment(&mut self, segment: IngestSegment, before: Option<&str>) -> Result<&mut MutableIngestSegment> {
        let external_id = segment.external_id.clone();
        if before == Some(external_id.as_str()) {
            return Err(IngestError::RelativeToSelf { kind: NodeKind::Segment, id: external_id });
        }
        if let Some(target) = before {
            if index_of(&self.segments, target).is_none() {
                return Err(IngestError::not_found(NodeKind::Segment, target));
            }
        }
        match index_of(&self.segments, &external_id) {
            Some(index) => self.segments[index].replace_data(segment),
            None => {
                self.segments.push(MutableIngestSegment::new(segment));
                self.segment_order_changed = true;
            }
        }
        if move_before(&mut self.segments, NodeKind::Segment, &external_id, before)? {
            self.segment_order_changed = true;
        }
        let index =
            index_of(&self.segments, &external_id).ok_or_else(|| IngestError::not_found(NodeKind::Segment, &external_id))?;
        Ok(&mut self.segments[index])
    }

    /// Elimina un segmento. Devuelve `false` si no existía.
    pub fn remove_segment(&mut self, external_id: &str) -> bool {
        match index_of(&self.segments, external_id) {
            Some(index) => {
                self.segments.remove(index);
                self.segment_order_changed = true;
                true
            }
            None => false,
        }
    }

    /// Cambia el id externo de un segmento. La procedencia (id original) se
    /// conserva, de modo que el drenado informa el renombre.
    pub fn change_segment_external_id(&mut self, old_external_id: &str, new_external_id: &str) -> Result<()> {
        if old_external_id == new_external_id {
            return Ok(());
        }
        if index_of(&self.segments, new_external_id).is_some() {
            return Err(IngestError::AlreadyExists { kind: NodeKind::Segment, id: new_external_id.to_string() });
        }
        let segment =
            self.get_segment_mut(old_external_id).ok_or_else(|| IngestError::not_found(NodeKind::Segment, old_external_id))?;
        segment.set_external_id(new_external_id);
        Ok(())
    }

    /// Registra de qué segmento proviene `external_id` sin cambiar su clave.
    pub fn change_segment_original_external_id(&mut self, external_id: &str, original_external_id: &str) -> Result<()> {
        if external_id != original_external_id && index_of(&self.segments, original_external_id).is_some() {
            return Err(IngestError::AlreadyExists { kind: NodeKind::Segment, id: original_external_id.to_string() });
        }
        let segment = self.get_segment_mut(external_id).ok_or_else(|| IngestError::not_found(NodeKind::Segment, external_id))?;
        segment.set_original_external_id(original_external_id);
        Ok(())
    }

    /// Devuelve si la posición cambió.
    pub fn move_segment_before(&mut self, external_id: &str, before: Option<&str>) -> Result<bool> {
        let moved = move_before(&mut self.segments, NodeKind::Segment, external_id, before)?;
        if moved {
            self.segment_order_changed = true;
        }
        Ok(moved)
    }

    /// Devuelve si la posición cambió.
    pub fn move_segment_after(&mut self, external_id: &str, after: Option<&str>) -> Result<bool> {
        let moved = move_after(&mut self.segments, NodeKind::Segment, external_id, after)?;
        if moved {
            self.segment_order_changed = true;
        }
        Ok(moved)
    }

    /// Vista inmutable del estado actual, con ranks posicionales.
    pub fn to_ingest_rundown(&self) -> IngestRundown {
        IngestRundown { external_id: self.external_id.clone(),
                        name: self.name.clone(),
                        rundown_type: self.rundown_type.clone(),
                        source: self.source.clone(),
                        payload: self.payload.clone(),
                        segments: self.segments.iter().enumerate().map(|(i, s)| s.to_ingest(i as f64)).collect() }
    }

    /// Entrega los cambios acumulados desde la carga (o el drenado anterior)
    /// y limpia todos los bits de cambio. Un segundo drenado sin mutaciones
    /// intermedias no informa cambios.
    pub fn drain_changes(&mut self) -> RundownChangesInfo {
        let rundown_external_id = self.external_id.clone();
        let mut changed_cache_objects = Vec::new();
        let mut all_cache_object_ids = BTreeSet::new();

        let mut ingest_rundown = self.to_ingest_rundown();
        ingest_rundown.segments.clear();
        all_cache_object_ids.insert(rundown_cache_id(&rundown_external_id));
        if self.fields_changed {
            changed_cache_objects.push(SofieCacheObject::rundown(&ingest_rundown));
        }

        let mut segments = Vec::new();
        let mut segment_external_id_changes = IndexMap::new();
        for (index, segment) in self.segments.iter_mut().enumerate() {
            let info = segment.drain_changes(&rundown_external_id, index as f64);
            ingest_rundown.segments.push(info.ingest_segment.clone());
            all_cache_object_ids.extend(info.all_cache_object_ids.iter().cloned());
            changed_cache_objects.extend(info.changed_cache_objects.iter().cloned());
            if info.is_renamed() {
                segment_external_id_changes.insert(info.original_external_id.clone(), info.external_id().to_string());
            }
            if info.has_changes() {
                segments.push(info);
            }
        }

        let info = RundownChangesInfo { ingest_rundown,
                                        rundown_fields_changed: self.fields_changed,
                                        regenerate_rundown: self.regenerate,
                                        segment_order_changed: self.segment_order_changed,
                                        segments,
                                        segment_external_id_changes,
                                        changed_cache_objects,
                                        all_cache_object_ids };

        self.fields_changed = false;
        self.segment_order_changed = false;
        self.regenerate = false;
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rundown_model::IngestPart;
    use serde_json::json;

    fn segment(id: &str, parts: &[&str]) -> IngestSegment {
        IngestSegment::new(id, 0.0, id.to_uppercase(), json!({})).with_parts(parts.iter()
                                                                                .enumerate()
                                                                                .map(|(i, p)| {
                                                                                    IngestPart::new(*p, i as f64, p.to_uppercase(), json!({}))
                                                                                })
                                                                                .collect())
    }

    fn cached(segments: Vec<IngestSegment>) -> MutableIngestRundown {
        let mut rundown = IngestRundown::new("rd", "Show", "external").with_segments(segments);
        for (i, s) in rundown.segments.iter_mut().enumerate() {
            s.rank = i as f64;
        }
        MutableIngestRundown::new(rundown, true)
    }

    #[test]
    fn fresh_cache_reports_no_changes() {
        let mut rundown = cached(vec![segment("s0", &["p0", "p1"]), segment("s1", &["p2"])]);
        let info = rundown.drain_changes();
        assert!(!info.has_changes());
        assert!(info.changed_cache_objects.is_empty());
        assert_eq!(info.all_cache_object_ids.len(), 1 + 2 + 3);
    }

    #[test]
    fn drain_is_consume_once() -> Result<()> {
        let mut rundown = cached(vec![segment("s0", &["p0"])]);
        rundown.set_name("Otro nombre");
        rundown.replace_segment(segment("s1", &["p1"]), None)?;
        let first = rundown.drain_changes();
        assert!(first.rundown_fields_changed);
        assert!(first.segment_order_changed);
        assert_eq!(first.segments.len(), 1);
        assert!(first.segments[0].is_new);

        let second = rundown.drain_changes();
        assert!(!second.has_changes());
        assert!(second.changed_cache_objects.is_empty());
        Ok(())
    }

    #[test]
    fn setters_only_mark_real_changes() {
        let mut rundown = cached(vec![segment("s0", &["p0"])]);
        rundown.set_name("Show");
        rundown.replace_payload(JsonValue::Null);
        if let Some(s) = rundown.get_segment_mut("s0") {
            s.set_name("S0");
        }
        assert!(!rundown.drain_changes().has_changes());
    }

    #[test]
    fn replace_segment_rejects_bad_anchors() {
        let mut rundown = cached(vec![segment("s0", &[])]);
        let err = rundown.replace_segment(segment("s1", &[]), Some("missing")).err();
        assert!(matches!(err, Some(IngestError::NotFound { kind: NodeKind::Segment, .. })));
        let err = rundown.replace_segment(segment("s1", &[]), Some("s1")).err();
        assert!(matches!(err, Some(IngestError::RelativeToSelf { .. })));
        assert_eq!(rundown.segment_ids(), vec!["s0"]);
    }

    #[test]
    fn remove_missing_segment_returns_false() {
        let mut rundown = cached(vec![segment("s0", &[])]);
        assert!(!rundown.remove_segment("nope"));
        assert!(!rundown.drain_changes().has_changes());
        assert!(rundown.remove_segment("s0"));
        assert!(rundown.drain_changes().segment_order_changed);
    }

    #[test]
    fn rename_is_reported_and_rekeys_cache() -> Result<()> {
        let mut rundown = cached(vec![segment("s0", &["p0"]), segment("s1", &[])]);
        rundown.change_segment_external_id("s0", "s0b")?;
        let info = rundown.drain_changes();
        assert_eq!(info.segment_external_id_changes.get("s0").map(String::as_str), Some("s0b"));
        let renamed = &info.segments[0];
        assert!(renamed.is_renamed());
        assert!(!renamed.fields_changed);
        assert_eq!(renamed.changed_part_ids, vec!["p0".to_string()]);
        assert!(!info.all_cache_object_ids.contains(&rundown_model::segment_cache_id("rd", "s0")));
        assert!(rundown.drain_changes().segment_external_id_changes.is_empty());
        Ok(())
    }

    #[test]
    fn rename_to_existing_id_fails() {
        let mut rundown = cached(vec![segment("s0", &[]), segment("s1", &[])]);
        let err = rundown.change_segment_external_id("s0", "s1").err();
        assert!(matches!(err, Some(IngestError::AlreadyExists { .. })));
        let err = rundown.change_segment_external_id("nope", "s9").err();
        assert!(matches!(err, Some(IngestError::NotFound { .. })));
    }

    #[test]
    fn original_external_id_tracks_provenance_without_rekeying() -> Result<()> {
        let mut rundown = cached(vec![segment("s1", &[])]);
        rundown.change_segment_original_external_id("s1", "s0")?;
        assert_eq!(rundown.segment_ids(), vec!["s1"]);
        let info = rundown.drain_changes();
        assert_eq!(info.segment_external_id_changes.get("s0").map(String::as_str), Some("s1"));
        Ok(())
    }

    #[test]
    fn moving_a_part_between_segments_marks_both() -> Result<()> {
        let mut rundown = cached(vec![segment("s0", &["p0", "p1"]), segment("s1", &["p2"])]);
        let moved = IngestPart::new("p1", 0.0, "P1", json!({}));
        if let Some(s0) = rundown.get_segment_mut("s0") {
            assert!(s0.remove_part("p1"));
        }
        let s1 = rundown.get_segment_mut("s1").ok_or(IngestError::not_found(NodeKind::Segment, "s1"))?;
        s1.replace_part(moved, None)?;
        assert_eq!(s1.part_ids(), vec!["p2", "p1"]);

        let info = rundown.drain_changes();
        let ids: Vec<&str> = info.segments.iter().map(|s| s.external_id()).collect();
        assert_eq!(ids, vec!["s0", "s1"]);
        assert!(info.segments[0].part_order_changed);
        assert_eq!(info.segments[1].changed_part_ids, vec!["p1".to_string()]);
        assert!(info.all_cache_object_ids.contains(&rundown_model::part_cache_id("rd", "p1")));
        Ok(())
    }

    #[test]
    fn regenerate_flag_is_reported_once() {
        let mut rundown = cached(vec![]);
        rundown.force_full_regenerate();
        assert!(rundown.drain_changes().regenerate_rundown);
        assert!(!rundown.drain_changes().regenerate_rundown);
    }
}
