// Archivo: mutable/part.rs
use super::{set_payload_property, Keyed};
use rundown_model::IngestPart;
use serde_json::Value as JsonValue;

/// Parte mutable. Sólo se obtiene a través de su segmento.
#[derive(Debug, Clone)]
pub struct MutableIngestPart {
    external_id: String,
    name: String,
    payload: JsonValue,
    pub(super) changed: bool,
    /// Rank y segmento con los que está en la cache; `None` si es nueva.
    pub(super) persisted_rank: Option<f64>,
    pub(super) persisted_segment: Option<String>,
}

impl Keyed for MutableIngestPart {
    fn key(&self) -> &str {
        &self.external_id
    }
}

impl MutableIngestPart {
    pub(super) fn new(part: IngestPart) -> Self {
        Self { external_id: part.external_id,
               name: part.name,
               payload: part.payload,
               changed: true,
               persisted_rank: None,
               persisted_segment: None }
    }

    pub(super) fn from_cache(part: IngestPart, segment_external_id: &str) -> Self {
        Self { persisted_rank: Some(part.rank),
               persisted_segment: Some(segment_external_id.to_string()),
               changed: false,
               ..Self::new(part) }
    }

    /// Reemplaza nombre y payload conservando el estado de cache. Marca la
    /// parte como cambiada sólo si algo difiere.
    pub(super) fn replace_data(&mut self, part: IngestPart) {
        self.set_name(part.name);
        self.replace_payload(part.payload);
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn has_changes(&self) -> bool {
        self.changed
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.name != name {
            self.name = name;
            self.changed = true;
        }
    }

    pub fn replace_payload(&mut self, payload: JsonValue) {
        if self.payload != payload {
            self.payload = payload;
            self.changed = true;
        }
    }

    pub fn set_payload_property(&mut self, key: &str, value: Option<JsonValue>) {
        if set_payload_property(&mut self.payload, key, value) {
            self.changed = true;
        }
    }

    pub(super) fn to_ingest(&self, rank: f64) -> IngestPart {
        IngestPart { external_id: self.external_id.clone(), rank, name: self.name.clone(), payload: self.payload.clone() }
    }
}
