// ingest_tree.rs
use crate::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Origen del rundown tal como lo declara la capa de transporte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RundownSource {
  /// Recibido desde un NRCS a través de un dispositivo periférico.
  #[serde(rename_all = "camelCase")]
  Nrcs { device_id: String, nrcs_name: String },
  /// Recibido por la API HTTP.
  Http,
  /// Rundown sintético de pruebas.
  #[default]
  Testing,
  /// Restaurado desde un snapshot.
  Snapshot,
}

/// Parte reproducible dentro de un segmento.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestPart {
  pub external_id: String,
  pub rank: f64,
  pub name: String,
  #[serde(default)]
  pub payload: JsonValue,
}

/// Segmento (capítulo) del rundown con sus partes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSegment {
  pub external_id: String,
  pub rank: f64,
  pub name: String,
  #[serde(default)]
  pub payload: JsonValue,
  #[serde(default)]
  pub parts: Vec<IngestPart>,
}

/// Snapshot inmutable de un rundown.
///
/// Se usa tanto para el árbol recibido del NRCS como para el árbol
/// normalizado que resulta de aplicar la lógica de transformación: ambos
/// comparten forma y sólo difieren en el contenido de los `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRundown {
  pub external_id: String,
  pub name: String,
  #[serde(rename = "type")]
  pub rundown_type: String,
  #[serde(default)]
  pub source: RundownSource,
  #[serde(default)]
  pub payload: JsonValue,
  #[serde(default)]
  pub segments: Vec<IngestSegment>,
}

impl IngestPart {
  pub fn new(external_id: impl Into<String>, rank: f64, name: impl Into<String>, payload: JsonValue) -> Self {
    Self { external_id: external_id.into(), rank, name: name.into(), payload }
  }
}

impl IngestSegment {
  pub fn new(external_id: impl Into<String>, rank: f64, name: impl Into<String>, payload: JsonValue) -> Self {
    Self { external_id: external_id.into(), rank, name: name.into(), payload, parts: Vec::new() }
  }

  pub fn with_parts(mut self, parts: Vec<IngestPart>) -> Self {
    self.parts = parts;
    self
  }

  pub fn part(&self, external_id: &str) -> Option<&IngestPart> {
    self.parts.iter().find(|p| p.external_id == external_id)
  }

  pub fn part_ids(&self) -> Vec<&str> {
    self.parts.iter().map(|p| p.external_id.as_str()).collect()
  }

  /// Ordena las partes por `rank`. El orden es estable: empates conservan la
  /// posición original.
  pub fn sort_parts(&mut self) {
    self.parts.sort_by(|a, b| a.rank.total_cmp(&b.rank));
  }
}

impl IngestRundown {
  pub fn new(external_id: impl Into<String>, name: impl Into<String>, rundown_type: impl Into<String>) -> Self {
    Self { external_id: external_id.into(),
           name: name.into(),
           rundown_type: rundown_type.into(),
           source: RundownSource::default(),
           payload: JsonValue::Null,
           segments: Vec::new() }
  }

  pub fn with_segments(mut self, segments: Vec<IngestSegment>) -> Self {
    self.segments = segments;
    self
  }

  pub fn segment(&self, external_id: &str) -> Option<&IngestSegment> {
    self.segments.iter().find(|s| s.external_id == external_id)
  }

  pub fn segment_mut(&mut self, external_id: &str) -> Option<&mut IngestSegment> {
    self.segments.iter_mut().find(|s| s.external_id == external_id)
  }

  pub fn segment_ids(&self) -> Vec<&str> {
    self.segments.iter().map(|s| s.external_id.as_str()).collect()
  }

  /// Busca el segmento que contiene la parte indicada.
  pub fn find_part(&self, part_external_id: &str) -> Option<(&IngestSegment, &IngestPart)> {
    self.segments.iter().find_map(|s| s.part(part_external_id).map(|p| (s, p)))
  }

  /// Normaliza el orden de segmentos y partes según `rank` (estable).
  pub fn sort_by_rank(&mut self) {
    self.segments.sort_by(|a, b| a.rank.total_cmp(&b.rank));
    for segment in self.segments.iter_mut() {
      segment.sort_parts();
    }
  }

  /// Copia del rundown sin segmentos (forma usada por la cache).
  pub fn without_segments(&self) -> Self {
    Self { external_id: self.external_id.clone(),
           name: self.name.clone(),
           rundown_type: self.rundown_type.clone(),
           source: self.source.clone(),
           payload: self.payload.clone(),
           segments: Vec::new() }
  }

  /// Verifica que los `external_id` sean únicos entre hermanos.
  pub fn validate(&self) -> Result<(), ModelError> {
    if self.external_id.trim().is_empty() {
      return Err(ModelError::Validation("El rundown no tiene externalId".to_string()));
    }
    let mut seen_segments = HashSet::new();
    for segment in &self.segments {
      if !seen_segments.insert(segment.external_id.as_str()) {
        return Err(ModelError::Validation(format!("Segmento duplicado en {}: {}", self.external_id, segment.external_id)));
      }
      let mut seen_parts = HashSet::new();
      for part in &segment.parts {
        if !seen_parts.insert(part.external_id.as_str()) {
          return Err(ModelError::Validation(format!("Parte duplicada en {}: {}", segment.external_id, part.external_id)));
        }
      }
    }
    Ok(())
  }
}
