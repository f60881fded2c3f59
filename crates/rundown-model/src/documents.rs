// documents.rs
use crate::{IngestRundown, PartId, RundownId, RundownSource, SegmentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Motivo por el que un nodo sigue persistido aunque ya no exista en el NRCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrphanedReason {
  /// Borrado en el NRCS mientras estaba en el aire.
  Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRundown {
  pub id: RundownId,
  pub external_id: String,
  pub name: String,
  pub rundown_type: String,
  pub source: RundownSource,
  pub payload: JsonValue,
  pub created_at: DateTime<Utc>,
  pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSegment {
  pub id: SegmentId,
  pub rundown_id: RundownId,
  pub external_id: String,
  pub rank: f64,
  pub name: String,
  pub payload: JsonValue,
  pub orphaned: Option<OrphanedReason>,
  pub created_at: DateTime<Utc>,
  pub modified_at: DateTime<Utc>,
  /// Número de regeneraciones de contenido desde que se creó.
  pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPart {
  pub id: PartId,
  pub rundown_id: RundownId,
  pub segment_id: SegmentId,
  pub external_id: String,
  pub rank: f64,
  pub name: String,
  pub payload: JsonValue,
  pub orphaned: Option<OrphanedReason>,
  pub created_at: DateTime<Utc>,
  pub modified_at: DateTime<Utc>,
  pub generation: u64,
}

impl DbRundown {
  pub fn from_ingest(rundown: &IngestRundown, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
    Self { id: RundownId::from_external_id(&rundown.external_id),
           external_id: rundown.external_id.clone(),
           name: rundown.name.clone(),
           rundown_type: rundown.rundown_type.clone(),
           source: rundown.source.clone(),
           payload: rundown.payload.clone(),
           created_at,
           modified_at: now }
  }
}

/// Modelo persistido completo de un rundown, tal como lo ve playout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RundownModel {
  pub rundown: DbRundown,
  pub segments: Vec<DbSegment>,
  pub parts: Vec<DbPart>,
}

impl RundownModel {
  pub fn new(rundown: DbRundown) -> Self {
    Self { rundown, segments: Vec::new(), parts: Vec::new() }
  }

  pub fn segment(&self, id: &SegmentId) -> Option<&DbSegment> {
    self.segments.iter().find(|s| &s.id == id)
  }

  pub fn part(&self, id: &PartId) -> Option<&DbPart> {
    self.parts.iter().find(|p| &p.id == id)
  }

  /// Segmentos ordenados por `rank`.
  pub fn sorted_segments(&self) -> Vec<&DbSegment> {
    let mut segments: Vec<&DbSegment> = self.segments.iter().collect();
    segments.sort_by(|a, b| a.rank.total_cmp(&b.rank));
    segments
  }

  /// Partes de un segmento ordenadas por `rank`.
  pub fn parts_in_segment(&self, segment_id: &SegmentId) -> Vec<&DbPart> {
    let mut parts: Vec<&DbPart> = self.parts.iter().filter(|p| &p.segment_id == segment_id).collect();
    parts.sort_by(|a, b| a.rank.total_cmp(&b.rank));
    parts
  }
}
