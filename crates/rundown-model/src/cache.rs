// cache.rs
use crate::ids::hash_id;
use crate::{IngestPart, IngestRundown, IngestSegment, ModelError};
use serde::{Deserialize, Serialize};

pub fn rundown_cache_id(rundown_external_id: &str) -> String {
  hash_id(&["cache", rundown_external_id])
}

pub fn segment_cache_id(rundown_external_id: &str, segment_external_id: &str) -> String {
  hash_id(&["cache", rundown_external_id, "segment", segment_external_id])
}

/// El id de cache de una parte no incluye el segmento, igual que su id de
/// almacenamiento.
pub fn part_cache_id(rundown_external_id: &str, part_external_id: &str) -> String {
  hash_id(&["cache", rundown_external_id, "part", part_external_id])
}

/// Objeto plano de la cache normalizada. Cada nodo se guarda sin sus hijos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SofieCacheObject {
  Rundown {
    id: String,
    rundown: IngestRundown,
  },
  Segment {
    id: String,
    segment: IngestSegment,
  },
  #[serde(rename_all = "camelCase")]
  Part {
    id: String,
    segment_external_id: String,
    part: IngestPart,
  },
}

impl SofieCacheObject {
  pub fn id(&self) -> &str {
    match self {
      SofieCacheObject::Rundown { id, .. } => id,
      SofieCacheObject::Segment { id, .. } => id,
      SofieCacheObject::Part { id, .. } => id,
    }
  }

  pub fn rundown(rundown: &IngestRundown) -> Self {
    SofieCacheObject::Rundown { id: rundown_cache_id(&rundown.external_id), rundown: rundown.without_segments() }
  }

  pub fn segment(rundown_external_id: &str, segment: &IngestSegment) -> Self {
    let mut data = segment.clone();
    data.parts.clear();
    SofieCacheObject::Segment { id: segment_cache_id(rundown_external_id, &segment.external_id), segment: data }
  }

  pub fn part(rundown_external_id: &str, segment_external_id: &str, part: &IngestPart) -> Self {
    SofieCacheObject::Part { id: part_cache_id(rundown_external_id, &part.external_id),
                             segment_external_id: segment_external_id.to_string(),
                             part: part.clone() }
  }
}

/// Reconstruye el árbol normalizado a partir de los objetos de la cache.
///
/// Devuelve `Ok(None)` si no hay objeto de rundown. Las partes cuyo segmento
/// no está en la cache se descartan: la siguiente ingesta las regenera.
pub fn build_ingest_rundown(objects: &[SofieCacheObject]) -> Result<Option<IngestRundown>, ModelError> {
  let mut rundown: Option<IngestRundown> = None;
  let mut segments: Vec<IngestSegment> = Vec::new();
  let mut parts: Vec<(&str, &IngestPart)> = Vec::new();

  for object in objects {
    match object {
      SofieCacheObject::Rundown { rundown: data, .. } => {
        if rundown.is_some() {
          return Err(ModelError::Validation(format!("Cache con más de un rundown: {}", data.external_id)));
        }
        rundown = Some(data.without_segments());
      }
      SofieCacheObject::Segment { segment, .. } => segments.push(segment.clone()),
      SofieCacheObject::Part { segment_external_id, part, .. } => parts.push((segment_external_id.as_str(), part)),
    }
  }

  let Some(mut rundown) = rundown else {
    return Ok(None);
  };
  for (segment_external_id, part) in parts {
    if let Some(segment) = segments.iter_mut().find(|s| s.external_id == segment_external_id) {
      segment.parts.push(part.clone());
    }
  }
  rundown.segments = segments;
  rundown.sort_by_rank();
  Ok(Some(rundown))
}
