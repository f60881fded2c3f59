// Archivo: repository.rs
// Propósito: contrato de persistencia del motor de ingesta. Agrupa las dos
// caches (NRCS y normalizada), el modelo persistido y el estado de playout.
// El almacén real queda fuera del crate; `stubs` trae uno en memoria.
use crate::errors::Result;
use async_trait::async_trait;
use rundown_model::{DbPart, DbRundown, DbSegment, IngestRundown, PartId, RundownId, RundownModel, SegmentId, SofieCacheObject};
use serde::{Deserialize, Serialize};

/// Punteros de playout de un rundown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayoutState {
    /// Parte en el aire.
    pub current_part: Option<PartId>,
    pub next_part: Option<PartId>,
    /// Segmento encolado para reproducirse a continuación.
    pub queued_segment: Option<SegmentId>,
}

impl PlayoutState {
    /// El rundown está en el aire si hay una parte actual.
    pub fn is_on_air(&self) -> bool {
        self.current_part.is_some()
    }

    /// `true` si la parte es la actual o la siguiente.
    pub fn references_part(&self, part_id: &PartId) -> bool {
        self.current_part.as_ref() == Some(part_id) || self.next_part.as_ref() == Some(part_id)
    }
}

/// Renombre de un segmento persistido: cambia su id y su `external_id`, y
/// sus partes pasan a apuntar al id nuevo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRename {
    pub from: SegmentId,
    pub to: SegmentId,
    pub new_external_id: String,
}

/// Escritura única sobre el modelo persistido de un rundown.
///
/// El repositorio la aplica en este orden: renombres, borrados, huérfanos,
/// upserts y, si viene, el nuevo estado de playout.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelWrite {
    pub rundown_id: RundownId,
    pub rundown: Option<DbRundown>,
    pub renamed_segments: Vec<SegmentRename>,
    pub removed_segment_ids: Vec<SegmentId>,
    pub removed_part_ids: Vec<PartId>,
    pub orphaned_segment_ids: Vec<SegmentId>,
    pub orphaned_part_ids: Vec<PartId>,
    pub upsert_segments: Vec<DbSegment>,
    pub upsert_parts: Vec<DbPart>,
    /// Playout con las referencias reescritas tras un renombre.
    pub playout: Option<PlayoutState>,
}

impl ModelWrite {
    pub fn new(rundown_id: RundownId) -> Self {
        Self { rundown_id,
               rundown: None,
               renamed_segments: Vec::new(),
               removed_segment_ids: Vec::new(),
               removed_part_ids: Vec::new(),
               orphaned_segment_ids: Vec::new(),
               orphaned_part_ids: Vec::new(),
               upsert_segments: Vec::new(),
               upsert_parts: Vec::new(),
               playout: None }
    }

    pub fn is_empty(&self) -> bool {
        self.rundown.is_none()
        && self.renamed_segments.is_empty()
        && self.removed_segment_ids.is_empty()
        && self.removed_part_ids.is_empty()
        && self.orphaned_segment_ids.is_empty()
        && self.orphaned_part_ids.is_empty()
        && self.upsert_segments.is_empty()
        && self.upsert_parts.is_empty()
        && self.playout.is_none()
    }
}

/// Contrato de persistencia que usa el motor.
///
/// Todas las llamadas para un mismo rundown se hacen bajo su lock, así que
/// las implementaciones no necesitan coordinar escrituras concurrentes sobre
/// el mismo rundown.
#[async_trait]
pub trait IngestRepository: Send + Sync {
    /// Último árbol recibido del NRCS.
    async fn load_nrcs_cache(&self, rundown_external_id: &str) -> Result<Option<IngestRundown>>;
    async fn save_nrcs_cache(&self, rundown: &IngestRundown) -> Result<()>;
    async fn remove_nrcs_cache(&self, rundown_external_id: &str) -> Result<()>;

    /// Objetos de la cache normalizada.
    async fn load_sofie_cache(&self, rundown_external_id: &str) -> Result<Vec<SofieCacheObject>>;
    /// Escribe los objetos cambiados y borra los indicados.
    async fn save_sofie_cache(&self, rundown_external_id: &str, changed: &[SofieCacheObject], removed_ids: &[String]) -> Result<()>;
    async fn remove_sofie_cache(&self, rundown_external_id: &str) -> Result<()>;

    async fn load_model(&self, rundown_id: &RundownId) -> Result<Option<RundownModel>>;
    /// Aplica una escritura completa de forma atómica.
    async fn commit_model(&self, write: &ModelWrite) -> Result<()>;
    async fn remove_model(&self, rundown_id: &RundownId) -> Result<()>;

    async fn load_playout_state(&self, rundown_id: &RundownId) -> Result<PlayoutState>;
}
