//! rundown-model: tipos de dominio para la ingesta de rundowns
//!
//! Define el árbol externo (`IngestRundown` → `IngestSegment` → `IngestPart`)
//! tal como lo entrega el NRCS, el descriptor de cambios entre dos snapshots,
//! los documentos persistidos que consume playout y los objetos de la cache
//! normalizada. Todos los ids internos se derivan de forma determinista a
//! partir de los `external_id`.
mod cache;
mod changes;
mod documents;
mod errors;
mod ids;
mod ingest_tree;

pub use cache::{build_ingest_rundown, part_cache_id, rundown_cache_id, segment_cache_id, SofieCacheObject};
pub use changes::{ChangeDescriptor, IngestChangeSource, PartChange, RundownChange, SegmentChange, SegmentChangeDetail};
pub use documents::{DbPart, DbRundown, DbSegment, OrphanedReason, RundownModel};
pub use errors::ModelError;
pub use ids::{PartId, RundownId, SegmentId};
pub use ingest_tree::{IngestPart, IngestRundown, IngestSegment, RundownSource};
