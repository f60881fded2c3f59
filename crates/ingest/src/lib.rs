//! Crate `ingest` — motor de reconciliación de ingesta de rundowns
//!
//! Recibe snapshots (o ediciones incrementales) de un sistema editorial
//! externo (NRCS), calcula qué cambió, deja que una lógica de transformación
//! edite un árbol interno con seguimiento de cambios y persiste sólo el
//! mínimo necesario en el modelo que consume playout.
//!
//! Diseño resumido:
//! - Un lock exclusivo por rundown (`RundownLockManager`) ordena todas las
//!   operaciones sobre él; rundowns distintos avanzan en paralelo.
//! - `MutableIngestRundown` registra qué nodos cambiaron y lo entrega una
//!   sola vez con `drain_changes`.
//! - `apply_default_changes` traduce un `ChangeDescriptor` a llamadas sobre
//!   el árbol mutable con el mínimo de movimientos (LIS).
//! - Los nodos borrados que siguen en el aire quedan huérfanos en lugar de
//!   eliminarse.
//!
//! Ejemplo rápido:
//! ```rust
//! use ingest::stubs::InMemoryIngestRepository;
//! use ingest::{IngestConfig, IngestService};
//! use std::sync::Arc;
//! let repo = Arc::new(InMemoryIngestRepository::new());
//! let service = IngestService::new(repo, IngestConfig::default());
//! ```
pub mod apply;
pub mod commit;
pub mod config;
pub mod diff;
pub mod engine;
pub mod errors;
pub mod grouping;
pub mod lock;
pub mod mutable;
pub mod reorder;
pub mod repository;
pub mod service;
pub mod stubs;
pub mod transform;

pub use apply::{apply_default_changes, AppliedChanges, IdentityPayloads, PayloadTransforms, TreeOp};
pub use commit::{CommitData, ModelDiff, SegmentUpdate};
pub use config::{IngestConfig, DEFAULT_PART_SEPARATOR};
pub use diff::{compute_changes, diff_ingest_rundowns};
pub use engine::{IngestEngine, IngestUpdate};
pub use errors::*;
pub use lock::{RundownLockGuard, RundownLockManager};
pub use mutable::{MutableIngestPart, MutableIngestRundown, MutableIngestSegment, RundownChangesInfo, SegmentChangesInfo};
pub use reorder::{longest_increasing_subsequence, reconcile_order};
pub use repository::{IngestRepository, ModelWrite, PlayoutState};
pub use service::IngestService;
pub use stubs::InMemoryIngestRepository;
pub use transform::{DefaultIngestTransform, GroupingTransform, IngestTransform};
