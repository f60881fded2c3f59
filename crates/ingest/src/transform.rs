// Archivo: transform.rs
// Propósito: punto de extensión para la lógica de transformación. El motor
// la invoca con el árbol mutable y los dos snapshots del NRCS.
use crate::apply::{apply_default_changes, IdentityPayloads, PayloadTransforms};
use crate::errors::Result;
use crate::grouping::group_rundown_and_changes;
use crate::mutable::MutableIngestRundown;
use async_trait::async_trait;
use rundown_model::{ChangeDescriptor, IngestRundown};
use std::sync::Arc;
use tracing::debug;

/// Lógica de transformación que edita el árbol mutable.
///
/// Puede devolver `IngestError::User` para abortar la operación; en ese caso
/// no se escribe nada.
#[async_trait]
pub trait IngestTransform: Send + Sync {
    async fn process_ingest_data(&self,
                                 mutable: &mut MutableIngestRundown,
                                 nrcs: &IngestRundown,
                                 previous_nrcs: Option<&IngestRundown>,
                                 changes: &ChangeDescriptor)
                                 -> Result<()>;
}

/// Aplica el descriptor con `apply_default_changes`.
#[derive(Clone)]
pub struct DefaultIngestTransform {
    payloads: Arc<dyn PayloadTransforms>,
}

impl DefaultIngestTransform {
    pub fn new() -> Self {
        Self { payloads: Arc::new(IdentityPayloads) }
    }

    pub fn with_payloads(payloads: Arc<dyn PayloadTransforms>) -> Self {
        Self { payloads }
    }
}

impl Default for DefaultIngestTransform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IngestTransform for DefaultIngestTransform {
    async fn process_ingest_data(&self,
                                 mutable: &mut MutableIngestRundown,
                                 nrcs: &IngestRundown,
                                 _previous_nrcs: Option<&IngestRundown>,
                                 changes: &ChangeDescriptor)
                                 -> Result<()> {
        apply_default_changes(mutable, nrcs, changes, self.payloads.as_ref())?;
        Ok(())
    }
}

/// Para fuentes planas: agrupa las historias por nombre y aplica el
/// descriptor recalculado sobre los árboles agrupados.
#[derive(Clone)]
pub struct GroupingTransform {
    separator: String,
    payloads: Arc<dyn PayloadTransforms>,
}

impl GroupingTransform {
    pub fn new(separator: impl Into<String>) -> Self {
        Self { separator: separator.into(), payloads: Arc::new(IdentityPayloads) }
    }

    pub fn with_payloads(mut self, payloads: Arc<dyn PayloadTransforms>) -> Self {
        self.payloads = payloads;
        self
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }
}

#[async_trait]
impl IngestTransform for GroupingTransform {
    async fn process_ingest_data(&self,
                                 mutable: &mut MutableIngestRundown,
                                 nrcs: &IngestRundown,
                                 previous_nrcs: Option<&IngestRundown>,
                                 changes: &ChangeDescriptor)
                                 -> Result<()> {
        let grouped = group_rundown_and_changes(nrcs, previous_nrcs, changes, &self.separator);
        debug!(rundown = %nrcs.external_id,
               segments = grouped.new_grouped.segments.len(),
               renames = grouped.changes.renamed_segment_external_ids.len(),
               "historias agrupadas");
        apply_default_changes(mutable, &grouped.new_grouped, &grouped.changes, self.payloads.as_ref())?;
        Ok(())
    }
}
