// changes.rs
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Procedencia de un cambio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum IngestChangeSource {
  /// Cambio automático recibido del NRCS.
  #[default]
  Ingest,
  /// Operación explícita de un usuario.
  User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RundownChange {
  /// Cambió el nombre/tipo/payload del rundown.
  PayloadChanged,
  /// Reconstrucción completa; anula cualquier otra pista.
  Regenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartChange {
  Inserted,
  Updated,
  Deleted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentChangeDetail {
  #[serde(default)]
  pub part_order_changed: bool,
  #[serde(default)]
  pub payload_changed: bool,
  #[serde(default)]
  pub part_changes: IndexMap<String, PartChange>,
}

impl SegmentChangeDetail {
  pub fn is_empty(&self) -> bool {
    !self.part_order_changed && !self.payload_changed && self.part_changes.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentChange {
  Deleted,
  InsertedOrUpdated,
  Detail(SegmentChangeDetail),
}

/// Descripción de la transición entre dos snapshots de un rundown.
///
/// Las entradas de `segment_changes` y `part_changes` son pistas: quien las
/// aplica tolera un `Deleted` sobre un id inexistente, pero un
/// `InsertedOrUpdated`/`Updated` sobre un id ausente del árbol nuevo es un
/// error de contrato.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDescriptor {
  #[serde(default)]
  pub source: IngestChangeSource,
  #[serde(default)]
  pub rundown_change: Option<RundownChange>,
  #[serde(default)]
  pub segment_order_changed: bool,
  #[serde(default)]
  pub renamed_segment_external_ids: IndexMap<String, String>,
  #[serde(default)]
  pub segment_changes: IndexMap<String, SegmentChange>,
}

impl ChangeDescriptor {
  pub fn new(source: IngestChangeSource) -> Self {
    Self { source, ..Default::default() }
  }

  /// Descriptor que fuerza la reconstrucción completa.
  pub fn regenerate(source: IngestChangeSource) -> Self {
    Self { source, rundown_change: Some(RundownChange::Regenerate), ..Default::default() }
  }

  pub fn is_regenerate(&self) -> bool {
    self.rundown_change == Some(RundownChange::Regenerate)
  }

  /// `true` si el descriptor no pide ninguna mutación.
  pub fn is_empty(&self) -> bool {
    self.rundown_change.is_none()
    && !self.segment_order_changed
    && self.renamed_segment_external_ids.is_empty()
    && self.segment_changes.values().all(|c| matches!(c, SegmentChange::Detail(d) if d.is_empty()))
  }

  pub fn with_segment_change(mut self, segment_external_id: impl Into<String>, change: SegmentChange) -> Self {
    self.segment_changes.insert(segment_external_id.into(), change);
    self
  }

  /// Registra un cambio de parte, creando (o reutilizando) el `Detail` del
  /// segmento. Si el segmento ya estaba marcado como `InsertedOrUpdated` o
  /// `Deleted`, esa marca gruesa se respeta.
  pub fn with_part_change(mut self,
                          segment_external_id: impl Into<String>,
                          part_external_id: impl Into<String>,
                          change: PartChange)
                          -> Self {
    let entry = self.segment_changes
                    .entry(segment_external_id.into())
                    .or_insert_with(|| SegmentChange::Detail(SegmentChangeDetail::default()));
    if let SegmentChange::Detail(detail) = entry {
      detail.part_changes.insert(part_external_id.into(), change);
      if change != PartChange::Updated {
        detail.part_order_changed = true;
      }
    }
    self
  }

  pub fn with_segment_order_changed(mut self) -> Self {
    self.segment_order_changed = true;
    self
  }

  pub fn with_renamed_segment(mut self, old_external_id: impl Into<String>, new_external_id: impl Into<String>) -> Self {
    self.renamed_segment_external_ids.insert(old_external_id.into(), new_external_id.into());
    self
  }

  /// Combina un descriptor calculado con una pista fuerte del transporte.
  ///
  /// `Regenerate` gana siempre, los flags de orden se combinan con OR, los
  /// renombres se unen y las entradas de segmento de la pista reemplazan a
  /// las calculadas.
  pub fn merge_hint(mut self, hint: &ChangeDescriptor) -> Self {
    self.source = hint.source;
    if hint.is_regenerate() || self.is_regenerate() {
      return Self::regenerate(hint.source);
    }
    if hint.rundown_change.is_some() {
      self.rundown_change = hint.rundown_change;
    }
    self.segment_order_changed |= hint.segment_order_changed;
    for (old, new) in &hint.renamed_segment_external_ids {
      self.renamed_segment_external_ids.insert(old.clone(), new.clone());
    }
    for (segment_id, change) in &hint.segment_changes {
      self.segment_changes.insert(segment_id.clone(), change.clone());
    }
    self
  }
}
