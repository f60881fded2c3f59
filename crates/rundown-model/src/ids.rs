// ids.rs
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const ID_LEN: usize = 24;

/// Hash estable de una secuencia de componentes. Se separan con `\0` para que
/// `("ab", "c")` y `("a", "bc")` no colisionen.
pub(crate) fn hash_id(components: &[&str]) -> String {
  let mut hasher = Sha256::new();
  for (i, component) in components.iter().enumerate() {
    if i > 0 {
      hasher.update([0u8]);
    }
    hasher.update(component.as_bytes());
  }
  let digest = format!("{:x}", hasher.finalize());
  digest[..ID_LEN].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RundownId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(String);

impl RundownId {
  pub fn from_external_id(rundown_external_id: &str) -> Self {
    Self(hash_id(&["rundown", rundown_external_id]))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl SegmentId {
  /// Id de almacenamiento de un segmento. Sólo depende del rundown y del
  /// `external_id` del segmento.
  pub fn derive(rundown_id: &RundownId, segment_external_id: &str) -> Self {
    Self(hash_id(&["segment", rundown_id.as_str(), segment_external_id]))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl PartId {
  /// Id de almacenamiento de una parte. No incluye el segmento: una parte que
  /// cambia de segmento conserva su identidad.
  pub fn derive(rundown_id: &RundownId, part_external_id: &str) -> Self {
    Self(hash_id(&["part", rundown_id.as_str(), part_external_id]))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for RundownId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Display for SegmentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Display for PartId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
