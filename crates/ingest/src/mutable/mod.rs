// Archivo: mutable/mod.rs
// Propósito: árbol interno mutable con seguimiento de cambios. Es lo único
// que la lógica de transformación puede tocar; recuerda qué nodos cambiaron
// y lo entrega una sola vez mediante `drain_changes`.
mod part;
mod rundown;
mod segment;

pub use part::MutableIngestPart;
pub use rundown::{MutableIngestRundown, RundownChangesInfo};
pub use segment::{MutableIngestSegment, SegmentChangesInfo};

use crate::errors::{IngestError, NodeKind, Result};
use serde_json::{Map, Value as JsonValue};

/// Nodo identificado por su `external_id` dentro de una lista ordenada de
/// hermanos.
pub(crate) trait Keyed {
    fn key(&self) -> &str;
}

pub(crate) fn index_of<T: Keyed>(items: &[T], id: &str) -> Option<usize> {
    items.iter().position(|item| item.key() == id)
}

fn require_index<T: Keyed>(items: &[T], kind: NodeKind, id: &str) -> Result<usize> {
    index_of(items, id).ok_or_else(|| IngestError::not_found(kind, id))
}

fn check_target<T: Keyed>(items: &[T], kind: NodeKind, id: &str, target: Option<&str>) -> Result<()> {
    if let Some(target) = target {
        if target == id {
            return Err(IngestError::RelativeToSelf { kind, id: id.to_string() });
        }
        require_index(items, kind, target)?;
    }
    Ok(())
}

/// Mueve `id` justo antes de `before` (`None` = al final). Devuelve si la
/// posición cambió.
pub(crate) fn move_before<T: Keyed>(items: &mut Vec<T>, kind: NodeKind, id: &str, before: Option<&str>) -> Result<bool> {
    let from = require_index(items, kind, id)?;
    check_target(items, kind, id, before)?;
    let item = items.remove(from);
    let to = match before {
        Some(target) => require_index(items, kind, target)?,
        None => items.len(),
    };
    items.insert(to, item);
    Ok(to != from)
}

/// Mueve `id` justo después de `after` (`None` = al principio). Devuelve si
/// la posición cambió.
pub(crate) fn move_after<T: Keyed>(items: &mut Vec<T>, kind: NodeKind, id: &str, after: Option<&str>) -> Result<bool> {
    let from = require_index(items, kind, id)?;
    check_target(items, kind, id, after)?;
    let item = items.remove(from);
    let to = match after {
        Some(target) => require_index(items, kind, target)? + 1,
        None => 0,
    };
    items.insert(to, item);
    Ok(to != from)
}

/// Asigna (`Some`) o elimina (`None`) una clave de primer nivel del payload.
/// Un payload que no es objeto se sustituye por uno vacío antes de asignar.
/// Devuelve si el payload cambió.
pub(crate) fn set_payload_property(payload: &mut JsonValue, key: &str, value: Option<JsonValue>) -> bool {
    match value {
        Some(value) => {
            if !payload.is_object() {
                *payload = JsonValue::Object(Map::new());
            }
            match payload.as_object_mut() {
                Some(object) if object.get(key) != Some(&value) => {
                    object.insert(key.to_string(), value);
                    true
                }
                _ => false,
            }
        }
        None => payload.as_object_mut().map(|object| object.remove(key).is_some()).unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Item(&'static str);

    impl Keyed for Item {
        fn key(&self) -> &str {
            self.0
        }
    }

    fn keys(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.0).collect()
    }

    #[test]
    fn move_before_and_after_respect_none_targets() -> Result<()> {
        let mut items = vec![Item("a"), Item("b"), Item("c")];
        assert!(move_before(&mut items, NodeKind::Segment, "a", None)?);
        assert_eq!(keys(&items), vec!["b", "c", "a"]);
        assert!(move_after(&mut items, NodeKind::Segment, "a", None)?);
        assert_eq!(keys(&items), vec!["a", "b", "c"]);
        assert!(!move_before(&mut items, NodeKind::Segment, "b", Some("c"))?);
        Ok(())
    }

    #[test]
    fn moving_relative_to_self_is_rejected() {
        let mut items = vec![Item("a"), Item("b")];
        let err = move_before(&mut items, NodeKind::Part, "a", Some("a"));
        assert!(matches!(err, Err(IngestError::RelativeToSelf { .. })));
        let err = move_after(&mut items, NodeKind::Part, "a", Some("missing"));
        assert!(matches!(err, Err(IngestError::NotFound { .. })));
        assert_eq!(keys(&items), vec!["a", "b"]);
    }

    #[test]
    fn payload_property_set_and_clear() {
        let mut payload = JsonValue::Null;
        assert!(set_payload_property(&mut payload, "k", Some(json!(1))));
        assert!(!set_payload_property(&mut payload, "k", Some(json!(1))));
        assert!(set_payload_property(&mut payload, "k", None));
        assert!(!set_payload_property(&mut payload, "k", None));
        assert_eq!(payload, json!({}));
    }
}
