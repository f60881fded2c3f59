// Archivo: grouping.rs
// Propósito: adaptador para fuentes planas. Agrupa una lista de historias en
// segmentos sintéticos según el nombre y recalcula el descriptor de cambios en
// el espacio agrupado.
use crate::diff::{relative_order_changed, rundown_fields_changed};
use indexmap::IndexMap;
use rundown_model::{ChangeDescriptor, IngestPart, IngestRundown, IngestSegment, RundownChange, SegmentChange};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Clave de agrupado: el texto previo al primer separador (o el nombre
/// entero), sin espacios en los extremos.
pub fn group_key<'a>(name: &'a str, separator: &str) -> &'a str {
    if separator.is_empty() {
        return name.trim();
    }
    name.split_once(separator).map(|(key, _)| key).unwrap_or(name).trim()
}

/// Id externo de un segmento sintético.
pub fn grouped_segment_external_id(rundown_external_id: &str, first_part_external_id: &str) -> String {
    format!("{}_{}", rundown_external_id, first_part_external_id)
}

/// Historias de una fuente plana, en orden.
pub fn flatten_stories(rundown: &IngestRundown) -> Vec<IngestPart> {
    rundown.segments.iter().flat_map(|s| s.parts.iter().cloned()).collect()
}

/// Agrupa partes consecutivas con la misma clave en un segmento. Los ranks
/// resultantes son posicionales.
pub fn group_parts_into_segments(rundown_external_id: &str, parts: &[IngestPart], separator: &str) -> Vec<IngestSegment> {
    let mut segments: Vec<IngestSegment> = Vec::new();
    let mut current_key: Option<&str> = None;
    for part in parts {
        let key = group_key(&part.name, separator);
        if current_key != Some(key) {
            let rank = segments.len() as f64;
            segments.push(IngestSegment::new(grouped_segment_external_id(rundown_external_id, &part.external_id),
                                             rank,
                                             key,
                                             JsonValue::Null));
            current_key = Some(key);
        }
        if let Some(segment) = segments.last_mut() {
            let mut part = part.clone();
            part.rank = segment.parts.len() as f64;
            segment.parts.push(part);
        }
    }
    segments
}

/// Versión agrupada de un rundown plano.
pub fn group_rundown(rundown: &IngestRundown, separator: &str) -> IngestRundown {
    let mut grouped = rundown.without_segments();
    grouped.segments = group_parts_into_segments(&rundown.external_id, &flatten_stories(rundown), separator);
    grouped
}

/// Diff entre dos árboles agrupados.
///
/// Un segmento sintético nuevo que comparte al menos una parte con uno
/// desaparecido se informa como renombre; si no comparte ninguna es borrado
/// más inserción. Los candidatos se emparejan en orden original.
pub fn diff_grouped_rundowns(old: &IngestRundown, new: &IngestRundown) -> ChangeDescriptor {
    let mut changes = ChangeDescriptor::default();
    if rundown_fields_changed(old, new) {
        changes.rundown_change = Some(RundownChange::PayloadChanged);
    }

    let old_ids: HashSet<&str> = old.segment_ids().into_iter().collect();
    let new_ids: HashSet<&str> = new.segment_ids().into_iter().collect();
    let mut vanished: Vec<&IngestSegment> = old.segments.iter().filter(|s| !new_ids.contains(s.external_id.as_str())).collect();

    let mut renames: IndexMap<&str, &IngestSegment> = IndexMap::new();
    for segment in new.segments.iter().filter(|s| !old_ids.contains(s.external_id.as_str())) {
        let parts: HashSet<&str> = segment.part_ids().into_iter().collect();
        if let Some(index) = vanished.iter().position(|o| o.parts.iter().any(|p| parts.contains(p.external_id.as_str()))) {
            let previous = vanished.remove(index);
            changes.renamed_segment_external_ids.insert(previous.external_id.clone(), segment.external_id.clone());
            renames.insert(segment.external_id.as_str(), previous);
        }
    }

    for segment in &vanished {
        changes.segment_changes.insert(segment.external_id.clone(), SegmentChange::Deleted);
    }

    for segment in &new.segments {
        let previous = old.segment(&segment.external_id).or_else(|| renames.get(segment.external_id.as_str()).copied());
        let changed = match previous {
            Some(previous) => previous.name != segment.name || previous.payload != segment.payload || previous.parts != segment.parts,
            None => true,
        };
        if changed {
            changes.segment_changes.insert(segment.external_id.clone(), SegmentChange::InsertedOrUpdated);
        }
    }

    let old_order: Vec<&str> = old.segments
                                  .iter()
                                  .map(|s| {
                                      changes.renamed_segment_external_ids
                                             .get(&s.external_id)
                                             .map(String::as_str)
                                             .unwrap_or(s.external_id.as_str())
                                  })
                                  .collect();
    changes.segment_order_changed = relative_order_changed(&old_order, &new.segment_ids());
    changes
}

/// Resultado de `group_rundown_and_changes`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedChanges {
    pub new_grouped: IngestRundown,
    pub old_grouped: Option<IngestRundown>,
    pub changes: ChangeDescriptor,
}

/// Agrupa el árbol nuevo (y el anterior, si existe) y deriva el descriptor
/// en el espacio agrupado. `Regenerate` y `PayloadChanged` de la pista pasan
/// tal cual; las entradas por segmento de la pista se refieren a la fuente
/// plana y no se usan.
pub fn group_rundown_and_changes(nrcs: &IngestRundown,
                                 previous: Option<&IngestRundown>,
                                 hint: &ChangeDescriptor,
                                 separator: &str)
                                 -> GroupedChanges {
    let new_grouped = group_rundown(nrcs, separator);
    let old_grouped = previous.map(|p| group_rundown(p, separator));
    let changes = match &old_grouped {
        Some(old) if !hint.is_regenerate() => {
            let mut changes = diff_grouped_rundowns(old, &new_grouped);
            changes.source = hint.source;
            if hint.rundown_change.is_some() {
                changes.rundown_change = hint.rundown_change;
            }
            changes
        }
        _ => ChangeDescriptor::regenerate(hint.source),
    };
    GroupedChanges { new_grouped, old_grouped, changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stories(names: &[(&str, &str)]) -> Vec<IngestPart> {
        names.iter().enumerate().map(|(i, (id, name))| IngestPart::new(*id, i as f64, *name, json!({}))).collect()
    }

    fn flat(parts: Vec<IngestPart>) -> IngestRundown {
        IngestRundown::new("rd", "Show", "flat").with_segments(vec![IngestSegment::new("all", 0.0, "all", json!({})).with_parts(parts)])
    }

    #[test]
    fn groups_consecutive_runs_by_key() {
        let parts = stories(&[("a", "S1;P1"), ("b", "S1;P2"), ("c", "S2;P1")]);
        let segments = group_parts_into_segments("rd", &parts, ";");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].external_id, "rd_a");
        assert_eq!(segments[0].name, "S1");
        assert_eq!(segments[0].part_ids(), vec!["a", "b"]);
        assert_eq!(segments[1].external_id, "rd_c");
        assert_eq!(segments[1].name, "S2");
        assert_eq!(segments[1].rank, 1.0);
    }

    #[test]
    fn key_without_separator_is_the_whole_name() {
        assert_eq!(group_key("  Titulares  ", ";"), "Titulares");
        assert_eq!(group_key("Deportes ; gol", ";"), "Deportes");
    }

    #[test]
    fn non_adjacent_runs_stay_separate() {
        let parts = stories(&[("a", "S1;x"), ("b", "S2;x"), ("c", "S1;y")]);
        let ids: Vec<String> = group_parts_into_segments("rd", &parts, ";").into_iter().map(|s| s.external_id).collect();
        assert_eq!(ids, vec!["rd_a", "rd_b", "rd_c"]);
    }

    #[test]
    fn regrouping_unchanged_list_is_a_no_op() {
        let tree = flat(stories(&[("a", "S1;P1"), ("b", "S1;P2"), ("c", "S2;P1")]));
        let grouped = group_rundown(&tree, ";");
        assert!(diff_grouped_rundowns(&grouped, &group_rundown(&tree, ";")).is_empty());
    }

    #[test]
    fn losing_the_first_part_is_a_rename() {
        let old = group_rundown(&flat(stories(&[("a", "S1;P1"), ("b", "S1;P2"), ("c", "S2;P1")])), ";");
        let new = group_rundown(&flat(stories(&[("b", "S1;P2"), ("c", "S2;P1")])), ";");
        let changes = diff_grouped_rundowns(&old, &new);
        assert_eq!(changes.renamed_segment_external_ids.get("rd_a").map(String::as_str), Some("rd_b"));
        assert_eq!(changes.segment_changes.get("rd_b"), Some(&SegmentChange::InsertedOrUpdated));
        assert!(!changes.segment_changes.contains_key("rd_c"));
        assert!(!changes.segment_order_changed);
    }

    #[test]
    fn replacing_every_part_is_delete_plus_insert() {
        let old = group_rundown(&flat(stories(&[("a", "S1;P1")])), ";");
        let new = group_rundown(&flat(stories(&[("z", "S1;P1")])), ";");
        let changes = diff_grouped_rundowns(&old, &new);
        assert!(changes.renamed_segment_external_ids.is_empty());
        assert_eq!(changes.segment_changes.get("rd_a"), Some(&SegmentChange::Deleted));
        assert_eq!(changes.segment_changes.get("rd_z"), Some(&SegmentChange::InsertedOrUpdated));
    }

    #[test]
    fn regenerate_hint_passes_through() {
        let tree = flat(stories(&[("a", "S1;P1")]));
        let hint = ChangeDescriptor::regenerate(Default::default());
        let grouped = group_rundown_and_changes(&tree, Some(&tree), &hint, ";");
        assert!(grouped.changes.is_regenerate());
        let first = group_rundown_and_changes(&tree, None, &ChangeDescriptor::default(), ";");
        assert!(first.changes.is_regenerate());
        assert!(first.old_grouped.is_none());
    }
}
