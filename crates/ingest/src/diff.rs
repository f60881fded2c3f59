// Archivo: diff.rs
// Propósito: cálculo del `ChangeDescriptor` a partir de dos snapshots del
// NRCS y, opcionalmente, de una pista del transporte.
use rundown_model::{ChangeDescriptor, IngestChangeSource, IngestRundown, IngestSegment, PartChange, RundownChange,
                    SegmentChange, SegmentChangeDetail};
use std::collections::HashSet;

/// Orden relativo de los ids comunes a ambas listas.
fn common_order<'a>(ids: &[&'a str], other: &HashSet<&str>) -> Vec<&'a str> {
    ids.iter().filter(|id| other.contains(*id)).copied().collect()
}

/// `true` si los elementos comunes aparecen en distinto orden relativo.
pub(crate) fn relative_order_changed(old_ids: &[&str], new_ids: &[&str]) -> bool {
    let old_set: HashSet<&str> = old_ids.iter().copied().collect();
    let new_set: HashSet<&str> = new_ids.iter().copied().collect();
    common_order(old_ids, &new_set) != common_order(new_ids, &old_set)
}

pub(crate) fn rundown_fields_changed(old: &IngestRundown, new: &IngestRundown) -> bool {
    old.name != new.name || old.rundown_type != new.rundown_type || old.source != new.source || old.payload != new.payload
}

fn diff_segment(old: &IngestSegment, new: &IngestSegment) -> SegmentChangeDetail {
    let mut detail = SegmentChangeDetail { payload_changed: old.name != new.name || old.payload != new.payload,
                                           ..Default::default() };
    for part in &old.parts {
        if new.part(&part.external_id).is_none() {
            detail.part_changes.insert(part.external_id.clone(), PartChange::Deleted);
        }
    }
    for part in &new.parts {
        match old.part(&part.external_id) {
            None => {
                detail.part_changes.insert(part.external_id.clone(), PartChange::Inserted);
            }
            Some(previous) if previous.name != part.name || previous.payload != part.payload => {
                detail.part_changes.insert(part.external_id.clone(), PartChange::Updated);
            }
            Some(_) => {}
        }
    }
    let structural = detail.part_changes.values().any(|c| *c != PartChange::Updated);
    detail.part_order_changed = structural || relative_order_changed(&old.part_ids(), &new.part_ids());
    detail
}

/// Diff estructural entre dos snapshots del mismo rundown.
///
/// Una parte que cambia de segmento aparece como `Deleted` en el segmento de
/// origen e `Inserted` en el de destino.
pub fn diff_ingest_rundowns(old: &IngestRundown, new: &IngestRundown) -> ChangeDescriptor {
    let mut changes = ChangeDescriptor::new(IngestChangeSource::Ingest);
    if rundown_fields_changed(old, new) {
        changes.rundown_change = Some(RundownChange::PayloadChanged);
    }

    for segment in &old.segments {
        if new.segment(&segment.external_id).is_none() {
            changes.segment_changes.insert(segment.external_id.clone(), SegmentChange::Deleted);
        }
    }
    for segment in &new.segments {
        match old.segment(&segment.external_id) {
            None => {
                changes.segment_changes.insert(segment.external_id.clone(), SegmentChange::InsertedOrUpdated);
            }
            Some(previous) => {
                let detail = diff_segment(previous, segment);
                if !detail.is_empty() {
                    changes.segment_changes.insert(segment.external_id.clone(), SegmentChange::Detail(detail));
                }
            }
        }
    }
    changes.segment_order_changed = relative_order_changed(&old.segment_ids(), &new.segment_ids());
    changes
}

/// Descriptor para pasar de `old` a `new`.
///
/// Sin árbol anterior el resultado siempre es `Regenerate`. Si hay pista se
/// combina como pista fuerte (ver `ChangeDescriptor::merge_hint`).
pub fn compute_changes(old: Option<&IngestRundown>, new: &IngestRundown, hint: Option<&ChangeDescriptor>) -> ChangeDescriptor {
    let source = hint.map(|h| h.source).unwrap_or_default();
    let Some(old) = old else {
        return ChangeDescriptor::regenerate(source);
    };
    let computed = diff_ingest_rundowns(old, new);
    match hint {
        Some(hint) => computed.merge_hint(hint),
        None => computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rundown_model::IngestPart;
    use serde_json::json;

    fn segment(id: &str, parts: &[&str]) -> IngestSegment {
        IngestSegment::new(id, 0.0, id, json!({})).with_parts(parts.iter().map(|p| IngestPart::new(*p, 0.0, *p, json!({}))).collect())
    }

    fn rundown(segments: Vec<IngestSegment>) -> IngestRundown {
        IngestRundown::new("rd", "Show", "external").with_segments(segments)
    }

    #[test]
    fn identical_trees_produce_an_empty_descriptor() {
        let tree = rundown(vec![segment("a", &["p1", "p2"]), segment("b", &[])]);
        assert!(diff_ingest_rundowns(&tree, &tree).is_empty());
    }

    #[test]
    fn moved_part_shows_as_delete_and_insert() {
        let old = rundown(vec![segment("seg0", &["part0", "part1"]), segment("seg1", &["part2"])]);
        let new = rundown(vec![segment("seg0", &["part0"]), segment("seg1", &["part2", "part1"])]);
        let changes = diff_ingest_rundowns(&old, &new);
        let expected = ChangeDescriptor::new(IngestChangeSource::Ingest).with_part_change("seg0", "part1", PartChange::Deleted)
                                                                        .with_part_change("seg1", "part1", PartChange::Inserted);
        assert_eq!(changes, expected);
    }

    #[test]
    fn inserts_do_not_count_as_reorders() {
        let old = rundown(vec![segment("a", &[]), segment("c", &[])]);
        let new = rundown(vec![segment("a", &[]), segment("b", &[]), segment("c", &[])]);
        let changes = diff_ingest_rundowns(&old, &new);
        assert!(!changes.segment_order_changed);
        assert_eq!(changes.segment_changes.get("b"), Some(&SegmentChange::InsertedOrUpdated));

        let swapped = rundown(vec![segment("c", &[]), segment("a", &[])]);
        assert!(diff_ingest_rundowns(&old, &swapped).segment_order_changed);
    }

    #[test]
    fn missing_old_tree_regenerates_even_with_a_hint() {
        let new = rundown(vec![segment("a", &[])]);
        let hint = ChangeDescriptor::new(IngestChangeSource::User).with_segment_change("a", SegmentChange::InsertedOrUpdated);
        let changes = compute_changes(None, &new, Some(&hint));
        assert!(changes.is_regenerate());
        assert_eq!(changes.source, IngestChangeSource::User);
    }

    #[test]
    fn hint_entries_replace_computed_ones() {
        let old = rundown(vec![segment("a", &["p"])]);
        let mut new = old.clone();
        new.segments[0].parts[0].payload = json!({ "v": 1 });
        let hint = ChangeDescriptor::new(IngestChangeSource::Ingest).with_segment_change("a", SegmentChange::InsertedOrUpdated);
        let changes = compute_changes(Some(&old), &new, Some(&hint));
        assert_eq!(changes.segment_changes.get("a"), Some(&SegmentChange::InsertedOrUpdated));
    }
}
