use ingest::apply::{apply_default_changes, IdentityPayloads, TreeOp};
use ingest::errors::{IngestError, NodeKind};
use ingest::grouping::{group_rundown, group_rundown_and_changes};
use ingest::mutable::MutableIngestRundown;
use ingest::repository::IngestRepository;
use ingest::stubs::InMemoryIngestRepository;
use ingest::{compute_changes, IngestConfig, IngestService, DEFAULT_PART_SEPARATOR};
use rundown_model::{ChangeDescriptor, IngestChangeSource, IngestPart, IngestRundown, IngestSegment, PartChange, RundownId,
                    SegmentId};
use serde_json::json;
use std::sync::Arc;

fn flat(stories: &[(&str, &str)]) -> IngestRundown {
  let parts = stories.iter().enumerate().map(|(i, (id, name))| IngestPart::new(*id, i as f64, *name, json!({}))).collect();
  IngestRundown::new("rd", "Show", "flat").with_segments(vec![IngestSegment::new("stories", 0.0, "stories", json!({})).with_parts(parts)])
}

#[test]
fn grouping_is_deterministic_and_idempotent() {
  let nrcs = flat(&[("a", "S1;P1"), ("b", "S1;P2"), ("c", "S2;P1")]);
  let grouped = group_rundown(&nrcs, DEFAULT_PART_SEPARATOR);
  assert_eq!(grouped.segments.len(), 2);
  assert_eq!(grouped, group_rundown(&nrcs, DEFAULT_PART_SEPARATOR));

  let again = group_rundown_and_changes(&nrcs, Some(&nrcs), &ChangeDescriptor::default(), DEFAULT_PART_SEPARATOR);
  assert!(again.changes.is_empty());
}

#[tokio::test]
async fn grouping_engine_persists_synthetic_segments() {
  let repo = Arc::new(InMemoryIngestRepository::new());
  let config = IngestConfig { part_name_separator: Some(DEFAULT_PART_SEPARATOR.to_string()), ..Default::default() };
  let service = IngestService::new(repo.clone(), config);

  let nrcs = flat(&[("a", "S1;P1"), ("b", "S1;P2"), ("c", "S2;P1")]);
  service.ingest_rundown(nrcs.clone(), None).await.expect("ingest");
  let model = repo.load_model(&RundownId::from_external_id("rd")).await.expect("load").expect("model");
  let names: Vec<&str> = model.sorted_segments().iter().map(|s| s.name.as_str()).collect();
  assert_eq!(names, vec!["S1", "S2"]);
  assert_eq!(model.parts.len(), 3);

  let commits = repo.model_commits();
  service.ingest_rundown(nrcs, None).await.expect("re-ingest");
  assert_eq!(repo.model_commits(), commits);
}

#[tokio::test]
async fn deleting_leading_story_renames_grouped_segment() {
  let repo = Arc::new(InMemoryIngestRepository::new());
  let config = IngestConfig { part_name_separator: Some(DEFAULT_PART_SEPARATOR.to_string()), ..Default::default() };
  let service = IngestService::new(repo.clone(), config);
  let rundown_id = RundownId::from_external_id("rd");
  let (rd_a, rd_b) = (SegmentId::derive(&rundown_id, "rd_a"), SegmentId::derive(&rundown_id, "rd_b"));

  service.ingest_rundown(flat(&[("a", "S1;P1"), ("b", "S1;P2"), ("c", "S2;P1")]), None).await.expect("ingest");
  let created_at = repo.load_model(&rundown_id).await.expect("load").expect("model").segment(&rd_a).expect("rd_a").created_at;

  let shorter = flat(&[("b", "S1;P2"), ("c", "S2;P1")]);
  let commit = service.ingest_rundown(shorter.clone(), None).await.expect("re-ingest");
  assert_eq!(commit.renamed_segments.get(&rd_a), Some(&rd_b));

  let model = repo.load_model(&rundown_id).await.expect("load").expect("model");
  assert!(model.segment(&rd_a).is_none());
  let renamed = model.segment(&rd_b).expect("rd_b");
  assert_eq!(renamed.name, "S1");
  assert_eq!(renamed.created_at, created_at);
  let parts: Vec<&str> = model.parts_in_segment(&rd_b).iter().map(|p| p.external_id.as_str()).collect();
  assert_eq!(parts, vec!["b"]);
  assert_eq!(model.parts.len(), 2);

  let commits = repo.model_commits();
  service.ingest_rundown(shorter, None).await.expect("same tree");
  assert_eq!(repo.model_commits(), commits);
}

#[test]
fn moving_a_part_is_one_remove_and_one_replace() {
  let old = IngestRundown::new("rd", "Show", "external").with_segments(vec![IngestSegment::new("s1", 0.0, "S1", json!({})).with_parts(vec![IngestPart::new("x", 0.0, "X", json!({}))]),
                                                                           IngestSegment::new("s2", 1.0, "S2", json!({}))]);
  let new = IngestRundown::new("rd", "Show", "external").with_segments(vec![IngestSegment::new("s1", 0.0, "S1", json!({})),
                                                                           IngestSegment::new("s2", 1.0, "S2", json!({})).with_parts(vec![IngestPart::new("x", 0.0, "X", json!({}))])]);
  let changes = compute_changes(Some(&old), &new, None);
  let mut mutable = MutableIngestRundown::new(old, true);
  let applied = apply_default_changes(&mut mutable, &new, &changes, &IdentityPayloads).expect("apply");

  let removes = applied.ops.iter().filter(|op| matches!(op, TreeOp::RemovePart { .. })).count();
  let replaces = applied.ops.iter().filter(|op| matches!(op, TreeOp::ReplacePart { .. })).count();
  assert_eq!((removes, replaces), (1, 1));
  assert_eq!(mutable.to_ingest_rundown().segments, new.segments);
}

#[test]
fn updated_part_missing_from_new_tree_is_not_found() {
  let tree = IngestRundown::new("rd", "Show", "external").with_segments(vec![IngestSegment::new("s1", 0.0, "S1", json!({}))]);
  let hint = ChangeDescriptor::new(IngestChangeSource::Ingest).with_part_change("s1", "ghost", PartChange::Updated);
  let mut mutable = MutableIngestRundown::new(tree.clone(), true);
  let result = apply_default_changes(&mut mutable, &tree, &hint, &IdentityPayloads);
  assert!(matches!(result, Err(IngestError::NotFound { kind: NodeKind::Part, .. })));

  let deleted = ChangeDescriptor::new(IngestChangeSource::Ingest).with_part_change("s1", "ghost", PartChange::Deleted);
  let applied = apply_default_changes(&mut mutable, &tree, &deleted, &IdentityPayloads).expect("tolerated");
  assert!(applied.ops.is_empty());
}
