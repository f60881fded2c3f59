use rundown_model::{ChangeDescriptor, IngestChangeSource, PartChange, RundownChange, SegmentChange, SofieCacheObject};
use rundown_model::{IngestPart, IngestRundown, IngestSegment};
use serde_json::json;

#[test]
fn partial_hint_deserializes_with_defaults() {
  let hint: ChangeDescriptor = serde_json::from_value(json!({
    "rundownChange": "payloadChanged",
    "segmentChanges": {
      "s1": "deleted",
      "s2": { "detail": { "partChanges": { "p1": "inserted" } } }
    }
  })).expect("hint");

  assert_eq!(hint.source, IngestChangeSource::Ingest);
  assert_eq!(hint.rundown_change, Some(RundownChange::PayloadChanged));
  assert!(!hint.segment_order_changed);
  assert_eq!(hint.segment_changes.get("s1"), Some(&SegmentChange::Deleted));
  match hint.segment_changes.get("s2") {
    Some(SegmentChange::Detail(detail)) => assert_eq!(detail.part_changes.get("p1"), Some(&PartChange::Inserted)),
    other => panic!("unexpected change: {:?}", other),
  }
}

#[test]
fn cache_objects_round_trip_through_json() {
  let segment = IngestSegment::new("s1", 0.0, "S1", json!({"a": 1})).with_parts(vec![IngestPart::new("p1", 0.0, "P1", json!(null))]);
  let rundown = IngestRundown::new("rd", "Show", "external").with_segments(vec![segment.clone()]);
  let objects = vec![SofieCacheObject::rundown(&rundown),
                     SofieCacheObject::segment("rd", &segment),
                     SofieCacheObject::part("rd", "s1", &segment.parts[0])];

  let json = serde_json::to_value(&objects).expect("serialize");
  assert_eq!(json[2]["type"], "part");
  assert_eq!(json[2]["segmentExternalId"], "s1");

  let back: Vec<SofieCacheObject> = serde_json::from_value(json).expect("deserialize");
  let rebuilt = rundown_model::build_ingest_rundown(&back).expect("build").expect("rundown");
  assert_eq!(rebuilt, rundown);
}
