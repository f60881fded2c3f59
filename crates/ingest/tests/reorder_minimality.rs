use ingest::mutable::MutableIngestRundown;
use ingest::reorder::{longest_increasing_subsequence, reconcile_order};
use proptest::prelude::*;
use rundown_model::{IngestRundown, IngestSegment};
use serde_json::json;

fn rundown_with(ids: &[String]) -> MutableIngestRundown {
  let segments = ids.iter().enumerate().map(|(i, id)| IngestSegment::new(id.clone(), i as f64, id.clone(), json!({}))).collect();
  MutableIngestRundown::new(IngestRundown::new("rd", "Show", "external").with_segments(segments), true)
}

/// Longitud de la LIS por programación dinámica O(n²), independiente de la
/// implementación del crate.
fn lis_len(sequence: &[usize]) -> usize {
  let mut best = vec![1usize; sequence.len()];
  for i in 0..sequence.len() {
    for j in 0..i {
      if sequence[j] < sequence[i] {
        best[i] = best[i].max(best[j] + 1);
      }
    }
  }
  best.into_iter().max().unwrap_or(0)
}

#[test]
fn swapping_ends_takes_two_moves() {
  let ids: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
  let mut rundown = rundown_with(&ids);
  let moves = reconcile_order(&mut rundown, &["D", "B", "C", "A"]).expect("reorder");
  assert_eq!(moves, 2);
  assert_eq!(rundown.segment_ids(), vec!["D", "B", "C", "A"]);
}

#[test]
fn lis_matches_reference_on_fixed_input() {
  let sequence = [3, 1, 4, 1, 5, 9, 2, 6];
  let lis = longest_increasing_subsequence(&sequence);
  assert_eq!(lis.len(), lis_len(&sequence));
  assert!(lis.windows(2).all(|w| w[0] < w[1] && sequence[w[0]] < sequence[w[1]]));
}

proptest! {
  #[test]
  fn moves_equal_len_minus_lis(permutation in (1usize..12).prop_flat_map(|n| Just((0..n).collect::<Vec<usize>>()).prop_shuffle())) {
    let ids: Vec<String> = (0..permutation.len()).map(|i| format!("s{}", i)).collect();
    let mut rundown = rundown_with(&ids);
    let new_order: Vec<&str> = permutation.iter().map(|i| ids[*i].as_str()).collect();

    let moves = reconcile_order(&mut rundown, &new_order).expect("reorder");

    prop_assert_eq!(rundown.segment_ids(), new_order);
    prop_assert_eq!(moves, permutation.len() - lis_len(&permutation));
  }
}
