// Archivo: reorder.rs
// Propósito: reconciliación de orden entre hermanos con el mínimo de
// movimientos. Se comparte entre segmentos (dentro del rundown) y partes
// (dentro de un segmento).
use crate::errors::Result;
use crate::mutable::{MutableIngestRundown, MutableIngestSegment};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Lista ordenada de hijos que se puede reordenar con `move_before` /
/// `move_after`.
pub trait OrderedChildren {
    fn child_ids(&self) -> Vec<String>;
    /// `None` = al final. Devuelve si la posición cambió.
    fn move_child_before(&mut self, id: &str, before: Option<&str>) -> Result<bool>;
    /// `None` = al principio. Devuelve si la posición cambió.
    fn move_child_after(&mut self, id: &str, after: Option<&str>) -> Result<bool>;
}

impl OrderedChildren for MutableIngestRundown {
    fn child_ids(&self) -> Vec<String> {
        self.segment_ids().into_iter().map(str::to_string).collect()
    }

    fn move_child_before(&mut self, id: &str, before: Option<&str>) -> Result<bool> {
        self.move_segment_before(id, before)
    }

    fn move_child_after(&mut self, id: &str, after: Option<&str>) -> Result<bool> {
        self.move_segment_after(id, after)
    }
}

impl OrderedChildren for MutableIngestSegment {
    fn child_ids(&self) -> Vec<String> {
        self.part_ids().into_iter().map(str::to_string).collect()
    }

    fn move_child_before(&mut self, id: &str, before: Option<&str>) -> Result<bool> {
        self.move_part_before(id, before)
    }

    fn move_child_after(&mut self, id: &str, after: Option<&str>) -> Result<bool> {
        self.move_part_after(id, after)
    }
}

/// Posiciones (dentro de `sequence`) de una subsecuencia estrictamente
/// creciente de longitud máxima. Ante empates se queda con la primera que
/// encuentra, de modo que el resultado es determinista.
pub fn longest_increasing_subsequence(sequence: &[usize]) -> Vec<usize> {
    // tails[k] = posición del menor final de una subsecuencia de longitud k+1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; sequence.len()];
    for (i, value) in sequence.iter().enumerate() {
        let slot = tails.partition_point(|&t| sequence[t] < *value);
        if slot > 0 {
            previous[i] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }
    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        result.push(i);
        cursor = previous[i];
    }
    result.reverse();
    result
}

/// Reordena los hijos de `target` para que sigan `new_order`.
///
/// Sólo participan los ids presentes en ambos lados; los de `new_order` que
/// el árbol no conoce se ignoran. Los ids que forman la subsecuencia más
/// larga ya ordenada no se tocan; el resto se mueve recorriendo `new_order`
/// de atrás hacia delante. Los ids que sólo existen en el árbol vuelven
/// detrás de su predecesor original (o al principio).
///
/// Devuelve el número de movimientos efectivos.
pub fn reconcile_order<T: OrderedChildren>(target: &mut T, new_order: &[&str]) -> Result<usize> {
    let old_order = target.child_ids();
    let old_index: HashMap<&str, usize> = old_order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();

    let mut seen = HashSet::new();
    let mut common: Vec<&str> = Vec::with_capacity(new_order.len());
    for id in new_order {
        if !old_index.contains_key(id) {
            debug!(id = %id, "id desconocido en el nuevo orden; se ignora");
            continue;
        }
        if seen.insert(*id) {
            common.push(*id);
        }
    }

    let positions: Vec<usize> = common.iter().map(|id| old_index[id]).collect();
    let keep: HashSet<&str> = longest_increasing_subsequence(&positions).into_iter().map(|i| common[i]).collect();

    let mut moves = 0;
    let mut anchor: Option<&str> = None;
    for id in common.iter().rev() {
        if !keep.contains(id) && !is_immediately_before(&target.child_ids(), id, anchor) && target.move_child_before(id, anchor)? {
            moves += 1;
        }
        anchor = Some(*id);
    }

    let new_ids: HashSet<&str> = common.iter().copied().collect();
    for (i, id) in old_order.iter().enumerate() {
        if new_ids.contains(id.as_str()) {
            continue;
        }
        let predecessor = if i == 0 { None } else { Some(old_order[i - 1].as_str()) };
        if target.move_child_after(id, predecessor)? {
            moves += 1;
        }
    }
    Ok(moves)
}

fn is_immediately_before(ids: &[String], id: &str, anchor: Option<&str>) -> bool {
    let Some(position) = ids.iter().position(|x| x == id) else {
        return false;
    };
    match anchor {
        Some(anchor) => ids.get(position + 1).map(|next| next == anchor).unwrap_or(false),
        None => position + 1 == ids.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lista simple que cuenta las llamadas de movimiento.
    struct Children {
        ids: Vec<String>,
        calls: Vec<String>,
    }

    impl Children {
        fn new(ids: &[&str]) -> Self {
            Self { ids: ids.iter().map(|s| s.to_string()).collect(), calls: Vec::new() }
        }
    }

    impl OrderedChildren for Children {
        fn child_ids(&self) -> Vec<String> {
            self.ids.clone()
        }

        fn move_child_before(&mut self, id: &str, before: Option<&str>) -> Result<bool> {
            self.calls.push(format!("before:{}", id));
            let from = self.ids.iter().position(|x| x == id).unwrap_or(0);
            let item = self.ids.remove(from);
            let to = before.and_then(|b| self.ids.iter().position(|x| x == b)).unwrap_or(self.ids.len());
            self.ids.insert(to, item);
            Ok(to != from)
        }

        fn move_child_after(&mut self, id: &str, after: Option<&str>) -> Result<bool> {
            self.calls.push(format!("after:{}", id));
            let from = self.ids.iter().position(|x| x == id).unwrap_or(0);
            let item = self.ids.remove(from);
            let to = after.and_then(|a| self.ids.iter().position(|x| x == a).map(|i| i + 1)).unwrap_or(0);
            self.ids.insert(to, item);
            Ok(to != from)
        }
    }

    #[test]
    fn lis_picks_longest_run() {
        assert_eq!(longest_increasing_subsequence(&[3, 1, 2, 0]), vec![1, 2]);
        assert!(longest_increasing_subsequence(&[]).is_empty());
    }

    #[test]
    fn swap_of_ends_takes_two_moves() -> Result<()> {
        let mut children = Children::new(&["A", "B", "C", "D"]);
        let moves = reconcile_order(&mut children, &["D", "B", "C", "A"])?;
        assert_eq!(children.ids, vec!["D", "B", "C", "A"]);
        assert_eq!(moves, 2);
        assert_eq!(children.calls, vec!["before:A", "before:D"]);
        Ok(())
    }

    #[test]
    fn same_order_makes_no_calls() -> Result<()> {
        let mut children = Children::new(&["A", "B", "C"]);
        assert_eq!(reconcile_order(&mut children, &["A", "B", "C"])?, 0);
        assert!(children.calls.is_empty());
        Ok(())
    }

    #[test]
    fn unknown_ids_are_ignored() -> Result<()> {
        let mut children = Children::new(&["A", "B"]);
        reconcile_order(&mut children, &["X", "B", "A"])?;
        assert_eq!(children.ids, vec!["B", "A"]);
        Ok(())
    }

    #[test]
    fn old_only_ids_follow_their_predecessor() -> Result<()> {
        let mut children = Children::new(&["A", "keep", "B", "C"]);
        reconcile_order(&mut children, &["C", "A", "B"])?;
        assert_eq!(children.ids, vec!["C", "A", "keep", "B"]);

        let mut children = Children::new(&["first", "A", "B"]);
        reconcile_order(&mut children, &["B", "A"])?;
        assert_eq!(children.ids, vec!["first", "B", "A"]);
        Ok(())
    }
}
