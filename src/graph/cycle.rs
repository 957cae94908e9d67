//! Reachability check run before accepting a directed edge.

use std::collections::{HashSet, VecDeque};

/// Whether inserting `source -> target` would close a directed cycle.
///
/// That is the case exactly when `source` is already reachable from
/// `target`. `successors` yields the targets of the directed edges leaving
/// a node. A self-loop is always a cycle and short-circuits the search.
///
/// ## Algorithm
///
/// Breadth-first search from `target` with a visited set, so each node and
/// edge is expanded at most once: O(V + E).
pub fn would_create_cycle<'a, F, I>(source: &str, target: &'a str, successors: F) -> bool
where
    F: Fn(&'a str) -> I,
    I: IntoIterator<Item = &'a str>,
{
    if source == target {
        return true;
    }

    let mut visited: HashSet<&'a str> = HashSet::new();
    let mut frontier: VecDeque<&'a str> = VecDeque::new();
    visited.insert(target);
    frontier.push_back(target);

    while let Some(current) = frontier.pop_front() {
        for next in successors(current) {
            if next == source {
                return true;
            }
            if visited.insert(next) {
                frontier.push_back(next);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn adjacency<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, Vec<&'a str>> {
        let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
        for (from, to) in pairs {
            map.entry(*from).or_default().push(*to);
        }
        map
    }

    fn check(pairs: &[(&'static str, &'static str)], source: &str, target: &'static str) -> bool {
        let adj = adjacency(pairs);
        would_create_cycle(source, target, |id| adj.get(id).cloned().unwrap_or_default())
    }

    #[test]
    fn test_self_loop() {
        assert!(check(&[], "a", "a"));
    }

    #[test]
    fn test_back_edge_closes_cycle() {
        assert!(check(&[("a", "b"), ("b", "c")], "c", "a"));
    }

    #[test]
    fn test_forward_edge_is_fine() {
        assert!(!check(&[("a", "b"), ("b", "c")], "a", "c"));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let pairs = [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")];
        assert!(!check(&pairs, "a", "d"));
        assert!(check(&pairs, "d", "a"));
    }

    #[test]
    fn test_existing_cycle_elsewhere_terminates() {
        // b <-> c already loop; search must not spin.
        let pairs = [("b", "c"), ("c", "b")];
        assert!(!check(&pairs, "a", "b"));
    }
}
