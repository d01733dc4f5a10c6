use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use crate::arena::{Arena, ArenaIndex};

/// Upper bound on the number of paths [`DiGraph::paths`] lists.
pub const MAX_PATHS: usize = 10_000;

#[derive(Debug, Clone)]
struct GraphNode<N> {
    value: N,
    incoming: IndexSet<ArenaIndex>,
    outgoing: IndexSet<ArenaIndex>,
    retired: bool,
}

/// Directed graph with set semantics for nodes and edges.
///
/// Nodes live in an arena and are never freed. Dropped or renamed nodes are retired instead and
/// come back to life when they are added again. Iteration follows discovery order.
#[derive(Debug, Clone)]
pub struct DiGraph<N> {
    arena: Arena<GraphNode<N>>,
    index: IndexMap<N, ArenaIndex>,
    edges: IndexSet<(ArenaIndex, ArenaIndex)>,
}

impl<N> Default for DiGraph<N> {
    fn default() -> Self {
        Self {
            arena: Arena::default(),
            index: IndexMap::new(),
            edges: IndexSet::new(),
        }
    }
}

impl<N: Clone + Eq + Hash> DiGraph<N> {
    pub fn add_node(&mut self, value: &N) -> ArenaIndex {
        if let Some(&idx) = self.index.get(value) {
            self.arena[idx].retired = false;
            return idx;
        }
        let idx = self.arena.allocate(GraphNode {
            value: value.clone(),
            incoming: IndexSet::new(),
            outgoing: IndexSet::new(),
            retired: false,
        });
        self.index.insert(value.clone(), idx);
        idx
    }

    /// Adds `source -> target`. Returns `false` if the edge already existed.
    pub fn add_edge(&mut self, source: &N, target: &N) -> bool {
        let source_idx = self.add_node(source);
        let target_idx = self.add_node(target);
        self.insert_edge(source_idx, target_idx)
    }

    fn insert_edge(&mut self, source_idx: ArenaIndex, target_idx: ArenaIndex) -> bool {
        if !self.edges.insert((source_idx, target_idx)) {
            return false;
        }
        self.arena[source_idx].outgoing.insert(target_idx);
        self.arena[target_idx].incoming.insert(source_idx);
        true
    }

    fn remove_edge(&mut self, source_idx: ArenaIndex, target_idx: ArenaIndex) {
        self.edges.shift_remove(&(source_idx, target_idx));
        self.arena[source_idx].outgoing.shift_remove(&target_idx);
        self.arena[target_idx].incoming.shift_remove(&source_idx);
    }

    fn live_index(&self, value: &N) -> Option<ArenaIndex> {
        self.index
            .get(value)
            .copied()
            .filter(|&idx| !self.arena[idx].retired)
    }

    pub fn contains_node(&self, value: &N) -> bool {
        self.live_index(value).is_some()
    }

    pub fn contains_edge(&self, source: &N, target: &N) -> bool {
        match (self.live_index(source), self.live_index(target)) {
            (Some(source_idx), Some(target_idx)) => self.edges.contains(&(source_idx, target_idx)),
            _ => false,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.arena
            .iter()
            .filter(|(_, node)| !node.retired)
            .map(|(_, node)| &node.value)
    }

    pub fn edges(&self) -> impl Iterator<Item = (&N, &N)> {
        self.edges.iter().map(|&(source_idx, target_idx)| {
            (&self.arena[source_idx].value, &self.arena[target_idx].value)
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    pub fn predecessors(&self, value: &N) -> impl Iterator<Item = &N> {
        self.neighbours(value, |node| &node.incoming)
    }

    pub fn successors(&self, value: &N) -> impl Iterator<Item = &N> {
        self.neighbours(value, |node| &node.outgoing)
    }

    fn neighbours<'g>(
        &'g self,
        value: &N,
        side: fn(&GraphNode<N>) -> &IndexSet<ArenaIndex>,
    ) -> impl Iterator<Item = &'g N> + use<'g, N> {
        self.live_index(value)
            .into_iter()
            .flat_map(move |idx| side(&self.arena[idx]).iter())
            .map(|&idx| &self.arena[idx].value)
    }

    /// Retires `value` if no edge touches it. Returns whether it was retired.
    pub fn retire_if_isolated(&mut self, value: &N) -> bool {
        let Some(idx) = self.live_index(value) else {
            return false;
        };
        let node = &mut self.arena[idx];
        if node.incoming.is_empty() && node.outgoing.is_empty() {
            node.retired = true;
            return true;
        }
        false
    }

    /// Moves every edge of `old` onto `new` and retires `old`.
    pub fn rename(&mut self, old: &N, new: &N) {
        let Some(old_idx) = self.live_index(old) else {
            return;
        };
        let new_idx = self.add_node(new);
        if old_idx == new_idx {
            return;
        }

        let incoming: Vec<ArenaIndex> = self.arena[old_idx].incoming.iter().copied().collect();
        let outgoing: Vec<ArenaIndex> = self.arena[old_idx].outgoing.iter().copied().collect();
        let moved = |idx: ArenaIndex| if idx == old_idx { new_idx } else { idx };
        for source_idx in incoming {
            self.remove_edge(source_idx, old_idx);
            self.insert_edge(moved(source_idx), new_idx);
        }
        for target_idx in outgoing {
            self.remove_edge(old_idx, target_idx);
            self.insert_edge(new_idx, moved(target_idx));
        }
        self.arena[old_idx].retired = true;
    }

    /// Every maximal path starting at a node without foreign predecessors, at most
    /// [`MAX_PATHS`] of them.
    ///
    /// Paths never revisit a node, so cycles end a path instead of looping.
    pub fn paths(&self) -> Vec<Vec<&N>> {
        self.paths_bounded(MAX_PATHS)
    }

    pub fn paths_bounded(&self, limit: usize) -> Vec<Vec<&N>> {
        let mut paths = vec![];
        for (idx, node) in self.arena.iter() {
            let is_root = node.incoming.iter().all(|&pred| pred == idx);
            let has_successor = node.outgoing.iter().any(|&succ| succ != idx);
            if !node.retired && is_root && has_successor && !self.walk(idx, limit, &mut paths) {
                log::warn!("Path listing stopped after {} paths.", limit);
                break;
            }
        }
        paths
    }

    /// Depth-first listing of the maximal paths from `root`. Returns `false` once `limit` is hit.
    fn walk<'g>(&'g self, root: ArenaIndex, limit: usize, paths: &mut Vec<Vec<&'g N>>) -> bool {
        let mut path = vec![root];
        // Successors still to visit, one list per node of `path`, popped from the back.
        let mut pending = vec![self.next_hops(root, &path)];
        while let Some(hops) = pending.last_mut() {
            let Some(succ) = hops.pop() else {
                pending.pop();
                path.pop();
                continue;
            };
            path.push(succ);
            let hops = self.next_hops(succ, &path);
            if hops.is_empty() {
                if paths.len() == limit {
                    return false;
                }
                paths.push(path.iter().map(|&idx| &self.arena[idx].value).collect());
                path.pop();
            } else {
                pending.push(hops);
            }
        }
        true
    }

    fn next_hops(&self, idx: ArenaIndex, path: &[ArenaIndex]) -> Vec<ArenaIndex> {
        let mut hops: Vec<ArenaIndex> = self.arena[idx]
            .outgoing
            .iter()
            .copied()
            .filter(|succ| !path.contains(succ))
            .collect();
        hops.reverse();
        hops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&'static str, &'static str)]) -> DiGraph<&'static str> {
        let mut graph = DiGraph::default();
        for (source, target) in edges {
            graph.add_edge(source, target);
        }
        graph
    }

    #[test]
    fn edges_have_set_semantics() {
        let mut graph = graph(&[("a", "b"), ("b", "c")]);
        assert!(!graph.add_edge(&"a", &"b"));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.nodes().copied().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(graph.predecessors(&"b").copied().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(graph.successors(&"b").copied().collect::<Vec<_>>(), vec!["c"]);
    }

    #[test]
    fn rename_moves_edges() {
        let mut graph = graph(&[("a", "b"), ("b", "c"), ("b", "b")]);
        graph.rename(&"b", &"x");

        assert!(!graph.contains_node(&"b"));
        assert!(graph.contains_edge(&"a", &"x"));
        assert!(graph.contains_edge(&"x", &"c"));
        assert!(graph.contains_edge(&"x", &"x"));
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn only_isolated_nodes_are_retired() {
        let mut graph = graph(&[("a", "b")]);
        graph.add_node(&"c");
        assert!(!graph.retire_if_isolated(&"a"));
        assert!(graph.retire_if_isolated(&"c"));
        assert_eq!(graph.node_count(), 2);

        graph.add_node(&"c");
        assert!(graph.contains_node(&"c"));
    }

    #[test]
    fn paths_stop_at_cycles() {
        let graph = graph(&[("a", "b"), ("b", "c"), ("c", "b"), ("a", "d")]);
        let paths: Vec<Vec<&str>> = graph
            .paths()
            .into_iter()
            .map(|path| path.into_iter().copied().collect())
            .collect();
        assert_eq!(paths, vec![vec!["a", "b", "c"], vec!["a", "d"]]);
    }

    #[test]
    fn path_listing_is_bounded() {
        let layers: Vec<Vec<String>> = (0..6)
            .map(|layer| (0..4).map(|node| format!("n{}_{}", layer, node)).collect())
            .collect();
        let mut graph = DiGraph::default();
        for pair in layers.windows(2) {
            for source in &pair[0] {
                for target in &pair[1] {
                    graph.add_edge(source, target);
                }
            }
        }

        assert_eq!(graph.paths().len(), 4usize.pow(6));
        let bounded = graph.paths_bounded(100);
        assert_eq!(bounded.len(), 100);
        assert_eq!(bounded[0], graph.paths()[0]);
        assert!(bounded.iter().all(|path| path.len() == 6));
    }
}
