use std::ops::{Index, IndexMut};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArenaIndex {
    pub index: usize,
}

/// Append-only node storage. Indices stay valid for the lifetime of the arena.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    nodes: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::default(),
        }
    }
}

impl<T> Arena<T> {
    pub fn allocate(&mut self, node: T) -> ArenaIndex {
        self.nodes.push(node);
        ArenaIndex {
            index: self.nodes.len() - 1,
        }
    }

    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        self.nodes.get(index.index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over `(index, node)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (ArenaIndex { index }, node))
    }
}

impl<T> Index<ArenaIndex> for Arena<T> {
    type Output = T;

    fn index(&self, index: ArenaIndex) -> &Self::Output {
        &self.nodes[index.index]
    }
}

impl<T> IndexMut<ArenaIndex> for Arena<T> {
    fn index_mut(&mut self, index: ArenaIndex) -> &mut Self::Output {
        &mut self.nodes[index.index]
    }
}
