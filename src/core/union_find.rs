//! Union-find (disjoint set union) over opaque string keys.
//!
//! Used to form clone groups as connected components of the per-revision
//! similarity graph. Path compression plus union by rank gives near-linear
//! amortised cost over a revision's pair list.

use std::collections::{BTreeMap, HashMap};

/// Disjoint set union with path compression and union by rank.
#[derive(Debug, Default)]
pub struct DisjointSet {
    parent: HashMap<String, String>,
    rank: HashMap<String, u32>,
}

impl DisjointSet {
    /// Create an empty structure.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the root of `x`, inserting `x` as its own root when absent.
    /// Compresses the path with halving while walking up.
    pub fn find(&mut self, x: &str) -> String {
        if !self.parent.contains_key(x) {
            self.parent.insert(x.to_string(), x.to_string());
            self.rank.insert(x.to_string(), 0);
            return x.to_string();
        }

        let mut current = x.to_string();
        loop {
            let parent = self.parent[&current].clone();
            if parent == current {
                return current;
            }
            // Path halving: point current at its grandparent
            let grandparent = self.parent[&parent].clone();
            self.parent.insert(current.clone(), grandparent.clone());
            current = grandparent;
        }
    }

    /// Union the sets containing `x` and `y` by rank.
    pub fn union(&mut self, x: &str, y: &str) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return;
        }

        let rank_x = self.rank[&root_x];
        let rank_y = self.rank[&root_y];

        if rank_x < rank_y {
            self.parent.insert(root_x, root_y);
        } else if rank_x > rank_y {
            self.parent.insert(root_y, root_x);
        } else {
            self.parent.insert(root_y, root_x.clone());
            self.rank.insert(root_x, rank_x + 1);
        }
    }

    /// Whether `x` and `y` are in the same set.
    pub fn connected(&mut self, x: &str, y: &str) -> bool {
        self.find(x) == self.find(y)
    }

    /// Whether `x` has been inserted.
    pub fn contains(&self, x: &str) -> bool {
        self.parent.contains_key(x)
    }

    /// All connected components as `{root -> sorted members}`.
    pub fn groups(&mut self) -> BTreeMap<String, Vec<String>> {
        let keys: Vec<String> = self.parent.keys().cloned().collect();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for key in keys {
            let root = self.find(&key);
            groups.entry(root).or_default().push(key);
        }

        for members in groups.values_mut() {
            members.sort_unstable();
        }

        groups
    }

    /// Number of inserted elements.
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Whether the structure is empty.
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Number of distinct components.
    pub fn num_groups(&mut self) -> usize {
        let keys: Vec<String> = self.parent.keys().cloned().collect();
        let mut roots: Vec<String> = keys.into_iter().map(|k| self.find(&k)).collect();
        roots.sort_unstable();
        roots.dedup();
        roots.len()
    }
}
