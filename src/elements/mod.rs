//! Per-element heat / click scores over an abstract tree of rectangles.
//!
//! Independent of the heat grid: the grid tracks *where* the cursor went,
//! this tracks *which element* it was over. Elements are identified by their
//! pre-order traversal index, not by any handle into the live tree.

pub mod desktop;

use serde::{Deserialize, Serialize};

pub use desktop::DesktopTree;

/// Axis-aligned box in surface pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Bounds {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Half-open containment: left/top edges inside, right/bottom outside.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && py >= self.y && px < self.x + self.w && py < self.y + self.h
    }
}

/// Read-only tree capability the tracker walks.
pub trait ElementTree {
    type Node: Copy;

    fn root(&self) -> Option<Self::Node>;
    /// Children in hit-test priority order (first child wins overlaps).
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;
    fn bounding_box(&self, node: Self::Node) -> Bounds;
    fn tag_name(&self, node: Self::Node) -> String;
    /// Free-form caption shown next to the tag, e.g. a window title.
    fn label(&self, _node: Self::Node) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedNode {
    pub parent: Option<usize>,
    pub depth: usize,
    pub tag: String,
    pub label: Option<String>,
    pub bounds: Bounds,
    pub children: Vec<usize>,
}

/// Flattened pre-order copy of an [`ElementTree`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedTree {
    nodes: Vec<IndexedNode>,
}

impl IndexedTree {
    /// Walk `tree` with an explicit stack; node `i` is the `i`-th visited.
    pub fn build<T: ElementTree>(tree: &T) -> Self {
        let mut nodes: Vec<IndexedNode> = Vec::new();
        let Some(root) = tree.root() else {
            return Self { nodes };
        };

        let mut stack = vec![(root, None::<usize>, 0usize)];
        while let Some((node, parent, depth)) = stack.pop() {
            let index = nodes.len();
            nodes.push(IndexedNode {
                parent,
                depth,
                tag: tree.tag_name(node),
                label: tree.label(node),
                bounds: tree.bounding_box(node),
                children: Vec::new(),
            });
            if let Some(p) = parent {
                nodes[p].children.push(index);
            }
            // Reverse so the first child is popped (and indexed) first.
            for child in tree.children(node).into_iter().rev() {
                stack.push((child, Some(index), depth + 1));
            }
        }
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[cfg(test)]
    pub fn node(&self, index: usize) -> Option<&IndexedNode> {
        self.nodes.get(index)
    }

    /// Root-to-deepest chain of nodes containing the point.
    pub fn hit_path(&self, x: f32, y: f32) -> Vec<usize> {
        let mut path = Vec::new();
        match self.nodes.first() {
            Some(root) if root.bounds.contains(x, y) => path.push(0),
            _ => return path,
        }
        let mut current = 0;
        while let Some(&next) = self.nodes[current]
            .children
            .iter()
            .find(|&&c| self.nodes[c].bounds.contains(x, y))
        {
            path.push(next);
            current = next;
        }
        path
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementScore {
    pub heat: u64,
    pub click: u64,
}

/// One node of a persisted tree snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub index: usize,
    pub parent: Option<usize>,
    pub depth: usize,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub bounds: Bounds,
    #[serde(flatten)]
    pub score: ElementScore,
}

/// Indexed tree plus one score bag per node.
#[derive(Debug, Default)]
pub struct ElementScores {
    tree: IndexedTree,
    scores: Vec<ElementScore>,
}

impl ElementScores {
    #[cfg(test)]
    pub fn new(tree: IndexedTree) -> Self {
        let scores = vec![ElementScore::default(); tree.len()];
        Self { tree, scores }
    }

    pub fn tree(&self) -> &IndexedTree {
        &self.tree
    }

    #[cfg(test)]
    pub fn score(&self, index: usize) -> Option<ElementScore> {
        self.scores.get(index).copied()
    }

    /// Swap in a fresh walk of the tree. Scores stay with their index;
    /// indices that did not exist before start at zero.
    pub fn retarget(&mut self, tree: IndexedTree) {
        self.scores.resize(tree.len(), ElementScore::default());
        self.tree = tree;
    }

    /// One heat point for every element under the cursor, ancestors included.
    /// Returns how many elements were credited.
    pub fn record_move(&mut self, x: f32, y: f32) -> usize {
        let path = self.tree.hit_path(x, y);
        for &i in &path {
            self.scores[i].heat += 1;
        }
        path.len()
    }

    /// One click for the deepest element under the cursor.
    pub fn record_click(&mut self, x: f32, y: f32) -> Option<usize> {
        let target = *self.tree.hit_path(x, y).last()?;
        self.scores[target].click += 1;
        Some(target)
    }

    /// Indented `<tag>` listing with scores, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.tree.nodes.iter().enumerate() {
            let s = self.scores[i];
            out.push_str(&"  ".repeat(node.depth));
            out.push_str(&format!("<{}> #{}", node.tag.to_lowercase(), i));
            if let Some(label) = &node.label {
                out.push_str(&format!(" {label:?}"));
            }
            out.push_str(&format!(" heat={} click={}\n", s.heat, s.click));
        }
        out
    }

    pub fn snapshot(&self) -> Vec<ElementRecord> {
        self.tree
            .nodes
            .iter()
            .zip(&self.scores)
            .enumerate()
            .map(|(index, (node, &score))| ElementRecord {
                index,
                parent: node.parent,
                depth: node.depth,
                tag: node.tag.clone(),
                label: node.label.clone(),
                bounds: node.bounds,
                score,
            })
            .collect()
    }
}
