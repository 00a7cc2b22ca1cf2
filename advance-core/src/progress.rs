//! Roll-up completion statistics over a requirement tree

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Add;
use uuid::Uuid;

use crate::hierarchy::{NodeId, RequirementTree};

/// Completed and total requirement counts for a subtree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionStats {
    pub completed: usize,
    pub total: usize,
}

impl CompletionStats {
    /// Whole-number percentage, rounded down
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        (self.completed * 100 / self.total) as u32
    }

    pub fn is_fully_complete(&self) -> bool {
        self.completed == self.total
    }
}

impl Add for CompletionStats {
    type Output = CompletionStats;

    fn add(self, other: CompletionStats) -> CompletionStats {
        CompletionStats {
            completed: self.completed + other.completed,
            total: self.total + other.total,
        }
    }
}

impl fmt::Display for CompletionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.completed, self.total, self.percent())
    }
}

/// Stats for the subtree rooted at `id`, counting the node itself
pub fn stats(tree: &RequirementTree, id: NodeId) -> CompletionStats {
    let mut visited = vec![false; tree.len()];
    let mut stack = vec![id];
    let mut subtree = CompletionStats::default();

    while let Some(current) = stack.pop() {
        if std::mem::replace(&mut visited[current.0], true) {
            continue;
        }
        let node = tree.node(current);
        subtree = subtree
            + CompletionStats {
                completed: usize::from(node.is_complete()),
                total: 1,
            };
        stack.extend(node.children.iter().copied());
    }
    subtree
}

/// Stats for every node, indexed by `NodeId`
pub fn stats_by_node(tree: &RequirementTree) -> Vec<CompletionStats> {
    let mut all = vec![CompletionStats::default(); tree.len()];

    // Children come after their parent in preorder, so a reverse walk sees
    // every child before its parent.
    for id in tree.preorder().into_iter().rev() {
        let node = tree.node(id);
        let own = CompletionStats {
            completed: usize::from(node.is_complete()),
            total: 1,
        };
        let subtree = node.children.iter().fold(own, |acc, child| acc + all[child.0]);
        all[id.0] = subtree;
    }
    all
}

/// Stats summed over every root of the forest
pub fn forest_stats(tree: &RequirementTree) -> CompletionStats {
    let by_node = stats_by_node(tree);
    tree.roots()
        .iter()
        .fold(CompletionStats::default(), |acc, root| acc + by_node[root.0])
}

/// Whether enough children of an alternatives parent are complete.
///
/// Returns `None` for nodes that do not carry a `required_count`.
pub fn alternatives_satisfied(tree: &RequirementTree, id: NodeId) -> Option<bool> {
    let node = tree.node(id);
    let required = node.requirement.required_count? as usize;
    let done = node
        .children
        .iter()
        .filter(|child| tree.node(**child).is_complete())
        .count();
    Some(done >= required)
}

/// Requirement ids whose subtree should start collapsed.
///
/// A node is collapsed when it is fully complete and has children to hide;
/// leaves never are.
pub fn default_collapsed(tree: &RequirementTree, collapse_completed: bool) -> BTreeSet<Uuid> {
    if !collapse_completed {
        return BTreeSet::new();
    }

    let by_node = stats_by_node(tree);
    tree.preorder()
        .into_iter()
        .filter(|id| {
            let node = tree.node(*id);
            !node.children.is_empty() && by_node[id.0].is_fully_complete()
        })
        .map(|id| tree.node(id).requirement.id)
        .collect()
}
