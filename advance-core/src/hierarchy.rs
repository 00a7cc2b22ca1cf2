//! Builds the nested requirement tree from flat requirement and progress records
//!
//! The tree is an arena: nodes live in one vector and refer to each other by
//! [`NodeId`]. It is rebuilt from the source collections on every read and
//! never patched in place.

use std::collections::{BTreeMap, HashMap, VecDeque};
use uuid::Uuid;

use crate::models::{HierarchyMode, ProgressRecord, Requirement};
use crate::numbering::{self, RequirementNumber};

/// Index of a node inside a [`RequirementTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// The requirements to assemble, tagged with how their nesting is expressed
#[derive(Debug, Clone)]
pub enum InputShape {
    /// Nesting comes from `parent_requirement_id`
    ParentLinked(Vec<Requirement>),
    /// Nesting is inferred by grouping on the requirement number
    Legacy(Vec<Requirement>),
}

impl InputShape {
    pub fn for_mode(mode: HierarchyMode, requirements: Vec<Requirement>) -> Self {
        match mode {
            HierarchyMode::ParentLinked => InputShape::ParentLinked(requirements),
            HierarchyMode::Legacy => InputShape::Legacy(requirements),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequirementNode {
    pub requirement: Requirement,
    pub progress: Option<ProgressRecord>,
    /// Parsed once at build time
    pub number: RequirementNumber,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// 1 for roots
    pub depth: u32,
}

impl RequirementNode {
    pub fn is_complete(&self) -> bool {
        self.progress.as_ref().is_some_and(|p| p.is_complete())
    }
}

/// A forest of requirements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequirementTree {
    nodes: Vec<RequirementNode>,
    roots: Vec<NodeId>,
}

impl RequirementTree {
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &RequirementNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node in display order, parents before their children
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut visited[id.0], true) {
                continue;
            }
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    pub fn find_by_number(&self, raw: &str) -> Option<NodeId> {
        let raw = raw.trim();
        self.nodes
            .iter()
            .position(|n| n.requirement.requirement_number.trim() == raw)
            .map(NodeId)
    }
}

/// Assembles a forest from flat records
///
/// Every input requirement ends up in the forest exactly once. Dangling
/// parent references and parent cycles never fail the build; the affected
/// requirements are promoted to roots instead.
pub fn build(shape: InputShape, progress: &[ProgressRecord]) -> RequirementTree {
    let progress_by_id = index_progress(progress);

    let (requirements, parent_linked) = match shape {
        InputShape::ParentLinked(reqs) => (reqs, true),
        InputShape::Legacy(reqs) => (reqs, false),
    };

    let mut requirements = requirements;
    requirements.sort_by_key(|r| r.display_order);

    let nodes = requirements
        .into_iter()
        .map(|requirement| {
            let number = numbering::parse(&requirement.requirement_number);
            let progress = progress_by_id.get(&requirement.id).cloned().cloned();
            RequirementNode {
                requirement,
                progress,
                number,
                parent: None,
                children: Vec::new(),
                depth: 1,
            }
        })
        .collect();

    if parent_linked {
        build_parent_linked(nodes)
    } else {
        build_legacy(nodes)
    }
}

/// Keeps the most mature record when a requirement has several
fn index_progress(progress: &[ProgressRecord]) -> HashMap<Uuid, &ProgressRecord> {
    let mut by_id: HashMap<Uuid, &ProgressRecord> = HashMap::new();
    for record in progress {
        by_id
            .entry(record.requirement_id)
            .and_modify(|current| {
                if record.status.maturity() > current.status.maturity() {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    by_id
}

fn build_parent_linked(mut nodes: Vec<RequirementNode>) -> RequirementTree {
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        index.entry(node.requirement.id).or_insert(i);
    }

    let mut parent_of: Vec<Option<usize>> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let parent_id = node.requirement.parent_requirement_id?;
            match index.get(&parent_id) {
                Some(&p) if p != i => Some(p),
                Some(_) => None,
                None => {
                    log::warn!(
                        "requirement {} references missing parent {}, promoting to root",
                        node.requirement.requirement_number,
                        parent_id
                    );
                    None
                }
            }
        })
        .collect();

    while let Some(i) = first_unreachable(&parent_of) {
        log::warn!(
            "requirement {} is part of a parent cycle, promoting to root",
            nodes[i].requirement.requirement_number
        );
        parent_of[i] = None;
    }

    let mut roots = Vec::new();
    for (i, parent) in parent_of.iter().enumerate() {
        match parent {
            Some(p) => {
                nodes[i].parent = Some(NodeId(*p));
                nodes[*p].children.push(NodeId(i));
            }
            None => roots.push(NodeId(i)),
        }
    }

    for i in 0..nodes.len() {
        let mut children = std::mem::take(&mut nodes[i].children);
        children.sort_by(|a, b| numbering::compare(&nodes[a.0].number, &nodes[b.0].number));
        nodes[i].children = children;
    }
    roots.sort_by_key(|id| nodes[id.0].number.group());

    assign_depths(&mut nodes, &roots);
    RequirementTree { nodes, roots }
}

/// First node (in input order) that cannot be reached from a root
fn first_unreachable(parent_of: &[Option<usize>]) -> Option<usize> {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); parent_of.len()];
    let mut queue = VecDeque::new();
    for (i, parent) in parent_of.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => queue.push_back(i),
        }
    }

    let mut reached = vec![false; parent_of.len()];
    while let Some(i) = queue.pop_front() {
        if std::mem::replace(&mut reached[i], true) {
            continue;
        }
        queue.extend(children[i].iter().copied());
    }

    reached.iter().position(|r| !r)
}

fn assign_depths(nodes: &mut [RequirementNode], roots: &[NodeId]) {
    let mut queue: VecDeque<(NodeId, u32)> = roots.iter().map(|id| (*id, 1)).collect();
    while let Some((id, depth)) = queue.pop_front() {
        nodes[id.0].depth = depth;
        for child in &nodes[id.0].children {
            queue.push_back((*child, depth + 1));
        }
    }
}

fn build_legacy(mut nodes: Vec<RequirementNode>) -> RequirementTree {
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, node) in nodes.iter().enumerate() {
        groups.entry(node.number.group()).or_default().push(i);
    }

    let mut roots = Vec::with_capacity(groups.len());
    for (_, mut members) in groups {
        members.sort_by(|a, b| numbering::compare(&nodes[*a].number, &nodes[*b].number));

        // Without an explicit parent the first member stands in for the group
        let parent_pos = members
            .iter()
            .position(|i| nodes[*i].number.is_parent())
            .unwrap_or(0);
        let parent = members.remove(parent_pos);

        for child in &members {
            nodes[*child].parent = Some(NodeId(parent));
            nodes[*child].depth = 2;
        }
        nodes[parent].depth = 1;
        nodes[parent].children = members.into_iter().map(NodeId).collect();
        roots.push(NodeId(parent));
    }

    RequirementTree { nodes, roots }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProgressStatus;
    use std::collections::HashSet;

    fn reqs(numbers: &[&str]) -> Vec<Requirement> {
        numbers
            .iter()
            .enumerate()
            .map(|(i, n)| {
                Requirement::new(*n, format!("Requirement {}", n)).with_display_order(i as u32)
            })
            .collect()
    }

    fn numbers_of(tree: &RequirementTree, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| tree.node(*id).requirement.requirement_number.clone())
            .collect()
    }

    fn assert_each_requirement_once(tree: &RequirementTree, input: &[Requirement]) {
        let order = tree.preorder();
        assert_eq!(order.len(), input.len());
        let seen: HashSet<Uuid> = order.iter().map(|id| tree.node(*id).requirement.id).collect();
        assert_eq!(seen.len(), input.len());
        for r in input {
            assert!(seen.contains(&r.id), "missing {}", r.requirement_number);
        }
    }

    #[test]
    fn test_legacy_grouping() {
        let input = reqs(&["1", "1a", "1b", "2"]);
        let tree = build(InputShape::Legacy(input.clone()), &[]);

        assert_eq!(numbers_of(&tree, tree.roots()), vec!["1", "2"]);
        let first = tree.node(tree.roots()[0]);
        assert_eq!(numbers_of(&tree, &first.children), vec!["1a", "1b"]);
        assert!(tree.node(tree.roots()[1]).children.is_empty());
        assert_each_requirement_once(&tree, &input);
    }

    #[test]
    fn test_legacy_depth_fixed_at_two() {
        let input = reqs(&["7", "7b", "7b8", "7b9"]);
        let tree = build(InputShape::Legacy(input), &[]);

        let root = tree.node(tree.roots()[0]);
        assert_eq!(root.depth, 1);
        assert_eq!(numbers_of(&tree, &root.children), vec!["7b", "7b8", "7b9"]);
        for child in &root.children {
            assert_eq!(tree.node(*child).depth, 2);
            assert!(tree.node(*child).children.is_empty());
        }
    }

    #[test]
    fn test_legacy_promotes_first_when_no_parent() {
        let input = reqs(&["3c", "3a", "3b"]);
        let tree = build(InputShape::Legacy(input.clone()), &[]);

        assert_eq!(numbers_of(&tree, tree.roots()), vec!["3a"]);
        let root = tree.node(tree.roots()[0]);
        assert_eq!(numbers_of(&tree, &root.children), vec!["3b", "3c"]);
        assert_each_requirement_once(&tree, &input);
    }

    #[test]
    fn test_legacy_duplicate_parents_are_kept() {
        let input = reqs(&["4", "4", "4a"]);
        let tree = build(InputShape::Legacy(input.clone()), &[]);

        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.node(tree.roots()[0]).children.len(), 2);
        assert_each_requirement_once(&tree, &input);
    }

    #[test]
    fn test_parent_linked_nesting_and_order() {
        let root = Requirement::new("5", "Root").with_display_order(0);
        let b = Requirement::new("5b", "B").with_parent(root.id).with_display_order(1);
        let a = Requirement::new("5a", "A").with_parent(root.id).with_display_order(2);
        let deep = Requirement::new("5a1", "Deep").with_parent(a.id).with_display_order(3);
        let other = Requirement::new("2", "Other").with_display_order(4);
        let input = vec![root, b, a, deep, other];

        let tree = build(InputShape::ParentLinked(input.clone()), &[]);

        assert_eq!(numbers_of(&tree, tree.roots()), vec!["2", "5"]);
        let five = tree.node(tree.roots()[1]);
        assert_eq!(numbers_of(&tree, &five.children), vec!["5a", "5b"]);
        let five_a = tree.node(five.children[0]);
        assert_eq!(numbers_of(&tree, &five_a.children), vec!["5a1"]);
        assert_eq!(tree.node(five_a.children[0]).depth, 3);
        assert_each_requirement_once(&tree, &input);
    }

    #[test]
    fn test_dangling_parent_becomes_root() {
        let orphan = Requirement::new("3a", "Orphan").with_parent(Uuid::new_v4());
        let input = vec![orphan];

        let tree = build(InputShape::ParentLinked(input.clone()), &[]);
        assert_eq!(tree.roots().len(), 1);
        assert!(tree.node(tree.roots()[0]).parent.is_none());
        assert_each_requirement_once(&tree, &input);
    }

    #[test]
    fn test_parent_cycle_is_broken() {
        let mut a = Requirement::new("1", "A").with_display_order(0);
        let b = Requirement::new("1a", "B").with_parent(a.id).with_display_order(1);
        let c = Requirement::new("1a1", "C").with_parent(b.id).with_display_order(2);
        a.parent_requirement_id = Some(c.id);
        let hanger = Requirement::new("1b", "Hangs off cycle")
            .with_parent(b.id)
            .with_display_order(3);
        let input = vec![a, b, c, hanger];

        let tree = build(InputShape::ParentLinked(input.clone()), &[]);
        assert_eq!(numbers_of(&tree, tree.roots()), vec!["1"]);
        assert_each_requirement_once(&tree, &input);
    }

    #[test]
    fn test_self_parent_is_root() {
        let mut r = Requirement::new("9", "Self");
        r.parent_requirement_id = Some(r.id);
        let tree = build(InputShape::ParentLinked(vec![r]), &[]);
        assert_eq!(tree.roots().len(), 1);
        assert!(tree.node(tree.roots()[0]).children.is_empty());
    }

    #[test]
    fn test_progress_attached_with_most_mature_status() {
        let input = reqs(&["1", "1a"]);
        let progress = vec![
            ProgressRecord::new(input[1].id, ProgressStatus::Approved),
            ProgressRecord::new(input[1].id, ProgressStatus::InProgress),
        ];

        let tree = build(InputShape::Legacy(input.clone()), &progress);
        let child = tree.node(tree.find_by_number("1a").unwrap());
        assert_eq!(child.progress.as_ref().unwrap().status, ProgressStatus::Approved);
        assert!(child.is_complete());
        assert!(tree.node(tree.find_by_number("1").unwrap()).progress.is_none());
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let input = reqs(&["2", "1b", "1", "3a", "1a", "3", "x"]);
        let progress = vec![ProgressRecord::new(input[0].id, ProgressStatus::Completed)];

        let first = build(InputShape::Legacy(input.clone()), &progress);
        let second = build(InputShape::Legacy(input.clone()), &progress);
        assert_eq!(first, second);
        assert_each_requirement_once(&first, &input);
    }

    #[test]
    fn test_empty_input() {
        let tree = build(InputShape::Legacy(Vec::new()), &[]);
        assert!(tree.is_empty());
        assert!(tree.roots().is_empty());
        assert!(tree.preorder().is_empty());
    }

    #[test]
    fn test_for_mode() {
        assert!(matches!(
            InputShape::for_mode(HierarchyMode::ParentLinked, Vec::new()),
            InputShape::ParentLinked(_)
        ));
        assert!(matches!(
            InputShape::for_mode(HierarchyMode::Legacy, Vec::new()),
            InputShape::Legacy(_)
        ));
    }
}
