use crate::DbError;
pub use operator::*;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::fmt;
mod operator;

/// NodeId is used to identify nodes in the QueryTree arena.
pub type NodeId = usize;

/// One navigation step from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// The slot to act on, relative to the node reached by a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// The last step of the path is the target; with an empty path, the root.
    None,
    Left,
    Right,
    Up,
    Down,
}

impl From<Direction> for Target {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Left => Target::Left,
            Direction::Right => Target::Right,
            Direction::Up => Target::Up,
            Direction::Down => Target::Down,
        }
    }
}

/// A node of the tree. Children are owning arena indices, `parent` is only used to walk up.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueryTreeNode {
    op: Operator,
    parent: Option<NodeId>,
    only_child: Option<NodeId>,
    left_child: Option<NodeId>,
    right_child: Option<NodeId>,
}

impl QueryTreeNode {
    fn new(op: Operator) -> Self {
        Self {
            op,
            parent: None,
            only_child: None,
            left_child: None,
            right_child: None,
        }
    }

    fn has_pair(&self) -> bool {
        self.left_child.is_some() || self.right_child.is_some()
    }

    fn is_mixed(&self) -> bool {
        self.only_child.is_some() && self.has_pair()
    }
}

/// A child-holding position in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Root,
    Only(NodeId),
    Left(NodeId),
    Right(NodeId),
}

/// Tree of relational-algebra operators, addressed by paths of directions from the root.
#[derive(Debug, Clone, Default)]
pub struct QueryTree {
    nodes: Vec<Option<QueryTreeNode>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    size: usize,
}

impl QueryTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree holding a single root operator.
    pub fn with_root(op: Operator) -> Self {
        let mut tree = Self::new();
        let id = tree.alloc(op);
        tree.root = Some(id);
        tree.size = 1;
        tree
    }

    /// Returns the number of live nodes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Operator at the root, if any.
    pub fn root_operator(&self) -> Option<&Operator> {
        self.root.and_then(|id| self.nodes[id].as_ref()).map(|n| &n.op)
    }

    fn alloc(&mut self, op: Operator) -> NodeId {
        let node = QueryTreeNode::new(op);
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = None;
        self.free.push(id);
    }

    fn node(&self, id: NodeId) -> Result<&QueryTreeNode, DbError> {
        self.nodes
            .get(id)
            .and_then(|n| n.as_ref())
            .ok_or_else(|| DbError::InternalError(format!("Dangling node index {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut QueryTreeNode, DbError> {
        self.nodes
            .get_mut(id)
            .and_then(|n| n.as_mut())
            .ok_or_else(|| DbError::InternalError(format!("Dangling node index {}", id)))
    }

    /// Follows `path` from the root.
    fn navigate(&self, path: &[Direction]) -> Result<NodeId, DbError> {
        let mut cur = self
            .root
            .ok_or_else(|| DbError::TreeError(String::from("Tree is empty")))?;
        for (i, step) in path.iter().enumerate() {
            let node = self.node(cur)?;
            let next = match step {
                Direction::Left => node.left_child,
                Direction::Right => node.right_child,
                Direction::Down => node.only_child,
                Direction::Up => node.parent,
            };
            cur = next.ok_or_else(|| {
                DbError::TreeError(format!("No node at step {} ({:?}) of path {:?}", i, step, path))
            })?;
        }
        Ok(cur)
    }

    /// Splits off the last step as the target when the target is `None`.
    fn split_target(path: &[Direction], target: Target) -> (&[Direction], Target) {
        match (target, path.split_last()) {
            (Target::None, Some((last, rest))) => (rest, Target::from(*last)),
            _ => (path, target),
        }
    }

    fn slot_of(&self, id: NodeId) -> Result<Slot, DbError> {
        match self.node(id)?.parent {
            None => Ok(Slot::Root),
            Some(p) => {
                let parent = self.node(p)?;
                if parent.only_child == Some(id) {
                    Ok(Slot::Only(p))
                } else if parent.left_child == Some(id) {
                    Ok(Slot::Left(p))
                } else if parent.right_child == Some(id) {
                    Ok(Slot::Right(p))
                } else {
                    Err(DbError::InternalError(format!(
                        "Node {} is not a child of its parent {}",
                        id, p
                    )))
                }
            }
        }
    }

    fn slot_get(&self, slot: Slot) -> Result<Option<NodeId>, DbError> {
        Ok(match slot {
            Slot::Root => self.root,
            Slot::Only(p) => self.node(p)?.only_child,
            Slot::Left(p) => self.node(p)?.left_child,
            Slot::Right(p) => self.node(p)?.right_child,
        })
    }

    /// Points `slot` at `child`, fixing the child's back-reference.
    fn slot_set(&mut self, slot: Slot, child: Option<NodeId>) -> Result<(), DbError> {
        let parent = match slot {
            Slot::Root => {
                self.root = child;
                None
            }
            Slot::Only(p) => {
                self.node_mut(p)?.only_child = child;
                Some(p)
            }
            Slot::Left(p) => {
                self.node_mut(p)?.left_child = child;
                Some(p)
            }
            Slot::Right(p) => {
                self.node_mut(p)?.right_child = child;
                Some(p)
            }
        };
        if let Some(c) = child {
            self.node_mut(c)?.parent = parent;
        }
        Ok(())
    }

    /// Slot an insertion at (`path`, `target`) acts on.
    fn insertion_slot(&self, path: &[Direction], target: Target) -> Result<Slot, DbError> {
        let (steps, target) = Self::split_target(path, target);
        if target == Target::None {
            return Ok(Slot::Root);
        }
        let p = self.navigate(steps)?;
        let slot = match target {
            Target::Left => Slot::Left(p),
            Target::Right => Slot::Right(p),
            Target::Down => Slot::Only(p),
            Target::Up | Target::None => self.slot_of(p)?,
        };
        // Splicing keeps the occupant under the new node, so only empty slots can mix.
        match slot {
            Slot::Only(p) if self.node(p)?.has_pair() => Err(DbError::TreeError(format!(
                "Node at {:?} already uses its left/right slots",
                steps
            ))),
            Slot::Left(p) | Slot::Right(p) if self.node(p)?.only_child.is_some() => {
                Err(DbError::TreeError(format!(
                    "Node at {:?} already uses its only-child slot",
                    steps
                )))
            }
            _ => Ok(slot),
        }
    }

    /// Node addressed by (`path`, `target`) together with the slot holding it.
    fn locate(&self, path: &[Direction], target: Target) -> Result<(Slot, NodeId), DbError> {
        let (steps, target) = Self::split_target(path, target);
        if target == Target::None {
            let root = self
                .root
                .ok_or_else(|| DbError::TreeError(String::from("Tree is empty")))?;
            return Ok((Slot::Root, root));
        }
        let p = self.navigate(steps)?;
        let (slot, found) = match target {
            Target::Left => (Slot::Left(p), self.node(p)?.left_child),
            Target::Right => (Slot::Right(p), self.node(p)?.right_child),
            Target::Down => (Slot::Only(p), self.node(p)?.only_child),
            Target::Up | Target::None => match self.node(p)?.parent {
                Some(g) => (self.slot_of(g)?, Some(g)),
                None => (Slot::Root, None),
            },
        };
        let id = found.ok_or_else(|| {
            DbError::TreeError(format!("No node at {:?} {:?}", steps, target))
        })?;
        Ok((slot, id))
    }

    /// Adds an operator at the addressed slot.
    ///
    /// An occupied slot is spliced: the new node takes the slot and the previous occupant
    /// becomes its only child. `Up` inserts above the node reached by the path.
    ///
    /// # Arguments
    ///
    /// * `path` - Steps from the root.
    /// * `target` - Slot relative to the node reached by `path`.
    /// * `op` - Operator to add.
    pub fn add(&mut self, path: &[Direction], target: Target, op: Operator) -> Result<(), DbError> {
        if self.root.is_none() {
            if !path.is_empty() {
                return Err(DbError::TreeError(format!(
                    "Path {:?} does not exist in an empty tree",
                    path
                )));
            }
            let id = self.alloc(op);
            self.root = Some(id);
            self.size = 1;
            return Ok(());
        }
        let slot = self.insertion_slot(path, target)?;
        let occupant = self.slot_get(slot)?;
        let id = self.alloc(op);
        self.slot_set(slot, Some(id))?;
        if let Some(old) = occupant {
            self.node_mut(id)?.only_child = Some(old);
            self.node_mut(old)?.parent = Some(id);
        }
        self.size += 1;
        Ok(())
    }

    /// Reads the operator at the addressed location.
    pub fn get(&self, path: &[Direction], target: Target) -> Result<&Operator, DbError> {
        let (_, id) = self.locate(path, target)?;
        Ok(&self.node(id)?.op)
    }

    /// Replaces the operator at the addressed location, returning the old one.
    pub fn set(
        &mut self,
        path: &[Direction],
        target: Target,
        op: Operator,
    ) -> Result<Operator, DbError> {
        let (_, id) = self.locate(path, target)?;
        Ok(std::mem::replace(&mut self.node_mut(id)?.op, op))
    }

    /// Removes the addressed node, promoting its single child into the vacated slot.
    ///
    /// A node holding both a left and a right child cannot be removed: only one of them could
    /// take its slot. The tree is left unchanged and a `TreeError` is returned.
    pub fn remove(&mut self, path: &[Direction], target: Target) -> Result<Operator, DbError> {
        let (slot, id) = self.locate(path, target)?;
        let node = self.node(id)?;
        if node.is_mixed() {
            return Err(DbError::InternalError(format!(
                "Node at {:?} {:?} has both only-child and left/right children",
                path, target
            )));
        }
        let replacement = match (node.only_child, node.left_child, node.right_child) {
            (None, Some(_), Some(_)) => {
                return Err(DbError::TreeError(format!(
                    "Cannot remove {} at {:?} {:?}: two children cannot share one slot",
                    node.op, path, target
                )));
            }
            (only, left, right) => only.or(left).or(right),
        };
        self.slot_set(slot, replacement)?;
        let op = self.node(id)?.op.clone();
        self.release(id);
        self.size -= 1;
        Ok(op)
    }

    /// Removes the addressed node and everything beneath it, returning how many nodes went.
    pub fn remove_subtree(&mut self, path: &[Direction]) -> Result<usize, DbError> {
        let (slot, id) = self.locate(path, Target::None)?;
        let doomed = self.collect(id)?;
        self.slot_set(slot, None)?;
        for n in &doomed {
            self.release(*n);
        }
        self.size -= doomed.len();
        Ok(doomed.len())
    }

    /// Ids of the subtree rooted at `id`, preorder. Fails on a node reached twice.
    fn collect(&self, id: NodeId) -> Result<Vec<NodeId>, DbError> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                return Err(DbError::TreeError(format!("Node {} is reached twice", n)));
            }
            out.push(n);
            let node = self.node(n)?;
            for c in [node.right_child, node.left_child, node.only_child].iter().flatten() {
                stack.push(*c);
            }
        }
        Ok(out)
    }

    fn copy_into(
        &self,
        id: NodeId,
        dest: &mut QueryTree,
        parent: Option<NodeId>,
    ) -> Result<NodeId, DbError> {
        let node = self.node(id)?;
        let new_id = dest.alloc(node.op.clone());
        dest.size += 1;
        dest.node_mut(new_id)?.parent = parent;
        if let Some(c) = node.only_child {
            let c = self.copy_into(c, dest, Some(new_id))?;
            dest.node_mut(new_id)?.only_child = Some(c);
        }
        if let Some(c) = node.left_child {
            let c = self.copy_into(c, dest, Some(new_id))?;
            dest.node_mut(new_id)?.left_child = Some(c);
        }
        if let Some(c) = node.right_child {
            let c = self.copy_into(c, dest, Some(new_id))?;
            dest.node_mut(new_id)?.right_child = Some(c);
        }
        Ok(new_id)
    }

    /// Copies the subtree at `path` into a tree of its own.
    pub fn subtree(&self, path: &[Direction]) -> Result<QueryTree, DbError> {
        let id = self.navigate(path)?;
        let mut tree = QueryTree::new();
        let root = self.copy_into(id, &mut tree, None)?;
        tree.root = Some(root);
        Ok(tree)
    }

    /// Grafts a copy of `subtree` into the addressed slot, which must be empty.
    pub fn add_subtree(
        &mut self,
        path: &[Direction],
        target: Target,
        subtree: &QueryTree,
    ) -> Result<(), DbError> {
        let sub_root = match subtree.root {
            Some(r) => r,
            None => return Ok(()),
        };
        let slot = if self.root.is_none() && path.is_empty() {
            Slot::Root
        } else {
            self.insertion_slot(path, target)?
        };
        if self.slot_get(slot)?.is_some() {
            return Err(DbError::TreeError(format!(
                "Cannot graft into occupied slot {:?} {:?}",
                path, target
            )));
        }
        let id = subtree.copy_into(sub_root, self, None)?;
        self.slot_set(slot, Some(id))
    }

    /// Preorder listing of every operator with its path: node, only child, left, right.
    pub fn traverse(&self) -> Vec<(Operator, Vec<Direction>)> {
        let mut out = Vec::with_capacity(self.size);
        if let Some(root) = self.root_view() {
            Self::traverse_helper(root, &mut out);
        }
        out
    }

    fn traverse_helper(view: NodeView<'_>, out: &mut Vec<(Operator, Vec<Direction>)>) {
        out.push((view.operator().clone(), view.path().to_vec()));
        for child in view.children() {
            Self::traverse_helper(child, out);
        }
    }

    /// Read cursor on the root.
    pub fn root_view(&self) -> Option<NodeView<'_>> {
        self.root.map(|id| NodeView {
            tree: self,
            id,
            path: Vec::new(),
        })
    }

    /// Read cursor on the node at `path`.
    pub fn view(&self, path: &[Direction]) -> Result<NodeView<'_>, DbError> {
        let id = self.navigate(path)?;
        Ok(NodeView {
            tree: self,
            id,
            path: path.to_vec(),
        })
    }

    /// Checks the only-child/left-right invariant, the back-references and the node count.
    pub fn validate(&self) -> Result<(), DbError> {
        let reachable = match self.root {
            Some(r) => {
                if self.node(r)?.parent.is_some() {
                    return Err(DbError::InternalError(String::from("Root has a parent")));
                }
                self.collect(r)?
            }
            None => Vec::new(),
        };
        for id in &reachable {
            let node = self.node(*id)?;
            if node.is_mixed() {
                return Err(DbError::InternalError(format!(
                    "Node {} ({}) uses both only-child and left/right",
                    id, node.op
                )));
            }
            for c in [node.only_child, node.left_child, node.right_child].iter().flatten() {
                if self.node(*c)?.parent != Some(*id) {
                    return Err(DbError::InternalError(format!(
                        "Node {} does not point back to its parent {}",
                        c, id
                    )));
                }
            }
        }
        if reachable.len() != self.size {
            return Err(DbError::InternalError(format!(
                "Tree reports {} nodes but {} are reachable",
                self.size,
                reachable.len()
            )));
        }
        Ok(())
    }

    /// One-line relational-algebra rendering, e.g. `π[a](x ⨝[x.c=y.c] y)`.
    pub fn to_algebra(&self) -> String {
        match self.root_view() {
            Some(root) => Self::algebra_helper(&root, false),
            None => String::new(),
        }
    }

    fn algebra_helper(view: &NodeView<'_>, nested: bool) -> String {
        let op = view.operator();
        match (view.only_child(), view.left(), view.right()) {
            (Some(child), _, _) => format!("{}({})", op, Self::algebra_helper(&child, false)),
            (None, Some(l), Some(r)) => {
                let s = format!(
                    "{} {} {}",
                    Self::algebra_helper(&l, true),
                    op,
                    Self::algebra_helper(&r, true)
                );
                if nested {
                    format!("({})", s)
                } else {
                    s
                }
            }
            (None, Some(c), None) | (None, None, Some(c)) => {
                format!("{}({})", op, Self::algebra_helper(&c, false))
            }
            (None, None, None) => op.to_string(),
        }
    }

    /// Serializes the tree as json.
    pub fn to_json(&self) -> serde_json::Value {
        let mut node_map = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(n) = node {
                node_map.insert(i.to_string(), n);
            }
        }
        json!({"nodes": node_map, "root": self.root, "size": self.size})
    }

    /// De-serializes a json representation created in to_json.
    pub fn from_json(json: &str) -> Result<Self, DbError> {
        let malformed = || DbError::IOError(String::from("Malformatted query tree json"));
        let v: serde_json::Value = serde_json::from_str(json)?;
        let nodes: HashMap<String, QueryTreeNode> =
            serde_json::from_value(v["nodes"].clone()).map_err(|_| malformed())?;
        let root: Option<NodeId> =
            serde_json::from_value(v["root"].clone()).map_err(|_| malformed())?;
        let mut tree = QueryTree::new();
        for (key, node) in nodes {
            let id: NodeId = key.parse().map_err(|_| malformed())?;
            if tree.nodes.len() <= id {
                tree.nodes.resize(id + 1, None);
            }
            tree.nodes[id] = Some(node);
        }
        tree.free = (0..tree.nodes.len())
            .filter(|i| tree.nodes[*i].is_none())
            .collect();
        tree.root = root;
        tree.size = match root {
            Some(r) => tree.collect(r).map_err(|_| malformed())?.len(),
            None => 0,
        };
        tree.validate()?;
        Ok(tree)
    }
}

impl fmt::Display for QueryTree {
    /// Indented rendering, one operator per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (op, path) in self.traverse() {
            let depth = path.len();
            writeln!(f, "{}{}", "  ".repeat(depth), op)?;
        }
        Ok(())
    }
}

/// Read-only cursor on a node, remembering the path that reached it.
#[derive(Clone)]
pub struct NodeView<'a> {
    tree: &'a QueryTree,
    id: NodeId,
    path: Vec<Direction>,
}

impl<'a> NodeView<'a> {
    fn node(&self) -> &'a QueryTreeNode {
        // Views are only built from ids reachable in a borrowed tree.
        match &self.tree.nodes[self.id] {
            Some(n) => n,
            None => unreachable!("view on a released node"),
        }
    }

    fn step(&self, child: Option<NodeId>, dir: Direction) -> Option<NodeView<'a>> {
        child.map(|id| {
            let mut path = self.path.clone();
            path.push(dir);
            NodeView {
                tree: self.tree,
                id,
                path,
            }
        })
    }

    pub fn operator(&self) -> &'a Operator {
        &self.node().op
    }

    pub fn path(&self) -> &[Direction] {
        &self.path
    }

    pub fn only_child(&self) -> Option<NodeView<'a>> {
        self.step(self.node().only_child, Direction::Down)
    }

    pub fn left(&self) -> Option<NodeView<'a>> {
        self.step(self.node().left_child, Direction::Left)
    }

    pub fn right(&self) -> Option<NodeView<'a>> {
        self.step(self.node().right_child, Direction::Right)
    }

    /// Children in traversal order: only child, left, right.
    pub fn children(&self) -> Vec<NodeView<'a>> {
        vec![self.only_child(), self.left(), self.right()]
            .into_iter()
            .flatten()
            .collect()
    }
}
