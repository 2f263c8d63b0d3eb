//! Lossless concrete syntax tree stored in an arena.
//!
//! Every node lives in one `Vec` owned by [`Tree`] and is addressed by a
//! copyable [`NodeId`]. Interior nodes own an ordered list of child ids; each
//! node records its parent id for upward traversal only. Concatenating
//! `prefix + value` of every leaf in order reproduces the parsed source.

use crate::grammar::{NodeKind, Syntax, TokenKind};
use std::fmt;

/// Index of a node inside its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single token together with the trivia in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub kind: TokenKind,
    pub value: String,
    pub prefix: String,
    /// 1-based source line of the token; 0 for leaves created by passes.
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interior {
    pub kind: Syntax,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Leaf(Leaf),
    Interior(Interior),
}

#[derive(Debug, Clone)]
struct Slot {
    data: NodeData,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    slots: Vec<Slot>,
    root: Option<NodeId>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every node allocated after the first `len`; used when a
    /// speculative parse is abandoned.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    /// Root node; the first allocated node when no root was set.
    pub fn root(&self) -> NodeId {
        self.root.unwrap_or(NodeId(0))
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot { data, parent: None });
        id
    }

    pub fn new_leaf(
        &mut self,
        kind: TokenKind,
        value: impl Into<String>,
        prefix: impl Into<String>,
        (line, column): (usize, usize),
    ) -> NodeId {
        self.alloc(NodeData::Leaf(Leaf {
            kind,
            value: value.into(),
            prefix: prefix.into(),
            line,
            column,
        }))
    }

    /// New interior node adopting `children`.
    pub fn new_node(&mut self, kind: Syntax, children: Vec<NodeId>) -> NodeId {
        let id = self.alloc(NodeData::Interior(Interior {
            kind,
            children: Vec::new(),
        }));
        for &child in &children {
            self.slots[child.index()].parent = Some(id);
        }
        if let NodeData::Interior(node) = &mut self.slots[id.index()].data {
            node.children = children;
        }
        id
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.slots[id.index()].data
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        match self.data(id) {
            NodeData::Leaf(leaf) => NodeKind::Token(leaf.kind),
            NodeData::Interior(node) => NodeKind::Syntax(node.kind),
        }
    }

    pub fn token(&self, id: NodeId) -> Option<TokenKind> {
        self.leaf(id).map(|l| l.kind)
    }

    pub fn syntax(&self, id: NodeId) -> Option<Syntax> {
        match self.data(id) {
            NodeData::Interior(node) => Some(node.kind),
            NodeData::Leaf(_) => None,
        }
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.data(id), NodeData::Leaf(_))
    }

    pub fn is_token(&self, id: NodeId, kind: TokenKind) -> bool {
        self.token(id) == Some(kind)
    }

    pub fn is_syntax(&self, id: NodeId, kind: Syntax) -> bool {
        self.syntax(id) == Some(kind)
    }

    pub fn leaf(&self, id: NodeId) -> Option<&Leaf> {
        match self.data(id) {
            NodeData::Leaf(leaf) => Some(leaf),
            NodeData::Interior(_) => None,
        }
    }

    pub fn leaf_mut(&mut self, id: NodeId) -> Option<&mut Leaf> {
        match &mut self.slots[id.index()].data {
            NodeData::Leaf(leaf) => Some(leaf),
            NodeData::Interior(_) => None,
        }
    }

    /// Text of a leaf; empty for interior nodes.
    pub fn value(&self, id: NodeId) -> &str {
        self.leaf(id).map_or("", |l| l.value.as_str())
    }

    /// True for a leaf of kind `kind` spelled `value`.
    pub fn is_leaf_value(&self, id: NodeId, kind: TokenKind, value: &str) -> bool {
        self.leaf(id).is_some_and(|l| l.kind == kind && l.value == value)
    }

    /// True for a `NAME` leaf spelled `keyword`.
    pub fn is_name(&self, id: NodeId, keyword: &str) -> bool {
        self.is_leaf_value(id, TokenKind::Name, keyword)
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        if let Some(leaf) = self.leaf_mut(id) {
            leaf.value = value.into();
        }
    }

    pub fn set_token_kind(&mut self, id: NodeId, kind: TokenKind) {
        if let Some(leaf) = self.leaf_mut(id) {
            leaf.kind = kind;
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.data(id) {
            NodeData::Interior(node) => &node.children,
            NodeData::Leaf(_) => &[],
        }
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.index()].parent
    }

    pub fn parent_syntax(&self, id: NodeId) -> Option<Syntax> {
        self.parent(id).and_then(|p| self.syntax(p))
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index.checked_sub(1).and_then(|i| self.child(parent, i))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.child(parent, index + 1)
    }

    pub fn first_leaf(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            match self.data(current) {
                NodeData::Leaf(_) => return Some(current),
                NodeData::Interior(node) => current = *node.children.first()?,
            }
        }
    }

    pub fn last_leaf(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            match self.data(current) {
                NodeData::Leaf(_) => return Some(current),
                NodeData::Interior(node) => current = *node.children.last()?,
            }
        }
    }

    /// All leaves under `id`, in source order.
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.data(current) {
                NodeData::Leaf(_) => out.push(current),
                NodeData::Interior(node) => stack.extend(node.children.iter().rev()),
            }
        }
        out
    }

    /// `id` and all of its descendants, parents before children.
    pub fn pre_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// The leaf that comes right before `id` in source order, if any.
    pub fn preceding_leaf(&self, id: NodeId) -> Option<NodeId> {
        let mut node = id;
        loop {
            if let Some(prev) = self.prev_sibling(node) {
                return self.last_leaf(prev);
            }
            node = self.parent(node)?;
        }
    }

    /// The leaf that comes right after `id` in source order, if any.
    pub fn following_leaf(&self, id: NodeId) -> Option<NodeId> {
        let mut node = id;
        loop {
            if let Some(next) = self.next_sibling(node) {
                return self.first_leaf(next);
            }
            node = self.parent(node)?;
        }
    }

    /// Prefix of the first leaf under `id`.
    pub fn prefix(&self, id: NodeId) -> &str {
        self.first_leaf(id)
            .and_then(|l| self.leaf(l))
            .map_or("", |l| l.prefix.as_str())
    }

    pub fn set_prefix(&mut self, id: NodeId, prefix: impl Into<String>) {
        if let Some(first) = self.first_leaf(id)
            && let Some(leaf) = self.leaf_mut(first)
        {
            leaf.prefix = prefix.into();
        }
    }

    /// Source line of the first leaf under `id`.
    pub fn line(&self, id: NodeId) -> usize {
        self.first_leaf(id)
            .and_then(|l| self.leaf(l))
            .map_or(0, |l| l.line)
    }

    /// Detach `id` from its parent, returning its former position.
    pub fn remove(&mut self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        if let NodeData::Interior(node) = &mut self.slots[parent.index()].data {
            node.children.remove(index);
        }
        self.slots[id.index()].parent = None;
        Some(index)
    }

    /// Put `new` where `old` is; `old` ends up detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.parent(old) else {
            return;
        };
        let Some(index) = self.index_in_parent(old) else {
            return;
        };
        self.remove(new);
        if let NodeData::Interior(node) = &mut self.slots[parent.index()].data {
            node.children[index] = new;
        }
        self.slots[new.index()].parent = Some(parent);
        self.slots[old.index()].parent = None;
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.remove(child);
        if let NodeData::Interior(node) = &mut self.slots[parent.index()].data {
            let index = index.min(node.children.len());
            node.children.insert(index, child);
        }
        self.slots[child.index()].parent = Some(parent);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child);
    }

    /// Replace `node` with a new interior node of `kind` wrapping it.
    pub fn wrap(&mut self, node: NodeId, kind: Syntax, before: Vec<NodeId>, after: Vec<NodeId>) -> NodeId {
        let parent = self.parent(node);
        let index = self.index_in_parent(node);
        self.remove(node);
        let mut children = before;
        children.push(node);
        children.extend(after);
        let wrapper = self.new_node(kind, children);
        if let (Some(parent), Some(index)) = (parent, index) {
            self.insert_child(parent, index, wrapper);
        }
        wrapper
    }

    /// Reconstruct the source text of the subtree at `id`.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        for leaf in self.leaves(id) {
            if let Some(l) = self.leaf(leaf) {
                out.push_str(&l.prefix);
                out.push_str(&l.value);
            }
        }
        out
    }

    /// Reconstruct the whole source text.
    pub fn to_source(&self) -> String {
        match self.root {
            Some(root) => self.render(root),
            None => String::new(),
        }
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let a = tree.new_leaf(TokenKind::Name, "a", "", (1, 0));
        let plus = tree.new_leaf(TokenKind::Op, "+", " ", (1, 2));
        let b = tree.new_leaf(TokenKind::Name, "b", " ", (1, 4));
        let expr = tree.new_node(Syntax::ArithExpr, vec![a, plus, b]);
        tree.set_root(expr);
        (tree, a, plus, b)
    }

    #[test]
    fn renders_losslessly() {
        let (tree, ..) = sample();
        assert_eq!(tree.to_source(), "a + b");
    }

    #[test]
    fn sibling_navigation() {
        let (tree, a, plus, b) = sample();
        assert_eq!(tree.next_sibling(a), Some(plus));
        assert_eq!(tree.prev_sibling(b), Some(plus));
        assert_eq!(tree.prev_sibling(a), None);
        assert_eq!(tree.preceding_leaf(b), Some(plus));
        assert_eq!(tree.following_leaf(a), Some(plus));
    }

    #[test]
    fn wrap_and_replace() {
        let (mut tree, a, _, b) = sample();
        let lpar = tree.new_leaf(TokenKind::LPar, "(", "", (0, 0));
        let rpar = tree.new_leaf(TokenKind::RPar, ")", "", (0, 0));
        let atom = tree.wrap(b, Syntax::Atom, vec![lpar], vec![rpar]);
        assert_eq!(tree.parent(b), Some(atom));
        assert_eq!(tree.to_source(), "a + ( b)");
        let c = tree.new_leaf(TokenKind::Name, "c", "", (0, 0));
        tree.replace(a, c);
        assert_eq!(tree.parent(a), None);
        assert_eq!(tree.to_source(), "c + ( b)");
    }

    #[test]
    fn remove_detaches() {
        let (mut tree, _, plus, _) = sample();
        assert_eq!(tree.remove(plus), Some(1));
        assert_eq!(tree.to_source(), "a b");
        assert_eq!(tree.parent(plus), None);
    }
}
