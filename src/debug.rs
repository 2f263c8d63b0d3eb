use crate::tree::{NodeData, NodeId, Tree};
use std::fmt::Write;

/// Render the tree one node per line, children indented under their parent.
///
/// Leaves show their position and value; a non-empty prefix follows in
/// debug form so comments and blank lines are visible.
pub fn dump_tree(tree: &Tree) -> String {
    let mut out = String::new();
    dump_node(tree, tree.root(), 0, &mut out);
    out
}

fn dump_node(tree: &Tree, id: NodeId, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match tree.data(id) {
        NodeData::Leaf(leaf) => {
            let _ = write!(out, "{}{}@{}:{} {:?}", indent, leaf.kind, leaf.line, leaf.column, leaf.value);
            if !leaf.prefix.is_empty() {
                let _ = write!(out, " prefix={:?}", leaf.prefix);
            }
            out.push('\n');
        }
        NodeData::Interior(node) => {
            let _ = writeln!(out, "{}{}", indent, node.kind);
            for &child in &node.children {
                dump_node(tree, child, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::collections::BTreeSet;

    #[test]
    fn dump_shows_structure_and_leaves() {
        let tree = parse("x = 1  # one\n", &BTreeSet::new()).unwrap();
        let dump = dump_tree(&tree);
        assert!(dump.starts_with("file_input\n"));
        assert!(dump.contains("  NAME@1:0 \"x\""));
        assert!(dump.contains("NUMBER@1:4 \"1\" prefix=\" \""));
        assert!(dump.contains("prefix=\"  # one\""));
    }
}
