//! Provides a DFS visitor to allow simple AIG traversal.
//!
//! See [`Dfs`] for details.

use std::collections::HashSet;

use super::{Aig, AigNode, NodeId};

/// A simple DFS visitor over the transitive fanin of some nodes.
///
/// Nodes are yielded in preorder. You can:
/// - start a DFS from a node using [`from_node`]
/// - or visit all the AIG by starting from the outputs using [`from_outputs`].
///
/// The visitor only stores slot ids, so it does not borrow the AIG between two calls.
/// Slots freed in the meantime are silently skipped.
///
/// [`from_node`]: Dfs::from_node
/// [`from_outputs`]: Dfs::from_outputs
///
/// ```rust
/// use certaig::{Aig, dfs::Dfs};
/// let mut aig = Aig::new();
/// let a = aig.add_input();
/// let b = aig.add_input();
/// let ab = aig.and(a, b).unwrap();
/// aig.add_output(ab).unwrap();
/// let mut dfs = Dfs::from_outputs(&aig);
/// let mut count = 0;
/// while let Some(_node) = dfs.next(&aig) {
///     count += 1;
/// }
/// assert_eq!(count, 3);
/// ```
pub struct Dfs {
    /// Nodes on the stack have not been visited yet, but are already marked as seen.
    stack: Vec<NodeId>,
    seen: HashSet<NodeId>,
}

impl Dfs {
    /// Create a DFS from the initial start node.
    /// You will only browse the fanin of this node.
    pub fn from_node(start: NodeId) -> Self {
        Dfs {
            stack: vec![start],
            seen: HashSet::from([start]),
        }
    }

    /// Create a DFS from the outputs of the given AIG, first output first.
    pub fn from_outputs(aig: &Aig) -> Self {
        let mut dfs = Dfs {
            stack: Vec::new(),
            seen: HashSet::new(),
        };
        let starts: Vec<NodeId> = aig
            .get_outputs()
            .iter()
            .map(|o| o.node)
            .filter(|&id| dfs.seen.insert(id))
            .collect();
        dfs.stack.extend(starts.into_iter().rev());
        dfs
    }

    /// Yield the next node of the DFS, or None if it is done.
    pub fn next<'a>(&mut self, aig: &'a Aig) -> Option<&'a AigNode> {
        while let Some(id) = self.stack.pop() {
            let Some(node) = aig.get_node(id) else {
                continue;
            };
            for child in node.get_fanins() {
                if self.seen.insert(child.node) {
                    self.stack.push(child.node);
                }
            }
            return Some(node);
        }
        None
    }
}
