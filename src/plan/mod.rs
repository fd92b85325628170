// ============================================================================
// File: packages/adles/src/plan/mod.rs
// ----------------------------------------------------------------------------
// Operation tree: the full set of platform operations of an environment,
// arranged so every folder precedes its contents.
// ============================================================================

mod builder;
mod operation;

pub use builder::{MASTER_FOLDER_NAME, MASTER_PREFIX, build};
pub use operation::{
    Applicability, MasterKey, Operation, OperationId, OperationNode, ServiceOperation,
};

/// Arena of operation nodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationTree {
    nodes: Vec<OperationNode>,
    roots: Vec<OperationId>,
}

impl OperationTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node under `parent`
    pub(crate) fn push(
        &mut self,
        parent: Option<OperationId>,
        applicability: Applicability,
        origin: impl Into<String>,
        operation: Operation,
    ) -> OperationId {
        let id = OperationId(self.nodes.len());
        let depth = match parent {
            Some(parent) => self.nodes[parent.0].depth + 1,
            None => 0,
        };
        self.nodes.push(OperationNode {
            id,
            parent,
            children: Vec::new(),
            depth,
            applicability,
            origin: origin.into(),
            operation,
        });
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn get(&self, id: OperationId) -> Option<&OperationNode> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[OperationId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in arena order, which is creation order
    pub fn iter(&self) -> impl Iterator<Item = &OperationNode> {
        self.nodes.iter()
    }

    /// Node ids in DFS pre-order: parents before children, permissions and
    /// networks before the rest of a folder's contents
    pub fn creation_order(&self) -> Vec<OperationId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<OperationId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    /// Reverse of creation order: children before parents
    pub fn cleanup_order(&self) -> Vec<OperationId> {
        let mut order = self.creation_order();
        order.reverse();
        order
    }

    /// Ancestors of a node, nearest first
    pub fn ancestors(&self, id: OperationId) -> Vec<OperationId> {
        let mut ancestors = Vec::new();
        let mut current = self.get(id).and_then(|node| node.parent);
        while let Some(parent) = current {
            ancestors.push(parent);
            current = self.nodes[parent.0].parent;
        }
        ancestors
    }

    /// Number of nodes matching `predicate`
    pub fn count(&self, predicate: impl Fn(&OperationNode) -> bool) -> usize {
        self.nodes.iter().filter(|node| predicate(node)).count()
    }

    /// Indented text rendering, one node per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        for id in self.creation_order() {
            let node = &self.nodes[id.0];
            out.push_str(&"  ".repeat(node.depth));
            out.push_str(&format!("[{}] {}\n", node.applicability, node.operation));
        }
        out
    }
}

#[cfg(test)]
mod tests;
