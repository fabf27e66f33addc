//! Ordered trail of command results kept by shell-backed resources
//!
//! The list is doubly linked through indices into an arena, so unlinking
//! and reversing never touch the stored results.

use crate::runner::CommandResults;

/// Index of a node in a [`ResultsContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    results: CommandResults,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultsContext {
    nodes: Vec<Option<Node>>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl ResultsContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn alloc(&mut self, results: CommandResults) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            results,
            prev: None,
            next: None,
        }));
        self.len += 1;
        id
    }

    /// Push onto the front
    pub fn cons(&mut self, results: CommandResults) -> NodeId {
        let id = self.alloc(results);
        match self.head {
            Some(head) => {
                if let Some(node) = self.node_mut(head) {
                    node.prev = Some(id);
                }
                if let Some(node) = self.node_mut(id) {
                    node.next = Some(head);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        id
    }

    /// Push onto the back
    pub fn append(&mut self, results: CommandResults) -> NodeId {
        let id = self.alloc(results);
        match self.tail {
            Some(tail) => {
                if let Some(node) = self.node_mut(tail) {
                    node.next = Some(id);
                }
                if let Some(node) = self.node_mut(id) {
                    node.prev = Some(tail);
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    /// Remove a node, returning its results
    pub fn unlink(&mut self, id: NodeId) -> Option<CommandResults> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        match node.prev {
            Some(prev) => {
                if let Some(p) = self.node_mut(prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.node_mut(next) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        self.len -= 1;
        Some(node.results)
    }

    /// Drop every node equal to an earlier one
    pub fn uniq(&mut self) {
        let mut seen: Vec<CommandResults> = Vec::new();
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let Some(node) = self.node(id) else { break };
            cursor = node.next;
            if seen.contains(&node.results) {
                self.unlink(id);
            } else {
                seen.push(node.results.clone());
            }
        }
    }

    /// Reverse in place
    pub fn reverse(&mut self) {
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let Some(node) = self.node_mut(id) else { break };
            std::mem::swap(&mut node.prev, &mut node.next);
            cursor = node.prev;
        }
        std::mem::swap(&mut self.head, &mut self.tail);
    }

    pub fn first(&self) -> Option<&CommandResults> {
        self.head.and_then(|id| self.node(id)).map(|n| &n.results)
    }

    pub fn last(&self) -> Option<&CommandResults> {
        self.tail.and_then(|id| self.node(id)).map(|n| &n.results)
    }

    /// The most recent results recorded under `op`
    pub fn last_by_op(&self, op: &str) -> Option<&CommandResults> {
        let mut cursor = self.tail;
        while let Some(node) = cursor.and_then(|id| self.node(id)) {
            if node.results.op == op {
                return Some(&node.results);
            }
            cursor = node.prev;
        }
        None
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            context: self,
            cursor: self.head,
        }
    }

    /// Human-readable trail, oldest first
    pub fn summarize(&self) -> String {
        let mut out = String::new();
        for results in self.iter() {
            out.push_str(&summarize_one(results));
        }
        out
    }
}

/// Summary of a single run
pub fn summarize_one(results: &CommandResults) -> String {
    let mut out = format!("{} (returned: {})\n", results.op, results.exit_status);
    for (label, text) in [("stdout", &results.stdout), ("stderr", &results.stderr)] {
        let text = text.trim_end();
        if !text.is_empty() {
            out.push_str(&format!("  {label}: {text}\n"));
        }
    }
    out
}

pub struct Iter<'a> {
    context: &'a ResultsContext,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a CommandResults;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.context.node(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.results)
    }
}
