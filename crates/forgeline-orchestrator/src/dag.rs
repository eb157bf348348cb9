use std::collections::{HashMap, HashSet};

/// Opaque handle to one node in a [`Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
struct DagNode {
    label: String,
    dependencies: Vec<NodeId>,
}

/// A directed acyclic graph of named stages. Built once per run from the
/// architecture -> code[i] -> test[i] -> {quality, build} shape and then
/// drained node by node as dependencies complete.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    nodes: HashMap<NodeId, DagNode>,
    next_id: u32,
}

impl Dag {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn add_node(&mut self, label: impl Into<String>, dependencies: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            DagNode {
                label: label.into(),
                dependencies,
            },
        );
        id
    }

    pub fn label(&self, id: NodeId) -> &str {
        self.nodes.get(&id).map(|n| n.label.as_str()).unwrap_or("")
    }

    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Nodes whose every dependency is in `completed` and that are not
    /// themselves in `completed`.
    pub fn ready(&self, completed: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(id, node)| {
                !completed.contains(id) && node.dependencies.iter().all(|d| completed.contains(d))
            })
            .map(|(id, _)| *id)
            .collect();
        out.sort();
        out
    }

    /// Three-color DFS cycle detection: 0 = unvisited, 1 = on the current
    /// path (a back-edge into this color is a cycle), 2 = fully resolved.
    /// The graph this orchestrator builds is constructed node-by-node with
    /// only forward dependency references, so it can never actually
    /// contain a cycle; this check exists to fail loudly rather than hang
    /// if that construction invariant is ever broken.
    pub fn has_cycle(&self) -> bool {
        let mut color: HashMap<NodeId, u8> = HashMap::new();
        for id in self.nodes.keys() {
            if !color.contains_key(id) && self.dfs_cycle(*id, &mut color) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle(&self, id: NodeId, color: &mut HashMap<NodeId, u8>) -> bool {
        color.insert(id, 1);
        if let Some(node) = self.nodes.get(&id) {
            for dep in &node.dependencies {
                match color.get(dep).copied().unwrap_or(0) {
                    1 => return true,
                    2 => continue,
                    _ => {
                        if self.dfs_cycle(*dep, color) {
                            return true;
                        }
                    }
                }
            }
        }
        color.insert(id, 2);
        false
    }
}
