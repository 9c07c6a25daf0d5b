use crate::types::{AppError, Result, TaskNode};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A validated, acyclic set of tasks.
///
/// Construction rejects empty plans, duplicate ids, dependencies on unknown
/// tasks, self-references and cycles. A graph that exists is always
/// schedulable.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
    order: Vec<usize>,
}

impl TaskGraph {
    pub fn new(nodes: Vec<TaskNode>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(AppError::Planning("plan contains no tasks".to_string()));
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(AppError::Planning(format!("task #{} has an empty id", i + 1)));
            }
            if index.insert(node.id.clone(), i).is_some() {
                return Err(AppError::Planning(format!("duplicate task id '{}'", node.id)));
            }
        }

        for node in &nodes {
            let mut seen = HashSet::new();
            for dep in &node.dependencies {
                if dep == &node.id {
                    return Err(AppError::Planning(format!(
                        "task '{}' depends on itself",
                        node.id
                    )));
                }
                if !index.contains_key(dep) {
                    return Err(AppError::Planning(format!(
                        "task '{}' depends on unknown task '{}'",
                        node.id, dep
                    )));
                }
                if !seen.insert(dep) {
                    return Err(AppError::Planning(format!(
                        "task '{}' lists dependency '{}' twice",
                        node.id, dep
                    )));
                }
            }
        }

        let order = Self::kahn(&nodes, &index)?;
        Ok(Self {
            nodes,
            index,
            order,
        })
    }

    /// Kahn's algorithm. Among ready tasks the one declared first goes first.
    fn kahn(nodes: &[TaskNode], index: &HashMap<String, usize>) -> Result<Vec<usize>> {
        let mut in_degree: Vec<usize> = nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for dep in &node.dependencies {
                if let Some(&d) = index.get(dep) {
                    dependents[d].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < nodes.len() {
            let cyclic: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| nodes[i].id.as_str())
                .collect();
            return Err(AppError::Planning(format!(
                "dependency cycle among tasks: {}",
                cyclic.join(", ")
            )));
        }
        Ok(order)
    }

    /// Tasks in declaration order.
    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<TaskNode> {
        self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declaration indices in dependency order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn topological_order(&self) -> Vec<&TaskNode> {
        self.order.iter().map(|&i| &self.nodes[i]).collect()
    }

    /// Ids of tasks that list `id` as a dependency.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.dependencies.iter().any(|d| d == id))
            .map(|n| n.id.as_str())
            .collect()
    }
}
