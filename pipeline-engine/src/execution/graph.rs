// Job Graph (DAG)
// Validated dependency graph of jobs, producing tiered execution order

use crate::model::{Job, JobRef, Pipeline};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Error type for graph operations
#[derive(Debug, Clone)]
pub struct GraphError {
    pub message: String,
    pub kind: GraphErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// Circular dependency detected
    CyclicDependency,
    /// Reference to an unknown job
    UnknownDependency,
    /// Job name already present in the graph
    DuplicateJob,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    pub fn cyclic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::CyclicDependency,
        }
    }

    pub fn unknown_dependency(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::UnknownDependency,
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::DuplicateJob,
        }
    }
}

/// A node in the job graph
#[derive(Debug, Clone)]
pub struct JobNode {
    /// Job definition (shared with the instances expanded from it)
    pub job: JobRef,
    /// Names of jobs this job depends on
    pub dependencies: Vec<String>,
}

/// Directed acyclic graph of named jobs.
/// Every mutation validates; a rejected mutation leaves the graph unchanged.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    nodes: Vec<JobNode>,
    indices: HashMap<String, usize>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a pipeline definition. Jobs may reference
    /// dependencies declared later in the list; the whole definition is
    /// validated afterwards.
    pub fn from_pipeline(pipeline: &Pipeline) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for job in &pipeline.jobs {
            graph.insert_node(job.clone())?;
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Add a job whose dependencies must already be present.
    /// Fails with `UnknownDependency` for an absent dependency and
    /// `CyclicDependency` for a self-dependency.
    pub fn add_job(&mut self, job: Job) -> Result<(), GraphError> {
        for dep in &job.depends_on {
            if *dep == job.name {
                return Err(GraphError::cyclic(format!(
                    "job '{}' depends on itself",
                    job.name
                )));
            }
            if !self.indices.contains_key(dep) {
                return Err(GraphError::unknown_dependency(format!(
                    "job '{}' depends on unknown job '{}'",
                    job.name, dep
                )));
            }
        }
        self.insert_node(job)
    }

    /// Add a dependency edge between existing jobs.
    /// Fails with `CyclicDependency` if the edge would close a cycle;
    /// the graph is unchanged after any error.
    pub fn add_dependency(&mut self, name: &str, depends_on: &str) -> Result<(), GraphError> {
        let index = *self.indices.get(name).ok_or_else(|| {
            GraphError::unknown_dependency(format!("unknown job '{}'", name))
        })?;
        if !self.indices.contains_key(depends_on) {
            return Err(GraphError::unknown_dependency(format!(
                "job '{}' depends on unknown job '{}'",
                name, depends_on
            )));
        }
        if name == depends_on || self.depends_transitively(depends_on, name) {
            return Err(GraphError::cyclic(format!(
                "adding dependency '{}' -> '{}' would create a cycle",
                name, depends_on
            )));
        }
        let node = &mut self.nodes[index];
        if !node.dependencies.iter().any(|d| d == depends_on) {
            node.dependencies.push(depends_on.to_string());
        }
        Ok(())
    }

    /// Insert a node without dependency validation (used during batch build)
    fn insert_node(&mut self, job: Job) -> Result<(), GraphError> {
        if self.indices.contains_key(&job.name) {
            return Err(GraphError::duplicate(format!(
                "job '{}' is already defined",
                job.name
            )));
        }
        let dependencies = job.depends_on.clone();
        self.indices.insert(job.name.clone(), self.nodes.len());
        self.nodes.push(JobNode {
            job: Arc::new(job),
            dependencies,
        });
        Ok(())
    }

    /// Whether `from` transitively depends on `target`
    fn depends_transitively(&self, from: &str, target: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(name) = stack.pop() {
            if name == target {
                return true;
            }
            if !seen.insert(name) {
                continue;
            }
            if let Some(&index) = self.indices.get(name) {
                stack.extend(self.nodes[index].dependencies.iter().map(String::as_str));
            }
        }
        false
    }

    /// Validate the whole graph: dependencies exist and no cycles
    pub fn validate(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            for dep in &node.dependencies {
                if !self.indices.contains_key(dep) {
                    return Err(GraphError::unknown_dependency(format!(
                        "job '{}' depends on unknown job '{}'",
                        node.job.name, dep
                    )));
                }
            }
        }
        self.detect_cycles()
    }

    /// Detect cycles using DFS
    fn detect_cycles(&self) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node in &self.nodes {
            if !visited.contains(node.job.name.as_str()) {
                if let Some(cycle) = self.dfs_cycle(node, &mut visited, &mut rec_stack) {
                    return Err(GraphError::cyclic(format!(
                        "circular dependency detected: {}",
                        cycle.join(" -> ")
                    )));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &JobNode,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        let name = node.job.name.clone();
        visited.insert(name.clone());
        rec_stack.insert(name.clone());

        for dep in &node.dependencies {
            if !visited.contains(dep) {
                if let Some(&index) = self.indices.get(dep) {
                    if let Some(mut cycle) =
                        self.dfs_cycle(&self.nodes[index], visited, rec_stack)
                    {
                        cycle.insert(0, name.clone());
                        return Some(cycle);
                    }
                }
            } else if rec_stack.contains(dep) {
                return Some(vec![name.clone(), dep.clone()]);
            }
        }

        rec_stack.remove(&name);
        None
    }

    /// Get a job node by name
    pub fn get(&self, name: &str) -> Option<&JobNode> {
        self.indices.get(name).map(|&index| &self.nodes[index])
    }

    /// Number of jobs in the graph
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Jobs in topological order (Kahn's algorithm).
    /// Never yields a job before one of its dependencies.
    pub fn topological_order(&self) -> Vec<&JobNode> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut adj_list: HashMap<&str, Vec<&str>> = HashMap::new();

        for node in &self.nodes {
            let name = node.job.name.as_str();
            in_degree.entry(name).or_insert(0);
            adj_list.entry(name).or_default();

            for dep in &node.dependencies {
                adj_list.entry(dep.as_str()).or_default().push(name);
                *in_degree.entry(name).or_insert(0) += 1;
            }
        }

        // Seed with in-degree 0, preserving declaration order for determinism
        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(|n| n.job.name.as_str())
            .filter(|name| in_degree.get(name) == Some(&0))
            .collect();

        let mut result = Vec::new();

        while let Some(name) = queue.pop_front() {
            if let Some(&index) = self.indices.get(name) {
                result.push(&self.nodes[index]);
            }

            if let Some(neighbors) = adj_list.get(name) {
                for &neighbor in neighbors {
                    if let Some(degree) = in_degree.get_mut(neighbor) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }

        result
    }

    /// Ready sets: groups of jobs whose dependencies are all satisfied at
    /// the same tier. Jobs within a tier have no ordering requirement and
    /// may run concurrently.
    pub fn tiers(&self) -> Vec<Vec<&JobNode>> {
        let mut levels: Vec<Vec<&JobNode>> = Vec::new();
        let mut assigned: HashMap<&str, usize> = HashMap::new();

        for node in self.topological_order() {
            let name = node.job.name.as_str();
            let level = if node.dependencies.is_empty() {
                0
            } else {
                node.dependencies
                    .iter()
                    .filter_map(|dep| assigned.get(dep.as_str()))
                    .max()
                    .map(|l| l + 1)
                    .unwrap_or(0)
            };

            assigned.insert(name, level);

            if level >= levels.len() {
                levels.resize(level + 1, Vec::new());
            }
            levels[level].push(node);
        }

        levels
    }
}
