// src/dag/graph.rs

//! The task dependency graph.
//!
//! Dependencies are kept as an explicit adjacency mapping over task names,
//! never as references between tasks. Sealing validates the mapping and
//! caches a topological order; a sealed graph is read-only.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::{Result, TaskweaveError};
use crate::task::Task;
use crate::types::TaskName;

/// Cached results of a successful [`DependencyGraph::seal`].
#[derive(Debug, Clone)]
struct SealedOrder {
    /// Topological order (dependencies before dependents).
    order: Vec<TaskName>,
    /// Reverse adjacency: task -> tasks that depend on it.
    dependents: HashMap<TaskName, Vec<TaskName>>,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Tasks in insertion order.
    tasks: Vec<Task>,
    /// Task name -> index into `tasks`.
    index: HashMap<TaskName, usize>,
    sealed: Option<SealedOrder>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Fails on a duplicate name or once the graph is sealed.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.sealed.is_some() {
            return Err(TaskweaveError::GraphSealed(format!(
                "cannot add task '{}'",
                task.name
            )));
        }
        if self.index.contains_key(&task.name) {
            return Err(TaskweaveError::DuplicateTask(task.name.clone()));
        }

        self.index.insert(task.name.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    /// Mutable access for adjusting dependencies before sealing.
    pub fn task_mut(&mut self, name: &str) -> Result<&mut Task> {
        if self.sealed.is_some() {
            return Err(TaskweaveError::GraphSealed(format!(
                "cannot modify task '{name}'"
            )));
        }
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.tasks[i]),
            None => Err(TaskweaveError::TaskNotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    /// Direct dependencies of `name` (empty for unknown tasks).
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.task(name)
            .map(|t| t.dependencies.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `name`. Only available once sealed.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.sealed
            .as_ref()
            .and_then(|s| s.dependents.get(name))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All direct and transitive dependents of `name`, in BFS order.
    pub fn transitive_dependents_of(&self, name: &str) -> Vec<TaskName> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);

        while let Some(current) = queue.pop_front() {
            for dep in self.dependents_of(current) {
                if seen.insert(dep.as_str()) {
                    out.push(dep.clone());
                    queue.push_back(dep.as_str());
                }
            }
        }
        out
    }

    /// Cached topological order. `None` until sealed.
    pub fn execution_order(&self) -> Option<&[TaskName]> {
        self.sealed.as_ref().map(|s| s.order.as_slice())
    }

    /// Validate the graph and freeze it.
    ///
    /// Checks, in order:
    /// - every dependency names a task in the graph,
    /// - the dependency relation is acyclic (the error carries the cycle).
    ///
    /// Sealing an already sealed graph is a no-op.
    pub fn seal(&mut self) -> Result<()> {
        if self.sealed.is_some() {
            return Ok(());
        }

        self.validate_dependencies()?;

        // Edge direction: dependency -> dependent, so the topological order
        // lists dependencies first.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for task in &self.tasks {
            graph.add_node(task.name.as_str());
        }
        for task in &self.tasks {
            for dep in &task.dependencies {
                graph.add_edge(dep.as_str(), task.name.as_str(), ());
            }
        }

        let order = match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(str::to_string).collect::<Vec<_>>(),
            Err(cycle) => {
                let path = self
                    .cycle_through(cycle.node_id())
                    .or_else(|| self.tasks.iter().find_map(|t| self.cycle_through(&t.name)))
                    .unwrap_or_else(|| vec![cycle.node_id().to_string()]);
                return Err(TaskweaveError::DagCycle { path });
            }
        };

        let mut dependents: HashMap<TaskName, Vec<TaskName>> = HashMap::new();
        for task in &self.tasks {
            for dep in &task.dependencies {
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.name.clone());
            }
        }

        debug!(tasks = self.tasks.len(), ?order, "dependency graph sealed");

        self.sealed = Some(SealedOrder { order, dependents });
        Ok(())
    }

    /// Tasks whose dependencies are all in `completed` and which are not in
    /// `dispatched`, highest priority first, then insertion order.
    ///
    /// Tasks already in `completed` are never returned.
    pub fn ready_tasks(
        &self,
        completed: &HashSet<TaskName>,
        dispatched: &HashSet<TaskName>,
    ) -> Vec<&Task> {
        // `tasks` is in insertion order and the sort is stable, so ties keep
        // insertion order.
        let mut ready: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| !completed.contains(&t.name) && !dispatched.contains(&t.name))
            .filter(|t| t.dependencies.iter().all(|d| completed.contains(d)))
            .collect();

        ready.sort_by(|a, b| b.priority.cmp(&a.priority));
        ready
    }

    fn validate_dependencies(&self) -> Result<()> {
        for task in &self.tasks {
            for dep in &task.dependencies {
                if !self.index.contains_key(dep) {
                    return Err(TaskweaveError::MissingDependency {
                        task: task.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Shortest dependency cycle starting and ending at `start`, expressed in
    /// "depends on" direction: `[a, b, a]` means `a` depends on `b` and `b`
    /// depends on `a`.
    fn cycle_through(&self, start: &str) -> Option<Vec<TaskName>> {
        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        for dep in &self.task(start)?.dependencies {
            if dep == start {
                return Some(vec![start.to_string(), start.to_string()]);
            }
            if !parent.contains_key(dep.as_str()) {
                parent.insert(dep.as_str(), start);
                queue.push_back(dep.as_str());
            }
        }

        while let Some(current) = queue.pop_front() {
            for dep in &self.task(current)?.dependencies {
                if dep == start {
                    // Walk parents back to `start`, then flip into forward order.
                    let mut path = vec![start.to_string(), current.to_string()];
                    let mut node = current;
                    while let Some(&p) = parent.get(node) {
                        if p == start {
                            break;
                        }
                        path.push(p.to_string());
                        node = p;
                    }
                    path.push(start.to_string());
                    path.reverse();
                    return Some(path);
                }
                if !parent.contains_key(dep.as_str()) && dep != start {
                    parent.insert(dep.as_str(), current);
                    queue.push_back(dep.as_str());
                }
            }
        }

        None
    }
}
