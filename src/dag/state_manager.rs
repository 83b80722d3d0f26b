// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::dag::DependencyGraph;
use crate::dag::scheduler_step::Transition;
use crate::dag::task_info::TaskInfo;
use crate::types::{SkipReason, TaskName, TaskState};

/// Applies state changes to the scheduler's task map and records every one
/// of them as a [`Transition`].
pub struct StateManager<'a> {
    graph: &'a DependencyGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
    transitions: &'a mut Vec<Transition>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        tasks: &'a mut HashMap<TaskName, TaskInfo>,
        transitions: &'a mut Vec<Transition>,
    ) -> Self {
        Self {
            graph,
            tasks,
            transitions,
        }
    }

    /// Move `name` to `to`. Terminal states are final; returns `false` when
    /// nothing changed.
    pub fn transition(&mut self, name: &str, to: TaskState) -> bool {
        let Some(info) = self.tasks.get_mut(name) else {
            warn!(task = %name, "transition for task missing from state map");
            return false;
        };
        if info.state == to || info.state.is_terminal() {
            return false;
        }

        let at = SystemTime::now();
        if to.is_terminal() {
            info.finished_at = Some(at);
        }
        self.transitions.push(Transition {
            task: info.name.clone(),
            from: info.state,
            to,
            at,
        });
        debug!(task = %info.name, from = %info.state, to = %to, "task state changed");
        info.state = to;
        true
    }

    /// Mark a not-yet-dispatched task as skipped.
    pub fn skip(&mut self, name: &str, reason: SkipReason) -> bool {
        let waiting = self.tasks.get(name).is_some_and(TaskInfo::is_waiting);
        if !waiting {
            return false;
        }
        if let Some(info) = self.tasks.get_mut(name) {
            info.skip_reason = Some(reason);
        }
        self.transition(name, TaskState::Skipped)
    }

    /// Skip every direct and transitive dependent of `failed` that has not
    /// been dispatched yet. Returns the newly skipped tasks.
    pub fn skip_dependents(&mut self, failed: &str) -> Vec<TaskName> {
        let mut skipped = Vec::new();
        for dependent in self.graph.transitive_dependents_of(failed) {
            if self.skip(&dependent, SkipReason::UpstreamFailed) {
                debug!(
                    task = %dependent,
                    upstream = %failed,
                    "skipping dependent of failed task"
                );
                skipped.push(dependent);
            }
        }
        skipped
    }

    /// Skip everything still waiting to be dispatched.
    pub fn skip_all_waiting(&mut self, reason: SkipReason) -> Vec<TaskName> {
        // Walk in insertion order so transitions come out deterministically.
        let waiting: Vec<TaskName> = self
            .graph
            .tasks()
            .map(|t| t.name().to_string())
            .filter(|n| self.tasks.get(n).is_some_and(TaskInfo::is_waiting))
            .collect();

        waiting
            .into_iter()
            .filter(|n| self.skip(n, reason))
            .collect()
    }

    /// Promote `Pending` tasks whose dependencies are all in `completed` to
    /// `Ready`, and return every `Ready` task in dispatch order.
    pub fn collect_ready(&mut self, completed: &HashSet<TaskName>) -> Vec<TaskName> {
        let dispatched: HashSet<TaskName> = self
            .tasks
            .values()
            .filter(|info| !info.is_waiting())
            .map(|info| info.name.clone())
            .collect();

        let ready: Vec<TaskName> = self
            .graph
            .ready_tasks(completed, &dispatched)
            .into_iter()
            .map(|t| t.name().to_string())
            .collect();

        for name in &ready {
            if self
                .tasks
                .get(name)
                .is_some_and(|info| info.state == TaskState::Pending)
            {
                self.transition(name, TaskState::Ready);
            }
        }

        ready
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(|info| info.state.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infos(names: &[&str]) -> HashMap<TaskName, TaskInfo> {
        names
            .iter()
            .map(|n| (n.to_string(), TaskInfo::new(n.to_string())))
            .collect()
    }

    #[test]
    fn run_is_terminal_only_when_every_task_is() {
        let graph = DependencyGraph::new();
        let mut tasks = infos(&["a", "b"]);
        let mut transitions = Vec::new();
        let mut manager = StateManager::new(&graph, &mut tasks, &mut transitions);

        assert!(!manager.all_tasks_terminal());
        assert!(manager.transition("a", TaskState::Succeeded));
        assert!(!manager.all_tasks_terminal());
        assert!(manager.transition("b", TaskState::Failed));
        assert!(manager.all_tasks_terminal());

        // Terminal states are final.
        assert!(!manager.transition("b", TaskState::Running));
        assert_eq!(transitions.len(), 2);
        assert!(tasks.values().all(|i| i.finished_at.is_some()));
    }
}
