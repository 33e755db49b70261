//! Frontier of directories waiting to be listed
//!
//! A LIFO stack so the walk stays depth-first. Completion is tracked with a
//! pending count covering both queued tasks and tasks a worker is still
//! processing: the walk is done when that count reaches zero.

use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;

/// A directory to list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirTask {
    pub path: PathBuf,
    /// Depth from root (0 = root)
    pub depth: usize,
}

impl DirTask {
    pub fn root(path: PathBuf) -> Self {
        Self { path, depth: 0 }
    }

    /// Task for a subdirectory one level below this one
    pub fn child(&self, path: PathBuf) -> Self {
        Self {
            path,
            depth: self.depth + 1,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    stack: Vec<DirTask>,
    pending: usize,
    closed: bool,
}

/// Shared work stack with completion detection
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<State>,
    changed: Condvar,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task; ignored once the frontier is closed
    pub fn push(&self, task: DirTask) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.pending += 1;
        state.stack.push(task);
        drop(state);
        self.changed.notify_one();
    }

    /// Take the most recently queued task
    ///
    /// Blocks while other workers may still produce work. Returns `None`
    /// once everything is done or the frontier was closed.
    pub fn pop(&self) -> Option<DirTask> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(task) = state.stack.pop() {
                return Some(task);
            }
            if state.pending == 0 {
                return None;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Mark a popped task as fully processed
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        let finished = state.pending == 0;
        drop(state);
        if finished {
            self.changed.notify_all();
        }
    }

    /// Stop handing out work; queued tasks are discarded
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.stack.clear();
        drop(state);
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Queued plus in-progress tasks
    pub fn pending(&self) -> usize {
        self.state.lock().pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pop_is_lifo() {
        let frontier = Frontier::new();
        let root = DirTask::root(PathBuf::from("/r"));
        frontier.push(root.child(PathBuf::from("/r/a")));
        frontier.push(root.child(PathBuf::from("/r/b")));

        assert_eq!(frontier.pop().unwrap().path, PathBuf::from("/r/b"));
        assert_eq!(frontier.pop().unwrap().depth, 1);
        assert_eq!(frontier.pending(), 2);
    }

    #[test]
    fn test_pop_returns_none_when_all_work_completes() {
        let frontier = Frontier::new();
        frontier.push(DirTask::root(PathBuf::from("/r")));
        let task = frontier.pop().unwrap();
        assert_eq!(task.depth, 0);
        frontier.complete();
        assert!(frontier.pop().is_none());
    }

    #[test]
    fn test_waiting_worker_sees_new_work_then_completion() {
        let frontier = Arc::new(Frontier::new());
        frontier.push(DirTask::root(PathBuf::from("/r")));
        let root = frontier.pop().unwrap();

        let waiter = {
            let frontier = Arc::clone(&frontier);
            thread::spawn(move || {
                let mut seen = 0;
                while let Some(_task) = frontier.pop() {
                    seen += 1;
                    frontier.complete();
                }
                seen
            })
        };

        frontier.push(root.child(PathBuf::from("/r/a")));
        frontier.push(root.child(PathBuf::from("/r/b")));
        frontier.complete();

        assert_eq!(waiter.join().unwrap(), 2);
    }

    #[test]
    fn test_close_discards_queued_tasks() {
        let frontier = Frontier::new();
        frontier.push(DirTask::root(PathBuf::from("/r")));
        frontier.close();
        assert!(frontier.is_closed());
        assert!(frontier.pop().is_none());

        frontier.push(DirTask::root(PathBuf::from("/again")));
        assert!(frontier.pop().is_none());
    }
}
