// SPDX-License-Identifier: MIT OR Apache-2.0

//! Values that are inherited down the task tree.
//!
//! A [`ThreadField`] holds at most one value per task. Reading for a task that has no value of
//! its own walks up its ancestors and returns the first value found, or the field's default
//! once the walk passes a root. Parent links are fixed when a task is created, so a child
//! sees whatever its ancestors had set before it was spawned.
//!
//! ```rust
//! use sessionwise::task::TaskHandle;
//! use sessionwise::thread_field::{FieldMode, ThreadField};
//!
//! let field = ThreadField::new("default", FieldMode::CachedInherit);
//! let parent = TaskHandle::new_root();
//! field.set(&parent, "parent");
//! let child = parent.new_child();
//! assert_eq!(field.get(&child), "parent");
//! assert_eq!(field.get(&TaskHandle::new_root()), "default");
//! ```
//!
//! # Ordering
//!
//! Only spawn-time ordering is guaranteed: a set on a task is visible to descendants created
//! afterwards. A descendant already running may keep the value it resolved before the set.
//!
//! # Reclamation
//!
//! Entries hold their task weakly. Entries whose task is gone are removed by [`ThreadField::prune`],
//! which also runs on its own every [`prune_interval`](ThreadField::with_prune_interval) stores.
//! Both `set` and the cache entries recorded by inherited reads count as stores, so a field that
//! is only ever read still gets pruned. Reclamation is eventual, not synchronous with task
//! completion.

use crate::task::{TaskHandle, TaskId, TaskInner};
use dashmap::DashMap;
use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stores between automatic prune passes.
const DEFAULT_PRUNE_INTERVAL: usize = 256;

/// Whether inherited reads are remembered at the reading task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldMode {
    /// The first inherited read records the value at the reading task; later reads are O(1).
    CachedInherit,
    /// Every read walks the ancestor chain.
    Recompute,
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    own: bool,
    depth: usize,
    task: Weak<TaskInner>,
}

impl<T> Entry<T> {
    fn new(value: T, own: bool, task: &TaskHandle) -> Self {
        Entry {
            value,
            own,
            depth: task.depth(),
            task: task.downgrade(),
        }
    }

    fn is_dead(&self) -> bool {
        self.task.strong_count() == 0
    }
}

/// A per-task-branch variable. See the [module docs](self).
#[derive(Debug)]
pub struct ThreadField<T> {
    default: T,
    mode: FieldMode,
    entries: DashMap<TaskId, Entry<T>>,
    stores: AtomicUsize,
    prune_interval: usize,
}

impl<T> ThreadField<T>
where
    T: Clone + Send + Sync,
{
    pub fn new(default: T, mode: FieldMode) -> Self {
        ThreadField {
            default,
            mode,
            entries: DashMap::new(),
            stores: AtomicUsize::new(0),
            prune_interval: DEFAULT_PRUNE_INTERVAL,
        }
    }

    /// Sets how many stores happen between automatic prune passes. `0` disables them.
    pub fn with_prune_interval(mut self, stores: usize) -> Self {
        self.prune_interval = stores;
        self
    }

    pub fn mode(&self) -> FieldMode {
        self.mode
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Resolves the value for `task`: its own, else the nearest ancestor's, else the default.
    pub fn get(&self, task: &TaskHandle) -> T {
        if let Some(entry) = self.entries.get(&task.id()) {
            return entry.value.clone();
        }
        let mut cursor = task.parent();
        let resolved = loop {
            match cursor {
                None => break self.default.clone(),
                Some(ancestor) => {
                    if let Some(entry) = self.entries.get(&ancestor.id()) {
                        break entry.value.clone();
                    }
                    cursor = ancestor.parent();
                }
            }
        };
        if self.mode == FieldMode::CachedInherit {
            let cached = match self.entries.entry(task.id()) {
                dashmap::Entry::Occupied(_) => false,
                dashmap::Entry::Vacant(slot) => {
                    slot.insert(Entry::new(resolved.clone(), false, task));
                    true
                }
            };
            if cached {
                self.note_store();
            }
        }
        resolved
    }

    /// Resolves the value for the calling thread's current task.
    pub fn get_current(&self) -> T {
        self.get(&TaskHandle::current())
    }

    /// Whether `task` has a value of its own (not inherited, not cached).
    pub fn has_own(&self, task: &TaskHandle) -> bool {
        self.entries.get(&task.id()).is_some_and(|e| e.own)
    }

    /// Stores `value` as `task`'s own value and forgets values descendants cached from above it.
    pub fn set(&self, task: &TaskHandle, value: T) {
        let previous = self.entries.insert(task.id(), Entry::new(value, true, task));
        // dropped outside the shard lock; the old value may run arbitrary Drop code
        drop(previous);
        self.invalidate_below(task);
        self.note_store();
    }

    /// Removes `task`'s own value, so it inherits again. Returns the removed value.
    pub fn clear(&self, task: &TaskHandle) -> Option<T> {
        let removed = self
            .entries
            .remove_if(&task.id(), |_, entry| entry.own)
            .map(|(_, entry)| entry.value);
        if removed.is_some() {
            self.invalidate_below(task);
        }
        removed
    }

    /// Drops cached entries of strict descendants of `task`, and any entry whose task is gone.
    ///
    /// Only cached entries strictly deeper than `task` are upgraded and checked for ancestry.
    fn invalidate_below(&self, task: &TaskHandle) {
        let depth = task.depth();
        // holders are released only after the iteration's shard locks are gone
        let mut holders: Vec<TaskHandle> = Vec::new();
        let mut doomed: Vec<TaskId> = Vec::new();
        for entry in self.entries.iter() {
            if entry.is_dead() {
                doomed.push(*entry.key());
            } else if !entry.own && entry.depth > depth {
                match TaskHandle::upgrade(&entry.task) {
                    None => doomed.push(*entry.key()),
                    Some(holder) => {
                        if holder.descends_from(task) {
                            doomed.push(*entry.key());
                        }
                        holders.push(holder);
                    }
                }
            }
        }
        self.remove_keys(doomed, |entry| !entry.own || entry.is_dead());
        drop(holders);
    }

    /// Removes every entry whose task is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let doomed: Vec<TaskId> = self
            .entries
            .iter()
            .filter(|entry| entry.is_dead())
            .map(|entry| *entry.key())
            .collect();
        self.remove_keys(doomed, Entry::is_dead)
    }

    /// Removes `keys` whose entry still satisfies `still_doomed` at removal time.
    fn remove_keys(
        &self,
        keys: Vec<TaskId>,
        still_doomed: impl Fn(&Entry<T>) -> bool,
    ) -> usize {
        let mut removed = Vec::new();
        for key in keys {
            if let Some(pair) = self.entries.remove_if(&key, |_, entry| still_doomed(entry)) {
                removed.push(pair);
            }
        }
        removed.len()
    }

    fn note_store(&self) {
        if self.prune_interval == 0 {
            return;
        }
        let stores = self.stores.fetch_add(1, Ordering::Relaxed) + 1;
        if stores % self.prune_interval == 0 {
            self.prune();
        }
    }

    /// Number of stored entries, own and cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
