//! Versioned key/value snapshots
//!
//! A `SnapshotTable` tracks the value of a set of keys along control-flow
//! shaped scopes: a scope is opened over the sealed snapshots of its
//! predecessors, written to, and sealed into an immutable `Snapshot` of its
//! own. Sealed snapshots form a tree (seal/merge only, never a general
//! graph), so the bookkeeping per scope is one delta of changed keys.
//!
//! Merging is pluggable: when a scope opens over several predecessors, the
//! caller's `merge_fn` is invoked for every key whose predecessor values
//! differ. Keys on which all predecessors agree keep their value untouched.

use rustc_hash::{FxHashMap, FxHashSet};

/// Handle to a tracked key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(u32);

impl Key {
    /// Position of this key in creation order
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Handle to a sealed snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Snapshot(u32);

/// Changes one sealed scope made relative to its parents
#[derive(Debug)]
struct SnapshotData<V> {
    parents: Vec<Snapshot>,
    changes: Vec<(Key, V)>,
}

/// The scope currently open for reading and writing
#[derive(Debug)]
struct OpenScope<V> {
    parents: Vec<Snapshot>,
    writes: FxHashMap<Key, V>,
}

/// A versioned key→value table with branch/merge-shaped scoped transactions
#[derive(Debug)]
pub struct SnapshotTable<V> {
    defaults: Vec<V>,
    snapshots: Vec<SnapshotData<V>>,
    open: Option<OpenScope<V>>,
}

impl<V: Clone + PartialEq> SnapshotTable<V> {
    /// Create an empty table with no keys and no open scope
    pub fn new() -> Self {
        SnapshotTable {
            defaults: Vec::new(),
            snapshots: Vec::new(),
            open: None,
        }
    }

    /// Register a new key with its creation default.
    ///
    /// Keys may be created at any point; scopes opened earlier observe the
    /// default.
    pub fn new_key(&mut self, default: V) -> Key {
        let key = Key(self.defaults.len() as u32);
        self.defaults.push(default);
        key
    }

    /// Read a key within the open scope
    pub fn get(&self, key: Key) -> V {
        let scope = self.open.as_ref().expect("get() with no open scope");
        if let Some(value) = scope.writes.get(&key) {
            return value.clone();
        }
        match scope.parents.first() {
            Some(&parent) => self.value_at(parent, key),
            None => self.defaults[key.0 as usize].clone(),
        }
    }

    /// Write a key within the open scope
    pub fn set(&mut self, key: Key, value: V) {
        let scope = self.open.as_mut().expect("set() with no open scope");
        scope.writes.insert(key, value);
    }

    /// Open a new scope over the given sealed predecessor snapshots.
    ///
    /// For every key whose resolved value differs between predecessors,
    /// `merge_fn(key, values)` supplies the merged value (`values` in
    /// predecessor order). Keys on which all predecessors agree are
    /// inherited untouched. With zero predecessors all keys read their
    /// creation default.
    pub fn start_new_snapshot<F>(&mut self, predecessors: &[Snapshot], mut merge_fn: F)
    where
        F: FnMut(Key, &[V]) -> V,
    {
        assert!(
            self.open.is_none(),
            "start_new_snapshot() while a scope is still open (missing seal)"
        );

        let mut writes = FxHashMap::default();
        if predecessors.len() > 1 {
            for key in self.keys_changed_below(predecessors) {
                let values: Vec<V> = predecessors
                    .iter()
                    .map(|&snapshot| self.value_at(snapshot, key))
                    .collect();
                if values.iter().any(|v| *v != values[0]) {
                    writes.insert(key, merge_fn(key, &values));
                }
            }
        }

        self.open = Some(OpenScope {
            parents: predecessors.to_vec(),
            writes,
        });
    }

    /// Seal the open scope into an immutable snapshot.
    ///
    /// At most one seal per open scope; sealing with no scope open is a
    /// fatal invariant violation.
    pub fn seal(&mut self) -> Snapshot {
        let scope = self.open.take().expect("seal() with no open scope (double seal?)");
        let mut changes: Vec<(Key, V)> = scope.writes.into_iter().collect();
        changes.sort_by_key(|(key, _)| key.0);

        let snapshot = Snapshot(self.snapshots.len() as u32);
        self.snapshots.push(SnapshotData {
            parents: scope.parents,
            changes,
        });
        snapshot
    }

    /// Whether a scope is currently open
    pub fn has_open_scope(&self) -> bool {
        self.open.is_some()
    }

    /// Resolve a key's value as of a sealed snapshot.
    ///
    /// Walks the first-parent chain. Sound because every key that differs
    /// between the parents of a merge is recorded in the merge's own delta,
    /// so a miss means all parents agree.
    fn value_at(&self, snapshot: Snapshot, key: Key) -> V {
        let mut current = snapshot;
        loop {
            let data = &self.snapshots[current.0 as usize];
            if let Some((_, value)) = data.changes.iter().find(|(k, _)| *k == key) {
                return value.clone();
            }
            match data.parents.first() {
                Some(&parent) => current = parent,
                None => return self.defaults[key.0 as usize].clone(),
            }
        }
    }

    /// All keys with a recorded change anywhere below the given snapshots
    fn keys_changed_below(&self, roots: &[Snapshot]) -> Vec<Key> {
        let mut seen_snapshots = FxHashSet::default();
        let mut keys = FxHashSet::default();
        let mut stack: Vec<Snapshot> = roots.to_vec();
        while let Some(snapshot) = stack.pop() {
            if !seen_snapshots.insert(snapshot) {
                continue;
            }
            let data = &self.snapshots[snapshot.0 as usize];
            keys.extend(data.changes.iter().map(|(key, _)| *key));
            stack.extend(data.parents.iter().copied());
        }
        let mut keys: Vec<Key> = keys.into_iter().collect();
        keys.sort_by_key(|key| key.0);
        keys
    }
}

impl<V: Clone + PartialEq> Default for SnapshotTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
