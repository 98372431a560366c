//! Deferred field values
//!
//! Applying a function installs a [`Thunk`] shared by all of that
//! application's output fields. A thunk is immutable: it holds the function,
//! a snapshot of the entries it depends on and its resolved configuration.
//! Results are not stored in the thunk but in the [`Memo`] of the container
//! doing the reading, which is copied whenever the container is cloned.
//! Resolving a field through one container therefore never changes what
//! another container holds.

use crate::compression::Packer;
use crate::error::{LdictError, Result};
use crate::function::{Args, Function};
use crate::hosh::Hosh;
use crate::persistence::Cache;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_THUNK: AtomicU64 = AtomicU64::new(1);

/// Value slot of a container field.
#[derive(Clone)]
pub enum Entry {
    Value(Arc<Value>),
    Lazy(LazyValue),
}

impl Entry {
    pub fn is_lazy(&self) -> bool {
        matches!(self, Entry::Lazy(_))
    }
}

/// One output field of a pending computation.
#[derive(Clone)]
pub struct LazyValue {
    pub(crate) field: String,
    pub(crate) thunk: Rc<Thunk>,
}

impl LazyValue {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn thunk_id(&self) -> u64 {
        self.thunk.id
    }

    /// Field names the computation reads.
    pub fn dependencies(&self) -> Vec<String> {
        self.thunk.dependencies()
    }
}

pub struct Thunk {
    id: u64,
    kind: ThunkKind,
}

pub(crate) enum ThunkKind {
    Call {
        function: Rc<Function>,
        deps: Vec<(String, Entry)>,
        config: Map<String, Value>,
        outputs: Vec<String>,
    },
    Cached {
        inner: Rc<Thunk>,
        caches: Rc<[Arc<dyn Cache>]>,
        ids: Vec<(String, Hosh)>,
        packer: Rc<Packer>,
    },
}

impl Thunk {
    fn new(kind: ThunkKind) -> Rc<Thunk> {
        Rc::new(Thunk {
            id: NEXT_THUNK.fetch_add(1, Ordering::Relaxed),
            kind,
        })
    }

    pub(crate) fn call(
        function: Rc<Function>,
        deps: Vec<(String, Entry)>,
        config: Map<String, Value>,
        outputs: Vec<String>,
    ) -> Rc<Thunk> {
        Thunk::new(ThunkKind::Call {
            function,
            deps,
            config,
            outputs,
        })
    }

    pub(crate) fn cached(
        inner: Rc<Thunk>,
        caches: Rc<[Arc<dyn Cache>]>,
        ids: Vec<(String, Hosh)>,
        packer: Rc<Packer>,
    ) -> Rc<Thunk> {
        Thunk::new(ThunkKind::Cached {
            inner,
            caches,
            ids,
            packer,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dependencies(&self) -> Vec<String> {
        match &self.kind {
            ThunkKind::Call { deps, .. } => deps.iter().map(|(name, _)| name.clone()).collect(),
            ThunkKind::Cached { inner, .. } => inner.dependencies(),
        }
    }
}

/// Results of thunks evaluated through one container.
#[derive(Default)]
pub struct Memo {
    table: RefCell<HashMap<u64, BTreeMap<String, Arc<Value>>>>,
}

impl Clone for Memo {
    fn clone(&self) -> Self {
        Memo {
            table: RefCell::new(self.table.borrow().clone()),
        }
    }
}

fn lazy_thunk(entry: &Entry) -> Option<&Rc<Thunk>> {
    match entry {
        Entry::Lazy(lazy) => Some(&lazy.thunk),
        Entry::Value(_) => None,
    }
}

impl Memo {
    /// Number of thunks with stored results.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.borrow().len()
    }

    fn lookup(&self, thunk: u64, field: &str) -> Option<Arc<Value>> {
        self.table
            .borrow()
            .get(&thunk)
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    fn store(&self, thunk: u64, produced: BTreeMap<String, Arc<Value>>) {
        self.table
            .borrow_mut()
            .entry(thunk)
            .or_default()
            .extend(produced);
    }

    /// Copy results from another memo, keeping ours on overlap.
    pub(crate) fn absorb(&self, other: &Memo) {
        if std::ptr::eq(self, other) {
            return;
        }
        let theirs = other.table.borrow();
        let mut ours = self.table.borrow_mut();
        for (thunk, fields) in theirs.iter() {
            let slot = ours.entry(*thunk).or_default();
            for (name, value) in fields {
                slot.entry(name.clone()).or_insert_with(|| Arc::clone(value));
            }
        }
    }

    fn is_complete(&self, thunk: &Thunk) -> bool {
        let table = self.table.borrow();
        let Some(known) = table.get(&thunk.id) else {
            return false;
        };
        match &thunk.kind {
            ThunkKind::Call { outputs, .. } => outputs.iter().all(|f| known.contains_key(f)),
            ThunkKind::Cached { ids, .. } => ids.iter().all(|(f, _)| known.contains_key(f)),
        }
    }

    /// Drop results that no entry in `roots` can reach.
    ///
    /// A thunk whose outputs are all known keeps its own results but no
    /// longer holds on to those of its dependencies.
    pub(crate) fn retain_reachable<'a, I>(&self, roots: I)
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        let mut live = HashSet::new();
        let mut stack: Vec<&Rc<Thunk>> = roots.into_iter().filter_map(lazy_thunk).collect();
        while let Some(thunk) = stack.pop() {
            if !live.insert(thunk.id) || self.is_complete(thunk) {
                continue;
            }
            match &thunk.kind {
                ThunkKind::Call { deps, .. } => {
                    stack.extend(deps.iter().filter_map(|(_, entry)| lazy_thunk(entry)))
                }
                ThunkKind::Cached { inner, .. } => stack.push(inner),
            }
        }
        let mut table = self.table.borrow_mut();
        let before = table.len();
        table.retain(|id, _| live.contains(id));
        if table.len() < before {
            tracing::trace!(dropped = before - table.len(), kept = table.len(), "pruned memo");
        }
    }

    pub fn is_resolved(&self, lazy: &LazyValue) -> bool {
        self.lookup(lazy.thunk.id, &lazy.field).is_some()
    }

    /// Current value of an entry, evaluating it if needed.
    pub fn resolve(&self, entry: &Entry) -> Result<Arc<Value>> {
        match entry {
            Entry::Value(v) => Ok(Arc::clone(v)),
            Entry::Lazy(lazy) => self.force(&lazy.thunk, &lazy.field),
        }
    }

    /// Already-known value of an entry, without evaluating anything.
    pub fn peek(&self, entry: &Entry) -> Option<Arc<Value>> {
        match entry {
            Entry::Value(v) => Some(Arc::clone(v)),
            Entry::Lazy(lazy) => self.lookup(lazy.thunk.id, &lazy.field),
        }
    }

    fn force(&self, thunk: &Rc<Thunk>, field: &str) -> Result<Arc<Value>> {
        if let Some(v) = self.lookup(thunk.id, field) {
            return Ok(v);
        }
        match &thunk.kind {
            ThunkKind::Call {
                function,
                deps,
                config,
                outputs,
            } => {
                let mut values = config.clone();
                for (name, entry) in deps {
                    let value = self.resolve(entry)?;
                    values.insert(name.clone(), (*value).clone());
                }
                tracing::debug!(function = function.name(), thunk = thunk.id, "evaluating");
                let mut result = function.call(&Args::new(values))?;
                let mut produced = BTreeMap::new();
                for out in outputs {
                    let value = result.remove(out).ok_or_else(|| LdictError::MissingField {
                        field: out.clone(),
                        function: function.name().to_string(),
                    })?;
                    produced.insert(out.clone(), Arc::new(value));
                }
                self.store(thunk.id, produced);
            }
            ThunkKind::Cached {
                inner,
                caches,
                ids,
                packer,
            } => {
                let (_, hosh) = ids
                    .iter()
                    .find(|(name, _)| name == field)
                    .ok_or_else(|| LdictError::KeyNotFound(field.to_string()))?;
                let key = hosh.id();
                for cache in caches.iter() {
                    if !cache.contains(&key)? {
                        continue;
                    }
                    if let Some(bytes) = cache.get(&key)? {
                        tracing::debug!(field, key = %key, cache = %cache.describe(), "cache hit");
                        let value = Arc::new(packer.unpack(&bytes)?);
                        self.store(thunk.id, BTreeMap::from([(field.to_string(), value)]));
                        return self
                            .lookup(thunk.id, field)
                            .ok_or_else(|| LdictError::KeyNotFound(field.to_string()));
                    }
                }
                tracing::debug!(field, key = %key, "cache miss");
                let mut produced = BTreeMap::new();
                for (name, hosh) in ids {
                    let value = self.force(inner, name)?;
                    let packed = packer.pack(&value)?;
                    let key = hosh.id();
                    for cache in caches.iter() {
                        cache.set(&key, &packed)?;
                    }
                    produced.insert(name.clone(), value);
                }
                self.store(thunk.id, produced);
            }
        }
        self.lookup(thunk.id, field)
            .ok_or_else(|| LdictError::KeyNotFound(field.to_string()))
    }
}
