//! The identified lazy dictionary
//!
//! An [`Ldict`] is an ordered list of fields, each carrying its own
//! identifier, plus an aggregate identifier that is always the ordered
//! product of the field identifiers. Every operation returns a new
//! container; the receiver is never changed.
//!
//! ```
//! use ldict::{ldict, Function};
//! use serde_json::json;
//!
//! let d = ldict! {x: 5, y: 3}.unwrap();
//! let add = Function::builder("add")
//!     .inputs(["x", "y"])
//!     .output("z")
//!     .code("z = x + y")
//!     .build(|args| Ok(json!({"z": args.i64("x")? + args.i64("y")?})))
//!     .unwrap();
//!
//! let e = (&d >> &add).unwrap();
//! assert!(!e.is_resolved("z"));
//! let id = e.id();
//! assert_eq!(*e.get("z").unwrap(), json!(8));
//! assert_eq!(e.id(), id);
//! ```

use crate::compression::Packer;
use crate::config::{self, Config};
use crate::error::{LdictError, Result};
use crate::function::Function;
use crate::history::History;
use crate::hosh::Hosh;
use crate::identity::{field_hosh, solve};
use crate::lazy::{Entry, LazyValue, Memo, Thunk};
use crate::parameter::{resolve_parameters, Let, Sampler};
use crate::persistence::Cache;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Shr;
use std::rc::Rc;
use std::sync::Arc;

const RESERVED: [&str; 2] = ["id", "ids"];

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || RESERVED.contains(&name) {
        return Err(LdictError::WrongKeyType(name.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
struct Slot {
    name: String,
    hosh: Hosh,
    entry: Entry,
}

/// Something that can be applied to a container with `>>`.
pub enum ApplyRequest {
    /// Insert each `Some` value, delete each `None`.
    Merge(Vec<(String, Option<Value>)>),
    /// Append the fields of another container.
    Chain(Ldict),
    /// Apply a function with explicit settings.
    Transform(Let),
    /// Replace the sampler used for parameter draws.
    SetSampler(Sampler),
    /// Route pending fields through caches; empty means the configured default.
    AttachCaches(Vec<Arc<dyn Cache>>),
    /// Apply several requests left to right.
    Pipeline(Vec<ApplyRequest>),
}

impl ApplyRequest {
    pub fn set<V: Into<Value>>(name: &str, value: V) -> Self {
        ApplyRequest::Merge(vec![(name.to_string(), Some(value.into()))])
    }

    pub fn delete(name: &str) -> Self {
        ApplyRequest::Merge(vec![(name.to_string(), None)])
    }
}

impl fmt::Debug for ApplyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyRequest::Merge(pairs) => f.debug_tuple("Merge").field(pairs).finish(),
            ApplyRequest::Chain(d) => f.debug_tuple("Chain").field(&d.id()).finish(),
            ApplyRequest::Transform(l) => f.debug_tuple("Transform").field(l).finish(),
            ApplyRequest::SetSampler(s) => f.debug_tuple("SetSampler").field(s).finish(),
            ApplyRequest::AttachCaches(c) => f
                .debug_tuple("AttachCaches")
                .field(&c.iter().map(|c| c.describe()).collect::<Vec<_>>())
                .finish(),
            ApplyRequest::Pipeline(steps) => f.debug_tuple("Pipeline").field(steps).finish(),
        }
    }
}

impl From<Map<String, Value>> for ApplyRequest {
    fn from(map: Map<String, Value>) -> Self {
        ApplyRequest::Merge(map.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

impl From<Vec<(String, Option<Value>)>> for ApplyRequest {
    fn from(pairs: Vec<(String, Option<Value>)>) -> Self {
        ApplyRequest::Merge(pairs)
    }
}

impl From<Ldict> for ApplyRequest {
    fn from(d: Ldict) -> Self {
        ApplyRequest::Chain(d)
    }
}

impl From<&Ldict> for ApplyRequest {
    fn from(d: &Ldict) -> Self {
        ApplyRequest::Chain(d.clone())
    }
}

impl From<Rc<Function>> for ApplyRequest {
    fn from(f: Rc<Function>) -> Self {
        ApplyRequest::Transform(Let::new(&f))
    }
}

impl From<&Rc<Function>> for ApplyRequest {
    fn from(f: &Rc<Function>) -> Self {
        ApplyRequest::Transform(Let::new(f))
    }
}

impl From<Let> for ApplyRequest {
    fn from(l: Let) -> Self {
        ApplyRequest::Transform(l)
    }
}

impl From<Sampler> for ApplyRequest {
    fn from(s: Sampler) -> Self {
        ApplyRequest::SetSampler(s)
    }
}

impl From<Vec<Arc<dyn Cache>>> for ApplyRequest {
    fn from(caches: Vec<Arc<dyn Cache>>) -> Self {
        ApplyRequest::AttachCaches(caches)
    }
}

impl<C: Cache + 'static> From<Arc<C>> for ApplyRequest {
    fn from(cache: Arc<C>) -> Self {
        ApplyRequest::AttachCaches(vec![cache as Arc<dyn Cache>])
    }
}

impl From<Vec<ApplyRequest>> for ApplyRequest {
    fn from(steps: Vec<ApplyRequest>) -> Self {
        ApplyRequest::Pipeline(steps)
    }
}

/// Immutable identified lazy dictionary.
#[derive(Clone)]
pub struct Ldict {
    slots: Vec<Slot>,
    hosh: Hosh,
    sampler: Option<Sampler>,
    config: Config,
    packer: Rc<Packer>,
    memo: Memo,
    history: Option<History>,
    frozen: bool,
}

impl Default for Ldict {
    fn default() -> Self {
        Ldict::new()
    }
}

impl Ldict {
    /// Empty container using the global defaults.
    pub fn new() -> Self {
        Ldict::with_config(config::global())
    }

    /// Empty container with an explicit configuration.
    pub fn with_config(config: Config) -> Self {
        let packer = Rc::new(Packer::new(config.compression_cache_limit));
        let history = config.history.then(History::new);
        Ldict {
            slots: Vec::new(),
            hosh: Hosh::identity(),
            sampler: None,
            config,
            packer,
            memo: Memo::default(),
            history,
            frozen: false,
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut d = Ldict::new();
        for (k, v) in pairs {
            d = d.insert(k.as_ref(), v.into())?;
        }
        Ok(d)
    }

    /// Build from a JSON object.
    ///
    /// A plain object becomes a container of data fields. An object carrying
    /// `"id"` must also carry `"ids"` listing every field in order; the
    /// identifiers are then taken as given and checked for consistency.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ldict::from_value_with_config(value, config::global())
    }

    pub fn from_value_with_config(value: &Value, config: Config) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| LdictError::WrongValueType {
            name: "<root>".into(),
            expected: "an object".into(),
        })?;
        let base = Ldict::with_config(config);

        let Some(id) = map.get("id") else {
            if map.contains_key("ids") {
                return Err(LdictError::InconsistentIds("'ids' given without 'id'".into()));
            }
            let mut d = base;
            for (k, v) in map {
                d = d.insert(k, v.clone())?;
            }
            return Ok(d);
        };

        let id = id
            .as_str()
            .ok_or_else(|| LdictError::WrongId(format!("id must be a string, got {id}")))?;
        let expected = Hosh::from_id(id)?;
        let ids = map
            .get("ids")
            .ok_or(LdictError::MissingIds)?
            .as_object()
            .ok_or_else(|| LdictError::InconsistentIds("'ids' must be an object".into()))?;

        let fields: Vec<(&String, &Value)> =
            map.iter().filter(|(k, _)| !RESERVED.contains(&k.as_str())).collect();
        let id_keys: Vec<&String> = ids.keys().collect();
        let field_keys: Vec<&String> = fields.iter().map(|(k, _)| *k).collect();
        if id_keys != field_keys {
            return Err(LdictError::InconsistentIds(format!(
                "fields {field_keys:?} do not match ids {id_keys:?}"
            )));
        }

        let mut d = base;
        for (name, value) in fields {
            check_name(name)?;
            let raw = &ids[name.as_str()];
            let hosh = raw
                .as_str()
                .ok_or_else(|| LdictError::WrongId(format!("id of '{name}' must be a string")))
                .and_then(Hosh::from_id)?;
            d.slots.push(Slot {
                name: name.clone(),
                hosh,
                entry: Entry::Value(Arc::new(value.clone())),
            });
        }
        d.hosh = d.slots.iter().map(|s| s.hosh).product();
        if d.hosh != expected {
            return Err(LdictError::InconsistentIds(format!(
                "product of field ids is {}, declared {}",
                d.hosh, expected
            )));
        }
        d.rebuild_history();
        Ok(d)
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    pub fn hosh(&self) -> Hosh {
        self.hosh
    }

    pub fn id(&self) -> String {
        self.hosh.id()
    }

    /// Field identifiers in field order.
    pub fn ids(&self) -> impl Iterator<Item = (&str, Hosh)> {
        self.slots.iter().map(|s| (s.name.as_str(), s.hosh))
    }

    pub fn field_hosh(&self, name: &str) -> Option<Hosh> {
        self.slot(name).map(|s| s.hosh)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sampler(&self) -> Option<&Sampler> {
        self.sampler.as_ref()
    }

    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Value of a field, evaluating it if it is still pending.
    ///
    /// Evaluation never changes any identifier.
    pub fn get(&self, name: &str) -> Result<Arc<Value>> {
        let slot = self
            .slot(name)
            .ok_or_else(|| LdictError::KeyNotFound(name.to_string()))?;
        if let Some(known) = self.memo.peek(&slot.entry) {
            return Ok(known);
        }
        let value = self.memo.resolve(&slot.entry)?;
        self.prune_memo();
        Ok(value)
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.slot(name).map(|s| &s.entry)
    }

    /// Whether a field's value is known without running anything.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.slot(name)
            .map(|s| self.memo.peek(&s.entry).is_some())
            .unwrap_or(false)
    }

    /// Evaluate every pending field.
    pub fn evaluate(&self) -> Result<()> {
        for slot in &self.slots {
            self.memo.resolve(&slot.entry)?;
        }
        self.prune_memo();
        Ok(())
    }

    /// Serialized form `{"id", "ids", fields...}`, evaluating every field.
    pub fn to_value(&self) -> Result<Value> {
        let mut ids = Map::with_capacity(self.slots.len());
        for slot in &self.slots {
            ids.insert(slot.name.clone(), Value::String(slot.hosh.id()));
        }
        let mut out = Map::with_capacity(self.slots.len() + 2);
        out.insert("id".into(), Value::String(self.id()));
        out.insert("ids".into(), Value::Object(ids));
        for slot in &self.slots {
            let value = self.memo.resolve(&slot.entry)?;
            out.insert(slot.name.clone(), (*value).clone());
        }
        Ok(Value::Object(out))
    }

    fn preview(&self) -> Value {
        let mut ids = Map::with_capacity(self.slots.len());
        for slot in &self.slots {
            ids.insert(slot.name.clone(), Value::String(slot.hosh.id()));
        }
        let mut out = Map::with_capacity(self.slots.len() + 2);
        out.insert("id".into(), Value::String(self.id()));
        out.insert("ids".into(), Value::Object(ids));
        for slot in &self.slots {
            let shown = match (self.memo.peek(&slot.entry), &slot.entry) {
                (Some(v), _) => (*v).clone(),
                (None, Entry::Lazy(lazy)) => {
                    Value::String(format!("→({})", lazy.dependencies().join(", ")))
                }
                (None, Entry::Value(v)) => (**v).clone(),
            };
            out.insert(slot.name.clone(), shown);
        }
        Value::Object(out)
    }

    // ---------------------------------------------------------------------
    // Identity engine
    // ---------------------------------------------------------------------

    fn record(&mut self, hosh: Hosh, fields: &[String]) {
        if let Some(history) = self.history.as_mut() {
            history.record(hosh, fields);
        }
    }

    fn prune_memo(&self) {
        self.memo.retain_reachable(self.slots.iter().map(|s| &s.entry));
    }

    fn rebuild_history(&mut self) {
        if self.history.is_some() {
            self.history = Some(History::rebuild(self.ids()));
        }
    }

    /// Add a data field.
    ///
    /// Re-inserting the same value is a no-op; a different value for an
    /// existing field fails with [`LdictError::Overwrite`].
    pub fn insert(&self, name: &str, value: Value) -> Result<Ldict> {
        check_name(name)?;
        let h = field_hosh(name, &value)?;
        if let Some(existing) = self.slot(name) {
            if existing.hosh == h {
                return Ok(self.clone());
            }
            return Err(LdictError::Overwrite(name.to_string()));
        }
        let mut d = self.clone();
        d.slots.push(Slot {
            name: name.to_string(),
            hosh: h,
            entry: Entry::Value(Arc::new(value)),
        });
        d.hosh = d.hosh * h;
        d.record(h, &[name.to_string()]);
        tracing::trace!(field = name, id = %d.hosh.short(), "inserted field");
        Ok(d)
    }

    /// Remove a field; the identifier is recomputed from the remaining fields.
    pub fn delete(&self, name: &str) -> Result<Ldict> {
        let pos = self
            .slots
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| LdictError::KeyNotFound(name.to_string()))?;
        let mut d = self.clone();
        d.slots.remove(pos);
        d.hosh = d.slots.iter().map(|s| s.hosh).product();
        d.rebuild_history();
        d.prune_memo();
        tracing::trace!(field = name, id = %d.hosh.short(), "deleted field");
        Ok(d)
    }

    /// Apply a function with default settings.
    pub fn apply(&self, function: &Rc<Function>) -> Result<Ldict> {
        self.apply_let(&Let::new(function))
    }

    /// Apply a function with explicit settings.
    ///
    /// Output fields become pending values sharing one evaluation. The new
    /// identifier is `self.hosh() * F`, where `F` is the function identifier
    /// with its resolved parameters folded in; the output identifiers are
    /// solved so the ordered product of all fields equals it.
    pub fn apply_let(&self, call: &Let) -> Result<Ldict> {
        let function = &call.function;
        if function.inputs().is_empty() && function.params().is_empty() {
            return Err(LdictError::NoInput(function.name().to_string()));
        }

        let params = resolve_parameters(function, &call.config, &call.domains, self.sampler.as_ref())?;

        let mut inputs = Vec::with_capacity(function.inputs().len());
        for field in function.inputs() {
            let name = field.resolve(&params)?;
            if !self.contains_key(&name) {
                return Err(LdictError::Dependence {
                    field: name,
                    available: self.keys().map(str::to_string).collect(),
                });
            }
            if params.contains_key(&name) {
                return Err(LdictError::ConflictingParameter(name));
            }
            inputs.push(name);
        }

        let mut outputs = Vec::with_capacity(function.outputs().len());
        for field in function.outputs() {
            let name = field.resolve(&params)?;
            check_name(&name)?;
            if params.contains_key(&name) {
                return Err(LdictError::ConflictingParameter(name));
            }
            if outputs.contains(&name) {
                return Err(LdictError::BadOutput {
                    function: function.name().to_string(),
                    reason: format!("field '{name}' written twice"),
                });
            }
            outputs.push(name);
        }

        let f = function.hosh_with_config(&params)?;
        let uf = self.hosh * f;

        let kept: Vec<&Slot> = self.slots.iter().filter(|s| !outputs.contains(&s.name)).collect();
        let kept_ids: Vec<Hosh> = kept.iter().map(|s| s.hosh).collect();
        let output_ids = solve(uf, &kept_ids, outputs.len());

        // Known values are captured directly so finished thunks can be released.
        let deps: Vec<(String, Entry)> = inputs
            .iter()
            .filter_map(|name| self.slot(name).map(|s| (name.clone(), s.entry.clone())))
            .map(|(name, entry)| match self.memo.peek(&entry) {
                Some(value) => (name, Entry::Value(value)),
                None => (name, entry),
            })
            .collect();
        let thunk = Thunk::call(Rc::clone(function), deps, params, outputs.clone());

        let mut slots = Vec::with_capacity(outputs.len() + kept.len());
        for (name, hosh) in outputs.iter().zip(output_ids) {
            slots.push(Slot {
                name: name.clone(),
                hosh,
                entry: Entry::Lazy(LazyValue {
                    field: name.clone(),
                    thunk: Rc::clone(&thunk),
                }),
            });
        }
        slots.extend(kept.into_iter().cloned());

        let mut d = self.clone();
        d.slots = slots;
        d.hosh = uf;
        d.prune_memo();
        d.record(f, &outputs);
        tracing::debug!(
            function = function.name(),
            outputs = ?outputs,
            id = %uf.short(),
            "applied function"
        );
        Ok(d)
    }

    /// Append the fields of `other`.
    ///
    /// Fields present in both with the same identifier are kept once; a field
    /// present in both with different identifiers fails with
    /// [`LdictError::Overwrite`]. The sampler of `other` wins when it has one.
    pub fn chain(&self, other: &Ldict) -> Result<Ldict> {
        let mut d = self.clone();
        for slot in &other.slots {
            if let Some(existing) = d.slot(&slot.name) {
                if existing.hosh == slot.hosh {
                    continue;
                }
                return Err(LdictError::Overwrite(slot.name.clone()));
            }
            d.slots.push(slot.clone());
            d.hosh = d.hosh * slot.hosh;
            d.record(slot.hosh, &[slot.name.clone()]);
        }
        d.memo.absorb(&other.memo);
        d.prune_memo();
        if other.sampler.is_some() {
            d.sampler = other.sampler.clone();
        }
        Ok(d)
    }

    /// Same container drawing parameters from `sampler`.
    pub fn with_sampler(&self, sampler: Sampler) -> Ldict {
        let mut d = self.clone();
        d.sampler = Some(sampler);
        d
    }

    /// Route every pending field through `caches`.
    ///
    /// On read, caches are tried in order and the first hit is returned
    /// without running the function. On a miss the computation runs once and
    /// every sibling output is stored in every cache. Identifiers are not
    /// affected. An empty list uses the configured default cache.
    pub fn cached(&self, caches: Vec<Arc<dyn Cache>>) -> Result<Ldict> {
        let caches = if caches.is_empty() {
            let default = self
                .config
                .cache
                .clone()
                .ok_or_else(|| LdictError::Cache("no cache given and none configured".into()))?;
            vec![default]
        } else {
            caches
        };
        let caches: Rc<[Arc<dyn Cache>]> = caches.into();

        // Siblings keep sharing one wrapper, grouped by the thunk they came from.
        let mut groups: HashMap<u64, Vec<(String, Hosh)>> = HashMap::new();
        for slot in &self.slots {
            if let Entry::Lazy(lazy) = &slot.entry {
                groups
                    .entry(lazy.thunk.id())
                    .or_default()
                    .push((slot.name.clone(), slot.hosh));
            }
        }

        let mut wrapped: HashMap<u64, Rc<Thunk>> = HashMap::new();
        let mut d = self.clone();
        for slot in d.slots.iter_mut() {
            let Entry::Lazy(lazy) = &slot.entry else {
                continue;
            };
            let inner = Rc::clone(&lazy.thunk);
            let thunk = wrapped
                .entry(inner.id())
                .or_insert_with(|| {
                    let ids = groups.remove(&inner.id()).unwrap_or_default();
                    Thunk::cached(Rc::clone(&inner), Rc::clone(&caches), ids, Rc::clone(&self.packer))
                })
                .clone();
            slot.entry = Entry::Lazy(LazyValue {
                field: slot.name.clone(),
                thunk,
            });
        }
        tracing::debug!(caches = caches.len(), wrapped = wrapped.len(), "attached caches");
        Ok(d)
    }

    /// Dispatch any [`ApplyRequest`].
    pub fn apply_request(&self, request: ApplyRequest) -> Result<Ldict> {
        match request {
            ApplyRequest::Merge(pairs) => {
                let mut d = self.clone();
                for (name, value) in pairs {
                    if RESERVED.contains(&name.as_str()) {
                        continue;
                    }
                    d = match value {
                        Some(v) => d.insert(&name, v)?,
                        None => d.delete(&name)?,
                    };
                }
                Ok(d)
            }
            ApplyRequest::Chain(other) => self.chain(&other),
            ApplyRequest::Transform(call) => self.apply_let(&call),
            ApplyRequest::SetSampler(sampler) => Ok(self.with_sampler(sampler)),
            ApplyRequest::AttachCaches(caches) => self.cached(caches),
            ApplyRequest::Pipeline(steps) => {
                let mut d = self.clone();
                for step in steps {
                    d = d.apply_request(step)?;
                }
                Ok(d)
            }
        }
    }

    // ---------------------------------------------------------------------
    // In-place convenience
    // ---------------------------------------------------------------------

    /// Forbid the in-place methods on this value and its derivatives.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn writable(&self) -> Result<()> {
        if self.frozen {
            Err(LdictError::ReadOnly)
        } else {
            Ok(())
        }
    }

    /// Set a data field, replacing any previous value.
    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<()> {
        self.writable()?;
        let value = value.into();
        let h = field_hosh(name, &value)?;
        let base = match self.slot(name) {
            Some(existing) if existing.hosh != h => self.delete(name)?,
            _ => self.clone(),
        };
        *self = base.insert(name, value)?;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.writable()?;
        *self = self.delete(name)?;
        Ok(())
    }

    pub fn apply_in_place<R: Into<ApplyRequest>>(&mut self, request: R) -> Result<()> {
        self.writable()?;
        *self = self.apply_request(request.into())?;
        Ok(())
    }
}

impl PartialEq for Ldict {
    fn eq(&self, other: &Self) -> bool {
        self.hosh == other.hosh
    }
}

impl Eq for Ldict {}

impl Hash for Ldict {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hosh.hash(state);
    }
}

impl fmt::Display for Ldict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string_pretty(&self.preview()).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl fmt::Debug for Ldict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ldict")
            .field("id", &self.id())
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<R: Into<ApplyRequest>> Shr<R> for &Ldict {
    type Output = Result<Ldict>;

    fn shr(self, rhs: R) -> Result<Ldict> {
        self.apply_request(rhs.into())
    }
}

impl<R: Into<ApplyRequest>> Shr<R> for Ldict {
    type Output = Result<Ldict>;

    fn shr(self, rhs: R) -> Result<Ldict> {
        self.apply_request(rhs.into())
    }
}

impl Serialize for Ldict {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ldict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ldict::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn increment() -> Rc<Function> {
        Function::builder("increment")
            .input("x")
            .output("x")
            .code("x = x + 2")
            .build(|args| Ok(json!({"x": args.i64("x")? + 2})))
            .unwrap()
    }

    #[test]
    fn test_reserved_names_rejected() {
        let d = Ldict::new();
        assert!(matches!(d.insert("id", json!(1)), Err(LdictError::WrongKeyType(_))));
        assert!(matches!(d.insert("", json!(1)), Err(LdictError::WrongKeyType(_))));
    }

    #[test]
    fn test_self_referential_update() {
        let d = Ldict::new().insert("x", json!(3)).unwrap().insert("y", json!(5)).unwrap();
        let e = d.apply(&increment()).unwrap();
        assert_eq!(e.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        let product: Hosh = e.ids().map(|(_, h)| h).product();
        assert_eq!(product, e.hosh());
        assert_eq!(*e.get("x").unwrap(), json!(5));
        assert_eq!(*d.get("x").unwrap(), json!(3));
    }

    #[test]
    fn test_preview_marks_pending_fields() {
        let d = Ldict::new().insert("x", json!(3)).unwrap();
        let e = d.apply(&increment()).unwrap();
        assert!(e.to_string().contains("→(x)"));
        e.evaluate().unwrap();
        assert!(!e.to_string().contains("→(x)"));
    }

    #[test]
    fn test_merge_skips_reserved_and_deletes() {
        let d = Ldict::new().insert("x", json!(3)).unwrap();
        let e = d
            .apply_request(ApplyRequest::Merge(vec![
                ("id".into(), Some(json!("ignored"))),
                ("y".into(), Some(json!(1))),
                ("x".into(), None),
            ]))
            .unwrap();
        assert_eq!(e.keys().collect::<Vec<_>>(), vec!["y"]);
    }

    #[test]
    fn test_memo_keeps_only_live_results() {
        let inc = increment();
        let mut d = Ldict::new().insert("x", json!(0)).unwrap();
        for _ in 0..200 {
            d = d.apply(&inc).unwrap();
            d.get("x").unwrap();
            assert!(d.memo.len() <= 1);
        }
        assert_eq!(*d.get("x").unwrap(), json!(400));

        let mut e = Ldict::new().insert("x", json!(0)).unwrap();
        for _ in 0..50 {
            e = e.apply(&inc).unwrap();
        }
        assert_eq!(*e.get("x").unwrap(), json!(100));
        assert_eq!(e.memo.len(), 1);
        let f = e.delete("x").unwrap();
        assert_eq!(f.memo.len(), 0);
    }

    #[test]
    fn test_pruning_keeps_pending_dependencies() {
        let square = Function::builder("square")
            .input("x")
            .output("y")
            .code("y = x * x")
            .build(|args| Ok(json!({"y": args.i64("x")?.pow(2)})))
            .unwrap();
        let d = Ldict::new().insert("x", json!(1)).unwrap();
        let e = d.apply(&increment()).unwrap().apply(&square).unwrap();
        // Reading y resolves x's thunk as a dependency; x itself is still read later.
        assert_eq!(*e.get("y").unwrap(), json!(9));
        assert!(e.is_resolved("x"));
        assert_eq!(*e.get("x").unwrap(), json!(3));
    }

    #[test]
    fn test_output_named_like_parameter_conflicts() {
        let f = Function::builder("shadow")
            .input("x")
            .param("a", crate::parameter::ParamDefault::literal(1))
            .output("a")
            .build(|_| Ok(json!({"a": 0})))
            .unwrap();
        let d = Ldict::new().insert("x", json!(1)).unwrap();
        assert!(matches!(d.apply(&f), Err(LdictError::ConflictingParameter(name)) if name == "a"));
    }

    #[test]
    fn test_frozen_rejects_in_place() {
        let mut d = Ldict::new().frozen();
        assert!(matches!(d.set("x", 1), Err(LdictError::ReadOnly)));
        assert!(matches!(d.remove("x"), Err(LdictError::ReadOnly)));
        assert!(d.insert("x", json!(1)).is_ok());
    }
}
