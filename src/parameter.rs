//! Function parameters, sampling domains and the shared sampler
//!
//! A parameter default is either a literal value or a [`Domain`] to draw
//! from. Domains are written as JSON lists:
//!
//! - `[1, 2, 3, "...", 9]` is a progression. The first three terms decide
//!   whether it is arithmetic (constant difference) or geometric (constant
//!   ratio); the last element bounds it.
//! - any other list is a finite set of choices.
//!
//! Drawing happens at application time with the container's [`Sampler`].
//! The drawn value becomes part of the function identifier, so two draws of
//! the same value give the same container identifier.

use crate::error::{LdictError, Result};
use crate::function::Function;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Marker separating the leading terms of a progression from its bound.
pub const ELLIPSIS: &str = "...";

/// Refuse to expand progressions longer than this.
pub const MAX_TERMS: usize = 1_000_000;

const REL_TOL: f64 = 1e-9;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= REL_TOL * a.abs().max(b.abs()).max(1.0)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn parse(value: &Value) -> Option<Num> {
        if let Some(i) = value.as_i64() {
            Some(Num::Int(i))
        } else {
            value.as_f64().map(Num::Float)
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn as_int(self) -> Option<i64> {
        match self {
            Num::Int(i) => Some(i),
            Num::Float(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Progression {
    IntArithmetic { start: i64, step: i64 },
    IntGeometric { start: i64, ratio: i64 },
    FloatArithmetic { start: f64, step: f64 },
    FloatGeometric { start: f64, ratio: f64 },
}

/// Set of values a parameter may be drawn from.
#[derive(Clone, Debug, PartialEq)]
pub enum Domain {
    /// Explicit finite set.
    Choices(Vec<Value>),
    /// Expanded progression, kept together with its written form.
    Progression { written: Vec<Value>, terms: Vec<Value> },
}

impl Domain {
    /// Parse the list notation.
    ///
    /// ```
    /// use ldict::parameter::Domain;
    /// use serde_json::json;
    ///
    /// let d = Domain::parse(&json!([1, 2, 4, "...", 20])).unwrap();
    /// assert_eq!(d.values(), &[json!(1), json!(2), json!(4), json!(8), json!(16)]);
    /// ```
    pub fn parse(value: &Value) -> Result<Domain> {
        let items = value.as_array().ok_or_else(|| {
            LdictError::InconsistentLange(format!("domain must be a list, got {value}"))
        })?;
        if items.is_empty() {
            return Err(LdictError::InconsistentLange("empty domain".into()));
        }
        let marked = items.len() >= 2 && items[items.len() - 2].as_str() == Some(ELLIPSIS);
        if !marked {
            return Ok(Domain::Choices(items.clone()));
        }
        let terms = expand(items)?;
        Ok(Domain::Progression {
            written: items.clone(),
            terms,
        })
    }

    /// All values the domain may yield.
    pub fn values(&self) -> &[Value] {
        match self {
            Domain::Choices(values) => values,
            Domain::Progression { terms, .. } => terms,
        }
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Draw one value.
    pub fn sample(&self, sampler: &Sampler) -> Result<Value> {
        sampler
            .choose(self.values())
            .ok_or_else(|| LdictError::InconsistentLange("empty domain".into()))
    }
}

fn classify(a0: Num, a1: Num, a2: Num, written: &[Value]) -> Result<Progression> {
    let inconsistent = |why: &str| {
        LdictError::InconsistentLange(format!("{why}: {}", Value::Array(written.to_vec())))
    };

    if let (Some(x0), Some(x1), Some(x2)) = (a0.as_int(), a1.as_int(), a2.as_int()) {
        let d1 = x1.checked_sub(x0).ok_or_else(|| inconsistent("overflow"))?;
        let d2 = x2.checked_sub(x1).ok_or_else(|| inconsistent("overflow"))?;
        if d1 == d2 {
            if d1 == 0 {
                return Err(inconsistent("zero step"));
            }
            return Ok(Progression::IntArithmetic { start: x0, step: d1 });
        }
        if x0 != 0 && x1 % x0 == 0 {
            let r = x1 / x0;
            if x1.checked_mul(r) == Some(x2) {
                if r.abs() < 2 {
                    return Err(inconsistent("ratio does not grow"));
                }
                return Ok(Progression::IntGeometric { start: x0, ratio: r });
            }
        }
    }

    let (f0, f1, f2) = (a0.as_f64(), a1.as_f64(), a2.as_f64());
    let d1 = f1 - f0;
    let d2 = f2 - f1;
    if approx_eq(d1, d2) {
        if approx_eq(d1, 0.0) {
            return Err(inconsistent("zero step"));
        }
        return Ok(Progression::FloatArithmetic { start: f0, step: d1 });
    }
    if f0 != 0.0 && f1 != 0.0 {
        let r1 = f1 / f0;
        let r2 = f2 / f1;
        if approx_eq(r1, r2) {
            if approx_eq(r1.abs(), 1.0) || r1 == 0.0 {
                return Err(inconsistent("unit ratio"));
            }
            return Ok(Progression::FloatGeometric { start: f0, ratio: r1 });
        }
    }
    Err(inconsistent(
        "cannot identify whether this is an arithmetic or geometric progression",
    ))
}

fn expand(items: &[Value]) -> Result<Vec<Value>> {
    let n = items.len();
    if n < 5 {
        return Err(LdictError::InconsistentLange(format!(
            "progression needs three leading terms and a bound: {}",
            Value::Array(items.to_vec())
        )));
    }
    let mut leading = Vec::with_capacity(3);
    for item in &items[..3] {
        leading.push(Num::parse(item).ok_or_else(|| {
            LdictError::InconsistentLange(format!("non-numeric progression term {item}"))
        })?);
    }
    let bound = Num::parse(&items[n - 1])
        .ok_or_else(|| LdictError::InconsistentLange(format!("non-numeric bound {}", items[n - 1])))?
        .as_f64();

    let progression = classify(leading[0], leading[1], leading[2], items)?;
    let mut terms = Vec::new();
    let runaway = || {
        LdictError::InconsistentLange(format!("progression exceeds {MAX_TERMS} terms"))
    };
    match progression {
        Progression::IntArithmetic { start, step } => {
            let mut x = start;
            while (step > 0 && (x as f64) <= bound) || (step < 0 && (x as f64) >= bound) {
                if terms.len() >= MAX_TERMS {
                    return Err(runaway());
                }
                terms.push(Value::from(x));
                match x.checked_add(step) {
                    Some(next) => x = next,
                    None => break,
                }
            }
        }
        Progression::IntGeometric { start, ratio } => {
            let mut x = start;
            while (x as f64).abs() <= bound.abs() {
                if terms.len() >= MAX_TERMS {
                    return Err(runaway());
                }
                terms.push(Value::from(x));
                match x.checked_mul(ratio) {
                    Some(next) => x = next,
                    None => break,
                }
            }
        }
        Progression::FloatArithmetic { start, step } => {
            let slack = REL_TOL * bound.abs().max(1.0);
            let mut i = 0usize;
            loop {
                let x = start + step * i as f64;
                let within = if step > 0.0 { x <= bound + slack } else { x >= bound - slack };
                if !within {
                    break;
                }
                if terms.len() >= MAX_TERMS {
                    return Err(runaway());
                }
                terms.push(Value::from(x));
                i += 1;
            }
        }
        Progression::FloatGeometric { start, ratio } => {
            let growing = ratio.abs() > 1.0;
            let mut x = start;
            loop {
                let within = if growing {
                    x.abs() <= bound.abs() * (1.0 + REL_TOL)
                } else {
                    x.abs() >= bound.abs() * (1.0 - REL_TOL)
                };
                if !within || !x.is_finite() {
                    break;
                }
                if terms.len() >= MAX_TERMS {
                    return Err(runaway());
                }
                terms.push(Value::from(x));
                x *= ratio;
            }
        }
    }
    if terms.is_empty() {
        return Err(LdictError::InconsistentLange(format!(
            "progression is empty: {}",
            Value::Array(items.to_vec())
        )));
    }
    Ok(terms)
}

/// Shared random source.
///
/// Clones share the same generator, so every draw made through any handle
/// advances the sequence for all of them.
#[derive(Clone)]
pub struct Sampler {
    rng: Rc<RefCell<StdRng>>,
}

impl Sampler {
    pub fn seeded(seed: u64) -> Self {
        Sampler::from_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Sampler {
            rng: Rc::new(RefCell::new(rng)),
        }
    }

    pub fn choose(&self, values: &[Value]) -> Option<Value> {
        let mut rng = self.rng.borrow_mut();
        values.choose(&mut *rng).cloned()
    }

    /// Whether both handles drive the same generator.
    pub fn same_as(&self, other: &Sampler) -> bool {
        Rc::ptr_eq(&self.rng, &other.rng)
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sampler({:p})", Rc::as_ptr(&self.rng))
    }
}

/// Declared default of a function parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamDefault {
    Literal(Value),
    Sample(Domain),
}

impl ParamDefault {
    /// Lists become sampling domains, anything else a literal.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_array() {
            Ok(ParamDefault::Sample(Domain::parse(&value)?))
        } else {
            Ok(ParamDefault::Literal(value))
        }
    }

    pub fn literal<V: Into<Value>>(value: V) -> Self {
        ParamDefault::Literal(value.into())
    }
}

/// A function together with explicit settings for one application.
///
/// ```
/// use ldict::{Function, Let, Ldict};
/// use ldict::parameter::ParamDefault;
/// use serde_json::json;
///
/// let f = Function::builder("scale")
///     .input("x")
///     .param("a", ParamDefault::literal(1))
///     .output("y")
///     .build(|args| Ok(json!({"y": args.i64("x")? * args.i64("a")?})))
///     .unwrap();
/// let d = Ldict::new().insert("x", json!(3)).unwrap();
/// let e = (&d >> Let::new(&f).with("a", 5)).unwrap();
/// assert_eq!(*e.get("y").unwrap(), json!(15));
/// ```
#[derive(Clone)]
pub struct Let {
    pub(crate) function: Rc<Function>,
    pub(crate) config: Map<String, Value>,
    pub(crate) domains: Vec<(String, Domain)>,
}

impl Let {
    pub fn new(function: &Rc<Function>) -> Self {
        Let {
            function: Rc::clone(function),
            config: Map::new(),
            domains: Vec::new(),
        }
    }

    /// Fix a parameter to a value; it is used verbatim, never sampled.
    pub fn with<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.config.insert(name.to_string(), value.into());
        self
    }

    /// Replace the declared domain of a parameter for this application.
    pub fn sample(mut self, name: &str, domain: Domain) -> Self {
        self.domains.push((name.to_string(), domain));
        self
    }

    pub fn function(&self) -> &Rc<Function> {
        &self.function
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }
}

impl fmt::Debug for Let {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Let")
            .field("function", &self.function.name())
            .field("config", &self.config)
            .field("domains", &self.domains)
            .finish()
    }
}

/// Resolve every declared parameter of `function` to a concrete value.
///
/// Explicit settings win and are used verbatim; domain overrides and declared
/// domains are drawn with `sampler`; literal defaults are copied. The result
/// follows declaration order.
pub fn resolve_parameters(
    function: &Function,
    explicit: &Map<String, Value>,
    domains: &[(String, Domain)],
    sampler: Option<&Sampler>,
) -> Result<Map<String, Value>> {
    let declared = function.params();
    let unknown = explicit
        .keys()
        .chain(domains.iter().map(|(k, _)| k))
        .find(|k| !declared.iter().any(|(name, _)| name == *k));
    if let Some(name) = unknown {
        return Err(LdictError::UnknownParameter {
            function: function.name().to_string(),
            parameter: name.clone(),
        });
    }

    let draw = |name: &str, domain: &Domain| -> Result<Value> {
        let sampler = sampler.ok_or_else(|| LdictError::UndefinedSeed(name.to_string()))?;
        let value = domain.sample(sampler)?;
        tracing::trace!(parameter = name, value = %value, "sampled parameter");
        Ok(value)
    };

    let mut resolved = Map::with_capacity(declared.len());
    for (name, default) in declared {
        let value = if let Some(v) = explicit.get(name) {
            v.clone()
        } else if let Some((_, domain)) = domains.iter().find(|(k, _)| k == name) {
            draw(name, domain)?
        } else {
            match default {
                ParamDefault::Literal(v) => v.clone(),
                ParamDefault::Sample(domain) => draw(name, domain)?,
            }
        };
        resolved.insert(name.clone(), value);
    }
    Ok(resolved)
}
