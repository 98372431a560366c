//! Declared functions and their identifiers
//!
//! A [`Function`] is a closure plus the metadata the container needs to
//! apply it without running it: which fields it reads, which parameters it
//! takes (with defaults), which fields it writes, and a code fingerprint.
//! The identifier is derived from that metadata, never from the closure.

use crate::compression::canonical_bytes;
use crate::error::{BoxError, LdictError, Result};
use crate::hosh::{Etype, Hosh};
use crate::parameter::ParamDefault;
use serde_json::{json, Map, Value};
use std::cell::OnceCell;
use std::fmt;
use std::ops::Index;
use std::rc::Rc;

/// Where a function input or output name comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldRef {
    /// A fixed field name.
    Named(String),
    /// The field named by the string value of a parameter at application time.
    Param(String),
}

impl FieldRef {
    /// Concrete field name given the resolved parameters.
    pub fn resolve(&self, params: &Map<String, Value>) -> Result<String> {
        match self {
            FieldRef::Named(name) => Ok(name.clone()),
            FieldRef::Param(param) => match params.get(param) {
                Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                Some(other) => Err(LdictError::WrongKeyType(format!(
                    "parameter '{param}' must name a field, got {other}"
                ))),
                None => Err(LdictError::WrongKeyType(format!(
                    "parameter '{param}' is not declared"
                ))),
            },
        }
    }

    fn fingerprint(&self) -> String {
        match self {
            FieldRef::Named(name) => name.clone(),
            FieldRef::Param(param) => format!("*{param}"),
        }
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        FieldRef::Named(name.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(name: String) -> Self {
        FieldRef::Named(name)
    }
}

/// Arguments handed to a function body: resolved parameters plus input values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    values: Map<String, Value>,
}

static NULL: Value = Value::Null;

impl Args {
    pub fn new(values: Map<String, Value>) -> Self {
        Args { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn value(&self, name: &str) -> Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| LdictError::KeyNotFound(name.to_string()))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        self.value(name)?.as_f64().ok_or_else(|| wrong_type(name, "a number"))
    }

    pub fn i64(&self, name: &str) -> Result<i64> {
        self.value(name)?.as_i64().ok_or_else(|| wrong_type(name, "an integer"))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.value(name)?.as_str().ok_or_else(|| wrong_type(name, "a string"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn wrong_type(name: &str, expected: &str) -> LdictError {
    LdictError::WrongValueType {
        name: name.to_string(),
        expected: expected.to_string(),
    }
}

impl Index<&str> for Args {
    type Output = Value;

    /// Missing names index to `null`, as `serde_json::Value` does.
    fn index(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }
}

type Body = dyn Fn(&Args) -> std::result::Result<Value, BoxError>;

enum ExplicitIdentity {
    Bytes(Vec<u8>),
    Hosh(Hosh),
}

pub struct Function {
    name: String,
    inputs: Vec<FieldRef>,
    params: Vec<(String, ParamDefault)>,
    outputs: Vec<FieldRef>,
    code: String,
    explicit: Option<ExplicitIdentity>,
    body: Box<Body>,
    hosh: OnceCell<Hosh>,
}

impl Function {
    pub fn builder(name: &str) -> FunctionBuilder {
        FunctionBuilder {
            name: name.to_string(),
            inputs: Vec::new(),
            params: Vec::new(),
            outputs: Vec::new(),
            code: String::new(),
            explicit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[FieldRef] {
        &self.inputs
    }

    pub fn params(&self) -> &[(String, ParamDefault)] {
        &self.params
    }

    pub fn outputs(&self) -> &[FieldRef] {
        &self.outputs
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|(p, _)| p == name)
    }

    /// Identifier of the function itself, computed once.
    ///
    /// Derived from the input and parameter names in declaration order, the
    /// outputs and the code fingerprint. With a fingerprint the function name
    /// is not part of it, so renaming a function does not change the
    /// containers it produces. Without one the name stands in for the code.
    pub fn hosh(&self) -> Result<Hosh> {
        if let Some(h) = self.hosh.get() {
            return Ok(*h);
        }
        if self.inputs.is_empty() && self.params.is_empty() {
            return Err(LdictError::NoInput(self.name.clone()));
        }
        let h = match &self.explicit {
            Some(ExplicitIdentity::Hosh(h)) => *h,
            Some(ExplicitIdentity::Bytes(bytes)) => Hosh::from_bytes(Etype::Ordered, bytes),
            None => {
                let signature: Vec<String> = self
                    .inputs
                    .iter()
                    .map(FieldRef::fingerprint)
                    .chain(self.params.iter().map(|(name, _)| name.clone()))
                    .collect();
                let outputs: Vec<String> = self.outputs.iter().map(FieldRef::fingerprint).collect();
                let body = if self.code.is_empty() {
                    json!({ "name": self.name })
                } else {
                    Value::String(self.code.clone())
                };
                let content = json!([signature, outputs, body]);
                Hosh::from_bytes(Etype::Ordered, &canonical_bytes(&content)?)
            }
        };
        self.check_ordered(h)?;
        let _ = self.hosh.set(h);
        Ok(h)
    }

    /// Identifier with resolved parameters folded in.
    pub fn hosh_with_config(&self, config: &Map<String, Value>) -> Result<Hosh> {
        let base = self.hosh()?;
        if config.is_empty() {
            return Ok(base);
        }
        let folded = base * Hosh::from_bytes(Etype::Ordered, &canonical_bytes(&Value::Object(config.clone()))?);
        self.check_ordered(folded)?;
        Ok(folded)
    }

    fn check_ordered(&self, h: Hosh) -> Result<()> {
        match h.etype() {
            Etype::Ordered => Ok(()),
            etype => Err(LdictError::FunctionEType {
                function: self.name.clone(),
                etype,
            }),
        }
    }

    /// Run the body and validate the shape of its result.
    pub fn call(&self, args: &Args) -> Result<Map<String, Value>> {
        let result = (self.body)(args).map_err(|source| LdictError::Function {
            function: self.name.clone(),
            source,
        })?;
        match result {
            Value::Object(map) => Ok(map),
            Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
                Err(LdictError::MultipleDicts(self.name.clone()))
            }
            other => Err(LdictError::BadOutput {
                function: self.name.clone(),
                reason: format!("expected a mapping of outputs, got {other}"),
            }),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("params", &self.params)
            .field("outputs", &self.outputs)
            .finish()
    }
}

pub struct FunctionBuilder {
    name: String,
    inputs: Vec<FieldRef>,
    params: Vec<(String, ParamDefault)>,
    outputs: Vec<FieldRef>,
    code: String,
    explicit: Option<ExplicitIdentity>,
}

impl FunctionBuilder {
    pub fn input<F: Into<FieldRef>>(mut self, field: F) -> Self {
        self.inputs.push(field.into());
        self
    }

    pub fn inputs<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldRef>,
    {
        self.inputs.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Read the field named by parameter `param`.
    pub fn implicit_input(mut self, param: &str) -> Self {
        self.inputs.push(FieldRef::Param(param.to_string()));
        self
    }

    pub fn param(mut self, name: &str, default: ParamDefault) -> Self {
        self.params.push((name.to_string(), default));
        self
    }

    pub fn output<F: Into<FieldRef>>(mut self, field: F) -> Self {
        self.outputs.push(field.into());
        self
    }

    pub fn outputs<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldRef>,
    {
        self.outputs.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Write the field named by parameter `param`.
    pub fn implicit_output(mut self, param: &str) -> Self {
        self.outputs.push(FieldRef::Param(param.to_string()));
        self
    }

    /// Code fingerprint; change it whenever the body's behavior changes.
    ///
    /// Functions built without one are told apart by name only.
    pub fn code(mut self, code: &str) -> Self {
        self.code = code.to_string();
        self
    }

    pub fn identity_bytes(mut self, bytes: &[u8]) -> Self {
        self.explicit = Some(ExplicitIdentity::Bytes(bytes.to_vec()));
        self
    }

    pub fn identity(mut self, hosh: Hosh) -> Self {
        self.explicit = Some(ExplicitIdentity::Hosh(hosh));
        self
    }

    pub fn build<F>(self, body: F) -> Result<Rc<Function>>
    where
        F: Fn(&Args) -> std::result::Result<Value, BoxError> + 'static,
    {
        if self.outputs.is_empty() {
            return Err(LdictError::NoReturn(self.name));
        }
        for (i, out) in self.outputs.iter().enumerate() {
            if self.outputs[..i].contains(out) {
                return Err(LdictError::BadOutput {
                    function: self.name.clone(),
                    reason: format!("output {out:?} declared twice"),
                });
            }
        }
        let referenced = self.inputs.iter().chain(self.outputs.iter());
        for field in referenced {
            if let FieldRef::Param(param) = field {
                if !self.params.iter().any(|(p, _)| p == param) {
                    return Err(LdictError::WrongKeyType(format!(
                        "implicit field refers to undeclared parameter '{param}'"
                    )));
                }
            }
        }
        for (i, (name, _)) in self.params.iter().enumerate() {
            if self.params[..i].iter().any(|(p, _)| p == name) {
                return Err(LdictError::ConflictingParameter(name.clone()));
            }
        }
        Ok(Rc::new(Function {
            name: self.name,
            inputs: self.inputs,
            params: self.params,
            outputs: self.outputs,
            code: self.code,
            explicit: self.explicit,
            body: Box::new(body),
            hosh: OnceCell::new(),
        }))
    }
}
