//! Record of how a container came to be.
//!
//! Function applications are kept as individual steps. Runs of data
//! insertions collapse into a single step, since their order does not
//! affect the identifier anyway. The product of all step identifiers equals
//! the container identifier.

use crate::hosh::{Etype, Hosh};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub hosh: Hosh,
    pub fields: Vec<String>,
}

impl Step {
    pub fn is_application(&self) -> bool {
        self.hosh.etype() == Etype::Ordered
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    steps: Vec<Step>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, merging consecutive non-application steps.
    pub fn record(&mut self, hosh: Hosh, fields: &[String]) {
        if hosh.etype() != Etype::Ordered {
            if let Some(last) = self.steps.last_mut() {
                if !last.is_application() {
                    last.hosh = last.hosh * hosh;
                    last.fields.extend(fields.iter().cloned());
                    return;
                }
            }
        }
        self.steps.push(Step {
            hosh,
            fields: fields.to_vec(),
        });
    }

    /// Rebuild from per-field identifiers, one field at a time.
    pub fn rebuild<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Hosh)>,
    {
        let mut history = History::new();
        for (name, hosh) in fields {
            history.record(hosh, &[name.to_string()]);
        }
        history
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Product of every step, in order.
    pub fn product(&self) -> Hosh {
        self.steps.iter().map(|s| s.hosh).product()
    }

    /// Textual identifiers of the steps.
    pub fn ids(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.hosh.id()).collect()
    }
}
