//! ldict - Identified Lazy Dictionaries
//!
//! Copyright (c) 2025 ldict Contributors
//! Licensed under MIT License
//!
//! Immutable key/value containers where every value, and the container
//! itself, is identified by an element of a non-commutative group.
//!
//! # Overview
//!
//! - Data fields get identifiers that commute, so insertion order does not
//!   change a container's identity.
//! - Applying a function multiplies in an ordered identifier, so the history
//!   of computations is part of the identity.
//! - Removing a field is multiplication by an inverse.
//! - Computed fields are lazy. Reading one runs the function once for all of
//!   its sibling outputs, and never changes any identifier.
//! - Because identifiers are known before evaluation, they are cache keys.
//!
//! # Quick Start
//!
//! ```
//! use ldict::{ldict, Function, Let};
//! use ldict::parameter::{ParamDefault, Sampler};
//! use serde_json::json;
//!
//! let d = ldict! {x: 3, y: 5}.unwrap();
//! let e = ldict! {y: 5, x: 3}.unwrap();
//! assert_eq!(d, e);
//!
//! let f = Function::builder("affine")
//!     .input("x")
//!     .param("a", ParamDefault::from_value(json!([1, 2, 3, "...", 9])).unwrap())
//!     .output("z")
//!     .code("z = a * x")
//!     .build(|args| Ok(json!({"z": args.i64("a")? * args.i64("x")?})))
//!     .unwrap();
//!
//! let g = (&(&d >> Sampler::seeded(0)).unwrap() >> &f).unwrap();
//! let z = g.get("z").unwrap();
//! assert!(z.as_i64().unwrap() % 3 == 0);
//!
//! let fixed = (&d >> Let::new(&f).with("a", 2)).unwrap();
//! assert_eq!(*fixed.get("z").unwrap(), json!(6));
//! ```
//!
//! # Modules
//!
//! - [`hosh`]: the group and identifier encoding
//! - [`identity`]: field identifiers and output splitting
//! - [`function`]: declared functions
//! - [`parameter`]: defaults, sampling domains, [`Let`]
//! - [`container`]: the [`Ldict`] container and [`ApplyRequest`]
//! - [`lazy`]: pending values and per-container memo tables
//! - [`persistence`]: cache backends
//! - [`compression`]: canonical bytes and packed envelopes
//! - [`history`]: application history
//! - [`config`]: global defaults
//! - [`cli`]: command-line inspection tool

pub mod cli;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod function;
pub mod history;
pub mod hosh;
pub mod identity;
pub mod lazy;
pub mod parameter;
pub mod persistence;

pub use serde_json;

// Re-export main types for convenience
pub use crate::config::Config;
pub use crate::error::{BoxError, LdictError, Result};
pub use crate::function::{Args, FieldRef, Function};
pub use crate::hosh::{Etype, Hosh};
pub use crate::container::{ApplyRequest, Ldict};
pub use crate::parameter::{Domain, Let, ParamDefault, Sampler};
pub use crate::persistence::{Cache, DiskCache, MemoryCache};

/// Build an [`Ldict`] from `name: value` pairs.
///
/// Values are anything [`serde_json::json!`] accepts as a single token tree;
/// wrap compound expressions in parentheses.
///
/// ```
/// let d = ldict::ldict! {x: 1, name: "a", xs: [1, 2, 3]}.unwrap();
/// assert_eq!(d.len(), 3);
/// ```
#[macro_export]
macro_rules! ldict {
    () => {
        ::std::result::Result::<$crate::Ldict, $crate::LdictError>::Ok($crate::Ldict::new())
    };
    ($($key:ident : $value:tt),+ $(,)?) => {
        $crate::Ldict::from_pairs([
            $((stringify!($key), $crate::serde_json::json!($value))),+
        ])
    };
}
