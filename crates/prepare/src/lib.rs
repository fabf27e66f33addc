//! # Prepare
//!
//! Turns a weakly typed declaration (a map of field names to
//! `serde_json::Value`s) into validated, strongly typed resource parameters.
//!
//! A resource type describes its parameters with a [`Schema`]. A
//! [`Preparer`] checks a declaration against it, then coerces fields on
//! demand through [`FromRaw`], rendering strings along the way.
//!
//! ```ignore
//! let schema = Schema::new()
//!     .field(Field::new("destination").required())
//!     .field(Field::new("mode").base(8));
//! let mut p = Preparer::new(&schema, &source, &mut renderer)?;
//! let destination: String = p.require("destination")?;
//! let mode: Option<u32> = p.get("mode")?;
//! ```

pub mod coerce;
pub mod error;
pub mod preparer;
pub mod schema;

pub use coerce::{Coercer, FromRaw};
pub use error::{PrepareError, Result};
pub use preparer::Preparer;
pub use schema::{Field, RESERVED_KEYS, Schema, levenshtein};
pub use serde_json::Value;
