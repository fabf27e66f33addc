//! # Render
//!
//! Parameter interpolation for resource declarations.
//!
//! Declarations may reference module parameters and the exported fields of
//! sibling resources through `{{ ... }}` actions:
//!
//! ```text
//! destination = "/srv/{{ param \"app\" }}/config"
//! owner       = "{{ lookup \"user.user.deploy.name\" }}"
//! ```
//!
//! The same parse also serves dependency extraction: [`Render::params`]
//! walks a template without evaluating it and reports every `param.X` it
//! references.

pub mod error;
mod eval;
pub mod renderer;
pub mod template;

pub use error::{RenderError, Result};
pub use eval::display;
pub use renderer::{ModuleRenderer, Param, Render, parse_bool};
pub use template::Template;
