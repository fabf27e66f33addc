//! # Fetchkit
//!
//! Retrieve artifacts and unpack them.
//!
//! - [`Fetcher`] copies `http(s)://`, `file://` and plain-path sources to a
//!   destination, verifying an optional [`Checksum`] before the destination
//!   is touched
//! - [`Extractor`] unpacks tar, tar.gz, zip and single-file gzip archives
//!   into an existing directory, preserving colliding files unless forced

pub mod archive;
pub mod error;
pub mod fetch;
pub mod hash;

pub use archive::{ArchiveFormat, ExtractReport, Extractor};
pub use error::{Error, ErrorCategory, Result};
pub use fetch::{Fetcher, Source};
pub use hash::{Checksum, HashType};
