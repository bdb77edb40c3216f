//! Job directory manifest parsing and validation.
//!
//! A manifest is written by the upstream producer before evaluation begins and
//! is read-only to this crate. It is validated against an embedded JSON Schema
//! and then converted into a typed [`Manifest`].

mod parser;
mod schema;

pub use parser::{
    FileEntry, FileFormat, Manifest, ManifestError, Strategy, DEFAULT_STRATEGY, MANIFEST_FILENAME,
};
pub use schema::validate_manifest_schema;
