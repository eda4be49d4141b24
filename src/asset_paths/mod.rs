//! Helpers for classifying source files and naming their output paths.
//!
//! The responsibilities are split into focused submodules so that classification,
//! external-reference filtering and output naming can be tested independently.

mod classify;
mod filters;
mod naming;

pub use classify::{AssetClassifier, BUILTIN_ASSET_EXTENSIONS, DEFAULT_ASSET_PATTERNS};
pub use filters::{is_external_reference, strip_query};
pub use naming::{
    OutputLayout, ensure_relative_output, normalise_public_base, public_url, unique_chunk_name,
};
