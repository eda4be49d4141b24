//! Emission of the bundle: chunk rendering, HTML patching, asset copies and the final install.

pub mod assets;
pub mod js_patch;
pub mod manifest;
pub mod runtime;
pub mod site;
pub mod writer;
