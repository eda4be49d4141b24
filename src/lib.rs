#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod builder;
pub mod bundle;
pub mod code_splitter;
pub mod config;
pub mod error;
pub mod graph;
pub mod models;
pub mod project;
pub mod resolve;
pub mod stages;

pub use builder::{BuildPlan, BuildReport, OfflineBundler};
pub use config::{ConfigError, ProjectConfig};
pub use error::{BuildError, BuildResult};
pub use project::{BuildOptions, OfflineBuildContext};
pub use stages::{EnvReplaceStage, StagePipeline, TransformStage};
