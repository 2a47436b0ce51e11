//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod manifest;

pub(crate) use build::BuildArgs;
pub(crate) use manifest::ManifestArgs;
