//! `post manifest` command implementation.

use std::path::PathBuf;

use clap::Args;
use post_site::{Project, ProjectOptions};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the manifest command.
#[derive(Args)]
pub(crate) struct ManifestArgs {
    /// Project root containing `post.config.json`.
    #[arg(short, long, default_value = ".", env = "POST_ROOT")]
    pub(crate) root: PathBuf,
}

impl ManifestArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let project = Project::open(&self.root, ProjectOptions::default())?;
        let manifest = serde_json::to_string_pretty(&project.manifest())?;

        output.field("Pages", &project.page_table().len());
        output.data(&manifest)?;
        Ok(())
    }
}
