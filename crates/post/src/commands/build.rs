//! `post build` command implementation.

use std::path::PathBuf;

use clap::Args;
use post_config::ConfigOverrides;
use post_site::{Project, ProjectOptions};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Project root containing `post.config.json`.
    #[arg(short, long, default_value = ".", env = "POST_ROOT")]
    pub(crate) root: PathBuf,

    /// Output directory (overrides `outputDir`).
    #[arg(short, long)]
    pub(crate) out_dir: Option<PathBuf>,

    /// Fail on the first module that does not compile.
    #[arg(long)]
    pub(crate) production: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl BuildArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let options = ProjectOptions {
            production: self.production,
            overrides: ConfigOverrides {
                output_dir: self.out_dir,
                ..ConfigOverrides::default()
            },
            ..ProjectOptions::default()
        };
        tracing::debug!(root = %self.root.display(), production = self.production, "opening project");
        let project = Project::open(&self.root, options)?;

        let config = project.config();
        output.field("Source", &config.src_dir.display());
        output.field("Output", &config.output_dir.display());

        let summary = project.build()?;
        for route in &summary.failed_pages {
            output.page_failed(route);
        }
        if self.production && !summary.failed_pages.is_empty() {
            return Err(CliError::Build(format!(
                "{} page(s) failed to render",
                summary.failed_pages.len()
            )));
        }

        output.built(&summary);
        Ok(())
    }
}
