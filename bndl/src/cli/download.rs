use bndl_common::error::Result;
use bndl_common::Category;
use bndl_core::{CreateOptions, Resolver};
use clap::Args;
use colored::Colorize;
use tracing::debug;

use super::parse_representation;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Descriptor URI or comma-separated key=value pairs
    pub descriptor: String,

    #[arg(long, short, default_value = "app")]
    pub category: Category,
}

impl DownloadArgs {
    pub fn run(&self, resolver: &Resolver) -> Result<()> {
        let handle = resolver.create_descriptor(
            parse_representation(&self.descriptor)?,
            self.category,
            CreateOptions::default(),
        )?;
        let was_cached = handle.is_cached();
        let path = handle.ensure_local()?;
        debug!("{} is local at {}", handle, path.display());
        let status = if was_cached { "cached" } else { "downloaded" };
        println!(
            "{} {} ({})",
            "==>".bold().blue(),
            path.display(),
            status.dimmed()
        );
        Ok(())
    }
}
