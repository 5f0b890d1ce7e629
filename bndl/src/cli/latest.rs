use bndl_common::error::Result;
use bndl_common::Category;
use bndl_core::{CreateOptions, Resolver};
use clap::Args;
use colored::Colorize;

use super::parse_representation;
use super::resolve::print_handle;

#[derive(Args, Debug)]
pub struct LatestArgs {
    /// Descriptor URI or key=value pairs; the version may be left out
    pub descriptor: String,

    #[arg(long, short, default_value = "app")]
    pub category: Category,

    /// Only consider versions matching a pattern such as v1.x.x
    #[arg(long)]
    pub pattern: Option<String>,

    /// Also make the latest version available locally
    #[arg(long)]
    pub download: bool,
}

impl LatestArgs {
    pub fn run(&self, resolver: &Resolver) -> Result<()> {
        let representation = parse_representation(&self.descriptor)?;
        let versionless = representation
            .to_fields()
            .is_ok_and(|fields| !fields.contains_key("version"));

        let latest = if versionless {
            resolver.latest_descriptor(representation, self.category, self.pattern.as_deref())?
        } else {
            resolver
                .create_descriptor(representation, self.category, CreateOptions::default())?
                .find_latest_version(self.pattern.as_deref())?
        };
        if self.download {
            latest.ensure_local()?;
        }

        println!(
            "{} latest version is {}",
            "==>".bold().blue(),
            latest.version().unwrap_or("-").green()
        );
        print_handle(&latest);
        Ok(())
    }
}
