use bndl_common::error::Result;
use bndl_common::Category;
use bndl_core::{resolve_core_dependency, CreateOptions, Resolver};
use clap::Args;
use colored::Colorize;

use super::parse_representation;
use super::resolve::print_handle;

#[derive(Args, Debug)]
pub struct CoreArgs {
    /// Descriptor of the bundle whose core should be resolved
    pub descriptor: String,

    #[arg(long, short, default_value = "config")]
    pub category: Category,
}

impl CoreArgs {
    pub fn run(&self, resolver: &Resolver) -> Result<()> {
        let bundle = resolver.create_descriptor(
            parse_representation(&self.descriptor)?,
            self.category,
            CreateOptions::default(),
        )?;
        match resolve_core_dependency(&bundle)? {
            Some(core) => {
                println!(
                    "{} {} requires core {}",
                    "==>".bold().blue(),
                    bundle.system_name().bold(),
                    core.version().unwrap_or("-").green()
                );
                print_handle(&core);
            }
            None => println!(
                "{} {} declares no core",
                "==>".bold().blue(),
                bundle.system_name().bold()
            ),
        }
        Ok(())
    }
}
