use bndl_common::error::Result;
use bndl_common::Category;
use bndl_core::{CreateOptions, DescriptorHandle, Resolver};
use clap::Args;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};

use super::parse_representation;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Descriptor URI or comma-separated key=value pairs
    pub descriptor: String,

    #[arg(long, short, default_value = "app")]
    pub category: Category,
}

impl ResolveArgs {
    pub fn run(&self, resolver: &Resolver) -> Result<()> {
        let handle = resolver.create_descriptor(
            parse_representation(&self.descriptor)?,
            self.category,
            CreateOptions::default(),
        )?;
        print_handle(&handle);
        Ok(())
    }
}

/// Prints what a handle names and where its payload lives.
pub fn print_handle(handle: &DescriptorHandle) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    let location = handle
        .local_path()
        .map(|p| p.to_path_buf())
        .or_else(|| handle.cache_location())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    let cached = if handle.is_cached() {
        "yes".green().to_string()
    } else {
        "no".yellow().to_string()
    };
    let rows = [
        ("URI", handle.uri()),
        ("Type", handle.descriptor_type().to_string()),
        ("Category", handle.category().to_string()),
        ("Name", handle.system_name()),
        ("Version", handle.version().unwrap_or("-").to_string()),
        ("Cached", cached),
        ("Location", location),
    ];
    for (label, value) in rows {
        table.add_row(Row::new(vec![
            Cell::new(label).style_spec("b"),
            Cell::new(&value),
        ]));
    }
    table.printstd();
}
