use std::time::Duration;

use bndl_common::cache::RootKind;
use bndl_common::error::Result;
use bndl_core::Resolver;
use clap::Subcommand;
use colored::Colorize;
use prettytable::{format, Cell, Row, Table};

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// List complete entries in every cache root
    List,
    /// Remove staging directories left behind by interrupted downloads
    Sweep {
        /// Only remove staging directories older than this
        #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
        max_age: Duration,
    },
}

fn root_label(kind: RootKind) -> &'static str {
    match kind {
        RootKind::Primary => "primary",
        RootKind::Fallback => "fallback",
        RootKind::ConfigLocal => "config",
    }
}

impl CacheCommand {
    pub fn run(&self, resolver: &Resolver) -> Result<()> {
        match self {
            Self::List => list(resolver),
            Self::Sweep { max_age } => {
                let removed = resolver.cache().sweep_staging(*max_age)?;
                println!(
                    "{} Removed {} staging director{}",
                    "==>".bold().blue(),
                    removed,
                    if removed == 1 { "y" } else { "ies" }
                );
                Ok(())
            }
        }
    }
}

fn list(resolver: &Resolver) -> Result<()> {
    let cache = resolver.cache();
    let mut entries = cache.entries();
    if entries.is_empty() {
        println!(
            "{} {}",
            "No cached bundles under".yellow(),
            cache.primary_root().display()
        );
        return Ok(());
    }
    entries.sort_by(|a, b| a.relative.cmp(&b.relative));

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.add_row(Row::new(vec![
        Cell::new("Root").style_spec("b"),
        Cell::new("Type").style_spec("b"),
        Cell::new("Entry").style_spec("b"),
    ]));
    for entry in &entries {
        let root_style = match entry.root {
            RootKind::Primary => "Fg",
            RootKind::Fallback => "Fy",
            RootKind::ConfigLocal => "Fc",
        };
        table.add_row(Row::new(vec![
            Cell::new(root_label(entry.root)).style_spec(root_style),
            Cell::new(entry.descriptor_type.as_str()),
            Cell::new(&entry.relative.display().to_string()),
        ]));
    }
    table.printstd();
    println!("{} {} entries", "==>".bold().blue(), entries.len());
    Ok(())
}
