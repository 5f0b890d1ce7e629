// bndl/src/cli.rs
//! Defines the command-line argument structure using clap.
use std::collections::BTreeMap;
use std::path::PathBuf;

use bndl_common::error::{BndlError, Result};
use bndl_common::Representation;
use bndl_core::Resolver;
use clap::{ArgAction, Parser, Subcommand};

pub mod cache;
pub mod core_bundle;
pub mod download;
pub mod latest;
pub mod prefetch;
pub mod resolve;

use crate::cli::cache::CacheCommand;
use crate::cli::core_bundle::CoreArgs;
use crate::cli::download::DownloadArgs;
use crate::cli::latest::LatestArgs;
use crate::cli::prefetch::PrefetchArgs;
use crate::cli::resolve::ResolveArgs;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, name = "bndl", bin_name = "bndl")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Bundle cache shipped with a pipeline configuration, searched last
    #[arg(long, global = true, value_name = "DIR")]
    pub config_cache: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show how a descriptor resolves without fetching it
    Resolve(ResolveArgs),
    /// Make a descriptor available locally and print its path
    Download(DownloadArgs),
    /// Find the latest version of a descriptor
    Latest(LatestArgs),
    /// Resolve the core a config bundle requires
    Core(CoreArgs),
    /// Download every descriptor listed in a file
    Prefetch(PrefetchArgs),
    /// Inspect or clean the bundle cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

impl Command {
    pub fn run(&self, resolver: &Resolver) -> Result<()> {
        match self {
            Self::Resolve(command) => command.run(resolver),
            Self::Download(command) => command.run(resolver),
            Self::Latest(command) => command.run(resolver),
            Self::Core(command) => command.run(resolver),
            Self::Prefetch(command) => command.run(resolver),
            Self::Cache(command) => command.run(resolver),
        }
    }
}

/// Descriptors are given on the command line either as a URI or as
/// comma-separated `key=value` pairs. Every non-empty pair must carry a key
/// and may appear only once.
pub fn parse_representation(raw: &str) -> Result<Representation> {
    let raw = raw.trim();
    if raw.contains(":descriptor:") {
        return Ok(Representation::from(raw));
    }
    let mut fields = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(BndlError::invalid(
                raw,
                format!("'{pair}' is not a key=value pair"),
            ));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(BndlError::invalid(raw, format!("'{pair}' has no key")));
        }
        if fields
            .insert(key.to_string(), value.trim().to_string())
            .is_some()
        {
            return Err(BndlError::invalid(raw, format!("key '{key}' is given twice")));
        }
    }
    Ok(Representation::Fields(fields))
}
