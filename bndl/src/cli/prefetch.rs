// bndl/src/cli/prefetch.rs
//! Parallel download of a list of descriptors.
//!
//! Each line of the input file holds one descriptor, optionally preceded by
//! its category (`core bndl:descriptor:...`). Blank lines and lines starting
//! with `#` are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use bndl_common::error::{BndlError, Result};
use bndl_common::Category;
use bndl_core::{CreateOptions, Resolver};
use clap::Args;
use colored::Colorize;
use crossbeam_channel::unbounded;
use threadpool::ThreadPool;
use tracing::{debug, error};

use super::parse_representation;

#[derive(Args, Debug)]
pub struct PrefetchArgs {
    /// File listing one descriptor per line
    pub file: PathBuf,

    /// Category for lines that do not name one
    #[arg(long, short, default_value = "app")]
    pub category: Category,

    /// Number of parallel downloads (defaults to the CPU count, at most 8)
    #[arg(long, short)]
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchEntry {
    pub line: usize,
    pub category: Category,
    pub descriptor: String,
}

pub fn parse_prefetch_list(contents: &str, default_category: Category) -> Vec<PrefetchEntry> {
    contents
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (category, descriptor) = match line.split_once(char::is_whitespace) {
                Some((first, rest)) => match first.parse::<Category>() {
                    Ok(category) => (category, rest.trim()),
                    Err(_) => (default_category, line),
                },
                None => (default_category, line),
            };
            Some(PrefetchEntry {
                line: idx + 1,
                category,
                descriptor: descriptor.to_string(),
            })
        })
        .collect()
}

fn read_list(path: &Path, default_category: Category) -> Result<Vec<PrefetchEntry>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        BndlError::Config(format!("Could not read {}: {e}", path.display()))
    })?;
    Ok(parse_prefetch_list(&contents, default_category))
}

impl PrefetchArgs {
    pub fn run(&self, resolver: &Resolver) -> Result<()> {
        let entries = read_list(&self.file, self.category)?;
        if entries.is_empty() {
            println!("{}", "Nothing to prefetch".yellow());
            return Ok(());
        }

        let num_workers = self
            .jobs
            .unwrap_or_else(|| num_cpus::get().min(8))
            .max(1);
        let pool = ThreadPool::new(num_workers);
        debug!(
            "Prefetching {} descriptor(s) with {} workers",
            entries.len(),
            num_workers
        );

        let (result_tx, result_rx) = unbounded();
        for entry in entries.iter().cloned() {
            let resolver = resolver.clone();
            let result_tx = result_tx.clone();
            pool.execute(move || {
                let result = parse_representation(&entry.descriptor)
                    .and_then(|representation| {
                        resolver.create_descriptor(
                            representation,
                            entry.category,
                            CreateOptions::default(),
                        )
                    })
                    .and_then(|handle| handle.ensure_local());
                let _ = result_tx.send((entry, result));
            });
        }
        drop(result_tx);

        let mut failures = Vec::new();
        for (entry, result) in result_rx {
            match result {
                Ok(path) => println!(
                    "{} {} {}",
                    "✓".green(),
                    entry.descriptor,
                    path.display().to_string().dimmed()
                ),
                Err(e) => {
                    error!("Line {}: {} failed: {}", entry.line, entry.descriptor, e);
                    println!("{} {} {}", "✗".red(), entry.descriptor, e);
                    failures.push(e);
                }
            }
        }
        pool.join();

        let total = entries.len();
        println!(
            "{} {} of {} descriptor(s) available locally",
            "==>".bold().blue(),
            total - failures.len(),
            total
        );
        match failures.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_categories_and_skips_comments() {
        let list = "\
# studio defaults
core bndl:descriptor:app_store?name=tk-core&version=v0.20.1

bndl:descriptor:git?path=%2Fr%2Ftk-multi-loader&version=v1.9.0
framework type=manual,name=tk-framework-qt,version=v1.0.0
";
        let entries = parse_prefetch_list(list, Category::App);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].category, Category::Core);
        assert_eq!(entries[0].line, 2);
        assert_eq!(
            entries[0].descriptor,
            "bndl:descriptor:app_store?name=tk-core&version=v0.20.1"
        );
        assert_eq!(entries[1].category, Category::App);
        assert_eq!(entries[2].category, Category::Framework);
        assert_eq!(
            entries[2].descriptor,
            "type=manual,name=tk-framework-qt,version=v1.0.0"
        );
    }

    #[test]
    fn unknown_leading_word_is_part_of_the_descriptor() {
        let entries = parse_prefetch_list("type=git, path=/r/x,version=v1", Category::Engine);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, Category::Engine);
        assert_eq!(entries[0].descriptor, "type=git, path=/r/x,version=v1");
    }

    #[test]
    fn prefetches_manual_payloads_from_the_cache() {
        let root = tempfile::tempdir().unwrap();
        let entry = root.path().join("manual/tk-framework-qt/v1.0.0");
        fs::create_dir_all(&entry).unwrap();
        fs::write(entry.join("info.yml"), "name: tk-framework-qt").unwrap();
        let list = root.path().join("bundles.txt");
        fs::write(
            &list,
            "framework bndl:descriptor:manual?name=tk-framework-qt&version=v1.0.0\n",
        )
        .unwrap();

        let resolver = Resolver::new(bndl_core::ResolutionContext::new(root.path()));
        let args = PrefetchArgs {
            file: list,
            category: Category::App,
            jobs: Some(2),
        };
        args.run(&resolver).unwrap();

        let missing = PrefetchArgs {
            file: root.path().join("none.txt"),
            category: Category::App,
            jobs: None,
        };
        assert!(matches!(
            missing.run(&resolver),
            Err(BndlError::Config(_))
        ));
    }
}
