use anyhow::Context;
use bytesize::ByteSize;
use clap::{ArgAction, Parser, Subcommand};
use colored::*;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::config::{default_config_path, Config};
use crate::filters::FilterSet;
use crate::progress;
use crate::scan_cache::CacheManager;
use crate::scanner::{ScanOutcome, Scanner};
use crate::walker::{ScanStats, WalkOptions, Walker};

#[derive(Parser)]
#[command(name = "fastfind")]
#[command(version)]
#[command(about = "Find files fast, with a persistent scan cache")]
#[command(long_about = "fastfind walks a directory tree with a bounded pool of workers and \
    caches each result, so repeating a query is answered without touching the disk.\n\n\
    Examples:\n  \
    fastfind scan ~/src --ext .rs             # All Rust files\n  \
    fastfind scan . --name test --max-size 1MB  # Small files with 'test' in the name\n  \
    fastfind cache stats                      # Inspect the cache")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress everything except the results and errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use this config file instead of the default one
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List files under PATH matching the given filters
    #[command(visible_alias = "s")]
    Scan {
        /// Directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Keep files whose name contains this text
        #[arg(long)]
        name: Option<String>,

        /// Keep files whose name ends with this extension (e.g. .rs)
        #[arg(long)]
        ext: Option<String>,

        /// Minimum file size (e.g. 10KB, 1MB)
        #[arg(long, value_name = "SIZE")]
        min_size: Option<ByteSize>,

        /// Maximum file size (e.g. 10KB, 1MB)
        #[arg(long, value_name = "SIZE")]
        max_size: Option<ByteSize>,

        /// Neither read nor write the cache
        #[arg(long)]
        no_cache: bool,

        /// Traverse symlinked directories
        #[arg(long)]
        follow_symlinks: bool,

        /// Recursion ceiling
        #[arg(long, value_name = "DEPTH")]
        max_depth: Option<usize>,

        /// Directory listings allowed in flight at once
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,

        /// Skip paths matching this glob (repeatable; replaces the defaults)
        #[arg(long, value_name = "GLOB")]
        ignore: Vec<String>,

        /// Print scan statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Inspect or manage the scan cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show hit rates, entry counts and sizes
    Stats,
    /// Remove expired entries from every tier
    Cleanup,
    /// Empty the memory and persistent tiers
    Clear {
        /// Also delete directory-state files
        #[arg(long)]
        dir_states: bool,
    },
    /// Turn caching on for future runs
    Enable,
    /// Turn caching off for future runs
    Disable,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn run(self) -> anyhow::Result<()> {
        let config_path = self.config.clone().or_else(default_config_path);
        let mut config = match &config_path {
            Some(path) => Config::load_from(path).context("Failed to load configuration")?,
            None => Config::default(),
        };

        match self.command {
            Commands::Scan {
                path,
                name,
                ext,
                min_size,
                max_size,
                no_cache,
                follow_symlinks,
                max_depth,
                concurrency,
                ignore,
                stats,
            } => {
                if follow_symlinks {
                    config.scan.follow_symlinks = true;
                }
                if let Some(depth) = max_depth {
                    config.scan.max_depth = depth;
                }
                if let Some(n) = concurrency {
                    config.scan.max_concurrent = n;
                }
                if !ignore.is_empty() {
                    config.scan.ignore = ignore;
                }

                let filters = FilterSet {
                    name,
                    extension: ext,
                    min_size: min_size.map(|s| s.as_u64()),
                    max_size: max_size.map(|s| s.as_u64()),
                    ..config.scan.base_filters()
                };

                let spinner = if self.quiet {
                    progress::hidden()
                } else {
                    progress::create_scan_spinner(&path.display().to_string())
                };
                let counter = spinner.clone();
                let walker = Walker::new(WalkOptions::from(&config.scan)).with_callback(move |_| {
                    counter.inc(1);
                    Ok(())
                });
                let mut scanner = Scanner::new(walker);
                if !no_cache {
                    scanner = scanner.with_cache_from(&config.cache);
                }

                let outcome = scanner.scan_directory(&path, &filters, !no_cache);
                progress::finish_and_clear(&spinner);
                let outcome =
                    outcome.with_context(|| format!("Failed to scan {}", path.display()))?;

                print_paths(&outcome)?;
                if stats && !self.quiet {
                    print_scan_stats(&outcome);
                }
                Ok(())
            }

            Commands::Cache { action } => {
                if let CacheAction::Enable | CacheAction::Disable = action {
                    let enabled = matches!(action, CacheAction::Enable);
                    config.cache.enabled = enabled;
                    match &config_path {
                        Some(path) => config.save_to(path),
                        None => config.save(),
                    }
                    .context("Failed to save configuration")?;
                    let state = if enabled { "enabled".green() } else { "disabled".yellow() };
                    println!("Cache {}", state);
                    return Ok(());
                }

                let manager = CacheManager::open(&config.cache).context("Failed to open cache")?;
                match action {
                    CacheAction::Stats => print_cache_stats(&manager),
                    CacheAction::Cleanup => {
                        let report = manager.cleanup();
                        println!(
                            "{} {} expired entries ({} memory, {} persistent, {} directory states)",
                            "Removed".green().bold(),
                            report.total,
                            report.memory,
                            report.persistent,
                            report.directory_state
                        );
                    }
                    CacheAction::Clear { dir_states } => {
                        manager.clear_all().context("Failed to clear cache")?;
                        println!("{} memory and persistent caches", "Cleared".green().bold());
                        if dir_states {
                            let removed = manager
                                .clear_directory_states()
                                .context("Failed to clear directory states")?;
                            println!(
                                "{} {} directory state files",
                                "Removed".green().bold(),
                                removed
                            );
                        }
                    }
                    CacheAction::Enable | CacheAction::Disable => {}
                }
                Ok(())
            }
        }
    }
}

fn print_paths(outcome: &ScanOutcome) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for path in &outcome.paths {
        writeln!(out, "{}", path.display())?;
    }
    out.flush()?;
    Ok(())
}

fn print_scan_stats(outcome: &ScanOutcome) {
    eprintln!();
    if outcome.from_cache {
        eprintln!(
            "{} {} files under {} {}",
            "Found".green().bold(),
            outcome.paths.len(),
            outcome.root.display(),
            "(from cache)".dimmed()
        );
        return;
    }

    let stats = outcome.stats.clone().unwrap_or_default();
    print_walk_stats(&stats);
}

fn print_walk_stats(stats: &ScanStats) {
    eprintln!(
        "{} {} files in {} directories ({})",
        "Found".green().bold(),
        stats.files_found,
        stats.dirs_scanned,
        ByteSize(stats.total_bytes)
    );
    eprintln!(
        "  {:.2?} elapsed, {:.0} files/s, {}/s, avg {}",
        stats.elapsed,
        stats.files_per_second,
        ByteSize(stats.bytes_per_second as u64),
        ByteSize(stats.avg_file_size as u64)
    );
    if stats.files_skipped > 0 {
        eprintln!("  {} entries ignored", stats.files_skipped);
    }
    if stats.permission_errors > 0 {
        eprintln!(
            "  {} {} entries could not be read",
            "Warning:".yellow(),
            stats.permission_errors
        );
    }
}

fn print_cache_stats(manager: &CacheManager) {
    let stats = manager.stats();
    let state = if stats.enabled { "enabled".green() } else { "disabled".yellow() };
    println!("{} ({})", "Cache".bold(), state);
    println!("  location: {}", stats.cache_dir.display());
    println!(
        "  combined hit rate: {:.1}%",
        stats.hierarchical.combined_hit_rate * 100.0
    );

    let memory = &stats.hierarchical.memory;
    println!(
        "  {} {}/{} entries, ttl {}s",
        "memory:".cyan(),
        memory.entries,
        memory.max_entries,
        memory.ttl.as_secs()
    );

    match &stats.hierarchical.persistent {
        Some(persistent) => {
            println!(
                "  {} {} entries, {} files, {} cached, store {}",
                "persistent:".cyan(),
                persistent.total_entries,
                persistent.total_files_cached,
                ByteSize(persistent.total_size_cached),
                ByteSize(persistent.cache_file_size)
            );
            if let (Some(oldest), Some(newest)) =
                (persistent.oldest_entry, persistent.newest_entry)
            {
                println!(
                    "    oldest {}, newest {}",
                    oldest.format("%Y-%m-%d %H:%M:%S"),
                    newest.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        None => println!("  {} unavailable", "persistent:".cyan()),
    }

    println!(
        "  {} {} files in {}",
        "directory states:".cyan(),
        stats.dir_state_files,
        stats.dir_state_dir.display()
    );
}
