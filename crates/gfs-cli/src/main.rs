#![forbid(unsafe_code)]

use anyhow::{bail, Context, Result};
use gfs_core::Report;
use gfs_error::GfsError;
use std::env;
use std::path::Path;

fn main() {
    // Log output is opt-in via RUST_LOG; the report itself goes to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        let code = error
            .downcast_ref::<GfsError>()
            .map_or(1, GfsError::exit_code);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "analyze" => {
            let Some(path) = args.next() else {
                bail!("analyze requires a path argument");
            };
            let json = args.any(|arg| arg == "--json");
            analyze(Path::new(&path), json)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("gfs-cli\n");
    println!("USAGE:");
    println!("  gfs-cli analyze <image-path> [--json]");
}

fn analyze(path: &Path, json: bool) -> Result<()> {
    let report = gfs_core::analyze_at_path(path)
        .with_context(|| format!("failed to analyze GrahaFS image {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report")?
        );
    } else {
        print_report(&report);
    }

    // Advisories alone leave the exit status at 0; a stage that could not
    // complete does not.
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &Report) {
    println!("GrahaFS Analyzer");
    println!("magic: {:#018x}", report.superblock.magic);
    println!("total_blocks: {}", report.superblock.total_blocks);
    println!("bitmap_start: {}", report.superblock.bitmap_start);
    println!("inode_start: {}", report.superblock.inode_start);
    println!("data_start: {}", report.superblock.data_start);
    println!("root_inode: {}", report.superblock.root_inode);
    println!("free_blocks: {}", report.superblock.free_blocks);
    println!("free_inodes: {}", report.superblock.free_inodes);

    match report.bitmap_used_blocks {
        Some(used) => println!("used_blocks: {used}"),
        None => println!("used_blocks: (bitmap unavailable)"),
    }

    if let Some(root) = &report.root_inode {
        println!(
            "root inode {}: type={} links={} mode={:#o} size={} first_block={}",
            root.number,
            root.inode.kind,
            root.inode.link_count,
            root.inode.mode,
            root.inode.size,
            root.inode.first_block
        );
    }

    for entry in &report.entries {
        println!(
            "  entry {}: inode={} name={:?}",
            entry.index, entry.inode, entry.name
        );
    }

    if let Some(digest) = &report.digest {
        println!("digest: {digest}");
    }

    for advisory in &report.advisories {
        println!("advisory: {advisory}");
    }
    for failure in &report.stage_failures {
        println!("failed stage: {}: {}", failure.stage, failure.detail);
    }
}
