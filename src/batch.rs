use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::{BatchCfg, BatchKind, FolderJob};
use crate::convert::{convert_image, is_supported, output_path, ConversionOutcome};
use crate::summary::{file_line, BatchReport, FolderSummary, RULE_WIDTH};

/// Supported image files directly inside `dir`, sorted by name. The name is
/// for display only; outputs are derived from the path.
pub fn list_images(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for ent in std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = ent?.path();
        if !path.is_file() || !is_supported(&path) { continue; }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else { continue };
        files.push((name, path));
    }
    files.sort();
    Ok(files)
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Converts every supported file of one folder into its destination directory.
/// Per-file failures are counted, never returned.
pub fn run_folder(job: &FolderJob, kind: BatchKind) -> Result<FolderSummary> {
    let dest = job.dest_dir(kind);
    std::fs::create_dir_all(&dest).with_context(|| format!("failed to create {}", dest.display()))?;

    match kind {
        BatchKind::Thumbnails => {
            println!("Creating thumbnails for: {}", job.source.display());
            println!("Thumbnail folder: {}", dest.display());
            println!("Max size: {}x{}, Quality: {}", job.max_size.width, job.max_size.height, job.quality);
        }
        BatchKind::Optimize => {
            println!("Optimizing images in: {}", job.source.display());
            println!("Output directory: {}", dest.display());
        }
    }
    println!("{}", "-".repeat(RULE_WIDTH));

    let files = list_images(&job.source)?;
    debug!("{} candidate images in {}", files.len(), job.source.display());

    let pb = progress_bar(files.len() as u64);
    let mut summary = FolderSummary::new(kind, job.source.clone(), dest.clone());
    for (name, path) in files {
        pb.set_message(name.clone());
        let outcome = convert_image(&path, &output_path(&dest, &path), job.max_size, job.quality, kind.resize_policy());
        if let ConversionOutcome::Failed { error } = &outcome {
            warn!(file = %path.display(), %error, "conversion failed");
        }
        summary.record(&outcome);
        let line = file_line(&name, &outcome);
        pb.suspend(|| println!("{line}"));
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("{summary}");
    info!(
        source = %job.source.display(),
        processed = summary.processed,
        failed = summary.failed,
        "folder done"
    );
    Ok(summary)
}

/// Runs every configured folder in order. Missing or unusable folders are
/// reported and skipped.
pub fn run_batch(cfg: &BatchCfg) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    for job in &cfg.folders {
        if !job.source.is_dir() {
            println!("\nSkipping {} (directory not found)", job.source.display());
            warn!(source = %job.source.display(), "source directory not found");
            report.skipped.push(job.source.clone());
            continue;
        }
        println!("\n{}", "=".repeat(RULE_WIDTH));
        match run_folder(job, cfg.kind) {
            Ok(summary) => report.folders.push(summary),
            Err(e) => {
                println!("\nSkipping {} ({e:#})", job.source.display());
                error!(source = %job.source.display(), "folder failed: {e:#}");
                report.skipped.push(job.source.clone());
            }
        }
    }
    Ok(report)
}

pub fn print_banner(kind: BatchKind) {
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("{}", kind.title());
    println!("{}", "=".repeat(RULE_WIDTH));
    println!();
}

pub fn print_footer(kind: BatchKind) {
    println!("\n{}", "=".repeat(RULE_WIDTH));
    match kind {
        BatchKind::Thumbnails => println!("Thumbnail creation complete!"),
        BatchKind::Optimize => println!("Optimization complete!"),
    }
    println!("{}", "=".repeat(RULE_WIDTH));
    match kind {
        BatchKind::Thumbnails => {
            println!("\nNote: Update your code to use:");
            println!("- Thumbnails in scrolling galleries (e.g., 'Otherside Otter Photos_thumbnails/')");
            println!("- Original images in modals (e.g., 'Otherside Otter Photos/')");
        }
        BatchKind::Optimize => {
            println!("\nNote: After optimization, you may want to:");
            println!("1. Review the optimized images");
            println!("2. Replace the original directories with optimized versions");
            println!("3. Update image paths in your code if needed");
        }
    }
}
