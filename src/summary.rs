use std::fmt;
use std::path::PathBuf;

use crate::config::BatchKind;
use crate::convert::{reduction_percent, ConversionOutcome};

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;

pub const RULE_WIDTH: usize = 60;

/// Running totals for one source folder. Failures only bump the counter.
#[derive(Debug, Clone)]
pub struct FolderSummary {
    pub kind: BatchKind,
    pub source: PathBuf,
    pub dest: PathBuf,
    pub processed: u64,
    pub failed: u64,
    pub total_original: u64,
    pub total_output: u64,
}

impl FolderSummary {
    pub fn new(kind: BatchKind, source: PathBuf, dest: PathBuf) -> Self {
        Self { kind, source, dest, processed: 0, failed: 0, total_original: 0, total_output: 0 }
    }

    pub fn record(&mut self, outcome: &ConversionOutcome) {
        match outcome {
            ConversionOutcome::Converted { original_size, new_size, .. } => {
                self.processed += 1;
                self.total_original += original_size;
                self.total_output += new_size;
            }
            ConversionOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn reduction_percent(&self) -> f64 {
        reduction_percent(self.total_original, self.total_output)
    }
}

impl fmt::Display for FolderSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(f, "Processed: {} images", self.processed)?;
        writeln!(f, "Failed: {} images", self.failed)?;
        writeln!(f, "Total original size: {:.2}MB", self.total_original as f64 / MB)?;
        writeln!(f, "Total {} size: {:.2}MB", self.kind.output_label(), self.total_output as f64 / MB)?;
        writeln!(f, "Total reduction: {:.1}%", self.reduction_percent())?;
        writeln!(f)?;
        let saved = match self.kind {
            BatchKind::Thumbnails => "Thumbnails",
            BatchKind::Optimize => "Optimized images",
        };
        write!(f, "{saved} saved to: {}", self.dest.display())
    }
}

/// One console line for a converted or failed file.
pub fn file_line(file_name: &str, outcome: &ConversionOutcome) -> String {
    match outcome {
        ConversionOutcome::Converted { original_size, new_size, reduction, .. } => format!(
            "✓ {file_name}: {:.1}KB → {:.1}KB ({reduction:.1}% reduction)",
            *original_size as f64 / KB,
            *new_size as f64 / KB,
        ),
        ConversionOutcome::Failed { error } => format!("✗ {file_name}: Failed - {error}"),
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub folders: Vec<FolderSummary>,
    pub skipped: Vec<PathBuf>,
}

impl BatchReport {
    pub fn processed(&self) -> u64 { self.folders.iter().map(|f| f.processed).sum() }

    pub fn failed(&self) -> u64 { self.folders.iter().map(|f| f.failed).sum() }

    pub fn total_original(&self) -> u64 { self.folders.iter().map(|f| f.total_original).sum() }

    pub fn total_output(&self) -> u64 { self.folders.iter().map(|f| f.total_output).sum() }
}
