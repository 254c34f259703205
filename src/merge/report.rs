//! Merge statistics.

use crate::merge::merger::MergeTotals;
use serde::Serialize;

/// Summary of one dataset merge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    pub dataset: String,
    /// Eligible source objects
    pub source_files: u64,
    /// Records in the merged payload
    pub records: u64,
    /// Sum of declared sizes of eligible source objects
    pub source_bytes: u64,
    /// Length of the merged payload
    pub output_bytes: u64,
    /// Size reduction in percent, one decimal place. `None` when there
    /// were no source bytes to compare against.
    pub compression_ratio: Option<f64>,
}

/// `(1 - output/source) * 100`, rounded to one decimal place.
///
/// Returns `None` for `source_bytes == 0` instead of dividing by zero.
/// Negative when the output is larger than the sources.
pub fn compression_ratio(source_bytes: u64, output_bytes: u64) -> Option<f64> {
    if source_bytes == 0 {
        return None;
    }
    let pct = (1.0 - output_bytes as f64 / source_bytes as f64) * 100.0;
    Some((pct * 10.0).round() / 10.0)
}

impl MergeReport {
    pub fn build(dataset: &str, totals: MergeTotals, output_bytes: u64) -> Self {
        MergeReport {
            dataset: dataset.to_string(),
            source_files: totals.source_files,
            records: totals.records,
            source_bytes: totals.source_bytes,
            output_bytes,
            compression_ratio: compression_ratio(totals.source_bytes, output_bytes),
        }
    }

    /// Ratio as text: `"42.5%"`, or `"N/A"` without source bytes
    pub fn compression_ratio_display(&self) -> String {
        match self.compression_ratio {
            Some(pct) => format!("{:.1}%", pct),
            None => "N/A".to_string(),
        }
    }

    /// Markdown one-liner for run metadata
    pub fn preview(&self) -> String {
        format!(
            "Merged **{}** records from **{}** files",
            self.records, self.source_files
        )
    }
}

impl std::fmt::Display for MergeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} records from {} files ({} -> {} bytes, ratio {})",
            self.dataset,
            self.records,
            self.source_files,
            self.source_bytes,
            self.output_bytes,
            self.compression_ratio_display()
        )
    }
}
