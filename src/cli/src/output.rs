//! Table formatting helpers for CLI output.

use a3s_delta_runtime::{EntryOutcome, RunSummary};
use comfy_table::{ContentArrangement, Table};

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// First 12 hex characters of a digest.
pub fn short_digest(digest: &str) -> &str {
    let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
    &hex[..hex.len().min(12)]
}

/// One row per worklist entry, in worklist order.
pub fn summary_table(summary: &RunSummary) -> Table {
    let mut table = new_table(&["ENTRY", "STATUS", "ARCHIVE", "SIZE", "DIGEST", "DETAIL"]);
    for report in &summary.reports {
        match &report.result {
            Ok(outcome) => {
                let archive = outcome.archive();
                let file = archive
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                table.add_row(vec![
                    report.label.clone(),
                    archive.outcome.to_string(),
                    file,
                    format_bytes(archive.size_bytes),
                    short_digest(&archive.digest).to_string(),
                    outcome_detail(outcome),
                ]);
            }
            Err(e) => {
                table.add_row(vec![
                    report.label.clone(),
                    "failed".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    e.to_string(),
                ]);
            }
        }
    }
    table
}

fn outcome_detail(outcome: &EntryOutcome) -> String {
    match outcome {
        EntryOutcome::Generated(built) => format!(
            "+{} -{} layers",
            built.record.added.len(),
            built.record.removed.len()
        ),
        EntryOutcome::Applied {
            reconstruction,
            loaded,
        } => {
            let mut detail = format!(
                "{} from archive, {} from baseline",
                reconstruction.from_archive, reconstruction.from_baseline
            );
            if *loaded {
                detail.push_str(", loaded");
            }
            detail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_delta_core::error::DeltaError;
    use a3s_delta_runtime::{EntryReport, Mode};

    #[test]
    fn test_format_bytes_zero() {
        assert_eq!(format_bytes(0), "0 B");
    }

    #[test]
    fn test_format_bytes_small() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1023), "1023 B");
    }

    #[test]
    fn test_format_bytes_megabytes() {
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }

    #[test]
    fn test_format_bytes_gigabytes() {
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.0 GB");
    }

    #[test]
    fn test_short_digest() {
        assert_eq!(short_digest("sha256:0123456789abcdef0123"), "0123456789ab");
        assert_eq!(short_digest("abc"), "abc");
    }

    #[test]
    fn test_summary_table_lists_failures() {
        let summary = RunSummary {
            mode: Mode::Apply,
            reports: vec![EntryReport {
                label: "entry #1".to_string(),
                entry: None,
                result: Err(DeltaError::InputError("missing image".to_string())),
            }],
        };
        let rendered = summary_table(&summary).to_string();
        assert!(rendered.contains("entry #1"));
        assert!(rendered.contains("failed"));
        assert!(rendered.contains("missing image"));
    }
}
