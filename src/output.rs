//! CLI output formatting for batch runs.
//!
//! # Output Format
//!
//! ```text
//! Compositing 3 photos → output/output_20260307_090503
//!     beach.jpg → beach_insta.jpg (RGB(12,200,87))
//! [=================                                 ] 33% (1/3)
//!     broken.jpg: Unreadable asset in/broken.jpg: ...
//! [=================================                 ] 67% (2/3)
//!     dunes.png → dunes_insta.jpg (RGB(250,3,141))
//! [==================================================] 100% (3/3)
//! Done: 2 succeeded, 1 failed in 1.4s
//! ```
//!
//! After the run, [`format_report`] summarizes the [`BatchReport`] with one
//! line per failure.
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure and do no I/O.

use crate::process::BatchEvent;
use crate::types::BatchReport;
use std::path::Path;
use std::time::Duration;

/// Width of the progress bar between the brackets.
pub const PROGRESS_WIDTH: usize = 50;

/// Render `[====    ] 42% (5/12)`.
///
/// Percent and fill are rounded to the nearest whole value.
pub fn progress_bar(current: usize, total: usize) -> String {
    let current = current.min(total);
    let percent = if total == 0 {
        0
    } else {
        (current * 200 + total) / (2 * total)
    };
    let filled = (PROGRESS_WIDTH * percent + 50) / 100;
    format!(
        "[{}{}] {}% ({}/{})",
        "=".repeat(filled),
        " ".repeat(PROGRESS_WIDTH - filled),
        percent,
        current,
        total
    )
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}

/// Format a single batch event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started {
            total,
            output_folder,
        } => {
            let noun = if *total == 1 { "photo" } else { "photos" };
            vec![format!(
                "Compositing {} {} → {}",
                total,
                noun,
                output_folder.display()
            )]
        }
        BatchEvent::Progress { current, total } => vec![progress_bar(*current, *total)],
        BatchEvent::Success {
            filename,
            output_path,
            color,
        } => vec![format!(
            "    {} → {} ({})",
            filename,
            file_name(output_path),
            color
        )],
        BatchEvent::Error { filename, reason } => vec![format!("    {}: {}", filename, reason)],
        BatchEvent::Complete {
            succeeded,
            failed,
            skipped,
            cancelled,
            elapsed,
        } => {
            let mut lines = vec![format!(
                "Done: {} succeeded, {} failed in {}",
                succeeded,
                failed,
                format_elapsed(*elapsed)
            )];
            if *cancelled {
                lines.push(format!("Cancelled: {} photos skipped", skipped));
            } else if *skipped > 0 {
                lines.push(format!("Stalled: {} photos skipped", skipped));
            }
            lines
        }
    }
}

/// Print a batch event to stdout.
pub fn print_batch_event(event: &BatchEvent) {
    for line in format_batch_event(event) {
        println!("{}", line);
    }
}

/// Format the final run summary.
pub fn format_report(report: &BatchReport) -> Vec<String> {
    let mut lines = vec![
        format!("Output: {}", report.output_folder.display()),
        format!(
            "Total: {}, succeeded: {}, failed: {}",
            report.total,
            report.succeeded(),
            report.failed()
        ),
    ];
    if report.cancelled {
        lines.push(format!("Cancelled with {} photos not processed", report.skipped));
    } else if report.skipped > 0 {
        lines.push(format!("Stalled with {} photos not processed", report.skipped));
    }
    if report.failed() > 0 {
        lines.push("Failures:".to_string());
        for item in report.failures() {
            lines.push(format!(
                "    {}: {}",
                item.filename,
                item.reason().unwrap_or("unknown error")
            ));
        }
    }
    lines.push(format!("Elapsed: {}", format_elapsed(report.elapsed())));
    lines
}

/// Print the final run summary to stdout.
pub fn print_report(report: &BatchReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::OverlayColor;
    use crate::types::BatchItem;
    use std::path::PathBuf;

    // =========================================================================
    // progress_bar
    // =========================================================================

    #[test]
    fn progress_bar_partial() {
        let bar = progress_bar(5, 12);
        assert_eq!(bar, format!("[{}{}] 42% (5/12)", "=".repeat(21), " ".repeat(29)));
    }

    #[test]
    fn progress_bar_complete() {
        assert_eq!(
            progress_bar(3, 3),
            format!("[{}] 100% (3/3)", "=".repeat(PROGRESS_WIDTH))
        );
    }

    #[test]
    fn progress_bar_empty_and_zero_total() {
        let empty = format!("[{}] 0% (0/0)", " ".repeat(PROGRESS_WIDTH));
        assert_eq!(progress_bar(0, 0), empty);
        assert!(progress_bar(0, 10).starts_with(&format!("[{}]", " ".repeat(PROGRESS_WIDTH))));
    }

    #[test]
    fn progress_bar_rounds_half_up() {
        // 1/8 = 12.5% → 13%
        assert!(progress_bar(1, 8).ends_with("] 13% (1/8)"));
        // 2/3 = 66.7% → 67%, 50 * 0.67 = 33.5 → 34 cells
        assert!(progress_bar(2, 3).starts_with(&format!("[{} ", "=".repeat(34))));
    }

    #[test]
    fn progress_bar_is_fixed_width() {
        for current in 0..=7 {
            let bar = progress_bar(current, 7);
            let inner = &bar[1..=PROGRESS_WIDTH];
            assert_eq!(inner.chars().count(), PROGRESS_WIDTH);
            assert_eq!(&bar[PROGRESS_WIDTH + 1..PROGRESS_WIDTH + 2], "]");
        }
    }

    // =========================================================================
    // format_batch_event
    // =========================================================================

    #[test]
    fn started_event() {
        let lines = format_batch_event(&BatchEvent::Started {
            total: 3,
            output_folder: PathBuf::from("output/output_20260307_090503"),
        });
        assert_eq!(
            lines,
            vec!["Compositing 3 photos → output/output_20260307_090503"]
        );
    }

    #[test]
    fn started_event_singular() {
        let lines = format_batch_event(&BatchEvent::Started {
            total: 1,
            output_folder: PathBuf::from("out"),
        });
        assert_eq!(lines, vec!["Compositing 1 photo → out"]);
    }

    #[test]
    fn success_event_shows_output_name_and_color() {
        let lines = format_batch_event(&BatchEvent::Success {
            filename: "beach.jpg".into(),
            output_path: PathBuf::from("/out/output_1/beach_insta.jpg"),
            color: OverlayColor::new(12, 200, 87),
        });
        assert_eq!(lines, vec!["    beach.jpg → beach_insta.jpg (RGB(12,200,87))"]);
    }

    #[test]
    fn error_event() {
        let lines = format_batch_event(&BatchEvent::Error {
            filename: "broken.jpg".into(),
            reason: "Timed out after 2s".into(),
        });
        assert_eq!(lines, vec!["    broken.jpg: Timed out after 2s"]);
    }

    #[test]
    fn progress_event_is_bar() {
        let lines = format_batch_event(&BatchEvent::Progress {
            current: 1,
            total: 2,
        });
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("50% (1/2)"));
    }

    #[test]
    fn complete_event() {
        let lines = format_batch_event(&BatchEvent::Complete {
            succeeded: 2,
            failed: 1,
            skipped: 0,
            cancelled: false,
            elapsed: Duration::from_millis(1400),
        });
        assert_eq!(lines, vec!["Done: 2 succeeded, 1 failed in 1.4s"]);
    }

    #[test]
    fn complete_event_cancelled() {
        let lines = format_batch_event(&BatchEvent::Complete {
            succeeded: 1,
            failed: 0,
            skipped: 4,
            cancelled: true,
            elapsed: Duration::from_secs(2),
        });
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "Cancelled: 4 photos skipped");
    }

    #[test]
    fn complete_event_stalled() {
        let lines = format_batch_event(&BatchEvent::Complete {
            succeeded: 1,
            failed: 1,
            skipped: 2,
            cancelled: false,
            elapsed: Duration::from_secs(1),
        });
        assert_eq!(lines[1], "Stalled: 2 photos skipped");
    }

    // =========================================================================
    // format_report
    // =========================================================================

    fn report() -> BatchReport {
        let mut report = BatchReport::new(PathBuf::from("out/output_20260307_090503"), 3);
        report.items.push(BatchItem::success(
            "a.jpg".into(),
            PathBuf::from("out/output_20260307_090503/a_insta.jpg"),
            OverlayColor::BLACK,
        ));
        report
            .items
            .push(BatchItem::failed("b.jpg".into(), "Unreadable asset b.jpg"));
        report.items.push(BatchItem::success(
            "c.jpg".into(),
            PathBuf::from("out/output_20260307_090503/c_insta.jpg"),
            OverlayColor::WHITE,
        ));
        report.elapsed_ms = 2500;
        report
    }

    #[test]
    fn report_lists_totals_and_failures() {
        let lines = format_report(&report());
        assert_eq!(
            lines,
            vec![
                "Output: out/output_20260307_090503",
                "Total: 3, succeeded: 2, failed: 1",
                "Failures:",
                "    b.jpg: Unreadable asset b.jpg",
                "Elapsed: 2.5s",
            ]
        );
    }

    #[test]
    fn report_without_failures_has_no_failure_section() {
        let mut report = report();
        report.items.retain(|i| i.is_success());
        let lines = format_report(&report);
        assert!(!lines.iter().any(|l| l == "Failures:"));
    }

    #[test]
    fn report_mentions_cancellation() {
        let mut report = report();
        report.cancelled = true;
        report.skipped = 2;
        let lines = format_report(&report);
        assert!(lines.contains(&"Cancelled with 2 photos not processed".to_string()));
    }

    #[test]
    fn report_mentions_stalled_skips() {
        let mut report = report();
        report.skipped = 1;
        let lines = format_report(&report);
        assert!(lines.contains(&"Stalled with 1 photos not processed".to_string()));
    }
}
