use drivemirror_core::domain::{ItemResult, Outcome, SkipReason, SyncReport};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

/// One-line description of an item outcome.
pub fn describe_item(item: &ItemResult) -> String {
    match &item.outcome {
        Outcome::Success => format!("{} ({} bytes)", item.local_path.display(), item.bytes_written),
        Outcome::Skipped(SkipReason::UnsupportedType { mime_type }) => {
            format!("{}: no export for {}", item.local_path.display(), mime_type)
        }
        Outcome::Skipped(SkipReason::CycleDetected) => {
            format!("{}: folder contains itself", item.local_path.display())
        }
        Outcome::Failed => format!(
            "{}: {}",
            item.local_path.display(),
            item.error_detail.as_deref().unwrap_or("failed")
        ),
    }
}

/// Prints the totals and every non-successful item.
pub fn print_report(fmt: &dyn OutputFormatter, report: &SyncReport) {
    let summary = format!(
        "{} succeeded, {} skipped, {} failed, {} bytes",
        report.succeeded(),
        report.skipped(),
        report.failed(),
        report.total_bytes()
    );
    if report.is_cancelled() {
        fmt.warn(&format!("Sync cancelled: {}", summary));
    } else if report.failed() > 0 {
        fmt.warn(&format!("Sync finished with failures: {}", summary));
    } else {
        fmt.success(&format!("Sync complete: {}", summary));
    }

    fmt.info(&format!("Destination: {}", report.task().local_root.display()));
    if let Some(ms) = report.duration_ms() {
        fmt.info(&format!("Duration:    {:.1}s", ms as f64 / 1000.0));
    }

    let skipped: Vec<_> = report
        .items()
        .iter()
        .filter(|i| matches!(i.outcome, Outcome::Skipped(_)))
        .collect();
    if !skipped.is_empty() {
        fmt.info("");
        fmt.info("Skipped:");
        for item in skipped {
            fmt.info(&format!("  {}", describe_item(item)));
        }
    }

    let failed: Vec<_> = report
        .items()
        .iter()
        .filter(|i| i.outcome == Outcome::Failed)
        .collect();
    if !failed.is_empty() {
        fmt.info("");
        fmt.info("Failed:");
        for item in failed {
            fmt.info(&format!("  {}", describe_item(item)));
        }
    }
}
