//! Output formatting utilities for CLI commands

use std::io::{self, Write};
use std::path::Path;

use crate::eval::TypingMetrics;

/// Format error message for display
pub fn format_error(operation: &str, details: &str) -> String {
    format!("ERROR: {} - {}", operation, details)
}

/// Log info message (respects quiet flag)
pub fn log_info(msg: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", msg);
    }
}

/// Write output to file or stdout
pub fn write_output(content: &str, path: Option<&Path>) -> Result<(), String> {
    if let Some(path) = path {
        std::fs::write(path, content)
            .map_err(|e| format!("Failed to write to {}: {}", path.display(), e))?;
    } else {
        print!("{}", content);
        io::stdout().flush().map_err(|e| format!("Failed to flush stdout: {}", e))?;
    }
    Ok(())
}

/// One metrics row for the human report.
pub fn format_metrics(name: &str, m: &TypingMetrics) -> String {
    format!(
        "{:<8} acc {:.4}  mi_f1 {:.4}  ma_f1 {:.4}  (mi_p {:.4}, mi_r {:.4}, ma_p {:.4}, ma_r {:.4})",
        name, m.strict_acc, m.micro_f1, m.macro_f1, m.micro_p, m.micro_r, m.macro_p, m.macro_r
    )
}
