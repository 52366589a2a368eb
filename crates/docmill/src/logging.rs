//! Tracing setup and helpers for sanitizing data before it enters span
//! attributes.
//!
//! Traces are safe to share for debugging — these functions ensure no
//! user file paths leak into spans beyond their final component.

use std::path::Path;
use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Installs the global tracing subscriber and the `log` crate bridge.
///
/// Filter defaults to `info` and can be overridden with `RUST_LOG`.
/// Safe to call more than once; only the first call takes effect.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_log::LogTracer::init();

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,docmill=debug"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init();
    });
}

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields — reveals file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn redact_path_keeps_only_filename() {
        let path = PathBuf::from("/home/user/documents/invoice_template.docx");
        assert_eq!(redact_path(&path), "invoice_template.docx");
    }

    #[test]
    fn redact_path_handles_root() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }
}
