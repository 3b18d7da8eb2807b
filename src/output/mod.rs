//! Output module for console output and progress.
//!
//! Provides:
//! - Colored console output
//! - Progress bars and the live coordinator spinner
//! - Statistics reporting

pub mod console;
pub mod progress;
pub mod stats;

pub use console::{
    channel_label, print_banner, print_config_summary, print_error, print_info, print_success,
    print_warning,
};
pub use progress::{create_download_bar, create_spinner, describe_snapshot, ProgressMonitor};
pub use stats::{
    print_channel_reports, print_cleanup_report, print_run_report, print_tracker_stats,
};
