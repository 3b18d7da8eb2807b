//! Console output utilities.

use std::path::Path;

use console::style;

use crate::download::CoordinatorSettings;
use crate::media::ChannelId;

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", style("INFO").cyan().bold(), message);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", style("OK").green().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", style("WARN").yellow().bold(), message);
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("ERROR").red().bold(), message);
}

/// Print the application banner.
pub fn print_banner() {
    let banner = format!(
        r#"
╔═══════════════════════════════════════════════════════╗
║     channel-fetch {:<36}║
║     Resumable media fetching for channels             ║
╚═══════════════════════════════════════════════════════╝
"#,
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style(banner).cyan());
}

/// Print configuration summary.
///
/// Each channel comes with the title the manifest gave it, if any.
pub fn print_config_summary(
    channels: &[(ChannelId, Option<String>)],
    settings: &CoordinatorSettings,
    download_dir: &Path,
) {
    let channels: Vec<String> = channels
        .iter()
        .map(|(channel, title)| channel_label(channel, title.as_deref()))
        .collect();
    let rate = if settings.requests_per_second > 0.0 {
        format!(
            "{}/s (burst {})",
            settings.requests_per_second, settings.burst_size
        )
    } else {
        "unlimited".to_string()
    };

    println!();
    println!("{}", style("Configuration:").bold());
    println!("  Channels:  {}", channels.join(", "));
    println!("  Workers:   {}", settings.workers);
    println!("  Rate:      {}", rate);
    println!("  Retries:   {}", settings.retry.max_retries);
    println!("  Directory: {}", download_dir.display());
    println!();
}

/// `jazz (Jazz Archive)`, or the bare identity when there is no title.
pub fn channel_label(channel: &ChannelId, title: Option<&str>) -> String {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("{} ({})", channel, title),
        None => channel.to_string(),
    }
}
