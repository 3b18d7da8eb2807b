//! Statistics reporting.

use console::style;
use indicatif::{HumanBytes, HumanDuration};

use crate::download::{ChannelReport, RunReport};
use crate::tracker::{ChannelStats, FanOutReport};

/// Print what the producer did for each channel.
pub fn print_channel_reports(reports: &[ChannelReport]) {
    for report in reports {
        let name = report
            .channel
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        println!();
        println!("{}", style(format!("Channel {}:", name)).bold());
        println!("  Found:             {}", report.found);
        println!("  Queued:            {}", report.queued);
        println!("  Already processed: {}", report.already_processed);
        if report.malformed > 0 {
            println!("  Malformed:         {}", style(report.malformed).red());
        }
        if report.deferred > 0 {
            println!(
                "  Deferred:          {} (per-run limit)",
                style(report.deferred).yellow()
            );
        }
    }
}

/// Print the final statistics of a download session.
pub fn print_run_report(report: &RunReport) {
    let c = &report.counters;

    println!();
    println!("{}", style("═".repeat(50)).dim());
    println!("{}", style("Run Statistics:").bold());
    println!("  Attempted:   {}", c.attempted);
    println!("  Downloaded:  {}", style(c.succeeded).green());
    println!(
        "  Skipped:     {} (duplicates)",
        style(c.skipped_duplicate).yellow()
    );
    if c.failed > 0 {
        println!("  Failed:      {}", style(c.failed).red());
    }
    if c.cancelled > 0 {
        println!("  Cancelled:   {}", c.cancelled);
    }
    println!("  Retries:     {}", c.retries);
    println!("  Transferred: {}", HumanBytes(c.bytes_transferred));
    println!("  Elapsed:     {}", HumanDuration(report.elapsed));
    println!("  Success:     {:.1}%", report.success_rate());

    if report.has_failures() {
        println!();
        println!("{}", style("Failures:").red().bold());
        for failure in &report.failures {
            let retries = report.retries_for(&failure.channel, failure.sequence);
            println!(
                "  {}#{} [{}] {}{}",
                failure.channel,
                failure.sequence,
                failure.kind,
                failure.message,
                if retries > 0 {
                    format!(" (after {} retries)", retries)
                } else {
                    String::new()
                }
            );
        }
    }
    println!("{}", style("═".repeat(50)).dim());
}

/// Print tracker statistics for each channel.
pub fn print_tracker_stats(stats: &[ChannelStats]) {
    if stats.is_empty() {
        println!("No tracked channels found.");
        return;
    }

    for channel in stats {
        let m = &channel.messages;
        let f = &channel.files;

        println!();
        println!("{}", style(format!("Channel {}:", m.channel)).bold());
        println!(
            "  Messages processed: {} (last: {})",
            m.total_messages_processed,
            m.last_processed_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string())
        );
        println!(
            "  Files tracked:      {} ({})",
            f.total_files_tracked,
            HumanBytes(f.total_size_bytes)
        );
        println!("  Blacklisted:        {}", f.blacklisted_count);
        println!(
            "  Message tracker:    {}",
            tracker_path_line(&m.tracker_file_path, m.tracker_file_exists)
        );
        println!(
            "  File tracker:       {}",
            tracker_path_line(&f.tracker_file_path, f.tracker_file_exists)
        );
    }
}

fn tracker_path_line(path: &std::path::Path, exists: bool) -> String {
    if exists {
        path.display().to_string()
    } else {
        format!("{} {}", path.display(), style("(not written yet)").dim())
    }
}

/// Print per-channel results of a tracker cleanup.
pub fn print_cleanup_report(report: &FanOutReport<usize>) {
    println!();
    println!("{}", style("Cleanup:").bold());
    for (channel, removed) in &report.succeeded {
        println!("  {}: {} stale record(s) removed", channel, removed);
    }
    for (channel, error) in &report.failed {
        println!("  {}: {}", channel, style(error).red());
    }
}
