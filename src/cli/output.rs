// Output formatting and display for CLI

use crate::logs::LogLine;
use crate::provider::Timetoken;
use chrono::{DateTime, Local, TimeZone};
use colored::*;

/// Print a single log line to stdout
pub fn print_line(line: &LogLine) {
    println!("{}", format_line(line));
}

/// Print log lines to stdout, oldest first
pub fn print_lines(lines: &[LogLine]) {
    if lines.is_empty() {
        println!("{}", "No log lines found".yellow());
        return;
    }

    for line in lines {
        print_line(line);
    }
}

pub fn print_clear_marker() {
    println!("{}", "--- logs cleared ---".dimmed());
}

/// Print a subscription warning to stderr
pub fn print_warning(category: &str) {
    eprintln!("{} {}", "⚠ Warning:".yellow().bold(), category);
}

pub fn print_cleared(timetoken: Timetoken) {
    println!("{}", "✓ Logs cleared".green().bold());
    println!("  {}: {}", "Timetoken".bold(), timetoken);
    if let Some(at) = timetoken_to_local(timetoken) {
        println!("  {}: {}", "At".bold(), at.format("%Y-%m-%d %H:%M:%S"));
    }
}

pub fn print_last_clear(timetoken: Timetoken) {
    if timetoken == 0 {
        println!("{}", "Logs have never been cleared".yellow());
        return;
    }

    println!("  {}: {}", "Timetoken".bold(), timetoken);
    if let Some(at) = timetoken_to_local(timetoken) {
        println!("  {}: {}", "At".bold(), at.format("%Y-%m-%d %H:%M:%S"));
    }
}

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

fn format_line(line: &LogLine) -> String {
    let timestamp = line
        .timestamp
        .and_then(|ms| Local.timestamp_millis_opt(ms).single())
        .map(|at| at.format("%Y-%m-%d %H:%M:%S%.3f").to_string());

    let message = if line.is_system {
        line.message.cyan().to_string()
    } else {
        line.message.clone()
    };

    match timestamp {
        Some(ts) => format!("{} {}", ts.dimmed(), message),
        None => message,
    }
}

/// Timetokens count 100ns units since the epoch
fn timetoken_to_local(timetoken: Timetoken) -> Option<DateTime<Local>> {
    let millis = i64::try_from(timetoken / 10_000).ok()?;
    Local.timestamp_millis_opt(millis).single()
}
