//! Operator-facing summaries printed after each command.

use colored::*;
use portalflow::{BackupRecord, FullBackupSummary, RetentionReport, ScheduledJob, TaskResult};
use std::collections::BTreeMap;
use std::fmt::Display;

fn rule() {
    println!("{}", "═".repeat(60));
}

fn thin_rule() {
    println!("{}", "─".repeat(60));
}

fn status(success: bool) -> ColoredString {
    if success {
        "✅ SUCCESS".green().bold()
    } else {
        "❌ FAILURE".red().bold()
    }
}

/// One pipeline run: status line, artifacts, error and screenshot.
pub fn task(title: &str, result: &TaskResult) {
    println!();
    rule();
    println!("{}: {}", status(result.success), title);
    for artifact in &result.artifacts {
        println!("   • {}", artifact.display());
    }
    if let Some(error) = &result.error {
        println!("   {} {}", "error:".red(), error);
    }
    if let Some(screenshot) = &result.diagnostic {
        println!("   {} {}", "screenshot:".yellow(), screenshot.display());
    }
    rule();
}

/// Several runs keyed by file or report kind.
pub fn task_map<K: Display>(title: &str, results: &BTreeMap<K, TaskResult>) {
    let succeeded = results.values().filter(|r| r.success).count();
    println!();
    rule();
    println!(
        "{}: {} ({}/{} succeeded)",
        status(succeeded == results.len() && !results.is_empty()),
        title,
        succeeded,
        results.len()
    );
    thin_rule();
    for (key, result) in results {
        let mark = if result.success {
            "✔".green()
        } else {
            "✘".red()
        };
        println!("   {mark} {key}");
        if let Some(error) = &result.error {
            println!("      {}", error.dimmed());
        }
    }
    rule();
}

pub fn full_backup(summary: &FullBackupSummary) {
    println!();
    rule();
    println!("{}: full backup", status(summary.success));
    println!("   • Folder: {}", summary.folder.display());
    println!("   • Range: {}", summary.manifest.range);
    println!("   • Claims: {}", summary.manifest.claims);
    println!("   • Reports: {}", summary.manifest.reports);
    match &summary.manifest_path {
        Some(path) => println!("   • Manifest: {}", path.display()),
        None => println!("   • Manifest: {}", "not written".red()),
    }
    rule();
}

pub fn backups(records: &[BackupRecord]) {
    if records.is_empty() {
        println!("No backups found.");
        return;
    }
    println!("{}", format!("{} backup(s), newest first", records.len()).bold());
    thin_rule();
    for record in records {
        println!(
            "{}  {}",
            record.created.format("%Y-%m-%d %H:%M:%S").to_string().cyan(),
            record.name
        );
        if let Some(manifest) = &record.manifest {
            println!(
                "      range {} | claims {} | reports {}",
                manifest.range, manifest.claims, manifest.reports
            );
        }
    }
}

pub fn retention(report: &RetentionReport, keep_days: u32) {
    println!(
        "{} {} folder(s) older than {} days removed",
        status(report.failures.is_empty()),
        report.deleted.len(),
        keep_days
    );
    for path in &report.deleted {
        println!("   - {}", path.display());
    }
    for path in &report.skipped_active {
        println!("   {} {} (in use)", "skipped".yellow(), path.display());
    }
    for failure in &report.failures {
        println!("   {} {}", "failed".red(), failure);
    }
}

pub fn jobs(jobs: &[ScheduledJob]) {
    println!("{}", format!("{} scheduled job(s)", jobs.len()).bold());
    for job in jobs {
        println!("   [{}] {}", job.id, job);
    }
}
