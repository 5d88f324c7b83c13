use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::migrate::StageReport;
use crate::store::mapping::{MappingEntry, MappingStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

/// Top-level result of a `migrate` or `fetch` invocation.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub stages: Vec<StageReport>,
    pub imported_total: usize,
    pub mapping_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

pub fn print_run_report(report: &RunReport, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(report)?),
        Format::Pretty => {
            if report.dry_run {
                println!("{}", "dry run: nothing was created".yellow().bold());
            }
            for stage in &report.stages {
                print_stage_pretty(stage);
            }
            println!(
                "{} {} imported, {} mapping entries",
                "total:".bold(),
                report.imported_total.to_string().green(),
                report.mapping_entries
            );
            if let Some(ref path) = report.mapping_file {
                println!("  mapping: {path}");
            }
            if let Some(ref path) = report.log_file {
                println!("  log: {path}");
            }
        }
        Format::Minimal => {
            println!(
                "{:12} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}",
                "KIND", "SRC", "DST", "EXIST", "NOVEL", "DONE", "FAIL"
            );
            println!("{}", "-".repeat(60));
            for stage in &report.stages {
                println!(
                    "{:12} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}",
                    stage.kind.stem(),
                    stage.source_count,
                    stage.destination_count,
                    stage.existing,
                    stage.novel,
                    stage.imported,
                    stage.failed.len()
                );
            }
        }
    }
    Ok(())
}

fn print_stage_pretty(stage: &StageReport) {
    println!("[{}]", stage.kind.stem().cyan().bold());
    println!(
        "  source: {} | destination: {} | existing: {} | novel: {}",
        stage.source_count, stage.destination_count, stage.existing, stage.novel
    );
    if stage.in_use > 0 {
        println!("  skipped (used by source cases): {}", stage.in_use);
    }
    if !stage.dry_run {
        println!("  imported: {}", stage.imported.to_string().green());
    }
    if !stage.failed.is_empty() {
        println!("  {} {}", "failed:".red().bold(), stage.failed.len());
        for failure in &stage.failed {
            println!("    {}", failure.to_string().red());
        }
    }
    for path in &stage.exported {
        println!("  exported: {path}");
    }
}

pub fn print_mapping(entries: &[MappingEntry], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(entries)?),
        Format::Pretty => {
            for entry in entries {
                let status = match entry.status {
                    MappingStatus::Created => entry.status.to_string().green(),
                    MappingStatus::Existing => entry.status.to_string().yellow(),
                };
                println!(
                    "{} {} -> {} ({})",
                    entry.kind.stem().cyan(),
                    entry.source_id,
                    entry.destination_id,
                    status
                );
            }
        }
        Format::Minimal => {
            println!("{:12} {:>10} {:>10} STATUS", "KIND", "SOURCE", "DEST");
            println!("{}", "-".repeat(44));
            for entry in entries {
                println!(
                    "{:12} {:>10} {:>10} {}",
                    entry.kind.stem(),
                    entry.source_id,
                    entry.destination_id,
                    entry.status
                );
            }
        }
    }
    Ok(())
}
