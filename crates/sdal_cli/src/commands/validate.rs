//! Validate command implementation.

use sdal_core::{validate_image, ValidationReport};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Serializable view of a validation run.
#[derive(Debug, Serialize)]
struct ReportOutput {
    /// Whether the walk recorded no findings.
    clean: bool,
    /// Regions visited.
    regions: usize,
    /// Parcels visited.
    parcels: usize,
    /// Record frames decoded.
    records: u64,
    /// Every finding, in discovery order.
    findings: Vec<FindingOutput>,
}

#[derive(Debug, Serialize)]
struct FindingOutput {
    kind: String,
    context: String,
    message: String,
}

impl ReportOutput {
    fn from_report(report: &ValidationReport) -> Self {
        Self {
            clean: report.is_clean(),
            regions: report.stats.regions,
            parcels: report.stats.parcels,
            records: report.stats.records,
            findings: report
                .findings()
                .iter()
                .map(|f| FindingOutput {
                    kind: f.kind.to_string(),
                    context: f.context.clone(),
                    message: f.message.clone(),
                })
                .collect(),
        }
    }
}

/// Runs the validate command.
pub fn run(image_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let image = fs::read(image_path)?;
    let report = validate_image(&image);

    match format {
        "json" => {
            let output = ReportOutput::from_report(&report);
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print_text_output(image_path, &report),
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(format!("validation failed with {} findings", report.findings().len()).into())
    }
}

fn print_text_output(image_path: &Path, report: &ValidationReport) {
    println!("Validating image at {:?}", image_path);
    println!();
    println!(
        "  Visited: {} regions, {} parcels, {} records",
        report.stats.regions, report.stats.parcels, report.stats.records
    );

    for finding in report.findings() {
        println!("    ERROR: {finding}");
    }

    println!();
    if report.is_clean() {
        println!("✓ Image validation passed");
    } else {
        println!("✗ Image validation failed ({} findings)", report.findings().len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdal_core::{build_image, BuildConfig, BuildInput};
    use sdal_testkit::fixtures::three_road_region;

    #[test]
    fn clean_image_exits_successfully() {
        let mut input = BuildInput::new();
        input.push_region(three_road_region());
        let image = build_image(&input, &BuildConfig::new()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disc.iso");
        fs::write(&path, &image).unwrap();
        assert!(run(&path, "text").is_ok());
    }

    #[test]
    fn damaged_image_is_an_error() {
        let mut input = BuildInput::new();
        input.push_region(three_road_region());
        let mut image = build_image(&input, &BuildConfig::new()).unwrap();
        // Chop the final sector off the payload stream.
        image.truncate(image.len() - 2048);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disc.iso");
        fs::write(&path, &image).unwrap();
        assert!(run(&path, "json").is_err());
    }
}
