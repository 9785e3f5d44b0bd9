use crate::collector::CollectionOutcome;
use crate::company::CollectedRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use csv::Writer;
use rust_xlsxwriter::{Format, Workbook};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Spreadsheet is the primary output; CSV and JSON are for piping into other tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Xlsx,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xlsx" => Ok(OutputFormat::Xlsx),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// `empresas_coletadas_{city}_{category}_{yyyy-mm-dd_HH-MM-SS}.{ext}`
pub fn output_filename(city: &str, category: &str, format: OutputFormat, timestamp: DateTime<Local>) -> String {
    let clean = |s: &str| s.trim().replace(['/', '\\'], "-");
    format!(
        "empresas_coletadas_{}_{}_{}.{}",
        clean(city),
        clean(category),
        timestamp.format("%Y-%m-%d_%H-%M-%S"),
        format.extension()
    )
}

/// Write `records` into `output_dir` in the chosen format and return the file path
pub fn export_records(
    records: &[CollectedRecord],
    output_dir: &Path,
    filename: &str,
    format: OutputFormat,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    let path = output_dir.join(filename);

    match format {
        OutputFormat::Xlsx => export_xlsx(records, &path)?,
        OutputFormat::Csv => export_csv(records, &path)?,
        OutputFormat::Json => export_json(records, &path)?,
    }

    Ok(path)
}

pub fn export_xlsx(records: &[CollectedRecord], output_path: &Path) -> Result<()> {
    debug!("Exporting {} records to XLSX: {}", records.len(), output_path.display());

    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Empresas")?;

    for (col, header) in CollectedRecord::HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    for (row, record) in records.iter().enumerate() {
        for (col, value) in record.row().iter().enumerate() {
            worksheet.write_string(row as u32 + 1, col as u16, *value)?;
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();

    workbook
        .save(output_path)
        .with_context(|| format!("Failed to write spreadsheet {}", output_path.display()))?;

    info!("Successfully exported {} records to XLSX: {}", records.len(), output_path.display());
    Ok(())
}

pub fn export_csv(records: &[CollectedRecord], output_path: &Path) -> Result<()> {
    debug!("Exporting {} records to CSV: {}", records.len(), output_path.display());

    let file = File::create(output_path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(CollectedRecord::HEADERS)?;
    for record in records {
        wtr.write_record(record.row())?;
    }

    wtr.flush()?;
    info!("Successfully exported {} records to CSV: {}", records.len(), output_path.display());

    Ok(())
}

pub fn export_json(records: &[CollectedRecord], output_path: &Path) -> Result<()> {
    debug!("Exporting {} records to JSON: {}", records.len(), output_path.display());

    let mut by_regime: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        *by_regime.entry(record.tax_regime.clone()).or_insert(0) += 1;
    }

    let json_output = JsonExport {
        summary: ExportSummary {
            total_records: records.len(),
            by_tax_regime: by_regime,
        },
        records: records.to_vec(),
    };

    let json_string = serde_json::to_string_pretty(&json_output)?;
    let mut file = File::create(output_path)?;
    file.write_all(json_string.as_bytes())?;

    info!("Successfully exported {} records to JSON: {}", records.len(), output_path.display());

    Ok(())
}

#[derive(serde::Serialize)]
struct JsonExport {
    summary: ExportSummary,
    records: Vec<CollectedRecord>,
}

#[derive(serde::Serialize)]
struct ExportSummary {
    total_records: usize,
    by_tax_regime: BTreeMap<String, usize>,
}

/// Render the records as an aligned text table
pub fn format_results_table(records: &[CollectedRecord]) -> String {
    let mut widths: Vec<usize> = CollectedRecord::HEADERS.iter().map(|h| h.chars().count()).collect();
    for record in records {
        for (i, value) in record.row().iter().enumerate() {
            widths[i] = widths[i].max(value.chars().count());
        }
    }

    let render = |cells: &[&str]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(&CollectedRecord::HEADERS[..])];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for record in records {
        lines.push(render(&record.row()[..]));
    }
    lines.join("\n")
}

pub fn print_results_table(records: &[CollectedRecord]) {
    if records.is_empty() {
        println!("No companies matched the filters.");
        return;
    }
    println!("\n{}\n", format_results_table(records));
}

pub fn print_collection_summary(outcome: &CollectionOutcome) {
    let mut by_regime: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &outcome.records {
        *by_regime.entry(record.tax_regime.as_str()).or_insert(0) += 1;
    }

    println!("\n=== Results Summary ===");
    println!("Companies collected: {}", outcome.records.len());
    for (regime, count) in &by_regime {
        println!("  {}: {}", regime, count);
    }
    for (reason, count) in &outcome.stats.rejected_by_reason {
        println!("Skipped ({}): {}", reason, count);
    }
    if !outcome.is_complete() {
        println!("Stopped early: {}", outcome.stop_reason);
    }
    println!("=======================\n");
}
