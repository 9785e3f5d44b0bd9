//! Output files written at the end of a run.

use chrono::{Local, TimeZone};
use cnpjfinder::company::{Cnpj, CollectedRecord, RegistryRecord, NOT_FOUND};
use cnpjfinder::export::{export_records, output_filename, OutputFormat};
use std::fs;
use tempfile::TempDir;

fn sample_records() -> Vec<CollectedRecord> {
    vec![
        CollectedRecord::new(
            "Padaria Central".to_string(),
            Some("(35) 3291-1234".to_string()),
            Cnpj::parse("11222333000181").unwrap(),
            RegistryRecord {
                ownership: "MARIA APARECIDA SILVA - Sócio-Administrador".to_string(),
                tax_regime: "Simples Nacional".to_string(),
                status: "ATIVA".to_string(),
                regime_effective_date: "2015-01-01".to_string(),
            },
        ),
        CollectedRecord::new(
            "Metalúrgica Sul, Mineira".to_string(),
            None,
            Cnpj::parse("11444777000161").unwrap(),
            RegistryRecord {
                ownership: NOT_FOUND.to_string(),
                tax_regime: "LUCRO PRESUMIDO".to_string(),
                status: "ATIVA".to_string(),
                regime_effective_date: "2020".to_string(),
            },
        ),
    ]
}

#[test]
fn test_xlsx_export_writes_workbook() {
    let tmp = TempDir::new().unwrap();
    let ts = Local.with_ymd_and_hms(2024, 5, 20, 14, 30, 0).unwrap();
    let filename = output_filename("Alfenas", "indústria", OutputFormat::Xlsx, ts);

    let path = export_records(&sample_records(), tmp.path(), &filename, OutputFormat::Xlsx).unwrap();

    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        "empresas_coletadas_Alfenas_indústria_2024-05-20_14-30-00.xlsx"
    );
    let bytes = fs::read(&path).unwrap();
    // xlsx files are zip archives
    assert!(bytes.starts_with(b"PK"));
}

#[test]
fn test_xlsx_export_with_no_records() {
    let tmp = TempDir::new().unwrap();
    let path = export_records(&[], tmp.path(), "empty.xlsx", OutputFormat::Xlsx).unwrap();
    assert!(path.exists());
}

#[test]
fn test_csv_export_columns_and_rows() {
    let tmp = TempDir::new().unwrap();
    let path = export_records(&sample_records(), tmp.path(), "out.csv", OutputFormat::Csv).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        headers,
        vec!["Name", "Phone", "Tax ID", "Ownership", "Tax Regime", "Regime Effective Date", "Status"]
    );

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][2], "11222333000181");
    assert_eq!(&rows[1][0], "Metalúrgica Sul, Mineira");
    assert_eq!(&rows[1][1], NOT_FOUND);
}

#[test]
fn test_export_creates_missing_output_directory() {
    let tmp = TempDir::new().unwrap();
    let nested = tmp.path().join("resultados").join("2024");

    let path = export_records(&sample_records(), &nested, "out.json", OutputFormat::Json).unwrap();

    assert!(path.starts_with(&nested));
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["summary"]["total_records"], 2);
    assert_eq!(value["records"][0]["name"], "Padaria Central");
}
