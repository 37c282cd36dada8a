//! Artifacts of the offline batch step: CSV tables and an xlsx workbook.

use crate::models::{DetailRecord, MunicipalityAggregate};
use anyhow::{Context, Result};
use csv::Writer;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

pub const MUNICIPALITIES_FILE: &str = "municipalities.csv";
pub const DETAILS_FILE: &str = "RobinHood_Data.csv";
pub const WORKBOOK_FILE: &str = "RobinHood_Data.xlsx";

const MUNICIPALITY_HEADERS: [&str; 6] = ["CITY_KEY", "NUM_BENI", "NUM_SERVIZI", "SCORE", "lat", "lon"];

const DETAIL_HEADERS: [&str; 9] = [
    "Comune",
    "Indirizzo",
    "Tipologia",
    "Categoria catastale",
    "Metri quadri/Consistenza",
    "Finalità",
    "Destinatario",
    "ROBIN_HOOD_SCORE",
    "NUM_SERVIZI",
];

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Text columns of a detail row, in `DETAIL_HEADERS` order.
fn detail_text(detail: &DetailRecord) -> [&str; 7] {
    let property = &detail.property;
    [
        property.municipality.as_str(),
        property.address.as_str(),
        property.property_type.as_str(),
        property.cadastral_category.as_str(),
        property.size_raw.as_str(),
        property.purpose.as_deref().unwrap_or(""),
        property.recipient.as_deref().unwrap_or(""),
    ]
}

/// `CITY_KEY, NUM_BENI, NUM_SERVIZI, SCORE, lat, lon`; unresolved coordinates stay blank.
pub fn write_municipalities_csv(municipalities: &[MunicipalityAggregate], output_dir: &Path) -> Result<()> {
    let csv_path = output_dir.join(MUNICIPALITIES_FILE);
    let mut writer = Writer::from_path(&csv_path)
        .with_context(|| format!("Failed to create {}", csv_path.display()))?;

    writer.write_record(MUNICIPALITY_HEADERS)?;

    for municipality in municipalities {
        writer.write_record([
            municipality.city_key.clone(),
            municipality.num_beni.to_string(),
            municipality.num_servizi.to_string(),
            format!("{:.1}", municipality.score),
            optional_number(municipality.coordinates.map(|c| c.lat)),
            optional_number(municipality.coordinates.map(|c| c.lon)),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_details_csv(details: &[DetailRecord], output_dir: &Path) -> Result<()> {
    let csv_path = output_dir.join(DETAILS_FILE);
    let mut writer = Writer::from_path(&csv_path)
        .with_context(|| format!("Failed to create {}", csv_path.display()))?;

    writer.write_record(DETAIL_HEADERS)?;

    for detail in details {
        let score = format!("{:.1}", detail.score);
        let num_servizi = detail.num_servizi.to_string();
        let mut record = detail_text(detail).to_vec();
        record.push(score.as_str());
        record.push(num_servizi.as_str());
        writer.write_record(record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Spreadsheet artifact: the detail view on the first sheet, the ranked
/// municipalities on a second one. Scores and counts are written as numbers.
pub fn write_workbook(details: &[DetailRecord], municipalities: &[MunicipalityAggregate], output_dir: &Path) -> Result<()> {
    let xlsx_path = output_dir.join(WORKBOOK_FILE);
    let header_format = Format::new().set_bold();
    let mut workbook = Workbook::new();

    // Detail sheet first, so loading the workbook reads it
    let sheet = workbook.add_worksheet().set_name("Dettaglio")?;
    write_header_row(sheet, &DETAIL_HEADERS, &header_format)?;
    for (i, detail) in details.iter().enumerate() {
        let row = i as u32 + 1;
        for (col, value) in detail_text(detail).iter().enumerate() {
            sheet.write_string(row, col as u16, *value)?;
        }
        sheet.write_number(row, 7, detail.score)?;
        sheet.write_number(row, 8, f64::from(detail.num_servizi))?;
    }

    let sheet = workbook.add_worksheet().set_name("Comuni")?;
    write_header_row(sheet, &MUNICIPALITY_HEADERS, &header_format)?;
    for (i, municipality) in municipalities.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, municipality.city_key.as_str())?;
        sheet.write_number(row, 1, f64::from(municipality.num_beni))?;
        sheet.write_number(row, 2, f64::from(municipality.num_servizi))?;
        sheet.write_number(row, 3, municipality.score)?;
        // Unresolved coordinates stay blank, as in the CSV
        if let Some(coordinates) = municipality.coordinates {
            sheet.write_number(row, 4, coordinates.lat)?;
            sheet.write_number(row, 5, coordinates.lon)?;
        }
    }

    workbook
        .save(&xlsx_path)
        .with_context(|| format!("Failed to save {}", xlsx_path.display()))?;
    Ok(())
}

fn write_header_row(sheet: &mut Worksheet, headers: &[&str], format: &Format) -> Result<()> {
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, format)?;
    }
    sheet.set_freeze_panes(1, 0)?;
    Ok(())
}
