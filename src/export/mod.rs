//! CSV and spreadsheet export of scraped records.
//!
//! Every export writes the same columns, in [`COLUMNS`] order, to both a
//! `.csv` (UTF-8 with BOM so spreadsheet apps pick up the accents) and a
//! single-sheet `.xlsx`. [`merge_workbooks`] later folds several exported
//! workbooks into one, a sheet per source.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use calamine::{Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::info;

use crate::models::{COLUMNS, DoctorRecord};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Sheet name used by single-site exports.
pub const SHEET_NAME: &str = "doctors";

/// Files written by [`export_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub xlsx: PathBuf,
}

/// Rows copied into each sheet by [`merge_workbooks`], header excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub path: PathBuf,
    pub sheets: Vec<(String, usize)>,
}

/// Write `records` to `<dir>/<basename>.csv` and `<dir>/<basename>.xlsx`,
/// creating `dir` if needed.
pub fn export_records(records: &[DoctorRecord], dir: &Path, basename: &str) -> Result<ExportPaths> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let paths = ExportPaths {
        csv: dir.join(format!("{basename}.csv")),
        xlsx: dir.join(format!("{basename}.xlsx")),
    };

    write_csv(records, &paths.csv)?;
    write_xlsx(records, &paths.xlsx)?;

    info!(
        "Saved {} records to {} and {}",
        records.len(),
        paths.csv.display(),
        paths.xlsx.display()
    );
    Ok(paths)
}

pub fn write_csv(records: &[DoctorRecord], path: &Path) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.write_record(record.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_xlsx(records: &[DoctorRecord], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    write_sheet(sheet, record_rows(records))?;

    workbook
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn record_rows(records: &[DoctorRecord]) -> impl Iterator<Item = Vec<String>> + '_ {
    records
        .iter()
        .map(|r| r.to_row().iter().map(|c| (*c).to_string()).collect())
}

/// Header row in bold, then `rows`; empty cells are left blank.
fn write_sheet(sheet: &mut Worksheet, rows: impl IntoIterator<Item = Vec<String>>) -> Result<()> {
    let bold = Format::new().set_bold();
    for (col, header) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, u16::try_from(col)?, *header, &bold)?;
    }

    for (i, row) in rows.into_iter().enumerate() {
        let row_num = u32::try_from(i + 1)?;
        for (col, value) in row.into_iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(row_num, u16::try_from(col)?, value)?;
            }
        }
    }
    Ok(())
}

/// Read records back from a CSV written by [`write_csv`].
#[cfg(test)]
fn read_csv(path: &Path) -> Result<Vec<DoctorRecord>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut reader = csv::Reader::from_reader(body);
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let cells: Vec<&str> = row.iter().collect();
        records.push(DoctorRecord::from_row(&cells));
    }
    Ok(records)
}

/// Read records back from the first sheet of a workbook written by [`write_xlsx`].
pub fn read_xlsx(path: &Path) -> Result<Vec<DoctorRecord>> {
    let rows = read_first_sheet(path)?;
    Ok(rows
        .iter()
        .skip(1)
        .map(|row| DoctorRecord::from_row(row))
        .collect())
}

/// Sheet names of a workbook, in order.
#[cfg(test)]
fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook: Xlsx<_> =
        open_workbook(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(workbook.sheet_names())
}

/// Records of the named sheet.
#[cfg(test)]
fn read_sheet(path: &Path, sheet: &str) -> Result<Vec<DoctorRecord>> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let range = workbook.worksheet_range(sheet)?;
    Ok(range
        .rows()
        .skip(1)
        .map(|row| {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            DoctorRecord::from_row(&cells)
        })
        .collect())
}

fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("{} has no sheets", path.display()))??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect())
}

/// Combine previously exported workbooks into `out`, one named sheet per source.
///
/// The records on the first sheet of each source are copied under a fresh
/// header in [`COLUMNS`] order.
pub fn merge_workbooks(sources: &[(String, PathBuf)], out: &Path) -> Result<MergeSummary> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut workbook = Workbook::new();
    let mut sheets = Vec::with_capacity(sources.len());

    for (name, path) in sources {
        let records = read_xlsx(path)?;
        let count = records.len();

        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_sheet(sheet, record_rows(&records))?;

        info!("Merged {} rows from {} into sheet '{}'", count, path.display(), name);
        sheets.push((name.clone(), count));
    }

    workbook
        .save(out)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    Ok(MergeSummary {
        path: out.to_path_buf(),
        sheets,
    })
}
