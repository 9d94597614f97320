use calamine::{open_workbook_from_rs, Data, Ods, Range, Reader, Xls, Xlsb, Xlsx};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Name given to the only sheet of a CSV upload.
pub const CSV_SHEET_NAME: &str = "Sheet1";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("file is empty")]
    Empty,
    #[error("not a recognizable spreadsheet ({0})")]
    Unrecognized(&'static str),
    #[error("invalid {format} workbook: {message}")]
    Workbook {
        format: &'static str,
        message: String,
    },
    #[error("invalid csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xlsx,
    Xlsb,
    Xls,
    Ods,
    Csv,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Xlsx => "xlsx",
            Format::Xlsb => "xlsb",
            Format::Xls => "xls",
            Format::Ods => "ods",
            Format::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }
}

/// The used range of a named sheet. `rows[i]` is worksheet row
/// `first_row + i` (0-based); columns count from the first used column.
/// Rows may be shorter than the widest row.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub first_row: usize,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub format: Format,
    pub sheets: Vec<Sheet>,
}

pub fn read_workbook(path: &Path) -> Result<Workbook, DecodeError> {
    let bytes = std::fs::read(path)?;
    decode_workbook(bytes)
}

/// Detects the container from the leading bytes and decodes every sheet.
pub fn decode_workbook(bytes: Vec<u8>) -> Result<Workbook, DecodeError> {
    let format = detect_format(&bytes)?;
    let sheets = match format {
        Format::Csv => vec![decode_csv(&bytes)?],
        Format::Xlsx => decode_sheets::<Xlsx<Source>>(format, bytes)?,
        Format::Xlsb => decode_sheets::<Xlsb<Source>>(format, bytes)?,
        Format::Xls => decode_sheets::<Xls<Source>>(format, bytes)?,
        Format::Ods => decode_sheets::<Ods<Source>>(format, bytes)?,
    };
    Ok(Workbook { format, sheets })
}

pub fn detect_format(bytes: &[u8]) -> Result<Format, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.starts_with(&OLE_SIGNATURE) {
        return Ok(Format::Xls);
    }
    if bytes.starts_with(&ZIP_SIGNATURE) {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|_| DecodeError::Unrecognized("corrupt zip container"))?;
        let mut format = None;
        for name in archive.file_names() {
            match name {
                "xl/workbook.xml" => format = Some(Format::Xlsx),
                "xl/workbook.bin" => format = Some(Format::Xlsb),
                "content.xml" if format.is_none() => format = Some(Format::Ods),
                _ => {}
            }
        }
        return format.ok_or(DecodeError::Unrecognized(
            "zip archive without a workbook part",
        ));
    }
    let text = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if text.contains(&0) || std::str::from_utf8(text).is_err() {
        return Err(DecodeError::Unrecognized("binary content"));
    }
    Ok(Format::Csv)
}

type Source = Cursor<Vec<u8>>;

fn decode_sheets<R>(format: Format, bytes: Vec<u8>) -> Result<Vec<Sheet>, DecodeError>
where
    R: Reader<Source>,
    R::Error: std::fmt::Display,
{
    let invalid = |e: R::Error| DecodeError::Workbook {
        format: format.as_str(),
        message: e.to_string(),
    };
    let mut workbook: R = open_workbook_from_rs(Cursor::new(bytes)).map_err(invalid)?;
    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name).map_err(invalid)?;
        let first_row = range.start().map_or(0, |(r, _)| r as usize);
        sheets.push(Sheet {
            rows: range_to_rows(&range),
            first_row,
            name,
        });
    }
    Ok(sheets)
}

/// Never pads outside the used range: memory stays proportional to what
/// calamine already holds, however far from A1 the cells sit.
fn range_to_rows(range: &Range<Data>) -> Vec<Vec<Cell>> {
    range
        .rows()
        .map(|row| row.iter().map(data_to_cell).collect())
        .collect()
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

/// Blank lines are skipped by the csv reader, so each record is placed by its
/// starting line number to keep the header-row offset meaningful.
fn decode_csv(bytes: &[u8]) -> Result<Sheet, DecodeError> {
    let text = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text);

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut width = 0;
    // Extra physical lines consumed by quoted fields containing newlines.
    let mut folded_lines: usize = 0;
    for record in reader.records() {
        let record = record?;
        if let Some(pos) = record.position() {
            let index = (pos.line() as usize)
                .saturating_sub(1)
                .saturating_sub(folded_lines);
            while rows.len() < index {
                rows.push(Vec::new());
            }
        }
        let row: Vec<Cell> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        folded_lines += record.iter().map(|f| f.matches('\n').count()).sum::<usize>();
        width = width.max(row.len());
        rows.push(row);
    }
    for row in &mut rows {
        row.resize(width, Cell::Empty);
    }

    Ok(Sheet {
        name: CSV_SHEET_NAME.to_string(),
        first_row: 0,
        rows,
    })
}
