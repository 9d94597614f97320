use crate::workbook::Cell;

/// Rows above this index are template banner rows; this row holds the headers.
pub const HEADER_ROW: usize = 4;

const REGISTRATION_HEADERS: [&str; 4] = ["Reg", "Registration", "Registration No", "ID"];
const NAME_HEADERS: [&str; 3] = ["Name", "Student Name", "Full Name"];
const MARK_HEADERS: [&str; 3] = ["Mark", "Marks", "Score"];

/// A data row that passed normalization, before class/batch tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDraft {
    pub registration_number: String,
    pub student_name: String,
    pub marks: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRows {
    pub drafts: Vec<RowDraft>,
    /// Non-blank rows below the header row.
    pub data_rows: usize,
    pub rejected: usize,
    pub headers_recognized: bool,
}

/// Column indices per canonical field, in alias priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    pub registration: Vec<usize>,
    pub name: Vec<usize>,
    pub mark: Vec<usize>,
}

impl HeaderMap {
    pub fn from_header_row(row: &[Cell]) -> Self {
        let keys: Vec<Option<String>> = row
            .iter()
            .map(|c| cell_text(c).map(|t| header_key(&t)))
            .collect();
        HeaderMap {
            registration: columns_for(&keys, &REGISTRATION_HEADERS),
            name: columns_for(&keys, &NAME_HEADERS),
            mark: columns_for(&keys, &MARK_HEADERS),
        }
    }

    /// Both identifying columns are present.
    pub fn is_usable(&self) -> bool {
        !self.registration.is_empty() && !self.name.is_empty()
    }
}

fn columns_for(keys: &[Option<String>], aliases: &[&str]) -> Vec<usize> {
    let mut out = Vec::new();
    for alias in aliases {
        let want = header_key(alias);
        if let Some(idx) = keys.iter().position(|k| k.as_deref() == Some(want.as_str())) {
            out.push(idx);
        }
    }
    out
}

/// Lower-cases and keeps only alphanumerics: "Registration No." -> "registrationno".
pub fn header_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Trimmed text of a cell; `None` when blank. Whole numbers render without ".0".
pub fn cell_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Empty => None,
        Cell::Text(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Cell::Number(n) => Some(format_number(*n)),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Numeric mark of a cell. Text is read by its leading numeric prefix
/// (sign, digits, fraction, exponent);
/// anything unparseable, negative or non-finite becomes 0.
pub fn coerce_marks(cell: &Cell) -> f64 {
    let v = match cell {
        Cell::Number(n) => *n,
        Cell::Text(s) => leading_number(s).unwrap_or(0.0),
        Cell::Empty => 0.0,
    };
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

fn leading_number(s: &str) -> Option<f64> {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start || has_digits {
            has_digits = has_digits || frac_end > frac_start;
            end = frac_end;
        }
    }
    if !has_digits {
        return None;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    t[..end].parse::<f64>().ok()
}

fn first_non_blank<'a>(row: &'a [Cell], columns: &[usize]) -> Option<&'a Cell> {
    columns
        .iter()
        .filter_map(|&c| row.get(c))
        .find(|cell| !cell.is_blank())
}

/// Normalizes one data row. Returns `None` when registration number or name
/// is missing.
pub fn normalize_row(headers: &HeaderMap, row: &[Cell]) -> Option<RowDraft> {
    let registration_number = first_non_blank(row, &headers.registration).and_then(cell_text)?;
    let student_name = first_non_blank(row, &headers.name).and_then(cell_text)?;
    let marks = first_non_blank(row, &headers.mark)
        .map(coerce_marks)
        .unwrap_or(0.0);
    Some(RowDraft {
        registration_number,
        student_name,
        marks,
    })
}

/// Reads the header on worksheet row `header_row` and normalizes every row
/// below it. `rows[0]` is worksheet row `first_row`; a header row above the
/// used range is blank.
pub fn normalize_sheet(rows: &[Vec<Cell>], first_row: usize, header_row: usize) -> SheetRows {
    if header_row >= first_row.saturating_add(rows.len()) {
        return SheetRows::default();
    }
    let header = header_row
        .checked_sub(first_row)
        .and_then(|i| rows.get(i))
        .map_or(&[][..], Vec::as_slice);
    let headers = HeaderMap::from_header_row(header);

    let mut out = SheetRows {
        headers_recognized: headers.is_usable(),
        ..SheetRows::default()
    };
    let data_start = header_row.saturating_add(1).saturating_sub(first_row);
    for row in rows.iter().skip(data_start) {
        if row.iter().all(Cell::is_blank) {
            continue;
        }
        out.data_rows += 1;
        match normalize_row(&headers, row) {
            Some(draft) => out.drafts.push(draft),
            None => out.rejected += 1,
        }
    }
    out
}
