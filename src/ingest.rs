use serde::Serialize;
use std::path::Path;
use tempfile::TempPath;
use thiserror::Error;

use crate::classify::{classify_sheet_name, SheetClass};
use crate::config::IngestConfig;
use crate::normalize::normalize_sheet;
use crate::record::ResultRecord;
use crate::store::{ResultStore, StoreError};
use crate::workbook::{self, DecodeError, Workbook};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(
        "No valid data found. Please ensure the Excel follows the template \
         (Data starts from row {header_row} with headers: SL, Name, Reg, Mark)."
    )]
    NoValidData { header_row: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub count: usize,
    pub sheets_processed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CollectedRecords {
    pub records: Vec<ResultRecord>,
    pub sheets_processed: usize,
}

/// Classifies and normalizes every sheet. Sheets are independent: an
/// unrecognised name tags rows "Unknown" instead of failing the workbook.
pub fn collect_records(wb: &Workbook, cfg: &IngestConfig) -> CollectedRecords {
    let mut out = CollectedRecords::default();
    for sheet in &wb.sheets {
        let class = classify_sheet_name(&sheet.name);
        if class == SheetClass::Unmatched {
            log::warn!(
                "sheet '{}' has no class/batch tag; rows will be stored as Unknown",
                sheet.name
            );
        }
        let (class_name, batch) = class.tags();

        let rows = normalize_sheet(&sheet.rows, sheet.first_row, cfg.header_row);
        log::debug!(
            "sheet '{}': class={} batch={} rows={} accepted={} rejected={}",
            sheet.name,
            class_name,
            batch,
            rows.data_rows,
            rows.drafts.len(),
            rows.rejected
        );
        if rows.data_rows == 0 {
            continue;
        }
        if !rows.headers_recognized {
            log::warn!(
                "sheet '{}': no Reg/Name headers on row {}",
                sheet.name,
                cfg.header_row.saturating_add(1)
            );
        }
        out.sheets_processed += 1;

        for draft in rows.drafts {
            out.records.push(ResultRecord::new(
                draft.registration_number,
                draft.student_name,
                class_name,
                batch,
                cfg.default_subject.as_str(),
                draft.marks,
                cfg.default_exam_date.as_str(),
            ));
        }
    }
    out
}

pub fn ingest_workbook(
    store: &mut ResultStore,
    wb: &Workbook,
    cfg: &IngestConfig,
) -> Result<IngestSummary, IngestError> {
    let collected = collect_records(wb, cfg);
    if collected.records.is_empty() {
        return Err(IngestError::NoValidData {
            header_row: cfg.header_row.saturating_add(1),
        });
    }

    let count = store.upsert_batch(&collected.records)?;
    log::info!(
        "ingested {} result rows from {} sheet(s) ({})",
        count,
        collected.sheets_processed,
        wb.format.as_str()
    );
    Ok(IngestSummary {
        count,
        sheets_processed: collected.sheets_processed,
    })
}

/// Ingests an uploaded file and removes it afterwards, whatever the outcome.
pub fn ingest_upload(
    store: &mut ResultStore,
    upload: &Path,
    cfg: &IngestConfig,
) -> Result<IngestSummary, IngestError> {
    let upload = TempPath::try_from_path(upload).map_err(DecodeError::Io)?;
    let decoded = workbook::read_workbook(&upload);
    if let Err(e) = upload.close() {
        log::warn!("failed to remove upload: {}", e);
    }
    let wb = decoded?;
    ingest_workbook(store, &wb, cfg)
}
