// 🏗️ EDC Parser - Semicolon export of the EDC portal into a CsvDocument
//
// Layout of the export:
//   Datum;Cas od;Cas do;IN-<EAN>-O;OUT-<EAN>-O;...;IN-<EAN>-D;OUT-<EAN>-D
//   01.05.2024;00:00;00:15;-0,12;-0,05;...;1,30;0,90
//
// Every EAN owns a "before sharing" (IN-) and an "after sharing" (OUT-)
// column. `-D` marks a producer, `-O` a consumer. Consumers are written as
// negative numbers. Each data row is sanitized and reconciled right away, so
// the resulting document is internally consistent.

use crate::data_quality::{record_warning, DataWarning, WarningKind};
use crate::document::CsvDocument;
use crate::entities::{Ean, EanSide, Interval, Measurement};
use crate::error::{EdcError, Result};
use crate::reconciliation::ReconciliationEngine;
use crate::temporal::{check_spacing, parse_timestamp};
use anyhow::Context;
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use std::path::Path;
use tracing::{debug, info};

/// Leading columns before the first EAN pair
const FIXED_COLUMNS: [&str; 3] = ["Datum", "Cas od", "Cas do"];

// ============================================================================
// HEADER
// ============================================================================

/// EAN columns announced by the header, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderLayout {
    pub producers: Vec<Ean>,
    pub consumers: Vec<Ean>,
}

impl HeaderLayout {
    /// Number of fields a data row must have
    pub fn expected_fields(&self) -> usize {
        FIXED_COLUMNS.len() + 2 * (self.producers.len() + self.consumers.len())
    }
}

/// Validate the header row and collect the EAN columns
pub fn parse_header(header: &StringRecord) -> Result<HeaderLayout> {
    let fields: Vec<&str> = header.iter().collect();

    if fields.len() <= FIXED_COLUMNS.len() {
        return Err(EdcError::InvalidHeader(format!(
            "expected more than {} fields, found {}",
            FIXED_COLUMNS.len(),
            fields.len()
        )));
    }

    let leading = fields[0].trim_start_matches('\u{feff}');
    if leading != FIXED_COLUMNS[0] || fields[1] != FIXED_COLUMNS[1] || fields[2] != FIXED_COLUMNS[2] {
        return Err(EdcError::InvalidHeader(format!(
            "expected \"Datum;Cas od;Cas do\" at the beginning, found \"{};{};{}\"",
            leading, fields[1], fields[2]
        )));
    }

    if fields.len() % 2 == 0 {
        return Err(EdcError::InvalidHeader(format!(
            "expected an odd number of fields (3 + 2 per EAN), found {}",
            fields.len()
        )));
    }

    let mut layout = HeaderLayout::default();
    for csv_index in (FIXED_COLUMNS.len()..fields.len()).step_by(2) {
        let (name, side) = parse_column_pair(fields[csv_index], fields[csv_index + 1])?;
        let ean = Ean::new(name, csv_index);
        match side {
            EanSide::Producer => layout.producers.push(ean),
            EanSide::Consumer => layout.consumers.push(ean),
        }
    }

    Ok(layout)
}

/// `IN-<EAN>-<D|O>` + `OUT-<EAN>-<D|O>` -> (EAN, side)
fn parse_column_pair(before: &str, after: &str) -> Result<(String, EanSide)> {
    let before = before.trim();
    let after = after.trim();

    let invalid = |reason: &str| {
        EdcError::InvalidHeader(format!("{} in column pair \"{}\" / \"{}\"", reason, before, after))
    };

    let before_rest = before
        .strip_prefix("IN-")
        .ok_or_else(|| invalid("\"before\" column must start with IN-"))?;
    let after_rest = after
        .strip_prefix("OUT-")
        .ok_or_else(|| invalid("\"after\" column must start with OUT-"))?;

    if before_rest != after_rest {
        return Err(invalid("EAN or marker differs between the two columns"));
    }

    let marker_at = before_rest
        .len()
        .checked_sub(2)
        .filter(|at| before_rest.is_char_boundary(*at))
        .ok_or_else(|| invalid("missing -D/-O marker"))?;
    let (name, marker) = before_rest.split_at(marker_at);
    let side = EanSide::from_marker(marker).ok_or_else(|| invalid("unknown marker (expected -D or -O)"))?;

    if name.is_empty() {
        return Err(invalid("empty EAN"));
    }

    Ok((name.to_string(), side))
}

// ============================================================================
// CELLS
// ============================================================================

/// Parse one kWh cell: decimal comma, empty means 0
pub fn parse_kwh(cell: &str, line: usize) -> Result<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(0.0);
    }

    let value: f64 = cell.replace(',', ".").parse().map_err(|_| EdcError::InvalidNumber {
        line,
        value: cell.to_string(),
    })?;

    if !value.is_finite() {
        return Err(EdcError::InvalidNumber {
            line,
            value: cell.to_string(),
        });
    }

    Ok(value)
}

// ============================================================================
// EDC PARSER
// ============================================================================

pub struct EdcParser {
    engine: ReconciliationEngine,
}

impl EdcParser {
    pub fn new() -> Self {
        EdcParser {
            engine: ReconciliationEngine::new(),
        }
    }

    pub fn with_engine(engine: ReconciliationEngine) -> Self {
        EdcParser { engine }
    }

    /// Read and parse an export from disk
    pub fn parse_file(&self, file_path: &Path) -> anyhow::Result<CsvDocument> {
        let text = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv");

        let document = self
            .parse(&text, filename)
            .with_context(|| format!("Failed to parse EDC export {}", file_path.display()))?;
        Ok(document)
    }

    /// Parse the full export text. Any hard failure aborts the document.
    pub fn parse(&self, text: &str, filename: &str) -> Result<CsvDocument> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(text.as_bytes());

        let mut records = reader.records();

        let header = match records.next() {
            Some(record) => record.map_err(|e| EdcError::Malformed(e.to_string()))?,
            None => return Err(EdcError::InvalidHeader("CSV file is empty".to_string())),
        };
        let layout = parse_header(&header)?;
        debug!(
            producers = layout.producers.len(),
            consumers = layout.consumers.len(),
            "parsed EDC header"
        );

        let mut intervals: Vec<Interval> = Vec::new();
        let mut previous: Option<NaiveDateTime> = None;

        for (index, result) in records.enumerate() {
            let record = result.map_err(|e| EdcError::Malformed(e.to_string()))?;
            let line = record
                .position()
                .map_or(index + 2, |p| p.line() as usize);

            if is_blank(&record) {
                continue;
            }

            let interval = self.parse_row(&record, line, &layout)?;

            if let Some(previous) = &previous {
                check_spacing(previous, &interval.start, line)?;
            }
            previous = Some(interval.start);

            intervals.push(interval);
        }

        let document = CsvDocument::new(filename, intervals, layout.producers, layout.consumers)?;

        info!(
            filename,
            intervals = document.intervals().len(),
            producers = document.producer_eans().len(),
            consumers = document.consumer_eans().len(),
            warnings = document.warning_summary().total_warnings,
            "parsed EDC export"
        );

        Ok(document)
    }

    fn parse_row(&self, record: &StringRecord, line: usize, layout: &HeaderLayout) -> Result<Interval> {
        check_field_count(record, line, layout.expected_fields())?;

        let start = parse_timestamp(&record[0], &record[1], line)?;
        let mut warnings = Vec::new();

        let mut producers = Vec::with_capacity(layout.producers.len());
        for ean in &layout.producers {
            producers.push(self.read_measurement(record, line, ean, EanSide::Producer, &mut warnings)?);
        }

        let mut consumers = Vec::with_capacity(layout.consumers.len());
        for ean in &layout.consumers {
            consumers.push(self.read_measurement(record, line, ean, EanSide::Consumer, &mut warnings)?);
        }

        let totals = self
            .engine
            .reconcile(line, &mut producers, &mut consumers, &mut warnings)?;

        Ok(Interval {
            start,
            sum_sharing: totals.sum_sharing,
            sum_missed: totals.sum_missed,
            sum_production: totals.sum_production,
            producers,
            consumers,
            warnings,
        })
    }

    fn read_measurement(
        &self,
        record: &StringRecord,
        line: usize,
        ean: &Ean,
        side: EanSide,
        warnings: &mut Vec<DataWarning>,
    ) -> Result<Measurement> {
        let before_cell = &record[ean.csv_index()];
        let after_cell = &record[ean.csv_index() + 1];

        let before = parse_kwh(before_cell, line)?;
        // Blank means whitespace-only too, the same rule parse_kwh applies
        let after = if after_cell.trim().is_empty() && !before_cell.trim().is_empty() {
            // Provisional data: the operator has not computed sharing yet
            record_warning(
                warnings,
                WarningKind::MissingAfterValue,
                Some(ean.name()),
                format!(
                    "Missing data after sharing for {} on line {}. Assuming no sharing.",
                    ean.name(),
                    line
                ),
            );
            before
        } else {
            parse_kwh(after_cell, line)?
        };

        Ok(self.engine.sanitize(side, ean.name(), before, after, warnings))
    }
}

impl Default for EdcParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an export with the default reconciliation settings
pub fn parse_csv(text: &str, filename: &str) -> Result<CsvDocument> {
    EdcParser::new().parse(text, filename)
}

// ============================================================================
// HELPERS
// ============================================================================

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|field| field.trim().is_empty())
}

/// Exact field count, or one extra empty field from a trailing `;`
fn check_field_count(record: &StringRecord, line: usize, expected: usize) -> Result<()> {
    let found = record.len();
    let trailing_separator = found == expected + 1 && record.get(expected).map_or(false, |f| f.trim().is_empty());

    if found == expected || trailing_separator {
        return Ok(());
    }

    Err(EdcError::FieldCount {
        line,
        found,
        expected,
        last: record.get(found.saturating_sub(1)).unwrap_or("").to_string(),
    })
}

// ============================================================================
// TESTS
// ============================================================================
