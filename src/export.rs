// 📤 Export - Text outputs built from a CsvDocument
//
// Two formats:
// 1. Filtered CSV: the EDC layout again, restricted to visible consumers, with
//    one virtual producer whose "before" is the summed sharing. Can be fed
//    back into the portal's own tools.
// 2. Statistics CSV: `statistic_id;unit;start;state;sum` rows for the
//    home-automation statistics importer, one file per metric and EAN.
//
// Building the text is all we do here; where it ends up is the caller's call.

use crate::config::DisplaySettings;
use crate::document::CsvDocument;
use crate::entities::{EanSide, Interval, Measurement};
use crate::error::{EdcError, Result};
use crate::grouping::Grouping;
use crate::temporal::slot_end;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::{QuoteStyle, Terminator, Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Producer EAN standing in for the summed sharing in the filtered export
pub const VIRTUAL_PRODUCER_EAN: &str = "859182400000000000";

pub const STATISTICS_HEADER: [&str; 5] = ["statistic_id", "unit", "start", "state", "sum"];

fn writer() -> Writer<Vec<u8>> {
    WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new())
}

fn finish(writer: Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| EdcError::Output(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| EdcError::Output(e.to_string()))
}

fn write_row<I, S>(writer: &mut Writer<Vec<u8>>, fields: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    writer
        .write_record(fields)
        .map_err(|e| EdcError::Output(e.to_string()))
}

// ============================================================================
// FILTERED CSV
// ============================================================================

/// Two decimals, decimal comma; a negated zero prints unsigned
fn czech_number(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:.2}", value).replace('.', ",")
}

/// Re-export the 15 minute data of visible consumers in the EDC layout
pub fn filtered_csv(doc: &CsvDocument, settings: &DisplaySettings) -> Result<String> {
    let timer = Instant::now();

    let visible: Vec<usize> = doc
        .consumer_eans()
        .iter()
        .enumerate()
        .filter(|(_, ean)| !settings.is_hidden(ean.name()))
        .map(|(i, _)| i)
        .collect();

    if visible.is_empty() {
        return Err(EdcError::NothingToExport);
    }

    let mut out = writer();

    let mut header: Vec<String> = vec!["Datum".into(), "Cas od".into(), "Cas do".into()];
    for &i in &visible {
        let name = doc.consumer_eans()[i].name();
        header.push(format!("IN-{}{}", name, EanSide::Consumer.marker()));
        header.push(format!("OUT-{}{}", name, EanSide::Consumer.marker()));
    }
    header.push(format!("IN-{}{}", VIRTUAL_PRODUCER_EAN, EanSide::Producer.marker()));
    header.push(format!("OUT-{}{}", VIRTUAL_PRODUCER_EAN, EanSide::Producer.marker()));
    write_row(&mut out, &header)?;

    for interval in doc.intervals() {
        let mut row = vec![
            interval.start.format("%d.%m.%Y").to_string(),
            interval.start.format("%H:%M").to_string(),
            slot_end(&interval.start).format("%H:%M").to_string(),
        ];

        let mut shared = 0.0;
        for &i in &visible {
            let consumer = &interval.consumers[i];
            row.push(czech_number(-consumer.before));
            row.push(czech_number(-consumer.after));
            shared += consumer.shared();
        }

        row.push(czech_number(shared));
        row.push("0".to_string());
        // trailing separator, as the portal writes it
        row.push(String::new());
        write_row(&mut out, &row)?;
    }

    let text = finish(out)?;
    debug!(
        consumers = visible.len(),
        elapsed_ms = timer.elapsed().as_millis() as u64,
        "built filtered CSV"
    );
    Ok(text)
}

// ============================================================================
// STATISTICS CSV
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportMetric {
    ProducerShared,
    ConsumerShared,
    ProducerMissed,
    ConsumerMissed,
    ProducerSoldToNetwork,
    ConsumerPurchased,
}

impl ExportMetric {
    pub const ALL: [ExportMetric; 6] = [
        ExportMetric::ProducerShared,
        ExportMetric::ConsumerShared,
        ExportMetric::ProducerMissed,
        ExportMetric::ProducerSoldToNetwork,
        ExportMetric::ConsumerMissed,
        ExportMetric::ConsumerPurchased,
    ];

    pub fn side(&self) -> EanSide {
        match self {
            ExportMetric::ProducerShared
            | ExportMetric::ProducerMissed
            | ExportMetric::ProducerSoldToNetwork => EanSide::Producer,
            ExportMetric::ConsumerShared
            | ExportMetric::ConsumerMissed
            | ExportMetric::ConsumerPurchased => EanSide::Consumer,
        }
    }

    /// Data type part of the entity id. Both "shared" metrics use the same one.
    pub fn slug(&self) -> &'static str {
        match self {
            ExportMetric::ProducerShared | ExportMetric::ConsumerShared => "shared",
            ExportMetric::ProducerMissed => "producer_missed",
            ExportMetric::ConsumerMissed => "consumer_missed",
            ExportMetric::ProducerSoldToNetwork => "producer_sold_network",
            ExportMetric::ConsumerPurchased => "consumer_purchased",
        }
    }

    pub fn value(&self, measurement: &Measurement) -> f64 {
        match self {
            ExportMetric::ProducerShared | ExportMetric::ConsumerShared => measurement.shared(),
            ExportMetric::ProducerMissed | ExportMetric::ConsumerMissed => measurement.missed,
            ExportMetric::ProducerSoldToNetwork => measurement.after - measurement.missed,
            ExportMetric::ConsumerPurchased => measurement.after,
        }
    }

    fn measurements<'a>(&self, interval: &'a Interval) -> &'a [Measurement] {
        match self.side() {
            EanSide::Producer => &interval.producers,
            EanSide::Consumer => &interval.consumers,
        }
    }
}

/// `edc_data_<metric>_<ean>_<grouping name>`
pub fn statistic_entity(metric: ExportMetric, ean: &str, grouping: Grouping) -> String {
    format!("edc_data_{}_{}_{}", metric.slug(), ean, grouping.name())
}

/// File name the statistics text is conventionally stored under
pub fn statistics_file_name(metric: ExportMetric, ean: &str, grouping: Grouping) -> String {
    format!("{}_export_{}_{}.csv", metric.slug(), ean, grouping)
}

/// Same wall-clock time on the last day of the month
fn last_day_of_month(at: NaiveDateTime) -> NaiveDateTime {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(at, |last| last.and_time(at.time()))
}

/// Statistics text for one EAN and one metric over grouped intervals.
///
/// Monthly rows are repeated on the last day of the month so the importer
/// does not attribute the value to the wrong month.
pub fn statistics_csv(
    doc: &CsvDocument,
    intervals: &[Interval],
    metric: ExportMetric,
    ean_index: usize,
    grouping: Grouping,
) -> Result<String> {
    let eans = match metric.side() {
        EanSide::Producer => doc.producer_eans(),
        EanSide::Consumer => doc.consumer_eans(),
    };
    let ean = eans.get(ean_index).ok_or_else(|| {
        EdcError::Precondition(format!(
            "{} index {} out of range ({} EANs)",
            metric.side().as_str(),
            ean_index,
            eans.len()
        ))
    })?;

    let statistic_id = format!("input_number.{}", statistic_entity(metric, ean.name(), grouping));
    let mut out = writer();
    write_row(&mut out, STATISTICS_HEADER)?;

    for interval in intervals {
        let measurement = metric.measurements(interval).get(ean_index).ok_or_else(|| {
            EdcError::MisalignedInterval(format!("{} has no {} {}", interval.start, metric.side().as_str(), ean_index))
        })?;
        let state = format!("{:.2}", metric.value(measurement));

        let mut dates = vec![interval.start];
        if grouping == Grouping::Month {
            dates.push(last_day_of_month(interval.start));
        }

        for date in dates {
            let start = date.format("%d.%m.%Y %H:%M").to_string();
            write_row(&mut out, [statistic_id.as_str(), "kWh", start.as_str(), state.as_str(), "0"])?;
        }
    }

    finish(out)
}

/// One statistics file ready to be written
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsExport {
    pub file_name: String,
    pub entity: String,
    pub text: String,
}

/// Statistics texts for every metric and every EAN of the document
pub fn statistics_exports(doc: &CsvDocument, grouping: Grouping) -> Result<Vec<StatisticsExport>> {
    let intervals = doc.grouped_intervals(grouping)?;
    let mut exports = Vec::new();

    for metric in ExportMetric::ALL {
        let eans = match metric.side() {
            EanSide::Producer => doc.producer_eans(),
            EanSide::Consumer => doc.consumer_eans(),
        };

        for (index, ean) in eans.iter().enumerate() {
            exports.push(StatisticsExport {
                file_name: statistics_file_name(metric, ean.name(), grouping),
                entity: statistic_entity(metric, ean.name(), grouping),
                text: statistics_csv(doc, &intervals, metric, index, grouping)?,
            });
        }
    }

    debug!(grouping = %grouping, files = exports.len(), "built statistics exports");
    Ok(exports)
}

// ============================================================================
// TESTS
// ============================================================================
