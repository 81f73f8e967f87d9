//! Turns a table plus a visualization descriptor into plotting-ready data
//!
//! Chart preparation buckets the group column (dates, numbers or text) and
//! aggregates the configured value columns per bucket. Text preparation
//! tokenizes a column, drops stopwords and counts the remaining tokens.

use crate::core::{
    Aggregate, ChartData, ChartKind, ChartPoint, ChartVisualization, DateFormat, FiniteNumber,
    Row, SortKey, StopwordSet, Table, TextData, TextExtract, TextVisualization, VisualizationData,
    VisualizationDescriptor, VisualizationError,
};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use tracing::{debug, trace};
use url::Url;

const EPOCH_YEAR_2000: i64 = 946_684_800;
const EPOCH_YEAR_2040: i64 = 2_208_988_800;

/// Upper bound on the buckets a zero-filled date range may produce
const MAX_FILLED_BUCKETS: usize = 10_000;

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Prepares visualization data; shared read-only with the background worker
#[derive(Debug, Clone, Default)]
pub struct VisualizationService {
    stopwords: StopwordSet,
}

impl VisualizationService {
    pub fn new(stopwords: StopwordSet) -> Self {
        Self { stopwords }
    }

    /// Prepare the data for one visualization of `table`'s visible rows
    ///
    /// `Ok(None)` means the preparation succeeded but no point survived,
    /// e.g. because every date was malformed.
    pub fn prepare(
        &self,
        table: &Table,
        descriptor: &VisualizationDescriptor,
    ) -> Result<Option<VisualizationData>, VisualizationError> {
        let data = match descriptor {
            VisualizationDescriptor::Line(chart) => {
                prepare_chart(ChartKind::Line, chart, table)?.map(VisualizationData::Chart)
            }
            VisualizationDescriptor::Bar(chart) => {
                prepare_chart(ChartKind::Bar, chart, table)?.map(VisualizationData::Chart)
            }
            VisualizationDescriptor::Area(chart) => {
                prepare_chart(ChartKind::Area, chart, table)?.map(VisualizationData::Chart)
            }
            VisualizationDescriptor::WordCloud(text) => {
                self.prepare_text(text, table)?.map(VisualizationData::Text)
            }
        };
        debug!(
            table = %table.id,
            visualization = descriptor.type_name(),
            rows = table.body().len(),
            empty = data.is_none(),
            "Prepared visualization data"
        );
        Ok(data)
    }

    fn prepare_text(
        &self,
        vis: &TextVisualization,
        table: &Table,
    ) -> Result<Option<TextData>, VisualizationError> {
        let text_idx = column_index(table, &vis.text_column)?;
        let value_idx = vis
            .value_column
            .as_deref()
            .map(|column| column_index(table, column))
            .transpose()?;

        let mut frequencies: BTreeMap<String, f64> = BTreeMap::new();
        for row in table.body() {
            let Some(cell) = row.cells.get(text_idx) else {
                continue;
            };
            let weight = match value_idx {
                Some(idx) => match row.cells.get(idx).and_then(|v| parse_number(v)) {
                    Some(weight) => weight.value(),
                    None => continue,
                },
                None => 1.0,
            };

            let text = match vis.extract {
                Some(TextExtract::UrlDomain) => match url_domain(cell) {
                    Some(domain) => domain,
                    None => continue,
                },
                None => cell.clone(),
            };

            if vis.tokenize {
                for token in self.tokenize(&text) {
                    *frequencies.entry(token).or_insert(0.0) += weight;
                }
            } else {
                let text = text.trim();
                if !text.is_empty() && !self.stopwords.contains(&text.to_lowercase()) {
                    *frequencies.entry(text.to_string()).or_insert(0.0) += weight;
                }
            }
        }

        if frequencies.is_empty() {
            return Ok(None);
        }
        Ok(Some(TextData { frequencies }))
    }

    /// Lowercased words of at least two characters, minus numbers and stopwords
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.chars().count() >= 2)
            .filter(|token| !token.chars().all(|c| c.is_numeric()))
            .filter(|token| !self.stopwords.contains(token))
            .map(str::to_string)
            .collect()
    }
}

fn column_index(table: &Table, column: &str) -> Result<usize, VisualizationError> {
    table
        .column_index(column)
        .ok_or_else(|| VisualizationError::MissingColumn(column.to_string()))
}

fn parse_number(text: &str) -> Option<FiniteNumber> {
    text.trim().parse::<f64>().ok().and_then(FiniteNumber::new)
}

/// Host of a URL without a leading `www.`; scheme-less input is accepted
fn url_domain(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let url = Url::parse(text)
        .ok()
        .filter(|url| url.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{text}")).ok())?;
    let host = url.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Parse the date/time formats found in extracted data packages
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    // Epoch seconds, only when plausibly a timestamp
    if text.chars().all(|c| c.is_ascii_digit()) {
        let seconds: i64 = text.parse().ok()?;
        if (EPOCH_YEAR_2000..=EPOCH_YEAR_2040).contains(&seconds) {
            return DateTime::from_timestamp(seconds, 0).map(|dt| dt.naive_utc());
        }
    }
    None
}

/// Resolve `auto` from the span of the parsed dates
fn resolve_date_format(format: DateFormat, dates: &[NaiveDateTime]) -> DateFormat {
    if format != DateFormat::Auto {
        return format;
    }
    let (Some(min), Some(max)) = (dates.iter().min(), dates.iter().max()) else {
        return DateFormat::Day;
    };
    let span = *max - *min;
    if span >= Duration::days(2 * 365) {
        DateFormat::Year
    } else if span >= Duration::days(90) {
        DateFormat::Month
    } else if span >= Duration::days(3) {
        DateFormat::Day
    } else {
        DateFormat::Hour
    }
}

fn invalid_time(dt: &NaiveDateTime) -> VisualizationError {
    VisualizationError::InvalidTimeValue(dt.to_string())
}

/// Start of the bucket containing `dt`
fn bucket_start(dt: &NaiveDateTime, format: DateFormat) -> Result<NaiveDateTime, VisualizationError> {
    let date = match format {
        DateFormat::Year => NaiveDate::from_ymd_opt(dt.year(), 1, 1),
        DateFormat::Quarter => NaiveDate::from_ymd_opt(dt.year(), (dt.month0() / 3) * 3 + 1, 1),
        DateFormat::Month => NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1),
        _ => Some(dt.date()),
    };
    let hour = if format == DateFormat::Hour { dt.hour() } else { 0 };
    date.and_then(|d| d.and_hms_opt(hour, 0, 0))
        .ok_or_else(|| invalid_time(dt))
}

/// Bucket key and display label for a parsed date
fn date_bucket(dt: &NaiveDateTime, format: DateFormat) -> Result<(SortKey, String), VisualizationError> {
    match format {
        DateFormat::MonthCycle => Ok((
            SortKey::Cycle(dt.month0()),
            MONTH_NAMES[dt.month0() as usize].to_string(),
        )),
        DateFormat::WeekdayCycle => {
            let day = dt.weekday().num_days_from_monday();
            Ok((SortKey::Cycle(day), WEEKDAY_NAMES[day as usize].to_string()))
        }
        DateFormat::HourCycle => Ok((SortKey::Cycle(dt.hour()), format!("{:02}", dt.hour()))),
        _ => {
            let start = bucket_start(dt, format)?;
            Ok((SortKey::Time(start.and_utc().timestamp()), date_label(&start, format)))
        }
    }
}

fn date_label(start: &NaiveDateTime, format: DateFormat) -> String {
    match format {
        DateFormat::Year => start.format("%Y").to_string(),
        DateFormat::Quarter => format!("{}-Q{}", start.year(), start.month0() / 3 + 1),
        DateFormat::Month => start.format("%Y-%m").to_string(),
        DateFormat::Hour => start.format("%Y-%m-%d %H:00").to_string(),
        _ => start.format("%Y-%m-%d").to_string(),
    }
}

fn next_bucket(start: &NaiveDateTime, format: DateFormat) -> Result<NaiveDateTime, VisualizationError> {
    let next = match format {
        DateFormat::Year => start.checked_add_months(Months::new(12)),
        DateFormat::Quarter => start.checked_add_months(Months::new(3)),
        DateFormat::Month => start.checked_add_months(Months::new(1)),
        DateFormat::Hour => start.checked_add_signed(Duration::hours(1)),
        _ => start.checked_add_signed(Duration::days(1)),
    };
    next.ok_or_else(|| invalid_time(start))
}

/// Every bucket between the first and last key, or the whole cycle
fn full_range(
    format: DateFormat,
    first: &NaiveDateTime,
    last: &NaiveDateTime,
) -> Result<Vec<(SortKey, String)>, VisualizationError> {
    match format {
        DateFormat::MonthCycle => Ok((0..12u32)
            .map(|m| (SortKey::Cycle(m), MONTH_NAMES[m as usize].to_string()))
            .collect()),
        DateFormat::WeekdayCycle => Ok((0..7u32)
            .map(|d| (SortKey::Cycle(d), WEEKDAY_NAMES[d as usize].to_string()))
            .collect()),
        DateFormat::HourCycle => Ok((0..24u32)
            .map(|h| (SortKey::Cycle(h), format!("{h:02}")))
            .collect()),
        _ => {
            let mut buckets = Vec::new();
            let mut current = bucket_start(first, format)?;
            let end = bucket_start(last, format)?;
            while current <= end {
                if buckets.len() == MAX_FILLED_BUCKETS {
                    debug!(%first, %last, ?format, "Date range too wide to fill with zeroes");
                    return Err(VisualizationError::InvalidTimeValue(format!(
                        "more than {MAX_FILLED_BUCKETS} buckets between {first} and {last}"
                    )));
                }
                buckets.push((
                    SortKey::Time(current.and_utc().timestamp()),
                    date_label(&current, format),
                ));
                current = next_bucket(&current, format)?;
            }
            Ok(buckets)
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Accumulator {
    count: usize,
    sum: f64,
    numeric: usize,
}

impl Accumulator {
    fn add(&mut self, cell: &str) {
        if cell.trim().is_empty() {
            return;
        }
        self.count += 1;
        if let Some(number) = parse_number(cell) {
            self.sum += number.value();
            self.numeric += 1;
        }
    }
}

struct Bucket {
    label: String,
    values: Vec<Accumulator>,
}

fn prepare_chart(
    kind: ChartKind,
    vis: &ChartVisualization,
    table: &Table,
) -> Result<Option<ChartData>, VisualizationError> {
    let group_idx = column_index(table, &vis.group.column)?;
    let value_idxs = vis
        .values
        .iter()
        .map(|value| column_index(table, &value.column))
        .collect::<Result<Vec<_>, _>>()?;

    let mut buckets: BTreeMap<SortKey, Bucket> = BTreeMap::new();
    let mut dropped = 0usize;
    let mut date_range: Option<(DateFormat, NaiveDateTime, NaiveDateTime)> = None;

    let keyed: Vec<(SortKey, String, &Row)> = match vis.group.date_format {
        Some(format) => {
            let dated: Vec<(NaiveDateTime, &Row)> = table
                .body()
                .iter()
                .filter_map(|row| {
                    let parsed = row.cells.get(group_idx).and_then(|cell| parse_datetime(cell));
                    if parsed.is_none() {
                        trace!(row = %row.id, "Dropping row with unparseable date");
                    }
                    parsed.map(|dt| (dt, row))
                })
                .collect();
            dropped = table.body().len() - dated.len();

            let dates: Vec<NaiveDateTime> = dated.iter().map(|(dt, _)| *dt).collect();
            let format = resolve_date_format(format, &dates);
            if let (Some(min), Some(max)) = (dates.iter().min(), dates.iter().max()) {
                date_range = Some((format, *min, *max));
            }

            dated
                .into_iter()
                .map(|(dt, row)| date_bucket(&dt, format).map(|(key, label)| (key, label, row)))
                .collect::<Result<Vec<_>, _>>()?
        }
        None => table
            .body()
            .iter()
            .filter_map(|row| {
                let cell = row.cells.get(group_idx)?.trim();
                if cell.is_empty() {
                    dropped += 1;
                    return None;
                }
                let key = match cell.parse::<f64>() {
                    Ok(number) => match FiniteNumber::new(number) {
                        Some(number) => SortKey::Number(number),
                        None => {
                            dropped += 1;
                            return None;
                        }
                    },
                    Err(_) => SortKey::Text(cell.to_string()),
                };
                Some((key, cell.to_string(), row))
            })
            .collect(),
    };

    if dropped > 0 {
        debug!(table = %table.id, dropped, "Dropped rows with unparseable group keys");
    }

    for (key, label, row) in keyed {
        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            label,
            values: vec![Accumulator::default(); value_idxs.len()],
        });
        for (acc, idx) in bucket.values.iter_mut().zip(&value_idxs) {
            if let Some(cell) = row.cells.get(*idx) {
                acc.add(cell);
            }
        }
    }

    if buckets.is_empty() {
        return Ok(None);
    }

    let totals: Vec<(usize, f64)> = (0..value_idxs.len())
        .map(|i| {
            buckets.values().fold((0usize, 0.0f64), |(count, sum), bucket| {
                (count + bucket.values[i].count, sum + bucket.values[i].sum)
            })
        })
        .collect();

    let mut points: BTreeMap<SortKey, ChartPoint> = buckets
        .into_iter()
        .map(|(key, bucket)| {
            let values = vis
                .values
                .iter()
                .zip(&bucket.values)
                .zip(&totals)
                .map(|((value, acc), total)| (value.key().to_string(), aggregate(value.aggregate, acc, *total)))
                .collect();
            let point = ChartPoint {
                x: bucket.label,
                sort_key: key.clone(),
                values,
            };
            (key, point)
        })
        .collect();

    if let Some((format, first, last)) = date_range {
        fill_zeroes(vis, format, &first, &last, &mut points)?;
    }

    Ok(Some(ChartData {
        kind,
        x_label: vis
            .group
            .label
            .clone()
            .unwrap_or_else(|| vis.group.column.clone()),
        y_keys: vis.values.iter().map(|v| v.key().to_string()).collect(),
        points: points.into_values().collect(),
    }))
}

fn aggregate(kind: Aggregate, acc: &Accumulator, (total_count, total_sum): (usize, f64)) -> f64 {
    match kind {
        Aggregate::Count => acc.count as f64,
        Aggregate::Sum => acc.sum,
        Aggregate::Mean if acc.numeric == 0 => 0.0,
        Aggregate::Mean => acc.sum / acc.numeric as f64,
        Aggregate::CountPct if total_count == 0 => 0.0,
        Aggregate::CountPct => acc.count as f64 * 100.0 / total_count as f64,
        Aggregate::Pct if total_sum == 0.0 => 0.0,
        Aggregate::Pct => acc.sum * 100.0 / total_sum,
    }
}

/// Insert zero-valued points for missing date buckets of `add_zeroes` series
fn fill_zeroes(
    vis: &ChartVisualization,
    format: DateFormat,
    first: &NaiveDateTime,
    last: &NaiveDateTime,
    points: &mut BTreeMap<SortKey, ChartPoint>,
) -> Result<(), VisualizationError> {
    let zero_keys: Vec<&str> = vis
        .values
        .iter()
        .filter(|value| value.add_zeroes)
        .map(|value| value.key())
        .collect();
    if zero_keys.is_empty() {
        return Ok(());
    }

    for (key, label) in full_range(format, first, last)? {
        let point = points.entry(key.clone()).or_insert_with(|| ChartPoint {
            x: label,
            sort_key: key,
            values: BTreeMap::new(),
        });
        for series in &zero_keys {
            point.values.entry(series.to_string()).or_insert(0.0);
        }
    }
    Ok(())
}
