//! Visualization descriptors and the plotting-ready data prepared from them

use crate::core::types::Translatable;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisualizationError {
    #[error("unsupported visualization type: {0}")]
    Unsupported(String),
    #[error("invalid visualization descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("column '{0}' does not exist in table")]
    MissingColumn(String),
    /// Raised when a date bucket cannot be represented. Callers treat this as
    /// "no data", not as a failure.
    #[error("invalid time value: {0}")]
    InvalidTimeValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Area,
}

/// How the group column of a chart is bucketed when it holds dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DateFormat {
    /// Pick year, month, day or hour from the span of the data
    Auto,
    Year,
    Quarter,
    Month,
    Day,
    Hour,
    MonthCycle,
    WeekdayCycle,
    HourCycle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Aggregate {
    #[default]
    Count,
    Sum,
    Mean,
    CountPct,
    Pct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextExtract {
    UrlDomain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartGroup {
    pub column: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, alias = "dateFormat")]
    pub date_format: Option<DateFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartValue {
    pub column: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub aggregate: Aggregate,
    #[serde(default = "default_true", alias = "addZeroes")]
    pub add_zeroes: bool,
}

impl ChartValue {
    /// Series name in the prepared data
    pub fn key(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartVisualization {
    #[serde(default)]
    pub title: Translatable,
    pub group: ChartGroup,
    pub values: Vec<ChartValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextVisualization {
    #[serde(default)]
    pub title: Translatable,
    #[serde(alias = "textColumn")]
    pub text_column: String,
    #[serde(default, alias = "valueColumn")]
    pub value_column: Option<String>,
    #[serde(default)]
    pub tokenize: bool,
    #[serde(default)]
    pub extract: Option<TextExtract>,
}

fn default_true() -> bool {
    true
}

/// Which chart or word cloud to render, and which columns feed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VisualizationDescriptor {
    Line(ChartVisualization),
    Bar(ChartVisualization),
    Area(ChartVisualization),
    #[serde(rename = "wordcloud")]
    WordCloud(TextVisualization),
}

const SUPPORTED_TYPES: [&str; 4] = ["line", "bar", "area", "wordcloud"];

impl VisualizationDescriptor {
    /// Parse a descriptor, reporting unknown `type` tags as `Unsupported`
    pub fn from_json(value: &JsonValue) -> Result<Self, VisualizationError> {
        let tag = value
            .get("type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| VisualizationError::InvalidDescriptor("missing 'type' tag".into()))?;
        if !SUPPORTED_TYPES.contains(&tag) {
            return Err(VisualizationError::Unsupported(tag.to_string()));
        }
        serde_json::from_value(value.clone())
            .map_err(|e| VisualizationError::InvalidDescriptor(e.to_string()))
    }

    pub fn title(&self) -> &Translatable {
        match self {
            Self::Line(chart) | Self::Bar(chart) | Self::Area(chart) => &chart.title,
            Self::WordCloud(text) => &text.title,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Line(_) => "line",
            Self::Bar(_) => "bar",
            Self::Area(_) => "area",
            Self::WordCloud(_) => "wordcloud",
        }
    }
}

/// Finite float with a total order, for numeric group keys
#[derive(Debug, Clone, Copy)]
pub struct FiniteNumber(f64);

impl FiniteNumber {
    pub fn new(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for FiniteNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FiniteNumber {}

impl PartialOrd for FiniteNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FiniteNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Synthesized sort key of a chart point
///
/// Time keys are bucket starts in seconds since the epoch; cycle keys are
/// positions within a month/weekday/hour cycle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Time(i64),
    Cycle(u32),
    Number(FiniteNumber),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    #[serde(rename = "__x")]
    pub x: String,
    #[serde(skip)]
    pub sort_key: SortKey,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub kind: ChartKind,
    pub x_label: String,
    pub y_keys: Vec<String>,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextData {
    pub frequencies: BTreeMap<String, f64>,
}

impl TextData {
    /// The `n` most frequent tokens, ties broken alphabetically
    pub fn top(&self, n: usize) -> Vec<(&str, f64)> {
        let mut words: Vec<(&str, f64)> = self
            .frequencies
            .iter()
            .map(|(text, value)| (text.as_str(), *value))
            .collect();
        words.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        words.truncate(n);
        words
    }
}

/// Plotting-ready data, mirroring the descriptor's tag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VisualizationData {
    Chart(ChartData),
    Text(TextData),
}
