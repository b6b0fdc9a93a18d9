//! Descriptive statistics and correlation over observation records.
//!
//! Everything here is a pure function of its inputs: records are only read,
//! never modified, and no state survives between calls. Callers fetch a
//! fresh snapshot from the backend and pass it in.
//!
//! # Example
//!
//! ```
//! use plantlog::stats::{correlate, summarize, MissingValues, Summary};
//! use serde_json::json;
//!
//! let records = vec![json!({"h": 1}), json!({"h": "x"}), json!({"h": 3})];
//! match summarize(&records, "h") {
//!     Summary::Values(d) => assert_eq!(d.average, 2.0),
//!     Summary::NoData => unreachable!(),
//! }
//!
//! let pairs = vec![json!({"x": 1, "y": 3}), json!({"x": 2, "y": 2}), json!({"x": 3, "y": 1})];
//! let r = correlate(&pairs, "x", "y", MissingValues::ZeroFill).unwrap();
//! assert!((r + 1.0).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};

use crate::model::{Field, Measurements, Observation};

/// Read access to named numeric fields of a record.
pub trait Measured {
    /// The finite numeric value of `field`, or `None` if it is absent or
    /// not a number.
    fn measurement(&self, field: &str) -> Option<f64>;
}

impl Measured for Observation {
    fn measurement(&self, field: &str) -> Option<f64> {
        self.value(field)
    }
}

impl Measured for Measurements {
    fn measurement(&self, field: &str) -> Option<f64> {
        field.parse::<Field>().ok().and_then(|f| self.get(f))
    }
}

/// Raw JSON objects; only JSON numbers count as values.
impl Measured for serde_json::Value {
    fn measurement(&self, field: &str) -> Option<f64> {
        self.get(field)
            .and_then(serde_json::Value::as_f64)
            .filter(|v| v.is_finite())
    }
}

impl<T: Measured + ?Sized> Measured for &T {
    fn measurement(&self, field: &str) -> Option<f64> {
        (**self).measurement(field)
    }
}

/// How correlation treats a record with a missing value on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValues {
    /// Substitute 0 for the missing value; every record yields a pair.
    #[default]
    ZeroFill,
    /// Skip records where either value is missing.
    ExcludePairwise,
}

impl MissingValues {
    /// Name used in configuration and query strings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZeroFill => "zero_fill",
            Self::ExcludePairwise => "exclude_pairwise",
        }
    }
}

impl std::str::FromStr for MissingValues {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "zero_fill" => Ok(Self::ZeroFill),
            "exclude_pairwise" => Ok(Self::ExcludePairwise),
            other => Err(crate::Error::validation(format!(
                "unknown missing-value policy '{other}', expected zero_fill or exclude_pairwise"
            ))),
        }
    }
}

/// Average, extrema and count of the usable values of one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Descriptive {
    /// Number of values that went into the summary.
    pub count: usize,
    /// Arithmetic mean.
    pub average: f64,
    /// Largest value.
    pub max: f64,
    /// Smallest value.
    pub min: f64,
}

/// Result of [`summarize`].
///
/// Serializes as `null` when there is no data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Summary {
    /// No record carried a usable value for the field.
    NoData,
    /// Statistics over the usable values.
    Values(Descriptive),
}

impl Summary {
    /// Whether this is the no-data marker.
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    /// The statistics, if any.
    #[must_use]
    pub fn values(&self) -> Option<&Descriptive> {
        match self {
            Self::NoData => None,
            Self::Values(d) => Some(d),
        }
    }
}

/// Summarize one field over `records`.
///
/// Records whose value is missing or not a finite number are skipped.
/// Returns [`Summary::NoData`] if nothing is left.
#[must_use]
pub fn summarize<R: Measured>(records: &[R], field: &str) -> Summary {
    let mut values = records.iter().filter_map(|r| r.measurement(field));

    let Some(first) = values.next() else {
        return Summary::NoData;
    };

    // Running mean; a plain sum overflows on large finite values.
    let (mut count, mut average, mut max, mut min) = (1usize, first, first, first);
    for v in values {
        count += 1;
        #[allow(clippy::cast_precision_loss)]
        let k = count as f64;
        average = average - average / k + v / k;
        max = max.max(v);
        min = min.min(v);
    }

    Summary::Values(Descriptive {
        count,
        average,
        max,
        min,
    })
}

/// Pearson correlation coefficient between `field_x` and `field_y`.
///
/// Pairs are extracted according to `missing`. Fewer than two pairs yields
/// `Some(0.0)`. Returns `None` when either side has zero variance, where the
/// coefficient is undefined.
#[must_use]
pub fn correlate<R: Measured>(
    records: &[R],
    field_x: &str,
    field_y: &str,
    missing: MissingValues,
) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| {
            let x = r.measurement(field_x);
            let y = r.measurement(field_y);
            match missing {
                MissingValues::ZeroFill => Some((x.unwrap_or(0.0), y.unwrap_or(0.0))),
                MissingValues::ExcludePairwise => x.zip(y),
            }
        })
        .collect();

    pearson(&pairs)
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return Some(0.0);
    }

    // The coefficient is scale-invariant. Dividing each side by its largest
    // magnitude keeps every sum and product below finite bounds.
    let scale_x = pairs.iter().fold(0.0_f64, |m, p| m.max(p.0.abs()));
    let scale_y = pairs.iter().fold(0.0_f64, |m, p| m.max(p.1.abs()));
    if scale_x == 0.0 || scale_y == 0.0 {
        return None;
    }
    let scaled: Vec<(f64, f64)> = pairs
        .iter()
        .map(|&(x, y)| (x / scale_x, y / scale_y))
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let n = scaled.len() as f64;
    let mean_x = scaled.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = scaled.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut covariance, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for &(x, y) in &scaled {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = var_x.sqrt() * var_y.sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }

    Some((covariance / denominator).clamp(-1.0, 1.0))
}

/// Fields summarized by default in a [`Report`].
pub const DEFAULT_SUMMARY_FIELDS: [Field; 3] =
    [Field::PlantHeight, Field::LeafArea, Field::PlantSpread];

/// Field pairs correlated by default in a [`Report`].
pub const DEFAULT_CORRELATION_PAIRS: [(Field, Field); 2] = [
    (Field::PlantHeight, Field::PlantSpread),
    (Field::PlantHeight, Field::LeafArea),
];

/// Summary of one field inside a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    /// Field name.
    pub field: String,
    /// Its statistics, `null` when there is no data.
    pub summary: Summary,
}

/// Correlation of one pair inside a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairCorrelation {
    /// First field.
    pub x: String,
    /// Second field.
    pub y: String,
    /// `null` when undefined.
    pub coefficient: Option<f64>,
}

/// Summaries and correlations over one snapshot of observations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Number of records the report was computed from.
    pub observations: usize,
    /// Missing-value policy used for correlations.
    pub missing_values: MissingValues,
    /// One entry per requested field, in request order.
    pub summaries: Vec<FieldSummary>,
    /// One entry per requested pair, in request order.
    pub correlations: Vec<PairCorrelation>,
}

/// Parse a correlation pair written as `x:y`, e.g. `plant_height:leaf_area`.
///
/// # Errors
///
/// Returns a validation error if the separator is missing or either side
/// is not a known field.
pub fn parse_pair(s: &str) -> crate::Result<(Field, Field)> {
    let (x, y) = s
        .split_once(':')
        .ok_or_else(|| crate::Error::validation(format!("expected x:y field pair, got '{s}'")))?;
    Ok((x.trim().parse()?, y.trim().parse()?))
}

/// Build a report for the given fields and pairs.
///
/// Empty `fields` / `pairs` fall back to [`DEFAULT_SUMMARY_FIELDS`] and
/// [`DEFAULT_CORRELATION_PAIRS`].
#[must_use]
pub fn report<R: Measured>(
    records: &[R],
    fields: &[Field],
    pairs: &[(Field, Field)],
    missing: MissingValues,
) -> Report {
    let fields = if fields.is_empty() {
        &DEFAULT_SUMMARY_FIELDS[..]
    } else {
        fields
    };
    let pairs = if pairs.is_empty() {
        &DEFAULT_CORRELATION_PAIRS[..]
    } else {
        pairs
    };

    Report {
        observations: records.len(),
        missing_values: missing,
        summaries: fields
            .iter()
            .map(|f| FieldSummary {
                field: f.name().to_string(),
                summary: summarize(records, f.name()),
            })
            .collect(),
        correlations: pairs
            .iter()
            .map(|(x, y)| PairCorrelation {
                x: x.name().to_string(),
                y: y.name().to_string(),
                coefficient: correlate(records, x.name(), y.name(), missing),
            })
            .collect(),
    }
}
