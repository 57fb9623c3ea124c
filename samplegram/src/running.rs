use serde_json::{json, Value};

use crate::errors::HistogramError;

/// Online accumulator for mean, variance, sum and geometric mean.
///
/// Values are folded in one at a time with Welford's algorithm, so no raw
/// values are retained and merging two accumulators is a closed-form
/// combination rather than a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStatistics {
    count: u64,
    max: f64,
    min: f64,
    sum: f64,
    mean: f64,
    // Sum of squared deviations from the mean, not the variance itself.
    variance: f64,
    // Running mean of ln(value); None once a non-positive value is seen,
    // at which point the geometric mean is no longer defined.
    meanlogs: Option<f64>,
}

impl Default for RunningStatistics {
    fn default() -> Self {
        Self {
            count: 0,
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            sum: 0.0,
            mean: 0.0,
            variance: 0.0,
            meanlogs: Some(0.0),
        }
    }
}

impl RunningStatistics {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one value in.
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.max = self.max.max(value);
        self.min = self.min.min(value);
        self.sum += value;

        if value <= 0.0 {
            self.meanlogs = None;
        } else if let Some(meanlogs) = self.meanlogs {
            self.meanlogs = Some(meanlogs + (value.ln() - meanlogs) / self.count as f64);
        }

        if self.count == 1 {
            self.mean = value;
            self.variance = 0.0;
        } else {
            let old_mean = self.mean;
            self.mean = old_mean + (value - old_mean) / self.count as f64;
            self.variance += (value - old_mean) * (value - self.mean);
        }
    }

    /// How many values have been folded in.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Largest value seen, or None before any value.
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    /// Smallest value seen, or None before any value.
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Sum of all values seen.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Arithmetic mean, or None before any value.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample variance (n-1 denominator), or None before any value.
    pub fn variance(&self) -> Option<f64> {
        match self.count {
            0 => None,
            1 => Some(0.0),
            count => Some(self.variance / (count - 1) as f64),
        }
    }

    /// Sample standard deviation, or None before any value.
    pub fn stddev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Geometric mean of the values seen. Zero before any value, and zero
    /// once any non-positive value has made the geometric mean undefined.
    pub fn geometric_mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        match self.meanlogs {
            Some(meanlogs) => meanlogs.exp(),
            None => 0.0,
        }
    }

    /// Combine two accumulators as if their streams had been interleaved,
    /// using the parallel-variance combination formula.
    pub fn merge(&self, other: &Self) -> Self {
        let count = self.count + other.count;
        let mut result = Self {
            count,
            max: self.max.max(other.max),
            min: self.min.min(other.min),
            sum: self.sum + other.sum,
            mean: 0.0,
            variance: 0.0,
            meanlogs: None,
        };
        if self.count == 0 {
            result.mean = other.mean;
            result.variance = other.variance;
        } else if other.count == 0 {
            result.mean = self.mean;
            result.variance = self.variance;
        } else {
            result.mean = (self.mean * self.count as f64 + other.mean * other.count as f64)
                / count as f64;
            let delta = self.mean - other.mean;
            result.variance = self.variance
                + other.variance
                + (self.count as f64 * other.count as f64 * delta * delta) / count as f64;
        }
        result.meanlogs = match (self.meanlogs, other.meanlogs) {
            (Some(a), Some(b)) => {
                if count == 0 {
                    Some(0.0)
                } else {
                    Some((a * self.count as f64 + b * other.count as f64) / count as f64)
                }
            }
            _ => None,
        };
        result
    }

    /// The compact wire form:
    /// `[count, max, meanlogs, mean, min, sum, variance]`, or an empty
    /// array before any value has been folded in.
    pub fn to_dict(&self) -> Value {
        if self.count == 0 {
            return json!([]);
        }
        json!([
            self.count,
            self.max,
            self.meanlogs,
            self.mean,
            self.min,
            self.sum,
            self.variance,
        ])
    }

    /// Rebuild an accumulator from its wire form.
    pub fn from_dict(dict: &Value) -> Result<Self, HistogramError> {
        let entries = dict
            .as_array()
            .ok_or(HistogramError::MalformedField("running"))?;
        if entries.is_empty() {
            return Ok(Self::default());
        }
        if entries.len() != 7 {
            return Err(HistogramError::MalformedField("running"));
        }
        let number = |index: usize| {
            entries[index]
                .as_f64()
                .ok_or(HistogramError::MalformedField("running"))
        };
        Ok(Self {
            count: entries[0]
                .as_u64()
                .ok_or(HistogramError::MalformedField("running"))?,
            max: number(1)?,
            meanlogs: match &entries[2] {
                Value::Null => None,
                value => Some(
                    value
                        .as_f64()
                        .ok_or(HistogramError::MalformedField("running"))?,
                ),
            },
            mean: number(3)?,
            min: number(4)?,
            sum: number(5)?,
            variance: number(6)?,
        })
    }
}
