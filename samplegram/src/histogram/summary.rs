//! Summary-statistic selection, naming and export.

use serde_json::{Map, Value};

use crate::{
    errors::HistogramError,
    types::{BaseUnit, ImprovementDirection, Scalar, Unit},
};

use super::Histogram;

/// One exportable summary statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    /// Number of finite samples.
    Count,
    /// Sum of finite samples.
    Sum,
    /// Arithmetic mean.
    Avg,
    /// Sample standard deviation.
    Std,
    /// Smallest sample.
    Min,
    /// Largest sample.
    Max,
    /// Geometric mean.
    GeometricMean,
    /// Number of non-finite samples.
    Nans,
    /// An approximate percentile, `0.0..=1.0`.
    Percentile(f64),
}

impl Statistic {
    /// The exported name: `count`, `sum`, `avg`, `std`, `min`, `max`,
    /// `geometricMean`, `nans`, or `pct_<token>` for percentiles.
    pub fn name(&self) -> Result<String, HistogramError> {
        Ok(match self {
            Statistic::Count => "count".to_owned(),
            Statistic::Sum => "sum".to_owned(),
            Statistic::Avg => "avg".to_owned(),
            Statistic::Std => "std".to_owned(),
            Statistic::Min => "min".to_owned(),
            Statistic::Max => "max".to_owned(),
            Statistic::GeometricMean => "geometricMean".to_owned(),
            Statistic::Nans => "nans".to_owned(),
            Statistic::Percentile(percent) => format!("pct_{}", percentile_token(*percent)?),
        })
    }
}

/// The legacy percentile naming rule, pinned by golden tests:
/// `0` is `000` and `1` is `100`; any other percentile takes its shortest
/// decimal fraction digits, padded with zeros to at least two, with an
/// underscore after the second digit when more follow, all prefixed with
/// `0`. So 0.5 is `050`, 0.95 is `095`, 0.999 is `099_9`.
pub(crate) fn percentile_token(percent: f64) -> Result<String, HistogramError> {
    if !(0.0..=1.0).contains(&percent) {
        return Err(HistogramError::InvalidPercentile(percent));
    }
    if percent == 0.0 {
        return Ok("000".to_owned());
    }
    if percent == 1.0 {
        return Ok("100".to_owned());
    }
    let printed = format!("{percent}");
    let mut digits = printed
        .strip_prefix("0.")
        .ok_or(HistogramError::InvalidPercentile(percent))?
        .to_owned();
    while digits.len() < 2 {
        digits.push('0');
    }
    if digits.len() > 2 {
        digits.insert(2, '_');
    }
    Ok(format!("0{digits}"))
}

/// Which summary statistics a histogram exports.
///
/// The defaults match what dashboards expect from every histogram;
/// serialization only records deviations from them.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    /// Export the arithmetic mean.
    pub avg: bool,
    /// Export the geometric mean.
    pub geometric_mean: bool,
    /// Export the sample standard deviation.
    pub std: bool,
    /// Export the sample count.
    pub count: bool,
    /// Export the sum.
    pub sum: bool,
    /// Export the minimum.
    pub min: bool,
    /// Export the maximum.
    pub max: bool,
    /// Export the count of non-finite samples.
    pub nans: bool,
    /// Approximate percentiles to export, each within `0.0..=1.0`.
    pub percentile: Vec<f64>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            avg: true,
            geometric_mean: false,
            std: true,
            count: true,
            sum: true,
            min: true,
            max: true,
            nans: false,
            percentile: Vec::new(),
        }
    }
}

impl SummaryOptions {
    /// The statistics currently enabled, in export order.
    pub(crate) fn enabled_statistics(&self) -> Vec<Statistic> {
        let mut enabled = Vec::new();
        if self.avg {
            enabled.push(Statistic::Avg);
        }
        if self.geometric_mean {
            enabled.push(Statistic::GeometricMean);
        }
        if self.std {
            enabled.push(Statistic::Std);
        }
        if self.count {
            enabled.push(Statistic::Count);
        }
        if self.sum {
            enabled.push(Statistic::Sum);
        }
        if self.min {
            enabled.push(Statistic::Min);
        }
        if self.max {
            enabled.push(Statistic::Max);
        }
        if self.nans {
            enabled.push(Statistic::Nans);
        }
        enabled.extend(self.percentile.iter().map(|&p| Statistic::Percentile(p)));
        enabled
    }

    /// Overlay a partial wire dict onto these options. Options the dict
    /// does not mention keep their current value; unknown keys and
    /// mistyped values are logged and ignored.
    pub(crate) fn customize(&mut self, dict: &Map<String, Value>) {
        for (key, value) in dict {
            if key == "percentile" {
                match value.as_array() {
                    Some(percentiles) => {
                        self.percentile = percentiles.iter().filter_map(Value::as_f64).collect();
                    }
                    None => log::warn!("ignoring mistyped percentile summary option: {value}"),
                }
                continue;
            }
            let Some(enabled) = value.as_bool() else {
                log::warn!("ignoring mistyped summary option {key}: {value}");
                continue;
            };
            match key.as_str() {
                "avg" => self.avg = enabled,
                "geometricMean" => self.geometric_mean = enabled,
                "std" => self.std = enabled,
                "count" => self.count = enabled,
                "sum" => self.sum = enabled,
                "min" => self.min = enabled,
                "max" => self.max = enabled,
                "nans" => self.nans = enabled,
                unknown => log::warn!("ignoring unknown summary option {unknown:?}"),
            }
        }
    }

    /// The wire form: only entries that differ from the defaults, with a
    /// non-empty percentile list always included. None when nothing
    /// deviates.
    pub(crate) fn to_dict(&self) -> Option<Value> {
        let defaults = Self::default();
        let mut overridden = Map::new();
        let mut record = |name: &str, value: bool, default: bool| {
            if value != default {
                overridden.insert(name.to_owned(), Value::Bool(value));
            }
        };
        record("avg", self.avg, defaults.avg);
        record("geometricMean", self.geometric_mean, defaults.geometric_mean);
        record("std", self.std, defaults.std);
        record("count", self.count, defaults.count);
        record("sum", self.sum, defaults.sum);
        record("min", self.min, defaults.min);
        record("max", self.max, defaults.max);
        record("nans", self.nans, defaults.nans);
        if !self.percentile.is_empty() {
            overridden.insert("percentile".to_owned(), serde_json::json!(self.percentile));
        }
        if overridden.is_empty() {
            None
        } else {
            Some(Value::Object(overridden))
        }
    }
}

impl Histogram {
    /// Produce one named [`Scalar`] per enabled summary option.
    ///
    /// `count` and `nans` always export as plain counts where smaller is
    /// better; everything else carries the histogram's unit. Statistics
    /// that are undefined for an empty histogram (mean, min, max, stddev)
    /// are omitted rather than exported as placeholders.
    pub fn statistics_scalars(&self) -> Result<Vec<(String, Scalar)>, HistogramError> {
        let count_unit = Unit::new(BaseUnit::Count, ImprovementDirection::SmallerIsBetter);
        let mut results = Vec::new();
        for statistic in self.summary_options().enabled_statistics() {
            let scalar = match statistic {
                Statistic::Count => Some(Scalar {
                    unit: count_unit,
                    value: self.num_values() as f64,
                }),
                Statistic::Nans => Some(Scalar {
                    unit: count_unit,
                    value: self.num_nans() as f64,
                }),
                Statistic::Sum => Some(Scalar {
                    unit: self.unit(),
                    value: self.sum(),
                }),
                Statistic::GeometricMean => Some(Scalar {
                    unit: self.unit(),
                    value: self.geometric_mean(),
                }),
                Statistic::Avg => self.average().map(|value| Scalar {
                    unit: self.unit(),
                    value,
                }),
                Statistic::Std => self.standard_deviation().map(|value| Scalar {
                    unit: self.unit(),
                    value,
                }),
                Statistic::Min => self.running().min().map(|value| Scalar {
                    unit: self.unit(),
                    value,
                }),
                Statistic::Max => self.running().max().map(|value| Scalar {
                    unit: self.unit(),
                    value,
                }),
                Statistic::Percentile(percent) => Some(Scalar {
                    unit: self.unit(),
                    value: self.get_approximate_percentile(percent)?,
                }),
            };
            if let Some(scalar) = scalar {
                results.push((statistic.name()?, scalar));
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::{
        boundaries::BinBoundaries,
        histogram::Histogram,
        types::{BaseUnit, ImprovementDirection, Unit},
    };

    use super::{percentile_token, Statistic, SummaryOptions};

    #[test]
    fn percentile_tokens_golden() {
        assert_eq!("000", percentile_token(0.0).unwrap());
        assert_eq!("100", percentile_token(1.0).unwrap());
        assert_eq!("050", percentile_token(0.5).unwrap());
        assert_eq!("025", percentile_token(0.25).unwrap());
        assert_eq!("095", percentile_token(0.95).unwrap());
        assert_eq!("099_9", percentile_token(0.999).unwrap());
        assert_eq!("012_345", percentile_token(0.12345).unwrap());
    }

    #[test]
    fn out_of_range_percentiles_have_no_token() {
        assert!(percentile_token(-0.1).is_err());
        assert!(percentile_token(1.5).is_err());
        assert!(percentile_token(f64::NAN).is_err());
    }

    #[test]
    fn statistic_names() {
        assert_eq!("avg", Statistic::Avg.name().unwrap());
        assert_eq!("geometricMean", Statistic::GeometricMean.name().unwrap());
        assert_eq!("pct_095", Statistic::Percentile(0.95).name().unwrap());
    }

    #[test]
    fn default_options_have_no_wire_form() {
        assert_eq!(None, SummaryOptions::default().to_dict());
    }

    #[test]
    fn deviations_and_percentiles_are_recorded() {
        let options = SummaryOptions {
            nans: true,
            min: false,
            percentile: vec![0.5, 0.95],
            ..SummaryOptions::default()
        };
        assert_eq!(
            Some(json!({"min": false, "nans": true, "percentile": [0.5, 0.95]})),
            options.to_dict()
        );
    }

    #[test]
    fn customize_overlays_only_named_options() {
        let mut options = SummaryOptions::default();
        let dict = json!({"nans": true, "avg": false, "percentile": [0.9]});
        options.customize(dict.as_object().unwrap());
        assert!(options.nans);
        assert!(!options.avg);
        assert_eq!(vec![0.9], options.percentile);
        // Untouched options keep their defaults.
        assert!(options.std);
    }

    #[test]
    fn customize_ignores_unknown_and_mistyped_options() {
        let mut options = SummaryOptions::default();
        let dict = json!({"median": true, "avg": "yes"});
        options.customize(dict.as_object().unwrap());
        assert_eq!(SummaryOptions::default(), options);
    }

    #[test_log::test]
    fn scalars_cover_every_enabled_statistic() {
        let unit = Unit::new(BaseUnit::SizeBytes, ImprovementDirection::SmallerIsBetter);
        let boundaries = BinBoundaries::create_linear(0.0, 10.0, 5).unwrap();
        let mut histogram = Histogram::new("transfer_size", unit, &boundaries);
        histogram.summary_options_mut().nans = true;
        histogram.summary_options_mut().percentile = vec![0.5];
        for sample in [2.0, 4.0, 6.0] {
            histogram.add_sample(sample);
        }
        histogram.add_sample(f64::NAN);

        let scalars = histogram.statistics_scalars().unwrap();
        let names: Vec<&str> = scalars.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            vec!["avg", "std", "count", "sum", "min", "max", "nans", "pct_050"],
            names
        );
        let lookup = |name: &str| {
            scalars
                .iter()
                .find(|(scalar_name, _)| scalar_name == name)
                .map(|(_, scalar)| *scalar)
                .unwrap()
        };
        assert_eq!(4.0, lookup("avg").value);
        assert_eq!(3.0, lookup("count").value);
        assert_eq!(12.0, lookup("sum").value);
        assert_eq!(2.0, lookup("min").value);
        assert_eq!(6.0, lookup("max").value);
        assert_eq!(1.0, lookup("nans").value);
        assert_eq!(5.0, lookup("pct_050").value);
        // Counts are exported as plain counts, not in the sample unit.
        assert_eq!(BaseUnit::Count, lookup("count").unit.base());
        assert_eq!(BaseUnit::Count, lookup("nans").unit.base());
        assert_eq!(unit, lookup("avg").unit);
    }

    #[test]
    fn empty_histograms_omit_undefined_scalars() {
        let unit = Unit::new(BaseUnit::Count, ImprovementDirection::SmallerIsBetter);
        let boundaries = BinBoundaries::create_linear(0.0, 10.0, 5).unwrap();
        let histogram = Histogram::new("empty", unit, &boundaries);
        let scalars = histogram.statistics_scalars().unwrap();
        let names: Vec<&str> = scalars.iter().map(|(name, _)| name.as_str()).collect();
        // Mean, stddev, min and max are undefined with no samples.
        assert_eq!(vec!["count", "sum"], names);
    }

    #[test]
    fn enabled_statistics_follow_export_order() {
        let options = SummaryOptions {
            geometric_mean: true,
            percentile: vec![0.5],
            ..SummaryOptions::default()
        };
        let names: Vec<String> = options
            .enabled_statistics()
            .iter()
            .map(|statistic| statistic.name().unwrap())
            .collect();
        assert_eq!(
            vec!["avg", "geometricMean", "std", "count", "sum", "min", "max", "pct_050"],
            names
        );
    }
}
