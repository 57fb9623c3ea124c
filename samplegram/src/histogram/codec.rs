//! The histogram wire codec.
//!
//! Encoding is asymmetric with decoding: defaults are omitted wholesale to
//! keep results bundles small, and the central bins choose between a dense
//! array and a sparse index map depending on how empty the histogram is.
//! Decoding reverses all of it, resolving bin layouts through the boundary
//! cache so equal layouts come back structurally shared.

use serde_json::{Map, Value};

use crate::{
    boundaries::BoundaryCache, errors::HistogramError, running::RunningStatistics, types::Unit,
};

use super::{Histogram, HistogramBin};

/// How the central bins should be serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CentralBinsLayout {
    /// Every bin is empty: serialize nothing.
    Omit,
    /// Mostly empty: an index-to-bin map is smaller.
    Sparse,
    /// Mostly occupied: a plain array is smaller.
    Dense,
}

/// Choose the central-bin serialization from the emptiness ratio: omit
/// everything when all bins are empty, go sparse when more than half are.
pub(crate) fn central_bins_layout(empty_bins: usize, total_bins: usize) -> CentralBinsLayout {
    if empty_bins == total_bins {
        CentralBinsLayout::Omit
    } else if empty_bins * 2 > total_bins {
        CentralBinsLayout::Sparse
    } else {
        CentralBinsLayout::Dense
    }
}

impl Histogram {
    /// Serialize to the compact wire form.
    ///
    /// Takes `&mut self` because serializing allocates the histogram's
    /// guid if it has never been read.
    pub fn as_dict(&mut self) -> Value {
        let guid = self.guid().to_owned();
        let mut dict = Map::new();
        dict.insert("binBoundaries".to_owned(), self.bin_boundaries.to_dict());
        dict.insert("name".to_owned(), Value::from(self.name.as_str()));
        dict.insert("unit".to_owned(), Value::from(self.unit.name()));
        dict.insert("guid".to_owned(), Value::from(guid));
        if let Some(short_name) = &self.short_name {
            dict.insert("shortName".to_owned(), Value::from(short_name.as_str()));
        }
        if !self.description.is_empty() {
            dict.insert("description".to_owned(), Value::from(self.description.as_str()));
        }
        if !self.diagnostics.is_empty() {
            dict.insert("diagnostics".to_owned(), Value::Object(self.diagnostics.clone()));
        }
        if self.max_num_sample_values != self.default_max_num_sample_values() {
            dict.insert(
                "maxNumSampleValues".to_owned(),
                Value::from(self.max_num_sample_values as u64),
            );
        }
        if self.num_nans > 0 {
            dict.insert("numNans".to_owned(), Value::from(self.num_nans));
        }
        if !self.nan_annotations.is_empty() {
            let annotations: Vec<Value> = self
                .nan_annotations
                .iter()
                .map(|map| Value::Object(map.clone()))
                .collect();
            dict.insert("nanDiagnostics".to_owned(), Value::Array(annotations));
        }
        if self.underflow_bin.count() > 0 {
            dict.insert("underflowBin".to_owned(), self.underflow_bin.to_dict());
        }
        if self.overflow_bin.count() > 0 {
            dict.insert("overflowBin".to_owned(), self.overflow_bin.to_dict());
        }
        if self.num_values() > 0 {
            // Non-finite reservoir entries have no JSON number; they decode
            // back as NaN, which is how they are accounted anyway.
            let samples: Vec<Value> = self.sample_values.iter().map(|&v| Value::from(v)).collect();
            dict.insert("sampleValues".to_owned(), Value::Array(samples));
            dict.insert("running".to_owned(), self.running.to_dict());
            if let Some(central_bins) = self.central_bins_as_dict() {
                dict.insert("centralBins".to_owned(), central_bins);
            }
        }
        if let Some(summary_options) = self.summary_options.to_dict() {
            dict.insert("summaryOptions".to_owned(), summary_options);
        }
        Value::Object(dict)
    }

    fn central_bins_as_dict(&self) -> Option<Value> {
        let empty_bins = self
            .central_bins
            .iter()
            .filter(|bin| bin.count() == 0)
            .count();
        match central_bins_layout(empty_bins, self.central_bins.len()) {
            CentralBinsLayout::Omit => None,
            CentralBinsLayout::Sparse => {
                let mut sparse = Map::new();
                for (index, bin) in self.central_bins.iter().enumerate() {
                    if bin.count() > 0 {
                        sparse.insert(index.to_string(), bin.to_dict());
                    }
                }
                Some(Value::Object(sparse))
            }
            CentralBinsLayout::Dense => Some(Value::Array(
                self.central_bins.iter().map(HistogramBin::to_dict).collect(),
            )),
        }
    }

    /// Decode a histogram from its wire form, interning the bin layout in
    /// the process-wide [`BoundaryCache`].
    pub fn from_dict(dict: &Value) -> Result<Self, HistogramError> {
        Self::from_dict_with_cache(dict, BoundaryCache::global())
    }

    /// Decode a histogram, interning the bin layout in `cache`. The
    /// decoded histogram answers every query identically to the one that
    /// was encoded.
    pub fn from_dict_with_cache(
        dict: &Value,
        cache: &BoundaryCache,
    ) -> Result<Self, HistogramError> {
        let object = dict
            .as_object()
            .ok_or(HistogramError::MalformedField("histogram"))?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or(HistogramError::MalformedField("name"))?;
        let unit = Unit::from_name(
            object
                .get("unit")
                .and_then(Value::as_str)
                .ok_or(HistogramError::MalformedField("unit"))?,
        )?;
        let boundaries = cache.resolve(
            object
                .get("binBoundaries")
                .ok_or(HistogramError::MalformedField("binBoundaries"))?,
        )?;
        let mut histogram = Histogram::new(name, unit, &boundaries);

        let guid = object
            .get("guid")
            .and_then(Value::as_str)
            .ok_or(HistogramError::MalformedField("guid"))?;
        histogram.set_guid(guid)?;
        if let Some(short_name) = object.get("shortName").and_then(Value::as_str) {
            histogram.set_short_name(short_name);
        }
        if let Some(description) = object.get("description").and_then(Value::as_str) {
            histogram.set_description(description);
        }
        if let Some(diagnostics) = object.get("diagnostics") {
            histogram.diagnostics = diagnostics
                .as_object()
                .ok_or(HistogramError::MalformedField("diagnostics"))?
                .clone();
        }
        if let Some(underflow) = object.get("underflowBin") {
            histogram.underflow_bin.apply_dict(underflow)?;
        }
        if let Some(overflow) = object.get("overflowBin") {
            histogram.overflow_bin.apply_dict(overflow)?;
        }
        if let Some(central_bins) = object.get("centralBins") {
            histogram.apply_central_bins_dict(central_bins)?;
        }
        histogram.max_count = histogram
            .all_bins()
            .map(HistogramBin::count)
            .max()
            .unwrap_or(0);
        if let Some(running) = object.get("running") {
            histogram.running = RunningStatistics::from_dict(running)?;
        }
        if let Some(summary_options) = object.get("summaryOptions") {
            let summary_options = summary_options
                .as_object()
                .ok_or(HistogramError::MalformedField("summaryOptions"))?;
            histogram.summary_options.customize(summary_options);
        }
        if let Some(max_num_sample_values) = object.get("maxNumSampleValues") {
            let max_num_sample_values = max_num_sample_values
                .as_u64()
                .ok_or(HistogramError::MalformedField("maxNumSampleValues"))?;
            histogram.set_max_num_sample_values(max_num_sample_values as usize);
        }
        if let Some(sample_values) = object.get("sampleValues") {
            let sample_values = sample_values
                .as_array()
                .ok_or(HistogramError::MalformedField("sampleValues"))?;
            histogram.sample_values = sample_values
                .iter()
                .map(|value| match value {
                    // Non-finite samples serialize as null.
                    Value::Null => Ok(f64::NAN),
                    value => value
                        .as_f64()
                        .ok_or(HistogramError::MalformedField("sampleValues")),
                })
                .collect::<Result<Vec<f64>, HistogramError>>()?;
        }
        if let Some(num_nans) = object.get("numNans") {
            histogram.num_nans = num_nans
                .as_u64()
                .ok_or(HistogramError::MalformedField("numNans"))?;
        }
        if let Some(nan_annotations) = object.get("nanDiagnostics") {
            let nan_annotations = nan_annotations
                .as_array()
                .ok_or(HistogramError::MalformedField("nanDiagnostics"))?;
            for annotation in nan_annotations {
                let map = annotation
                    .as_object()
                    .ok_or(HistogramError::MalformedField("nanDiagnostics"))?;
                histogram.nan_annotations.push(map.clone());
            }
        }
        Ok(histogram)
    }

    fn apply_central_bins_dict(&mut self, central_bins: &Value) -> Result<(), HistogramError> {
        match central_bins {
            Value::Array(bins) => {
                if bins.len() > self.central_bins.len() {
                    return Err(HistogramError::MalformedField("centralBins"));
                }
                for (index, bin_dict) in bins.iter().enumerate() {
                    self.central_bins[index].apply_dict(bin_dict)?;
                }
                Ok(())
            }
            Value::Object(bins) => {
                for (key, bin_dict) in bins {
                    let index: usize = key
                        .parse()
                        .map_err(|_| HistogramError::MalformedField("centralBins"))?;
                    self.central_bins
                        .get_mut(index)
                        .ok_or(HistogramError::MalformedField("centralBins"))?
                        .apply_dict(bin_dict)?;
                }
                Ok(())
            }
            _ => Err(HistogramError::MalformedField("centralBins")),
        }
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    use crate::{
        boundaries::{BinBoundaries, BoundaryCache},
        histogram::Histogram,
        types::{AnnotationMap, BaseUnit, ImprovementDirection, Unit},
    };

    use super::{central_bins_layout, CentralBinsLayout};

    fn ms() -> Unit {
        Unit::new(BaseUnit::TimeDurationMs, ImprovementDirection::SmallerIsBetter)
    }

    fn linear_histogram(name: &str) -> Histogram {
        let boundaries = BinBoundaries::create_linear(0.0, 10.0, 5).unwrap();
        Histogram::with_rng(name, ms(), &boundaries, StdRng::seed_from_u64(9))
    }

    #[test]
    fn layout_choice_is_a_pure_function_of_emptiness() {
        assert_eq!(CentralBinsLayout::Omit, central_bins_layout(5, 5));
        assert_eq!(CentralBinsLayout::Omit, central_bins_layout(0, 0));
        assert_eq!(CentralBinsLayout::Sparse, central_bins_layout(4, 5));
        assert_eq!(CentralBinsLayout::Sparse, central_bins_layout(3, 5));
        assert_eq!(CentralBinsLayout::Dense, central_bins_layout(2, 5));
        assert_eq!(CentralBinsLayout::Dense, central_bins_layout(2, 4));
        assert_eq!(CentralBinsLayout::Dense, central_bins_layout(0, 5));
    }

    #[test]
    fn empty_histograms_encode_only_their_identity() {
        let mut histogram = linear_histogram("empty");
        let dict = histogram.as_dict();
        let object = dict.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(vec!["binBoundaries", "guid", "name", "unit"], keys);
        assert_eq!(json!("empty"), object["name"]);
        assert_eq!(json!("timeDurationInMs_smallerIsBetter"), object["unit"]);
    }

    #[test]
    fn all_empty_central_bins_are_omitted_entirely() {
        let mut histogram = linear_histogram("catch_alls_only");
        histogram.add_sample(-5.0);
        histogram.add_sample(50.0);
        let dict = histogram.as_dict();
        assert!(dict.get("centralBins").is_none());
        assert!(dict.get("underflowBin").is_some());
        assert!(dict.get("overflowBin").is_some());
    }

    #[test]
    fn mostly_empty_central_bins_encode_sparsely() {
        let mut histogram = linear_histogram("sparse");
        histogram.add_sample(1.0);
        histogram.add_sample(1.5);
        let dict = histogram.as_dict();
        let central_bins = dict.get("centralBins").unwrap();
        assert!(central_bins.is_object(), "expected a sparse map");
        assert_eq!(json!([2]), central_bins["0"]);
    }

    #[test]
    fn mostly_occupied_central_bins_encode_densely() {
        let mut histogram = linear_histogram("dense");
        for sample in [1.0, 3.0, 5.0, 7.0, 9.0] {
            histogram.add_sample(sample);
        }
        let dict = histogram.as_dict();
        let central_bins = dict.get("centralBins").unwrap();
        assert!(central_bins.is_array(), "expected a dense array");
        assert_eq!(json!([[1], [1], [1], [1], [1]]), *central_bins);
    }

    #[test_log::test]
    fn round_trip_preserves_every_observable_query() {
        let mut histogram = linear_histogram("round_trip");
        let mut annotations = AnnotationMap::new();
        annotations.insert("page".to_owned(), json!("index.html"));
        for sample in [0.5, 1.0, 2.5, 2.6, 4.0, 9.9, 25.0, -3.0] {
            histogram.add_sample(sample);
        }
        histogram.add_sample_with_annotations(3.0, annotations);
        histogram.add_sample(f64::NAN);
        histogram.add_sample(f64::NAN);

        let cache = BoundaryCache::new();
        let dict = histogram.as_dict();
        let decoded = Histogram::from_dict_with_cache(&dict, &cache).unwrap();

        assert_eq!(histogram.num_values(), decoded.num_values());
        assert_eq!(histogram.num_nans(), decoded.num_nans());
        assert_eq!(histogram.sum(), decoded.sum());
        assert_eq!(histogram.average(), decoded.average());
        assert_eq!(
            histogram.standard_deviation(),
            decoded.standard_deviation()
        );
        assert_eq!(histogram.max_count(), decoded.max_count());
        assert_eq!(
            histogram.max_num_sample_values(),
            decoded.max_num_sample_values()
        );
        for percent in [0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0] {
            assert_eq!(
                histogram.get_approximate_percentile(percent).unwrap(),
                decoded.get_approximate_percentile(percent).unwrap(),
                "percentile {percent} diverged"
            );
        }
        // The reservoir survives, NaN entries included.
        assert_eq!(histogram.sample_values().len(), decoded.sample_values().len());
        assert_eq!(
            histogram.sample_values().iter().filter(|v| v.is_nan()).count(),
            decoded.sample_values().iter().filter(|v| v.is_nan()).count()
        );
    }

    #[test]
    fn round_trip_keeps_the_guid_and_identity_fields() {
        let mut histogram = linear_histogram("identity");
        histogram.set_guid("f0b1c2d3-aaaa-4bbb-8ccc-0123456789ab").unwrap();
        histogram.set_short_name("ident");
        histogram.set_description("identity fields");
        histogram
            .diagnostics_mut()
            .insert("benchmark".to_owned(), json!("speedometer"));

        let mut decoded = Histogram::from_dict(&histogram.as_dict()).unwrap();
        assert_eq!("f0b1c2d3-aaaa-4bbb-8ccc-0123456789ab", decoded.guid());
        assert_eq!(Some("ident"), decoded.short_name());
        assert_eq!("identity fields", decoded.description());
        assert_eq!(histogram.diagnostics(), decoded.diagnostics());
        assert_eq!(histogram.name(), decoded.name());
        assert_eq!(histogram.unit(), decoded.unit());
    }

    #[test]
    fn round_trip_keeps_customized_summary_options() {
        let mut histogram = linear_histogram("options");
        histogram.summary_options_mut().nans = true;
        histogram.summary_options_mut().min = false;
        histogram.summary_options_mut().percentile = vec![0.5, 0.95];
        histogram.add_sample(1.0);

        let dict = histogram.as_dict();
        assert_eq!(
            json!({"min": false, "nans": true, "percentile": [0.5, 0.95]}),
            dict["summaryOptions"]
        );
        let decoded = Histogram::from_dict(&dict).unwrap();
        assert_eq!(histogram.summary_options(), decoded.summary_options());
    }

    #[test]
    fn default_summary_options_are_not_encoded() {
        let mut histogram = linear_histogram("options");
        histogram.add_sample(1.0);
        assert!(histogram.as_dict().get("summaryOptions").is_none());
    }

    #[test]
    fn non_default_reservoir_capacity_is_encoded() {
        let mut histogram = linear_histogram("capacity");
        assert!(histogram.as_dict().get("maxNumSampleValues").is_none());
        histogram.set_max_num_sample_values(5);
        assert_eq!(json!(5), histogram.as_dict()["maxNumSampleValues"]);
        let decoded = Histogram::from_dict(&histogram.as_dict()).unwrap();
        assert_eq!(5, decoded.max_num_sample_values());
    }

    #[test]
    fn annotations_round_trip_through_bins() {
        let mut histogram = linear_histogram("annotated");
        let mut annotations = AnnotationMap::new();
        annotations.insert("url".to_owned(), json!("https://example.test/"));
        histogram.add_sample_with_annotations(1.0, annotations.clone());
        histogram.add_sample_with_annotations(f64::NAN, annotations.clone());

        let decoded = Histogram::from_dict(&histogram.as_dict()).unwrap();
        assert_eq!(&[annotations.clone()], decoded.bin_for_value(1.0).annotations());
        assert_eq!(&[annotations], decoded.nan_annotations());
    }

    #[test]
    fn decoding_interns_identical_layouts() {
        let cache = BoundaryCache::new();
        let mut h1 = linear_histogram("one");
        let mut h2 = linear_histogram("two");
        let d1 = Histogram::from_dict_with_cache(&h1.as_dict(), &cache).unwrap();
        let d2 = Histogram::from_dict_with_cache(&h2.as_dict(), &cache).unwrap();
        assert_eq!(1, cache.len());
        assert!(d1.can_merge_from(&d2));
    }

    #[test]
    fn malformed_histograms_are_rejected() {
        assert!(Histogram::from_dict(&json!([])).is_err());
        assert!(Histogram::from_dict(&json!({})).is_err());
        assert!(Histogram::from_dict(&json!({
            "name": "x", "unit": "count", "guid": "g",
        }))
        .is_err());
        assert!(Histogram::from_dict(&json!({
            "name": "x", "unit": "lightyears", "guid": "g", "binBoundaries": [0.0, 1.0],
        }))
        .is_err());
        // A central-bin index beyond the layout.
        assert!(Histogram::from_dict(&json!({
            "name": "x", "unit": "count", "guid": "g", "binBoundaries": [0.0, 1.0],
            "centralBins": {"7": [1]},
        }))
        .is_err());
    }

    #[test]
    fn decoded_histograms_keep_accumulating() {
        let mut histogram = linear_histogram("continue");
        for sample in [1.0, 3.0, 5.0] {
            histogram.add_sample(sample);
        }
        let mut decoded = Histogram::from_dict(&histogram.as_dict()).unwrap();
        decoded.add_sample(7.0);
        assert_eq!(4, decoded.num_values());
        assert_eq!(Some(4.0), decoded.average());
    }
}
