use rand::Rng;
use serde_json::Value;

use crate::{
    errors::HistogramError,
    range::Range,
    sampling::{merge_sampled_streams, uniformly_sample_stream},
    types::AnnotationMap,
};

/// How many annotation maps a bin retains, reservoir-sampled over every
/// annotated sample the bin has counted.
pub(crate) const MAX_ANNOTATIONS: usize = 16;

/// One histogram bucket: a fixed range, a sample count, and a bounded
/// reservoir of per-sample annotations.
///
/// Bins never store sample values; the raw values live in the owning
/// histogram's own reservoir.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    range: Range,
    count: u64,
    annotations: Vec<AnnotationMap>,
}

impl HistogramBin {
    pub(crate) fn new(range: Range) -> Self {
        Self {
            range,
            count: 0,
            annotations: Vec::new(),
        }
    }

    /// The fixed range this bin covers.
    pub fn range(&self) -> Range {
        self.range
    }

    /// How many samples have landed in this bin.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The retained annotation maps, at most [`MAX_ANNOTATIONS`] of them.
    pub fn annotations(&self) -> &[AnnotationMap] {
        &self.annotations
    }

    /// Count one sample. The value itself is retained only by the owning
    /// histogram's reservoir.
    pub(crate) fn add_sample(&mut self) {
        self.count += 1;
    }

    /// Offer one sample's annotations to the bin's reservoir. The current
    /// count is the annotation stream length.
    pub(crate) fn add_annotations(&mut self, annotations: AnnotationMap, rng: &mut impl Rng) {
        uniformly_sample_stream(
            &mut self.annotations,
            self.count,
            annotations,
            MAX_ANNOTATIONS,
            rng,
        );
    }

    /// Fold `other` into this bin: weighted merge of the annotation
    /// reservoirs, then summed counts. The ranges must be identical.
    pub(crate) fn merge_from(
        &mut self,
        other: &HistogramBin,
        rng: &mut impl Rng,
    ) -> Result<(), HistogramError> {
        if self.range != other.range {
            return Err(HistogramError::IncompatibleRange);
        }
        merge_sampled_streams(
            &mut self.annotations,
            self.count,
            &other.annotations,
            other.count,
            MAX_ANNOTATIONS,
            rng,
        );
        self.count += other.count;
        Ok(())
    }

    /// Wire form: `[count]`, or `[count, [annotations...]]` when any
    /// annotations were retained.
    pub(crate) fn to_dict(&self) -> Value {
        if self.annotations.is_empty() {
            return serde_json::json!([self.count]);
        }
        let annotations: Vec<Value> = self
            .annotations
            .iter()
            .map(|map| Value::Object(map.clone()))
            .collect();
        serde_json::json!([self.count, annotations])
    }

    /// Restore count and annotations from the wire form. The range is not
    /// on the wire; it is reconstructed from the histogram's boundaries.
    pub(crate) fn apply_dict(&mut self, dict: &Value) -> Result<(), HistogramError> {
        let entries = dict
            .as_array()
            .filter(|entries| !entries.is_empty())
            .ok_or(HistogramError::MalformedField("bin"))?;
        self.count = entries[0]
            .as_u64()
            .ok_or(HistogramError::MalformedField("bin"))?;
        if let Some(annotations) = entries.get(1) {
            let annotations = annotations
                .as_array()
                .ok_or(HistogramError::MalformedField("bin"))?;
            for annotation in annotations {
                let map = annotation
                    .as_object()
                    .ok_or(HistogramError::MalformedField("bin"))?;
                self.annotations.push(map.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    use crate::{errors::HistogramError, range::Range, types::AnnotationMap};

    use super::{HistogramBin, MAX_ANNOTATIONS};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn annotation(key: &str) -> AnnotationMap {
        let mut map = AnnotationMap::new();
        map.insert(key.to_owned(), json!(true));
        map
    }

    #[test]
    fn samples_only_bump_the_count() {
        let mut bin = HistogramBin::new(Range::from_explicit_range(0.0, 1.0));
        bin.add_sample();
        bin.add_sample();
        assert_eq!(2, bin.count());
        assert!(bin.annotations().is_empty());
    }

    #[test]
    fn annotation_reservoir_is_bounded() {
        let mut rng = rng();
        let mut bin = HistogramBin::new(Range::from_explicit_range(0.0, 1.0));
        for i in 0..100 {
            bin.add_sample();
            bin.add_annotations(annotation(&format!("sample-{i}")), &mut rng);
            assert!(bin.annotations().len() <= MAX_ANNOTATIONS);
        }
        assert_eq!(MAX_ANNOTATIONS, bin.annotations().len());
    }

    #[test]
    fn merging_requires_identical_ranges() {
        let mut rng = rng();
        let mut bin = HistogramBin::new(Range::from_explicit_range(0.0, 1.0));
        let other = HistogramBin::new(Range::from_explicit_range(0.0, 2.0));
        assert_eq!(
            Err(HistogramError::IncompatibleRange),
            bin.merge_from(&other, &mut rng)
        );
    }

    #[test_log::test]
    fn merging_sums_counts_and_bounds_annotations() {
        let mut rng = rng();
        let range = Range::from_explicit_range(0.0, 1.0);
        let mut bin = HistogramBin::new(range);
        let mut other = HistogramBin::new(range);
        for i in 0..40 {
            bin.add_sample();
            bin.add_annotations(annotation(&format!("left-{i}")), &mut rng);
            other.add_sample();
            other.add_annotations(annotation(&format!("right-{i}")), &mut rng);
        }
        bin.merge_from(&other, &mut rng).unwrap();
        assert_eq!(80, bin.count());
        assert!(bin.annotations().len() <= MAX_ANNOTATIONS);
    }

    #[test]
    fn wire_form_skips_empty_annotations() {
        let mut bin = HistogramBin::new(Range::from_explicit_range(0.0, 1.0));
        bin.add_sample();
        assert_eq!(json!([1]), bin.to_dict());
    }

    #[test]
    fn wire_form_round_trips_annotations() {
        let mut rng = rng();
        let range = Range::from_explicit_range(0.0, 1.0);
        let mut bin = HistogramBin::new(range);
        bin.add_sample();
        bin.add_annotations(annotation("page"), &mut rng);

        let mut decoded = HistogramBin::new(range);
        decoded.apply_dict(&bin.to_dict()).unwrap();
        assert_eq!(bin, decoded);
    }

    #[test]
    fn malformed_bins_are_rejected() {
        let mut bin = HistogramBin::new(Range::from_explicit_range(0.0, 1.0));
        assert!(bin.apply_dict(&json!([])).is_err());
        assert!(bin.apply_dict(&json!("bin")).is_err());
        assert!(bin.apply_dict(&json!([1, "annotations"])).is_err());
    }
}
