//! The histogram aggregate: bounded bins, running statistics, sample
//! reservoirs and NaN bookkeeping behind one ingestion call.

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    boundaries::{default_boundaries_for_unit, BinBoundaries},
    errors::HistogramError,
    range::Range,
    running::RunningStatistics,
    sampling::{merge_sampled_streams, uniformly_sample_array, uniformly_sample_stream},
    significance::{mann_whitney_u, Significance, DEFAULT_ALPHA},
    types::{allocate_uuid4, AnnotationMap, ImprovementDirection, Unit},
};

mod bin;
mod codec;
mod summary;

pub use bin::HistogramBin;
pub use summary::{Statistic, SummaryOptions};

use bin::MAX_ANNOTATIONS;

/// An approximate-distribution summary of a stream of numeric samples.
///
/// A histogram owns an underflow bin, an overflow bin and an ordered run
/// of central bins stamped out from a [`BinBoundaries`] layout. Ingested
/// samples update a bin count, an online statistics accumulator and a
/// bounded reservoir of raw values; non-finite samples are quarantined
/// into separate NaN bookkeeping. Histograms with identical units and bin
/// layouts can be merged (shard reduction) or compared for statistical
/// significance, and every histogram round-trips through a compact wire
/// form.
#[derive(Debug, Clone)]
pub struct Histogram {
    name: String,
    unit: Unit,
    // None until first read or decode; immutable once set.
    guid: Option<String>,
    short_name: Option<String>,
    description: String,
    diagnostics: AnnotationMap,
    summary_options: SummaryOptions,
    bin_boundaries: BinBoundaries,
    underflow_bin: HistogramBin,
    overflow_bin: HistogramBin,
    central_bins: Vec<HistogramBin>,
    running: RunningStatistics,
    sample_values: Vec<f64>,
    max_num_sample_values: usize,
    num_nans: u64,
    nan_annotations: Vec<AnnotationMap>,
    max_count: u64,
    rng: StdRng,
}

enum BinPosition {
    Underflow,
    Central(usize),
    Overflow,
}

impl Histogram {
    /// A histogram with the given bin layout.
    pub fn new(name: impl Into<String>, unit: Unit, bin_boundaries: &BinBoundaries) -> Self {
        Self::with_rng(name, unit, bin_boundaries, StdRng::from_entropy())
    }

    /// A histogram using the default bin layout for the unit's base.
    pub fn with_default_boundaries(name: impl Into<String>, unit: Unit) -> Self {
        Self::new(name, unit, &default_boundaries_for_unit(unit.base()))
    }

    /// A histogram with an injected random source, for deterministic
    /// reservoir behavior in tests.
    pub fn with_rng(
        name: impl Into<String>,
        unit: Unit,
        bin_boundaries: &BinBoundaries,
        rng: StdRng,
    ) -> Self {
        let boundaries = bin_boundaries.boundaries();
        let underflow_bin = HistogramBin::new(Range::from_explicit_range(
            f64::MIN,
            boundaries[0],
        ));
        let overflow_bin = HistogramBin::new(Range::from_explicit_range(
            boundaries[boundaries.len() - 1],
            f64::MAX,
        ));
        let central_bins: Vec<HistogramBin> =
            bin_boundaries.bin_ranges().map(HistogramBin::new).collect();
        let max_num_sample_values = (central_bins.len() + 2) * 10;
        Self {
            name: name.into(),
            unit,
            guid: None,
            short_name: None,
            description: String::new(),
            diagnostics: AnnotationMap::new(),
            summary_options: SummaryOptions::default(),
            bin_boundaries: bin_boundaries.clone(),
            underflow_bin,
            overflow_bin,
            central_bins,
            running: RunningStatistics::new(),
            sample_values: Vec::new(),
            max_num_sample_values,
            num_nans: 0,
            nan_annotations: Vec::new(),
            max_count: 0,
            rng,
        }
    }

    /// Summarize a fixed batch of scalars: the bin layout is sized to the
    /// samples via [`BinBoundaries::create_from_samples`] and every sample
    /// is ingested. The raw-value reservoir is widened to 1000 entries so
    /// small batches survive verbatim.
    pub fn build_from_samples(
        name: impl Into<String>,
        unit: Unit,
        samples: &[f64],
    ) -> Result<Self, HistogramError> {
        let boundaries = BinBoundaries::create_from_samples(samples)?;
        let mut result = Self::new(name, unit, &boundaries);
        result.set_max_num_sample_values(1000);
        for &sample in samples {
            result.add_sample(sample);
        }
        Ok(result)
    }

    /// A histogram with this one's name, unit and bin layout, but none of
    /// its data.
    pub fn clone_empty(&self) -> Self {
        Self::new(self.name.clone(), self.unit, &self.bin_boundaries)
    }

    /// The histogram's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unit every sample is measured in.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// The stable identifier, allocated on first read and never changed
    /// afterwards.
    pub fn guid(&mut self) -> &str {
        let rng = &mut self.rng;
        self.guid.get_or_insert_with(|| allocate_uuid4(rng))
    }

    /// Assign the identifier explicitly. Fails once any identifier has
    /// been read or assigned: a guid transitions None to Some exactly
    /// once.
    pub fn set_guid(&mut self, guid: impl Into<String>) -> Result<(), HistogramError> {
        if self.guid.is_some() {
            return Err(HistogramError::GuidAlreadySet);
        }
        self.guid = Some(guid.into());
        Ok(())
    }

    /// An optional short display name.
    pub fn short_name(&self) -> Option<&str> {
        self.short_name.as_deref()
    }

    /// Set the short display name.
    pub fn set_short_name(&mut self, short_name: impl Into<String>) {
        self.short_name = Some(short_name.into());
    }

    /// A free-form description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Set the description.
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Histogram-level annotations.
    pub fn diagnostics(&self) -> &AnnotationMap {
        &self.diagnostics
    }

    /// Histogram-level annotations, writable.
    pub fn diagnostics_mut(&mut self) -> &mut AnnotationMap {
        &mut self.diagnostics
    }

    /// Which summary statistics this histogram exports.
    pub fn summary_options(&self) -> &SummaryOptions {
        &self.summary_options
    }

    /// Which summary statistics this histogram exports, writable.
    pub fn summary_options_mut(&mut self) -> &mut SummaryOptions {
        &mut self.summary_options
    }

    /// The layout this histogram's central bins were stamped from.
    pub fn bin_boundaries(&self) -> &BinBoundaries {
        &self.bin_boundaries
    }

    /// The catch-all bin below the central range.
    pub fn underflow_bin(&self) -> &HistogramBin {
        &self.underflow_bin
    }

    /// The catch-all bin above the central range.
    pub fn overflow_bin(&self) -> &HistogramBin {
        &self.overflow_bin
    }

    /// The central bins, in ascending range order.
    pub fn central_bins(&self) -> &[HistogramBin] {
        &self.central_bins
    }

    /// Every bin in ascending range order: underflow, central, overflow.
    pub fn all_bins(&self) -> impl Iterator<Item = &HistogramBin> {
        std::iter::once(&self.underflow_bin)
            .chain(self.central_bins.iter())
            .chain(std::iter::once(&self.overflow_bin))
    }

    /// The online statistics accumulator over finite samples.
    pub fn running(&self) -> &RunningStatistics {
        &self.running
    }

    /// The bounded reservoir of raw sample values.
    pub fn sample_values(&self) -> &[f64] {
        &self.sample_values
    }

    /// The reservoir capacity for raw sample values.
    pub fn max_num_sample_values(&self) -> usize {
        self.max_num_sample_values
    }

    /// Resize the raw-value reservoir, down-sampling uniformly if it
    /// shrinks below the values already retained.
    pub fn set_max_num_sample_values(&mut self, max_num_sample_values: usize) {
        self.max_num_sample_values = max_num_sample_values;
        uniformly_sample_array(
            &mut self.sample_values,
            self.max_num_sample_values,
            &mut self.rng,
        );
    }

    pub(crate) fn default_max_num_sample_values(&self) -> usize {
        (self.central_bins.len() + 2) * 10
    }

    /// How many non-finite samples were ingested.
    pub fn num_nans(&self) -> u64 {
        self.num_nans
    }

    /// Annotations retained from non-finite samples.
    pub fn nan_annotations(&self) -> &[AnnotationMap] {
        &self.nan_annotations
    }

    /// How many finite samples were ingested: the sum of all bin counts.
    pub fn num_values(&self) -> u64 {
        self.all_bins().map(HistogramBin::count).sum()
    }

    /// The largest single bin count, kept denormalized for fast access.
    pub fn max_count(&self) -> u64 {
        self.max_count
    }

    /// Arithmetic mean of the finite samples, None before any.
    pub fn average(&self) -> Option<f64> {
        self.running.mean()
    }

    /// Sample standard deviation of the finite samples, None before any.
    pub fn standard_deviation(&self) -> Option<f64> {
        self.running.stddev()
    }

    /// Geometric mean of the finite samples, zero when undefined.
    pub fn geometric_mean(&self) -> f64 {
        self.running.geometric_mean()
    }

    /// Sum of the finite samples.
    pub fn sum(&self) -> f64 {
        self.running.sum()
    }

    /// Ingest one sample.
    pub fn add_sample(&mut self, value: f64) {
        self.ingest(value, None);
    }

    /// Ingest one sample carrying annotations. The annotations follow the
    /// sample into its bin's bounded reservoir (or the NaN reservoir for
    /// non-finite samples).
    pub fn add_sample_with_annotations(&mut self, value: f64, annotations: AnnotationMap) {
        self.ingest(value, Some(annotations));
    }

    fn ingest(&mut self, value: f64, annotations: Option<AnnotationMap>) {
        if !value.is_finite() {
            self.num_nans += 1;
            if let Some(annotations) = annotations {
                uniformly_sample_stream(
                    &mut self.nan_annotations,
                    self.num_nans,
                    annotations,
                    MAX_ANNOTATIONS,
                    &mut self.rng,
                );
            }
        } else {
            self.running.add(value);
            let position = self.bin_position_for_value(value);
            let rng = &mut self.rng;
            let bin = match position {
                BinPosition::Underflow => &mut self.underflow_bin,
                BinPosition::Central(index) => &mut self.central_bins[index],
                BinPosition::Overflow => &mut self.overflow_bin,
            };
            bin.add_sample();
            if let Some(annotations) = annotations {
                bin.add_annotations(annotations, rng);
            }
            if bin.count() > self.max_count {
                self.max_count = bin.count();
            }
        }

        // Non-finite samples count toward reservoir admission pressure
        // even though they are excluded from bins and statistics.
        let stream_length = self.num_values() + self.num_nans;
        uniformly_sample_stream(
            &mut self.sample_values,
            stream_length,
            value,
            self.max_num_sample_values,
            &mut self.rng,
        );
    }

    /// The bin a finite value falls into.
    pub fn bin_for_value(&self, value: f64) -> &HistogramBin {
        match self.bin_position_for_value(value) {
            BinPosition::Underflow => &self.underflow_bin,
            BinPosition::Central(index) => &self.central_bins[index],
            BinPosition::Overflow => &self.overflow_bin,
        }
    }

    fn bin_position_for_value(&self, value: f64) -> BinPosition {
        if value < self.underflow_bin.range().max() {
            return BinPosition::Underflow;
        }
        // First bin whose upper bound exceeds the value; the bins' upper
        // bounds are sorted, so this is a binary search.
        let index = self
            .central_bins
            .partition_point(|bin| bin.range().max() <= value);
        if index < self.central_bins.len() {
            BinPosition::Central(index)
        } else {
            BinPosition::Overflow
        }
    }

    /// Approximate the `percent` percentile (within [0, 1]) from bin
    /// counts.
    ///
    /// Walks bins in ascending order, skipping `floor((n-1) * percent)`
    /// samples, and answers with the landing bin's center (its boundary
    /// toward the central range for the underflow and overflow bins). The
    /// estimate therefore deviates from the true percentile by at most the
    /// width of the bin the true value lies in. An empty histogram answers
    /// zero.
    pub fn get_approximate_percentile(&self, percent: f64) -> Result<f64, HistogramError> {
        if !(0.0..=1.0).contains(&percent) {
            return Err(HistogramError::InvalidPercentile(percent));
        }
        let num_values = self.num_values();
        if num_values == 0 {
            return Ok(0.0);
        }
        let mut values_to_skip = ((num_values - 1) as f64 * percent).floor() as i64;
        values_to_skip -= self.underflow_bin.count() as i64;
        if values_to_skip < 0 {
            return Ok(self.underflow_bin.range().max());
        }
        for bin in &self.central_bins {
            values_to_skip -= bin.count() as i64;
            if values_to_skip < 0 {
                return Ok(bin.range().center());
            }
        }
        Ok(self.overflow_bin.range().min())
    }

    /// Whether the distributions behind this histogram and `other` differ
    /// beyond chance, per a Mann-Whitney U test over the two sample
    /// reservoirs at level `alpha` (default [`DEFAULT_ALPHA`]).
    ///
    /// Units must match; a unit that does not care about improvement
    /// direction answers [`Significance::DontCare`] without testing.
    pub fn get_difference_significance(
        &self,
        other: &Histogram,
        alpha: Option<f64>,
    ) -> Result<Significance, HistogramError> {
        if self.unit != other.unit {
            return Err(HistogramError::UnitMismatch {
                left: self.unit,
                right: other.unit,
            });
        }
        if self.unit.direction() == ImprovementDirection::DontCare {
            return Ok(Significance::DontCare);
        }
        let result = mann_whitney_u(
            &self.sample_values,
            &other.sample_values,
            alpha.unwrap_or(DEFAULT_ALPHA),
        );
        Ok(result.significance)
    }

    /// Whether `other` can be folded into this histogram: identical units
    /// and pairwise-equal bin ranges.
    pub fn can_merge_from(&self, other: &Histogram) -> bool {
        self.unit == other.unit
            && self.central_bins.len() == other.central_bins.len()
            && self
                .all_bins()
                .zip(other.all_bins())
                .all(|(mine, theirs)| mine.range() == theirs.range())
    }

    /// Fold `other` into this histogram in place.
    ///
    /// Reads `other`, mutates only `self`, and retains no references into
    /// `other`: reservoirs merge weighted by their stream lengths, running
    /// statistics combine algebraically, and bins merge pairwise in
    /// order. The raw-value reservoir merges at the mean of the two
    /// capacities.
    pub fn merge_from(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        if self.unit != other.unit {
            return Err(HistogramError::UnitMismatch {
                left: self.unit,
                right: other.unit,
            });
        }
        if !self.can_merge_from(other) {
            return Err(HistogramError::IncompatibleBins);
        }

        merge_sampled_streams(
            &mut self.nan_annotations,
            self.num_nans,
            &other.nan_annotations,
            other.num_nans,
            MAX_ANNOTATIONS,
            &mut self.rng,
        );
        let merge_capacity = (self.max_num_sample_values + other.max_num_sample_values) / 2;
        let num_values = self.num_values();
        merge_sampled_streams(
            &mut self.sample_values,
            num_values,
            &other.sample_values,
            other.num_values(),
            merge_capacity,
            &mut self.rng,
        );
        self.num_nans += other.num_nans;
        self.running = self.running.merge(&other.running);

        self.underflow_bin
            .merge_from(&other.underflow_bin, &mut self.rng)?;
        for (bin, other_bin) in self.central_bins.iter_mut().zip(other.central_bins.iter()) {
            bin.merge_from(other_bin, &mut self.rng)?;
        }
        self.overflow_bin
            .merge_from(&other.overflow_bin, &mut self.rng)?;

        self.max_count = self.all_bins().map(HistogramBin::count).max().unwrap_or(0);
        Ok(())
    }
}
