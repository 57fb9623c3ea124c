//! Bin boundary construction, compilation and interning.
//!
//! A [`BinBoundaries`] is a reusable recipe for a histogram's central bins:
//! an ordered list of boundary segments (a literal boundary, a linear run,
//! or an exponential run) that compiles lazily into the ordered array of
//! bin edges. The compact segment list is also the serialized form, and
//! deserialized recipes are interned in a [`BoundaryCache`] keyed by that
//! form, so histograms that share a layout share one compiled array.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
};

use serde_json::{json, Value};

#[cfg(not(feature = "ahash-hasher"))]
use std::collections::hash_map::RandomState;

#[cfg(feature = "ahash-hasher")]
use ahash::RandomState;

use crate::{errors::HistogramError, range::Range, types::BaseUnit};

/// Alias for the cache hasher, selected by the ahash-hasher crate feature
pub(crate) type Hasher = RandomState;

/// Wire tag for a linear boundary run.
const LINEAR_SEGMENT_TAG: i64 = 0;
/// Wire tag for an exponential boundary run.
const EXPONENTIAL_SEGMENT_TAG: i64 = 1;

/// One entry in the boundary recipe following the initial boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
enum BoundarySegment {
    /// A single explicit boundary.
    Boundary(f64),
    /// `count` equal-width bins up to `next`.
    LinearBins { next: f64, count: u32 },
    /// `count` geometrically spaced bins up to `next`.
    ExponentialBins { next: f64, count: u32 },
}

/// Reusable builder for histogram bin layouts.
///
/// The builder starts with a single boundary, which separates the eventual
/// underflow and overflow bins. Each added boundary or run appends central
/// bins above the current maximum; boundaries must strictly increase.
/// Compilation is a pure function of the segment list and is cached until
/// the next mutation, so one builder can stamp out any number of
/// identically shaped histograms.
#[derive(Debug, Clone)]
pub struct BinBoundaries {
    first_boundary: f64,
    segments: Vec<BoundarySegment>,
    range: Range,
    compiled: OnceLock<Vec<f64>>,
}

impl BinBoundaries {
    /// A builder with only `min_bin_boundary`: no central bins yet.
    pub fn new(min_bin_boundary: f64) -> Self {
        Self {
            first_boundary: min_bin_boundary,
            segments: Vec::new(),
            range: Range::from_point(min_bin_boundary),
            compiled: OnceLock::new(),
        }
    }

    /// `num_bins` equal-width central bins covering `min..max`.
    pub fn create_linear(min: f64, max: f64, num_bins: u32) -> Result<Self, HistogramError> {
        Self::new(min).add_linear_bins(max, num_bins)
    }

    /// `num_bins` geometrically spaced central bins covering `min..max`.
    pub fn create_exponential(min: f64, max: f64, num_bins: u32) -> Result<Self, HistogramError> {
        Self::new(min).add_exponential_bins(max, num_bins)
    }

    /// A layout listing every boundary explicitly.
    pub fn create_with_boundaries(boundaries: &[f64]) -> Result<Self, HistogramError> {
        let (&first, rest) = boundaries
            .split_first()
            .ok_or(HistogramError::MalformedField("binBoundaries"))?;
        let mut result = Self::new(first);
        for &boundary in rest {
            result = result.add_bin_boundary(boundary)?;
        }
        Ok(result)
    }

    /// A linear layout sized to a concrete batch of samples: its range is
    /// the samples' range (widened if degenerate or empty) and its bin
    /// count is `ceil(sqrt(n))`. The resulting range depends entirely on
    /// the data, so only use this when effectively merging a fixed set of
    /// scalars.
    pub fn create_from_samples(samples: &[f64]) -> Result<Self, HistogramError> {
        let mut range: Option<Range> = None;
        for &sample in samples.iter().filter(|sample| sample.is_finite()) {
            match range.as_mut() {
                Some(range) => range.add_value(sample),
                None => range = Some(Range::from_point(sample)),
            }
        }
        let mut range = range.unwrap_or_else(|| Range::from_point(1.0));
        if range.min() == range.max() {
            range.add_value(range.min() - 1.0);
        }
        let num_bins = ((samples.len() as f64).sqrt().ceil() as u32).max(1);
        Self::new(range.min()).add_linear_bins(range.max(), num_bins)
    }

    /// Append one explicit boundary above the current maximum.
    pub fn add_bin_boundary(mut self, next_max_bin_boundary: f64) -> Result<Self, HistogramError> {
        self.check_ascending(next_max_bin_boundary)?;
        self.push(BoundarySegment::Boundary(next_max_bin_boundary));
        Ok(self)
    }

    /// Append `bin_count` equal-width bins up to `next_max_bin_boundary`.
    pub fn add_linear_bins(
        mut self,
        next_max_bin_boundary: f64,
        bin_count: u32,
    ) -> Result<Self, HistogramError> {
        if bin_count == 0 {
            return Err(HistogramError::InvalidBinCount);
        }
        self.check_ascending(next_max_bin_boundary)?;
        self.push(BoundarySegment::LinearBins {
            next: next_max_bin_boundary,
            count: bin_count,
        });
        Ok(self)
    }

    /// Append `bin_count` geometrically spaced bins up to
    /// `next_max_bin_boundary`. The current maximum must be positive for
    /// the spacing to be defined.
    pub fn add_exponential_bins(
        mut self,
        next_max_bin_boundary: f64,
        bin_count: u32,
    ) -> Result<Self, HistogramError> {
        if bin_count == 0 {
            return Err(HistogramError::InvalidBinCount);
        }
        if self.range.max() <= 0.0 {
            return Err(HistogramError::NonPositiveExponentialBase(self.range.max()));
        }
        self.check_ascending(next_max_bin_boundary)?;
        self.push(BoundarySegment::ExponentialBins {
            next: next_max_bin_boundary,
            count: bin_count,
        });
        Ok(self)
    }

    fn check_ascending(&self, next: f64) -> Result<(), HistogramError> {
        if next <= self.range.max() {
            return Err(HistogramError::OutOfOrderBoundary {
                next,
                current: self.range.max(),
            });
        }
        Ok(())
    }

    fn push(&mut self, segment: BoundarySegment) {
        self.segments.push(segment);
        let (BoundarySegment::Boundary(next)
        | BoundarySegment::LinearBins { next, .. }
        | BoundarySegment::ExponentialBins { next, .. }) = segment;
        self.range.add_value(next);
        // Any mutation invalidates a previously compiled array.
        self.compiled = OnceLock::new();
    }

    /// The span from the first to the last boundary.
    pub fn range(&self) -> Range {
        self.range
    }

    /// The compiled, ordered array of bin edges: N+1 boundaries defining
    /// N central bins. Compiled on first use and cached until mutation.
    pub fn boundaries(&self) -> &[f64] {
        self.compiled.get_or_init(|| self.build())
    }

    fn build(&self) -> Vec<f64> {
        let mut current = self.first_boundary;
        let mut boundaries = vec![current];
        for segment in &self.segments {
            match *segment {
                BoundarySegment::Boundary(next) => {
                    boundaries.push(next);
                    current = next;
                }
                BoundarySegment::LinearBins { next, count } => {
                    let width = (next - current) / count as f64;
                    for i in 1..count {
                        boundaries.push(current + i as f64 * width);
                    }
                    boundaries.push(next);
                    current = next;
                }
                BoundarySegment::ExponentialBins { next, count } => {
                    let exponent_width = (next / current).ln() / count as f64;
                    for i in 1..count {
                        boundaries.push(current * (i as f64 * exponent_width).exp());
                    }
                    boundaries.push(next);
                    current = next;
                }
            }
        }
        boundaries
    }

    /// How many central bins the compiled layout defines.
    pub fn num_central_bins(&self) -> usize {
        self.boundaries().len() - 1
    }

    /// Ranges of adjacent boundaries, one per central bin.
    pub fn bin_ranges(&self) -> impl Iterator<Item = Range> + '_ {
        self.boundaries()
            .windows(2)
            .map(|pair| Range::from_explicit_range(pair[0], pair[1]))
    }

    /// The compact serialized recipe: the first boundary followed by
    /// segments, each a bare number or a `[tag, next, count]` run.
    pub fn to_dict(&self) -> Value {
        let mut entries = vec![json!(self.first_boundary)];
        for segment in &self.segments {
            entries.push(match *segment {
                BoundarySegment::Boundary(next) => json!(next),
                BoundarySegment::LinearBins { next, count } => {
                    json!([LINEAR_SEGMENT_TAG, next, count])
                }
                BoundarySegment::ExponentialBins { next, count } => {
                    json!([EXPONENTIAL_SEGMENT_TAG, next, count])
                }
            });
        }
        Value::Array(entries)
    }

    /// Rebuild a recipe from its serialized form, re-validating every
    /// segment on the way in.
    pub fn from_dict(dict: &Value) -> Result<Self, HistogramError> {
        let entries = dict
            .as_array()
            .filter(|entries| !entries.is_empty())
            .ok_or(HistogramError::MalformedField("binBoundaries"))?;
        let first = entries[0]
            .as_f64()
            .ok_or(HistogramError::MalformedField("binBoundaries"))?;
        let mut result = Self::new(first);
        for entry in &entries[1..] {
            result = match entry {
                Value::Array(run) => {
                    let tag = run
                        .first()
                        .and_then(Value::as_i64)
                        .ok_or(HistogramError::MalformedField("binBoundaries"))?;
                    let next = run
                        .get(1)
                        .and_then(Value::as_f64)
                        .ok_or(HistogramError::MalformedField("binBoundaries"))?;
                    let count = run
                        .get(2)
                        .and_then(Value::as_u64)
                        .and_then(|count| u32::try_from(count).ok())
                        .ok_or(HistogramError::MalformedField("binBoundaries"))?;
                    match tag {
                        LINEAR_SEGMENT_TAG => result.add_linear_bins(next, count)?,
                        EXPONENTIAL_SEGMENT_TAG => result.add_exponential_bins(next, count)?,
                        unrecognized => {
                            return Err(HistogramError::UnrecognizedBoundarySegment(unrecognized))
                        }
                    }
                }
                entry => {
                    let boundary = entry
                        .as_f64()
                        .ok_or(HistogramError::MalformedField("binBoundaries"))?;
                    result.add_bin_boundary(boundary)?
                }
            };
        }
        Ok(result)
    }
}

/// Equality for merge purposes: the full compiled boundary arrays match.
impl PartialEq for BinBoundaries {
    fn eq(&self, other: &Self) -> bool {
        self.boundaries() == other.boundaries()
    }
}

/// Insert-if-absent interner for deserialized bin layouts, keyed by the
/// canonical serialized recipe.
///
/// Interning makes independently decoded histograms with identical
/// layouts share one compiled boundary array, and pins down any
/// nondeterminism in compilation that could otherwise make equal-looking
/// histograms unmergeable. Entries are never evicted or mutated. The
/// process-wide instance lives behind [`BoundaryCache::global`]; tests
/// that want isolation construct their own.
#[derive(Debug, Default)]
pub struct BoundaryCache {
    cache: Mutex<HashMap<String, Arc<BinBoundaries>, Hasher>>,
}

impl BoundaryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by histogram deserialization.
    pub fn global() -> &'static BoundaryCache {
        static GLOBAL: OnceLock<BoundaryCache> = OnceLock::new();
        GLOBAL.get_or_init(BoundaryCache::new)
    }

    /// Resolve a serialized recipe to a shared, validated layout.
    pub fn resolve(&self, dict: &Value) -> Result<Arc<BinBoundaries>, HistogramError> {
        let key = dict.to_string();
        let mut cache = self.cache.lock().expect("boundary cache lock poisoned");
        if let Some(interned) = cache.get(&key) {
            return Ok(Arc::clone(interned));
        }
        log::debug!("compiling bin boundaries for {key}");
        let built = Arc::new(BinBoundaries::from_dict(dict)?);
        cache.insert(key, Arc::clone(&built));
        Ok(built)
    }

    /// How many layouts have been interned.
    pub fn len(&self) -> usize {
        self.cache.lock().expect("boundary cache lock poisoned").len()
    }

    /// Whether any layout has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The default bin layout for histograms of the given base unit, used when
/// a histogram is constructed without an explicit layout.
pub fn default_boundaries_for_unit(base: BaseUnit) -> BinBoundaries {
    let built = match base {
        BaseUnit::TimeDurationMs => BinBoundaries::create_exponential(1e-3, 1e6, 100),
        BaseUnit::TimeStampMs => BinBoundaries::create_linear(0.0, 1e10, 1000),
        BaseUnit::NormalizedPercentage => BinBoundaries::create_linear(0.0, 1.0, 20),
        BaseUnit::SizeBytes => BinBoundaries::create_exponential(1.0, 1e12, 100),
        BaseUnit::EnergyJoules => BinBoundaries::create_exponential(1e-3, 1e3, 50),
        BaseUnit::PowerWatts => BinBoundaries::create_exponential(1e-3, 1.0, 50),
        BaseUnit::UnitlessNumber => BinBoundaries::create_exponential(1e-3, 1e3, 50),
        BaseUnit::Count => BinBoundaries::create_exponential(1.0, 1e3, 20),
    };
    built.expect("default bin layouts are ascending by construction")
}
