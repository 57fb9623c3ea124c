//! Compact, mergeable sample-distribution histograms for performance
//! analysis.
//!
//! [`samplegram`] summarizes large streams of numeric samples - timings,
//! byte counts, power readings - into a fixed-size structure that still
//! answers the questions dashboards ask: approximate percentiles, running
//! statistics, and whether two runs differ beyond chance.
//!
//! A [`Histogram`] is built from a reusable [`BinBoundaries`] layout
//! (linear runs, exponential runs, or explicit boundaries), ingests
//! samples in O(log bins), and keeps bounded uniform reservoirs of raw
//! values and per-sample annotations. Histograms with identical units and
//! layouts merge losslessly for fan-out/fan-in pipelines, and everything
//! round-trips through a compact JSON-compatible wire form.
//!
//! # Examples
//!
//! ```
//! use samplegram::{BaseUnit, BinBoundaries, Histogram, ImprovementDirection, Unit};
//!
//! let unit = Unit::new(BaseUnit::TimeDurationMs, ImprovementDirection::SmallerIsBetter);
//! let boundaries = BinBoundaries::create_exponential(1.0, 1000.0, 30)?;
//! let mut latency = Histogram::new("page_load", unit, &boundaries);
//! for sample in [12.0, 19.5, 14.2, 250.0] {
//!     latency.add_sample(sample);
//! }
//! assert_eq!(4, latency.num_values());
//! let median = latency.get_approximate_percentile(0.5)?;
//! assert!(median > 1.0 && median < 1000.0);
//! # Ok::<(), samplegram::HistogramError>(())
//! ```
//!
//! # Feature Flags
//!
//! - `ahash-hasher`: use [ahash] for the boundary-cache hash map.
//!

pub mod boundaries;
pub mod errors;
pub mod histogram;
pub mod range;
pub mod running;
pub mod sampling;
pub mod significance;
pub mod types;

pub use boundaries::{default_boundaries_for_unit, BinBoundaries, BoundaryCache};
pub use errors::HistogramError;
pub use histogram::{Histogram, HistogramBin, Statistic, SummaryOptions};
pub use range::Range;
pub use running::RunningStatistics;
pub use significance::{mann_whitney_u, MwuResult, Significance, DEFAULT_ALPHA};
pub use types::{AnnotationMap, BaseUnit, ImprovementDirection, Scalar, Unit};
