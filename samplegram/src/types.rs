use std::fmt::Display;

use rand::Rng;

use crate::errors::HistogramError;

/// A per-sample annotation object.
///
/// Annotations are opaque to the engine: they are stored, reservoir-sampled
/// and re-serialized verbatim, never interpreted.
pub type AnnotationMap = serde_json::Map<String, serde_json::Value>;

/// The physical dimension a histogram's samples are measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseUnit {
    /// Milliseconds of elapsed time.
    TimeDurationMs,
    /// A timestamp, in milliseconds since some epoch.
    TimeStampMs,
    /// A ratio within [0, 1].
    NormalizedPercentage,
    /// Bytes.
    SizeBytes,
    /// Joules.
    EnergyJoules,
    /// Watts.
    PowerWatts,
    /// A bare number.
    UnitlessNumber,
    /// A count of things.
    Count,
}

impl BaseUnit {
    /// The wire name of this base unit.
    pub fn name(&self) -> &'static str {
        match self {
            BaseUnit::TimeDurationMs => "timeDurationInMs",
            BaseUnit::TimeStampMs => "timeStampInMs",
            BaseUnit::NormalizedPercentage => "normalizedPercentage",
            BaseUnit::SizeBytes => "sizeInBytes",
            BaseUnit::EnergyJoules => "energyInJoules",
            BaseUnit::PowerWatts => "powerInWatts",
            BaseUnit::UnitlessNumber => "unitlessNumber",
            BaseUnit::Count => "count",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "timeDurationInMs" => BaseUnit::TimeDurationMs,
            "timeStampInMs" => BaseUnit::TimeStampMs,
            "normalizedPercentage" => BaseUnit::NormalizedPercentage,
            "sizeInBytes" => BaseUnit::SizeBytes,
            "energyInJoules" => BaseUnit::EnergyJoules,
            "powerInWatts" => BaseUnit::PowerWatts,
            "unitlessNumber" => BaseUnit::UnitlessNumber,
            "count" => BaseUnit::Count,
            _ => return None,
        })
    }
}

/// Whether larger or smaller samples are an improvement, or neither.
///
/// Significance testing consults this: comparing two histograms whose unit
/// does not care about direction is answered without running any test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImprovementDirection {
    /// Larger values are better (e.g. throughput).
    BiggerIsBetter,
    /// Smaller values are better (e.g. latency).
    SmallerIsBetter,
    /// Neither direction is preferred.
    DontCare,
}

/// A base unit paired with an improvement direction.
///
/// Unit identity (exact equality) gates merging and significance testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unit {
    base: BaseUnit,
    direction: ImprovementDirection,
}

impl Unit {
    /// A unit with the given base and improvement direction.
    pub fn new(base: BaseUnit, direction: ImprovementDirection) -> Self {
        Self { base, direction }
    }

    /// The physical dimension of this unit.
    pub fn base(&self) -> BaseUnit {
        self.base
    }

    /// Which direction of change counts as an improvement.
    pub fn direction(&self) -> ImprovementDirection {
        self.direction
    }

    /// The wire name: the base name plus a direction suffix.
    /// `DontCare` units use the bare base name.
    pub fn name(&self) -> String {
        match self.direction {
            ImprovementDirection::BiggerIsBetter => format!("{}_biggerIsBetter", self.base.name()),
            ImprovementDirection::SmallerIsBetter => {
                format!("{}_smallerIsBetter", self.base.name())
            }
            ImprovementDirection::DontCare => self.base.name().to_owned(),
        }
    }

    /// Parse a wire name produced by [`Unit::name`].
    pub fn from_name(name: &str) -> Result<Self, HistogramError> {
        let (base_name, direction) = if let Some(prefix) = name.strip_suffix("_biggerIsBetter") {
            (prefix, ImprovementDirection::BiggerIsBetter)
        } else if let Some(prefix) = name.strip_suffix("_smallerIsBetter") {
            (prefix, ImprovementDirection::SmallerIsBetter)
        } else {
            (name, ImprovementDirection::DontCare)
        };
        match BaseUnit::from_name(base_name) {
            Some(base) => Ok(Self { base, direction }),
            None => Err(HistogramError::UnknownUnit(name.to_owned())),
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// A single exported statistic: a value carrying its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalar {
    /// The unit the value is measured in.
    pub unit: Unit,
    /// The value itself.
    pub value: f64,
}

/// A random version-4 UUID, used for lazy histogram guid allocation.
pub(crate) fn allocate_uuid4(rng: &mut impl Rng) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill(&mut bytes[..]);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};

    use super::{allocate_uuid4, BaseUnit, ImprovementDirection, Unit};

    #[test]
    fn unit_names_round_trip() {
        for base in [
            BaseUnit::TimeDurationMs,
            BaseUnit::TimeStampMs,
            BaseUnit::NormalizedPercentage,
            BaseUnit::SizeBytes,
            BaseUnit::EnergyJoules,
            BaseUnit::PowerWatts,
            BaseUnit::UnitlessNumber,
            BaseUnit::Count,
        ] {
            for direction in [
                ImprovementDirection::BiggerIsBetter,
                ImprovementDirection::SmallerIsBetter,
                ImprovementDirection::DontCare,
            ] {
                let unit = Unit::new(base, direction);
                assert_eq!(Ok(unit), Unit::from_name(&unit.name()));
            }
        }
    }

    #[test]
    fn direction_suffixes() {
        assert_eq!(
            "timeDurationInMs_smallerIsBetter",
            Unit::new(BaseUnit::TimeDurationMs, ImprovementDirection::SmallerIsBetter).name()
        );
        assert_eq!(
            "count",
            Unit::new(BaseUnit::Count, ImprovementDirection::DontCare).name()
        );
    }

    #[test]
    fn unknown_unit_names_are_rejected() {
        assert!(Unit::from_name("parsecs_smallerIsBetter").is_err());
        assert!(Unit::from_name("").is_err());
    }

    #[test]
    fn uuid4_has_version_and_variant_bits() {
        let mut rng = StdRng::seed_from_u64(7);
        let guid = allocate_uuid4(&mut rng);
        assert_eq!(36, guid.len());
        assert_eq!(Some('4'), guid.chars().nth(14));
        assert!(matches!(
            guid.chars().nth(19),
            Some('8') | Some('9') | Some('a') | Some('b')
        ));
    }
}
