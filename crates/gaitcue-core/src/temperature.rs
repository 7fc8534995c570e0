//! Temperature ratings and how charger and battery readings are combined.

use std::fmt;

use serde::{Serialize, Serializer};

/// A temperature band, or a union of bands when the source cannot tell them apart.
///
/// The five basic bands are single bits. A reading of [`Self::COLD_OR_HOT`]
/// means "outside the safe window, direction unknown".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemperatureRating(u8);

impl TemperatureRating {
    /// Below the charging window.
    pub const COLD: Self = Self(0b0_0001);
    /// Charging allowed at reduced current.
    pub const COOL: Self = Self(0b0_0010);
    /// Normal operating window.
    pub const OK: Self = Self(0b0_0100);
    /// Charging allowed at reduced voltage.
    pub const WARM: Self = Self(0b0_1000);
    /// Above the charging window.
    pub const HOT: Self = Self(0b1_0000);
    /// Cool or warm.
    pub const COOL_OR_WARM: Self = Self(Self::COOL.0 | Self::WARM.0);
    /// Cold or hot.
    pub const COLD_OR_HOT: Self = Self(Self::COLD.0 | Self::HOT.0);

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `true` if the two ratings share at least one band.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// `true` if the rating touches the cold or hot band.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        self.intersects(Self::COLD_OR_HOT)
    }

    /// Combine the charger-die and battery readings into one rating.
    ///
    /// A battery reading of exactly cold, hot, or cold-or-hot wins. Anything
    /// else falls back to the charger, and to [`Self::OK`] when the charger
    /// rating is unknown too.
    #[must_use]
    pub fn combine(charger: Option<Self>, battery: Option<Self>) -> Self {
        match battery {
            Some(rating)
                if rating == Self::COLD_OR_HOT || rating == Self::HOT || rating == Self::COLD =>
            {
                rating
            }
            _ => charger.unwrap_or(Self::OK),
        }
    }

    /// Rate a temperature given in tenths of a degree Celsius.
    ///
    /// Bands: cold below 0 °C, cool below 10 °C, ok below 45 °C, warm below
    /// 60 °C, hot from 60 °C.
    #[must_use]
    pub const fn from_decidegrees(value: i32) -> Self {
        if value < 0 {
            Self::COLD
        } else if value < 100 {
            Self::COOL
        } else if value < 450 {
            Self::OK
        } else if value < 600 {
            Self::WARM
        } else {
            Self::HOT
        }
    }

    const fn name(self) -> &'static str {
        match self.0 {
            0b0_0001 => "cold",
            0b0_0010 => "cool",
            0b0_0100 => "ok",
            0b0_1000 => "warm",
            0b1_0000 => "hot",
            0b0_1010 => "cool_or_warm",
            0b1_0001 => "cold_or_hot",
            _ => "mixed",
        }
    }
}

impl fmt::Debug for TemperatureRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemperatureRating({})", self.name())
    }
}

impl fmt::Display for TemperatureRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TemperatureRating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type R = TemperatureRating;

    #[test]
    fn test_battery_extreme_wins() {
        assert_eq!(R::combine(Some(R::WARM), Some(R::HOT)), R::HOT);
        assert_eq!(R::combine(Some(R::OK), Some(R::COLD)), R::COLD);
        assert_eq!(R::combine(Some(R::OK), Some(R::COLD_OR_HOT)), R::COLD_OR_HOT);
    }

    #[test]
    fn test_charger_used_when_battery_not_extreme() {
        assert_eq!(R::combine(Some(R::WARM), Some(R::OK)), R::WARM);
        assert_eq!(R::combine(Some(R::WARM), None), R::WARM);
        assert_eq!(R::combine(Some(R::OK), Some(R::WARM)), R::OK);
    }

    #[test]
    fn test_unknown_everywhere_is_ok() {
        assert_eq!(R::combine(None, None), R::OK);
        assert_eq!(R::combine(None, Some(R::COOL)), R::OK);
    }

    #[test]
    fn test_critical() {
        assert!(R::HOT.is_critical());
        assert!(R::COLD.is_critical());
        assert!(R::COLD_OR_HOT.is_critical());
        assert!(!R::COOL_OR_WARM.is_critical());
        assert!(!R::OK.is_critical());
    }

    #[test]
    fn test_from_decidegrees_band_edges() {
        assert_eq!(R::from_decidegrees(-1), R::COLD);
        assert_eq!(R::from_decidegrees(0), R::COOL);
        assert_eq!(R::from_decidegrees(250), R::OK);
        assert_eq!(R::from_decidegrees(450), R::WARM);
        assert_eq!(R::from_decidegrees(600), R::HOT);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(R::COOL_OR_WARM.to_string(), "cool_or_warm");
        assert_eq!(format!("{:?}", R::HOT), "TemperatureRating(hot)");
    }
}
