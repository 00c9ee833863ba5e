use std::time::Duration;

use strum_macros::{Display, EnumIter, EnumString};

/// Named lighting ramp durations and their protocol duration codes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default, EnumIter, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum RampRate {
    #[default]
    #[strum(to_string = "0 Sec")]
    Instant,
    #[strum(to_string = "4 Sec")]
    FourSeconds,
    #[strum(to_string = "8 Sec")]
    EightSeconds,
    #[strum(to_string = "12 Sec")]
    TwelveSeconds,
    #[strum(to_string = "20 Sec")]
    TwentySeconds,
    #[strum(to_string = "30 Sec")]
    ThirtySeconds,
    #[strum(to_string = "40 Sec")]
    FortySeconds,
    #[strum(to_string = "1 Min")]
    OneMinute,
    #[strum(to_string = "1.5 Min")]
    NinetySeconds,
    #[strum(to_string = "2 Min")]
    TwoMinutes,
    #[strum(to_string = "3 Min")]
    ThreeMinutes,
    #[strum(to_string = "5 Min")]
    FiveMinutes,
    #[strum(to_string = "7 Min")]
    SevenMinutes,
    #[strum(to_string = "10 Min")]
    TenMinutes,
    #[strum(to_string = "15 Min")]
    FifteenMinutes,
    #[strum(to_string = "17 Min")]
    SeventeenMinutes,
    #[strum(to_string = "Stop Ramp")]
    StopRamp,
}

impl RampRate {
    /// Returns the command byte that carries this ramp duration.
    ///
    /// ```
    /// use zonelink::RampRate;
    ///
    /// assert_eq!(0x02, RampRate::Instant.code());
    /// assert_eq!(0x7A, RampRate::SeventeenMinutes.code());
    /// assert_eq!(0x09, RampRate::StopRamp.code());
    /// ```
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Instant => 0x02,
            Self::FourSeconds => 0x0A,
            Self::EightSeconds => 0x12,
            Self::TwelveSeconds => 0x1A,
            Self::TwentySeconds => 0x22,
            Self::ThirtySeconds => 0x2A,
            Self::FortySeconds => 0x32,
            Self::OneMinute => 0x3A,
            Self::NinetySeconds => 0x42,
            Self::TwoMinutes => 0x4A,
            Self::ThreeMinutes => 0x52,
            Self::FiveMinutes => 0x5A,
            Self::SevenMinutes => 0x62,
            Self::TenMinutes => 0x6A,
            Self::FifteenMinutes => 0x72,
            Self::SeventeenMinutes => 0x7A,
            Self::StopRamp => 0x09,
        }
    }

    /// Returns the ramp duration, or `None` for [`RampRate::StopRamp`].
    #[must_use]
    pub const fn duration(self) -> Option<Duration> {
        let seconds = match self {
            Self::Instant => 0,
            Self::FourSeconds => 4,
            Self::EightSeconds => 8,
            Self::TwelveSeconds => 12,
            Self::TwentySeconds => 20,
            Self::ThirtySeconds => 30,
            Self::FortySeconds => 40,
            Self::OneMinute => 60,
            Self::NinetySeconds => 90,
            Self::TwoMinutes => 120,
            Self::ThreeMinutes => 180,
            Self::FiveMinutes => 300,
            Self::SevenMinutes => 420,
            Self::TenMinutes => 600,
            Self::FifteenMinutes => 900,
            Self::SeventeenMinutes => 1_020,
            Self::StopRamp => return None,
        };
        Some(Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::str::FromStr;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest]
    #[case("0 Sec", RampRate::Instant)]
    #[case("1.5 Min", RampRate::NinetySeconds)]
    #[case("17 min", RampRate::SeventeenMinutes)]
    #[case("stop ramp", RampRate::StopRamp)]
    fn labels_parse_case_insensitively(#[case] label: &str, #[case] expected: RampRate) {
        assert_eq!(Ok(expected), RampRate::from_str(label));
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert_matches!(RampRate::from_str("6 Sec"), Err(_));
    }

    #[test]
    fn ramp_codes_are_unique() {
        let codes: HashSet<u8> = RampRate::iter().map(RampRate::code).collect();
        assert_eq!(RampRate::iter().count(), codes.len());
    }

    #[test]
    fn labels_round_trip_through_display() {
        for rate in RampRate::iter() {
            assert_eq!(Ok(rate), rate.to_string().parse());
        }
    }
}
