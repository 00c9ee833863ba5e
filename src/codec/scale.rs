use crate::protocol::{Attribute, ProtocolFamily};

/// Conversion between the external `0..=100` scale and a device-native range.
///
/// All arithmetic is integral and rounds half up, so `to_external` matches
/// `round(native / step)` where `step = native_max / 100`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Scale {
    native_max: u8,
}

impl Scale {
    /// Lighting brightness, `0..=255`.
    pub const LIGHTING_LEVEL: Self = Self::new(255);
    /// Audio volume, step `0.38`.
    pub const AUDIO_VOLUME: Self = Self::new(38);
    /// Audio bass and treble, step `0.14`.
    pub const AUDIO_TONE: Self = Self::new(14);
    /// Audio balance, step `0.64`.
    pub const AUDIO_BALANCE: Self = Self::new(64);

    const EXTERNAL_MAX: u32 = 100;

    #[must_use]
    pub const fn new(native_max: u8) -> Self {
        Self { native_max }
    }

    #[must_use]
    pub const fn native_max(self) -> u8 {
        self.native_max
    }

    /// Converts an external value using its absolute value, saturating at the
    /// native maximum.
    ///
    /// ```
    /// use zonelink::Scale;
    ///
    /// assert_eq!(7, Scale::AUDIO_TONE.to_native(50));
    /// assert_eq!(7, Scale::AUDIO_TONE.to_native(-50));
    /// assert_eq!(14, Scale::AUDIO_TONE.to_native(250));
    /// ```
    #[must_use]
    pub fn to_native(self, external: i32) -> u8 {
        let external = external.unsigned_abs().min(Self::EXTERNAL_MAX);
        self.scale_down(external)
    }

    /// Converts a level-set value, clamping the external value to `0..=100`
    /// first so negative input maps to zero.
    ///
    /// ```
    /// use zonelink::Scale;
    ///
    /// assert_eq!(0, Scale::LIGHTING_LEVEL.to_native_clamped(-20));
    /// assert_eq!(255, Scale::LIGHTING_LEVEL.to_native_clamped(140));
    /// ```
    #[must_use]
    pub fn to_native_clamped(self, external: i32) -> u8 {
        let external = u32::try_from(external.clamp(0, 100)).unwrap_or(0);
        self.scale_down(external)
    }

    /// Converts a native value back to the external scale.
    #[must_use]
    pub fn to_external(self, native: u8) -> u8 {
        if self.native_max == 0 {
            return 0;
        }
        let native = u32::from(native.min(self.native_max));
        let max = u32::from(self.native_max);
        let external = (2 * native * Self::EXTERNAL_MAX + max) / (2 * max);
        u8::try_from(external).unwrap_or(u8::MAX)
    }

    fn scale_down(self, external: u32) -> u8 {
        let max = u32::from(self.native_max);
        let native = (2 * external * max + Self::EXTERNAL_MAX) / (2 * Self::EXTERNAL_MAX);
        u8::try_from(native.min(max)).unwrap_or(self.native_max)
    }
}

/// Returns the native scale for a scaled attribute, or `None` for switches
/// and source selection.
#[must_use]
pub fn scale_for(family: ProtocolFamily, attribute: Attribute) -> Option<Scale> {
    match (family, attribute) {
        (ProtocolFamily::Lighting, Attribute::Level) => Some(Scale::LIGHTING_LEVEL),
        (ProtocolFamily::Audio, Attribute::Level) => Some(Scale::AUDIO_VOLUME),
        (ProtocolFamily::Audio, Attribute::Bass | Attribute::Treble) => Some(Scale::AUDIO_TONE),
        (ProtocolFamily::Audio, Attribute::Balance) => Some(Scale::AUDIO_BALANCE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::volume(Scale::AUDIO_VOLUME, 8, 21)]
    #[case::volume_max(Scale::AUDIO_VOLUME, 38, 100)]
    #[case::tone_mid(Scale::AUDIO_TONE, 7, 50)]
    #[case::balance_half_rounds_up(Scale::AUDIO_BALANCE, 8, 13)]
    #[case::lighting_full(Scale::LIGHTING_LEVEL, 255, 100)]
    #[case::lighting_half(Scale::LIGHTING_LEVEL, 128, 50)]
    #[case::native_above_max(Scale::AUDIO_VOLUME, 200, 100)]
    fn to_external_rounds_native_values(
        #[case] scale: Scale,
        #[case] native: u8,
        #[case] expected: u8,
    ) {
        assert_eq!(expected, scale.to_external(native));
    }

    #[rstest]
    #[case(Scale::LIGHTING_LEVEL, 50, 128)]
    #[case(Scale::LIGHTING_LEVEL, 100, 255)]
    #[case(Scale::AUDIO_VOLUME, 21, 8)]
    #[case(Scale::AUDIO_BALANCE, -100, 64)]
    #[case(Scale::AUDIO_BALANCE, i32::MIN, 64)]
    fn to_native_uses_absolute_value(
        #[case] scale: Scale,
        #[case] external: i32,
        #[case] expected: u8,
    ) {
        assert_eq!(expected, scale.to_native(external));
    }

    #[test]
    fn lighting_level_round_trips_within_one_unit() {
        for external in 0..=100 {
            let native = Scale::LIGHTING_LEVEL.to_native_clamped(external);
            let back = i32::from(Scale::LIGHTING_LEVEL.to_external(native));
            assert!(
                (back - external).abs() <= 1,
                "level {external} came back as {back} via native {native}"
            );
        }
    }

    #[test]
    fn lighting_has_no_tone_scales() {
        assert_eq!(None, scale_for(ProtocolFamily::Lighting, Attribute::Bass));
        assert_eq!(
            Some(Scale::AUDIO_TONE),
            scale_for(ProtocolFamily::Audio, Attribute::Treble)
        );
    }
}
