mod mapper;
mod palette;

pub use mapper::{ColoredGeometry, MapColors, ScalarBinding};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result, StreamviewError};

/// Linear RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    /// Creates a color from float components.
    #[must_use]
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Creates a color from 8-bit components.
    #[must_use]
    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self::new(f64::from(r) / 255.0, f64::from(g) / 255.0, f64::from(b) / 255.0)
    }

    /// Creates a color from a `0xRRGGBB` literal.
    #[must_use]
    pub fn from_hex(hex: u32) -> Self {
        let [_, r, g, b] = hex.to_be_bytes();
        Self::from_u8(r, g, b)
    }
}

/// The closed set of lookup-table presets selectable from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ColorPreset {
    /// Continuous two-hue HSV ramp, deep blue to light yellow.
    #[default]
    Ramp,
    /// Eight discrete colors assigned in index order.
    Ordinal,
    /// Eight-class diverging palette, symmetric around the midpoint.
    Diverging,
}

impl TryFrom<i64> for ColorPreset {
    type Error = ConfigError;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ramp),
            1 => Ok(Self::Ordinal),
            2 => Ok(Self::Diverging),
            other => Err(ConfigError::UnknownPreset(other)),
        }
    }
}

impl From<ColorPreset> for i64 {
    fn from(preset: ColorPreset) -> Self {
        match preset {
            ColorPreset::Ramp => 0,
            ColorPreset::Ordinal => 1,
            ColorPreset::Diverging => 2,
        }
    }
}

/// Closed numeric interval `[min, max]` a lookup table is stretched over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct ScalarRange {
    min: f64,
    max: f64,
}

impl ScalarRange {
    /// Creates a range.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound is not finite or `min > max`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        Ok(Self::checked(min, max)?)
    }

    fn checked(min: f64, max: f64) -> std::result::Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ConfigError::Invalid(format!("invalid scalar range [{min}, {max}]")));
        }
        Ok(Self { min, max })
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns `true` if `value` lies within the range. `NaN` never does.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for ScalarRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl TryFrom<[f64; 2]> for ScalarRange {
    type Error = ConfigError;

    fn try_from([min, max]: [f64; 2]) -> std::result::Result<Self, Self::Error> {
        Self::checked(min, max)
    }
}

impl From<ScalarRange> for [f64; 2] {
    fn from(range: ScalarRange) -> Self {
        [range.min, range.max]
    }
}

/// How values outside the table's domain are colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRange {
    /// Use the undefined-value color.
    #[default]
    Undefined,
    /// Clamp to the first or last table color.
    Clamp,
}

/// A finite palette stretched over a fixed scalar domain.
///
/// Tables are values: changing the preset builds a new table instead of
/// editing an existing one.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    preset: ColorPreset,
    colors: Vec<Rgb>,
    undefined: Rgb,
    domain: ScalarRange,
    out_of_range: OutOfRange,
}

impl ColorTable {
    /// Builds the table for `preset` over the default domain `[0, 1]`.
    #[must_use]
    pub fn build(preset: ColorPreset) -> Self {
        let (colors, undefined) = match preset {
            ColorPreset::Ramp => (palette::hsv_ramp(), palette::RAMP_UNDEFINED),
            ColorPreset::Ordinal => (palette::ordinal(), palette::SERIES_UNDEFINED),
            ColorPreset::Diverging => (palette::diverging(), palette::SERIES_UNDEFINED),
        };
        Self {
            preset,
            colors,
            undefined,
            domain: ScalarRange::default(),
            out_of_range: OutOfRange::default(),
        }
    }

    /// Returns a copy of the table bound to `domain`.
    #[must_use]
    pub fn with_domain(mut self, domain: ScalarRange) -> Self {
        self.domain = domain;
        self
    }

    /// Returns a copy of the table using `policy` for out-of-domain values.
    #[must_use]
    pub fn with_out_of_range(mut self, policy: OutOfRange) -> Self {
        self.out_of_range = policy;
        self
    }

    /// The preset this table was built from.
    #[must_use]
    pub fn preset(&self) -> ColorPreset {
        self.preset
    }

    /// Palette entries in index order.
    #[must_use]
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    /// Color reserved for undefined and `NaN` values.
    #[must_use]
    pub fn undefined_color(&self) -> Rgb {
        self.undefined
    }

    /// The scalar domain the palette is stretched over.
    #[must_use]
    pub fn domain(&self) -> ScalarRange {
        self.domain
    }

    /// Maps a scalar to a color.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    #[must_use]
    pub fn map(&self, value: f64) -> Rgb {
        if value.is_nan() {
            return self.undefined;
        }
        let value = if self.domain.contains(value) {
            value
        } else {
            match self.out_of_range {
                OutOfRange::Undefined => return self.undefined,
                OutOfRange::Clamp => value.clamp(self.domain.min, self.domain.max),
            }
        };

        let n = self.colors.len();
        let width = self.domain.max - self.domain.min;
        let index = if width > 0.0 {
            (((value - self.domain.min) / width) * n as f64) as usize
        } else {
            0
        };
        self.colors[index.min(n - 1)]
    }
}

impl TryFrom<i64> for ColorTable {
    type Error = StreamviewError;

    fn try_from(preset: i64) -> Result<Self> {
        Ok(Self::build(ColorPreset::try_from(preset)?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn k_range() -> ScalarRange {
        ScalarRange::new(0.0, 15.6).unwrap()
    }

    #[test]
    fn presets_come_from_a_closed_set() {
        assert_eq!(ColorPreset::try_from(0_i64).unwrap(), ColorPreset::Ramp);
        assert_eq!(ColorPreset::try_from(2_i64).unwrap(), ColorPreset::Diverging);
        assert!(ColorPreset::try_from(3_i64).is_err());
        assert!(ColorPreset::try_from(-1_i64).is_err());
        assert!(ColorTable::try_from(7_i64).unwrap_err().is_invalid_configuration());
    }

    #[test]
    fn palette_sizes() {
        assert_eq!(ColorTable::build(ColorPreset::Ramp).colors().len(), 256);
        assert_eq!(ColorTable::build(ColorPreset::Ordinal).colors().len(), 8);
        assert_eq!(ColorTable::build(ColorPreset::Diverging).colors().len(), 8);
    }

    #[test]
    fn out_of_domain_is_undefined_for_every_preset() {
        for preset in [0_i64, 1, 2] {
            let table = ColorTable::try_from(preset).unwrap().with_domain(k_range());
            let undefined = table.undefined_color();
            assert_eq!(table.map(-0.1), undefined);
            assert_eq!(table.map(15.7), undefined);
            assert_eq!(table.map(f64::NAN), undefined);
            assert_ne!(table.map(7.8), undefined);
        }
    }

    #[test]
    fn endpoints_map_to_end_colors() {
        let table = ColorTable::build(ColorPreset::Ordinal).with_domain(k_range());
        assert_eq!(table.map(0.0), table.colors()[0]);
        assert_eq!(table.map(15.6), table.colors()[7]);
        assert_eq!(table.map(15.6 * 3.5 / 8.0), table.colors()[3]);
    }

    #[test]
    fn clamp_policy_uses_end_colors() {
        let table = ColorTable::build(ColorPreset::Diverging)
            .with_domain(k_range())
            .with_out_of_range(OutOfRange::Clamp);
        assert_eq!(table.map(-100.0), table.colors()[0]);
        assert_eq!(table.map(100.0), table.colors()[7]);
        assert_eq!(table.map(f64::NAN), table.undefined_color());
    }

    #[test]
    fn degenerate_domain_maps_to_first_color() {
        let table = ColorTable::build(ColorPreset::Ramp).with_domain(ScalarRange::new(2.0, 2.0).unwrap());
        assert_eq!(table.map(2.0), table.colors()[0]);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(ScalarRange::new(1.0, 0.0).is_err());
        assert!(ScalarRange::new(f64::NAN, 1.0).is_err());
        assert!(serde_json::from_str::<ScalarRange>("[2.0, 1.0]").is_err());
        let range: ScalarRange = serde_json::from_str("[0.0, 15.6]").unwrap();
        assert_eq!(range, k_range());
    }

    #[test]
    fn hex_colors_decode() {
        assert_eq!(Rgb::from_hex(0xff_00_00), Rgb::new(1.0, 0.0, 0.0));
    }
}
