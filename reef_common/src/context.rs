//! Environmental context features and lookup-key discretization.
//!
//! The gain lookup table is indexed by a coarse, discretized view of the
//! environment: ambient temperature band, hour-of-day block and season.
//! Vessel scale stays continuous — it rarely changes at runtime and is
//! carried on the performance sample instead of the key.

use serde::{Deserialize, Serialize};

// ─── Season ─────────────────────────────────────────────────────────

/// Season index used by the context key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Season {
    Spring = 0,
    Summer = 1,
    Autumn = 2,
    Winter = 3,
}

impl Season {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Spring),
            1 => Some(Self::Summer),
            2 => Some(Self::Autumn),
            3 => Some(Self::Winter),
            _ => None,
        }
    }

    /// Human-readable season name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Spring => "Spring",
            Self::Summer => "Summer",
            Self::Autumn => "Autumn",
            Self::Winter => "Winter",
        }
    }

    /// Derive the season from a calendar month (1–12) under a hemisphere
    /// preset. Out-of-range months saturate into December.
    pub fn from_month(month: u32, preset: SeasonPreset) -> Self {
        let month = month.clamp(1, 12);
        let northern = match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Autumn,
            _ => Self::Winter,
        };
        match preset {
            SeasonPreset::Northern => northern,
            SeasonPreset::Southern => northern.opposite(),
            // Tropical climates have no thermal seasons worth separating;
            // everything lands in one bucket.
            SeasonPreset::Tropical => Self::Summer,
        }
    }

    const fn opposite(self) -> Self {
        match self {
            Self::Spring => Self::Autumn,
            Self::Summer => Self::Winter,
            Self::Autumn => Self::Spring,
            Self::Winter => Self::Summer,
        }
    }
}

impl Default for Season {
    fn default() -> Self {
        Self::Spring
    }
}

/// Hemisphere preset for season derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeasonPreset {
    #[default]
    Northern,
    Southern,
    Tropical,
}

// ─── Context features & key ─────────────────────────────────────────

/// Continuous context features sampled by the caller once per tick (or
/// slower). The controller stores the latest value; discretization into a
/// [`ContextKey`] happens on the adaptation side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextFeatures {
    /// Ambient (room) temperature [°C].
    pub ambient: f64,
    /// Hour of day, 0–23.
    pub hour: u8,
    /// Current season.
    pub season: Season,
    /// Vessel scale multiplier (e.g. tank volume relative to reference).
    pub scale: f64,
}

impl Default for ContextFeatures {
    fn default() -> Self {
        Self {
            ambient: 22.0,
            hour: 12,
            season: Season::default(),
            scale: 1.0,
        }
    }
}

/// Discretized lookup-table key.
///
/// `ambient_band` uses floor division so bands stay uniform across zero;
/// `hour_block` groups hours into coarse blocks (default 6 h → 4 blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    pub ambient_band: i16,
    pub hour_block: u8,
    pub season: Season,
}

impl ContextKey {
    /// Discretize continuous features into a key.
    ///
    /// `band_width` must be positive and `block_hours` in 1..=24; both are
    /// enforced by config validation before any key is built.
    pub fn from_features(features: &ContextFeatures, band_width: f64, block_hours: u8) -> Self {
        let band = (features.ambient / band_width).floor();
        // Saturate instead of wrapping for absurd ambient readings.
        let ambient_band = band.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        let hour_block = (features.hour % 24) / block_hours.max(1);
        Self {
            ambient_band,
            hour_block,
            season: features.season,
        }
    }

    /// Stable string encoding used as the persistence key suffix.
    pub fn encode(&self) -> String {
        format!(
            "A{}_H{}_S{}",
            self.ambient_band, self.hour_block, self.season as u8
        )
    }

    /// Parse a key previously produced by [`ContextKey::encode`].
    /// Returns `None` for any malformed input.
    pub fn decode(encoded: &str) -> Option<Self> {
        let mut parts = encoded.split('_');
        let ambient_band = parts.next()?.strip_prefix('A')?.parse::<i16>().ok()?;
        let hour_block = parts.next()?.strip_prefix('H')?.parse::<u8>().ok()?;
        let season_raw = parts.next()?.strip_prefix('S')?.parse::<u8>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            ambient_band,
            hour_block,
            season: Season::from_u8(season_raw)?,
        })
    }
}
