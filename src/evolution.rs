use serde::{Deserialize, Serialize};

/// Values inside this band around zero are treated as no change.
pub const STABLE_TOLERANCE: f64 = 0.0001;

/// Fractional change from `previous` to `current`.
///
/// Growth from zero is reported as exactly `1.0` (+100%), and zero to zero as
/// `0.0`.
pub fn evolution_pct(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        current / previous - 1.0
    } else if current > 0.0 {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Grew,
    Declined,
    Stable,
}

impl Trend {
    pub fn from_evolution(value: f64) -> Self {
        if value > STABLE_TOLERANCE {
            Trend::Grew
        } else if value < -STABLE_TOLERANCE {
            Trend::Declined
        } else {
            Trend::Stable
        }
    }

    /// Plain comparison of two counts.
    pub fn from_counts(current: f64, previous: f64) -> Self {
        if current > previous {
            Trend::Grew
        } else if current < previous {
            Trend::Declined
        } else {
            Trend::Stable
        }
    }

    /// +1, -1 or 0.
    pub fn signum(&self) -> i8 {
        match self {
            Trend::Grew => 1,
            Trend::Declined => -1,
            Trend::Stable => 0,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Trend::Grew => "↑",
            Trend::Declined => "↓",
            Trend::Stable => "≈",
        }
    }
}

/// Percentage with one decimal and a trend arrow, e.g. `12.5% ↑`.
pub fn format_evolution(value: f64) -> String {
    match Trend::from_evolution(value) {
        Trend::Stable => "0.0% ≈".to_string(),
        trend => format!("{:.1}% {}", value * 100.0, trend.arrow()),
    }
}
