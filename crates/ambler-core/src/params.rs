//! Walking parameters.
//!
//! One value of [`HumanoidParameters`] is passed explicitly to the footstep
//! planners, the walk pattern generator and the walk tasks; there is no
//! global state. Durations are converted to planner timesteps by rounding
//! against `dt`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::GRAVITY;

const fn default_dt() -> f64 {
    0.035
}
const fn default_single_support_duration() -> f64 {
    0.35
}
const fn default_double_support_duration() -> f64 {
    0.14
}
const fn default_startend_double_support_duration() -> f64 {
    0.35
}
const fn default_kick_support_duration() -> f64 {
    0.35
}
const fn default_planned_timesteps() -> usize {
    48
}
const fn default_zmp_margin() -> f64 {
    0.02
}
const fn default_zmp_reference_weight() -> f64 {
    1.5
}
const fn default_walk_com_height() -> f64 {
    0.8
}
const fn default_walk_foot_height() -> f64 {
    0.04
}
const fn default_walk_foot_rise_ratio() -> f64 {
    0.2
}
const fn default_feet_spacing() -> f64 {
    0.2
}
const fn default_foot_width() -> f64 {
    0.1
}
const fn default_foot_length() -> f64 {
    0.15
}

/// Errors raised while loading or validating parameters.
#[derive(Debug, Error)]
pub enum ParametersError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {value} (must be > 0)")]
    NotPositive { field: &'static str, value: f64 },

    #[error("walk_foot_rise_ratio must lie in (0, 0.5), got {0}")]
    InvalidRiseRatio(f64),
}

/// Timing, geometry and ZMP tuning for the walk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HumanoidParameters {
    /// Planner tick in seconds.
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Duration of a single support (one foot on the ground).
    #[serde(default = "default_single_support_duration")]
    pub single_support_duration: f64,

    /// Duration of an intermediate double support.
    #[serde(default = "default_double_support_duration")]
    pub double_support_duration: f64,

    /// Duration of the first and last double supports.
    #[serde(default = "default_startend_double_support_duration")]
    pub startend_double_support_duration: f64,

    /// Duration of a kick support.
    #[serde(default = "default_kick_support_duration")]
    pub kick_support_duration: f64,

    /// CoM planning horizon in timesteps.
    #[serde(default = "default_planned_timesteps")]
    pub planned_timesteps: usize,

    /// Minkowski shrink applied to support polygons for the ZMP constraint.
    #[serde(default = "default_zmp_margin")]
    pub zmp_margin: f64,

    /// Weight of the soft ZMP reference constraint.
    #[serde(default = "default_zmp_reference_weight")]
    pub zmp_reference_weight: f64,

    /// ZMP reference offset along x in the support foot frame.
    #[serde(default)]
    pub foot_zmp_target_x: f64,

    /// ZMP reference offset along y (towards the inside of the foot).
    #[serde(default)]
    pub foot_zmp_target_y: f64,

    /// ZMP reference offset along x while kicking.
    #[serde(default)]
    pub kick_zmp_target_x: f64,

    /// ZMP reference offset along y while kicking.
    #[serde(default)]
    pub kick_zmp_target_y: f64,

    /// Constant CoM height during the walk.
    #[serde(default = "default_walk_com_height")]
    pub walk_com_height: f64,

    /// Trunk pitch during the walk, radians.
    #[serde(default)]
    pub walk_trunk_pitch: f64,

    /// Apex height of the swing foot.
    #[serde(default = "default_walk_foot_height")]
    pub walk_foot_height: f64,

    /// Fraction of the swing spent rising (and falling).
    #[serde(default = "default_walk_foot_rise_ratio")]
    pub walk_foot_rise_ratio: f64,

    /// Nominal lateral distance between the feet.
    #[serde(default = "default_feet_spacing")]
    pub feet_spacing: f64,

    /// Foot rectangle width.
    #[serde(default = "default_foot_width")]
    pub foot_width: f64,

    /// Foot rectangle length.
    #[serde(default = "default_foot_length")]
    pub foot_length: f64,
}

impl Default for HumanoidParameters {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            single_support_duration: default_single_support_duration(),
            double_support_duration: default_double_support_duration(),
            startend_double_support_duration: default_startend_double_support_duration(),
            kick_support_duration: default_kick_support_duration(),
            planned_timesteps: default_planned_timesteps(),
            zmp_margin: default_zmp_margin(),
            zmp_reference_weight: default_zmp_reference_weight(),
            foot_zmp_target_x: 0.0,
            foot_zmp_target_y: 0.0,
            kick_zmp_target_x: 0.0,
            kick_zmp_target_y: 0.0,
            walk_com_height: default_walk_com_height(),
            walk_trunk_pitch: 0.0,
            walk_foot_height: default_walk_foot_height(),
            walk_foot_rise_ratio: default_walk_foot_rise_ratio(),
            feet_spacing: default_feet_spacing(),
            foot_width: default_foot_width(),
            foot_length: default_foot_length(),
        }
    }
}

impl HumanoidParameters {
    /// Load parameters from a TOML file and validate them.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ParametersError> {
        let content = std::fs::read_to_string(path)?;
        let params: Self = toml::from_str(&content)?;
        params.validate()?;
        Ok(params)
    }

    /// Validate the parameters. Returns Err on non-positive durations or
    /// dimensions and on a rise ratio outside `(0, 0.5)`.
    pub fn validate(&self) -> Result<(), ParametersError> {
        let positive = [
            ("dt", self.dt),
            ("single_support_duration", self.single_support_duration),
            ("double_support_duration", self.double_support_duration),
            (
                "startend_double_support_duration",
                self.startend_double_support_duration,
            ),
            ("kick_support_duration", self.kick_support_duration),
            ("walk_com_height", self.walk_com_height),
            ("feet_spacing", self.feet_spacing),
            ("foot_width", self.foot_width),
            ("foot_length", self.foot_length),
        ];
        for (field, value) in positive {
            if value <= 0.0 {
                return Err(ParametersError::NotPositive { field, value });
            }
        }
        if self.walk_foot_rise_ratio <= 0.0 || self.walk_foot_rise_ratio >= 0.5 {
            return Err(ParametersError::InvalidRiseRatio(self.walk_foot_rise_ratio));
        }
        Ok(())
    }

    /// LIPM natural frequency `sqrt(g / com_height)`.
    pub fn omega(&self) -> f64 {
        (GRAVITY / self.walk_com_height).sqrt()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn timesteps(&self, duration: f64) -> usize {
        ((duration / self.dt).round() as usize).max(1)
    }

    /// Timesteps spanned by a single support.
    pub fn single_support_timesteps(&self) -> usize {
        self.timesteps(self.single_support_duration)
    }

    /// Timesteps spanned by an intermediate double support.
    pub fn double_support_timesteps(&self) -> usize {
        self.timesteps(self.double_support_duration)
    }

    /// Timesteps spanned by the first/last double supports.
    pub fn startend_double_support_timesteps(&self) -> usize {
        self.timesteps(self.startend_double_support_duration)
    }

    /// Timesteps spanned by a kick support.
    pub fn kick_support_timesteps(&self) -> usize {
        self.timesteps(self.kick_support_duration)
    }

    /// Whether intermediate double supports are long enough to be planned.
    pub fn has_double_support(&self) -> bool {
        self.double_support_duration >= self.dt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_are_valid() {
        let params = HumanoidParameters::default();
        assert!(params.validate().is_ok());
    }

    #[test]
    fn omega_matches_lipm() {
        let params = HumanoidParameters {
            walk_com_height: 0.8,
            ..HumanoidParameters::default()
        };
        assert_relative_eq!(params.omega(), (GRAVITY / 0.8).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn timestep_rounding() {
        let params = HumanoidParameters {
            dt: 0.1,
            single_support_duration: 0.35,
            double_support_duration: 0.04,
            ..HumanoidParameters::default()
        };
        assert_eq!(params.single_support_timesteps(), 4);
        // Shorter than a tick still spans at least one timestep.
        assert_eq!(params.double_support_timesteps(), 1);
        assert!(!params.has_double_support());
    }

    #[test]
    fn rejects_negative_duration() {
        let params = HumanoidParameters {
            single_support_duration: -0.1,
            ..HumanoidParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParametersError::NotPositive { field: "single_support_duration", .. })
        ));
    }

    #[test]
    fn rejects_bad_rise_ratio() {
        let params = HumanoidParameters {
            walk_foot_rise_ratio: 0.5,
            ..HumanoidParameters::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ParametersError::InvalidRiseRatio(_))
        ));
    }

    #[test]
    fn toml_roundtrip_with_defaults() {
        let params: HumanoidParameters = toml::from_str(
            r#"
            dt = 0.05
            walk_com_height = 0.75
            "#,
        )
        .unwrap();
        assert_relative_eq!(params.dt, 0.05);
        assert_relative_eq!(params.walk_com_height, 0.75);
        // Unspecified fields fall back to defaults.
        assert_relative_eq!(params.feet_spacing, 0.2);
        assert_eq!(params.planned_timesteps, 48);
    }
}
