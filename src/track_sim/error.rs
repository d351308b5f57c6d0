//! Configuration errors raised at vehicle creation time.
//!
//! Nothing in the per-step path returns these: once a configuration has been
//! validated every step is a total function over its input.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("vehicle has no wheels")]
    NoWheels,

    #[error("wheel count mismatch: setup has {expected}, got {actual}")]
    WheelCountMismatch { expected: usize, actual: usize },

    #[error("forward gear ratio table is empty")]
    EmptyGearTable,

    #[error("gear ratio {index} must be positive (got {value})")]
    InvalidGearRatio { index: usize, value: f32 },

    #[error("final drive ratio must be positive (got {0})")]
    InvalidFinalRatio(f32),

    #[error("engine max RPM must be positive (got {0})")]
    InvalidMaxRpm(f32),

    #[error("engine max torque must be positive (got {0})")]
    InvalidMaxTorque(f32),

    #[error("engine idle RPM {idle} must lie in (0, {max})")]
    InvalidIdleRpm { idle: f32, max: f32 },

    #[error("shift thresholds inverted: down {down} >= up {up}")]
    InvertedShiftPoints { down: f32, up: f32 },

    #[error("curve `{0}` has no keys")]
    EmptyCurve(&'static str),

    #[error("curve `{0}` keys are not strictly increasing")]
    UnsortedCurve(&'static str),

    #[error("{field} must be in [0, 1] (got {value})")]
    OutOfUnitRange { field: &'static str, value: f32 },

    #[error("wheel {wheel}: {field} must be positive (got {value})")]
    InvalidWheel {
        wheel: usize,
        field: &'static str,
        value: f32,
    },

    #[error("wheel {0}: suspension axis has zero length")]
    ZeroSuspensionAxis(usize),

    #[error("{field} must be non-negative (got {value})")]
    NegativeCoefficient { field: &'static str, value: f32 },

    #[error("chassis mass must be positive (got {0})")]
    InvalidChassisMass(f32),

    #[error("failed to parse vehicle config: {0}")]
    Parse(String),

    #[error("failed to read vehicle config: {0}")]
    Io(String),
}
