pub use crate::madgwick::Madgwick;
use nalgebra::{UnitQuaternion, Vector3};
use std::time::Instant;

pub mod math;
mod madgwick;

/// Branch taken by a single filter update.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
	/// Gyroscope integration with gradient descent correction.
	Updated,
	/// Gyroscope integration only, the accelerometer reading was not finite.
	UpdatedGyroOnly,
	/// The clock did not advance since the previous update.
	SkippedZeroDt,
	/// The magnetometer reading was NaN or infinite, nothing was integrated.
	SkippedInvalidMagnetometer,
}

impl IterationOutcome {
	/// `true` when the orientation estimate moved.
	pub fn is_update(&self) -> bool {
		matches!(self, IterationOutcome::Updated | IterationOutcome::UpdatedGyroOnly)
	}
}

pub trait Ahrs where Self: Send + Sync + 'static {
	/// Fuses one sample taken at `instant`. `gyroscope` is in degrees per second.
	fn iterate_at(&mut self,
				  gyroscope: &Vector3<f64>,
				  accelerometer: &Vector3<f64>,
				  magnetometer: &Vector3<f64>,
				  instant: Instant) -> IterationOutcome;

	/// Orientation relative to the configured zero reference.
	fn orientation(&self) -> UnitQuaternion<f64>;
}
