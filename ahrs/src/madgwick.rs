#![allow(clippy::many_single_char_names)]

use log::{debug, trace};
use nalgebra::{Matrix3, Matrix4x6, Quaternion, UnitQuaternion, Vector3, Vector4, Vector6};
use std::time::Instant;

use crate::math;
use crate::{Ahrs, IterationOutcome};

/// Gradient descent orientation filter fusing gyroscope, accelerometer and magnetometer samples.
///
/// The Earth magnetic field reference is re-derived from the current estimate on every update,
/// so the filter only relies on the field inclination it measures, not on a stored one.
///
/// A magnetometer reading whose magnitude is NaN or infinite aborts the whole update: the
/// gyroscope is not integrated either and the estimate stays frozen until a valid reading
/// arrives. An accelerometer reading that is not finite only disables the correction step.
#[derive(Debug, Clone)]
pub struct Madgwick {
	beta: f64,
	quaternion: Quaternion<f64>,
	offset: Quaternion<f64>,
	body: Quaternion<f64>,
	last_instant: Instant,
}

impl Madgwick {
	pub const DEFAULT_BETA: f64 = 0.1;

	/// Aligns the filter with the reference frame given by one accelerometer and magnetometer
	/// sample, using the monotonic clock as the time origin.
	pub fn init(accelerometer: &Vector3<f64>, magnetometer: &Vector3<f64>) -> Self {
		Self::init_at(accelerometer, magnetometer, Instant::now())
	}

	/// Same as [`Madgwick::init`] with an explicit time origin.
	///
	/// Down is the accelerometer direction, east is perpendicular to down and to the magnetic
	/// field, north completes the frame.
	pub fn init_at(accelerometer: &Vector3<f64>, magnetometer: &Vector3<f64>, instant: Instant) -> Self {
		let down = *accelerometer;
		let east = down.cross(magnetometer);
		let north = east.cross(&down);

		let dcm = math::dcm_from_rows(&north.normalize(), &east.normalize(), &down.normalize());
		let quaternion = math::quaternion_from_dcm(&dcm);

		debug!("AHRS initialized at {:?}", quaternion);

		Madgwick {
			beta: Self::DEFAULT_BETA,
			quaternion,
			offset: Quaternion::identity(),
			body: quaternion,
			last_instant: instant,
		}
	}

	pub fn with_beta(mut self, beta: f64) -> Self {
		self.set_beta(beta);
		self
	}

	pub fn beta(&self) -> f64 {
		self.beta
	}

	/// Higher values correct drift faster but let more sensor noise through. Zero integrates the
	/// gyroscope alone.
	pub fn set_beta(&mut self, beta: f64) {
		self.beta = beta;
	}

	pub fn offset(&self) -> Quaternion<f64> {
		self.offset
	}

	/// Sets the attitude reported as zero.
	pub fn set_offset(&mut self, offset: Quaternion<f64>) {
		self.offset = offset;
		self.update_body();
	}

	/// Makes the current attitude the zero reference.
	pub fn set_offset_to_current(&mut self) {
		self.set_offset(self.quaternion);
	}

	/// Fuses one sample, timestamped with the monotonic clock. `gyroscope` is in degrees per
	/// second; only the directions of `accelerometer` and `magnetometer` matter.
	pub fn iterate(&mut self,
				   gyroscope: &Vector3<f64>,
				   accelerometer: &Vector3<f64>,
				   magnetometer: &Vector3<f64>) -> IterationOutcome {
		self.iterate_at(gyroscope, accelerometer, magnetometer, Instant::now())
	}

	/// Fuses one sample taken at `instant`.
	pub fn iterate_at(&mut self,
					  gyroscope: &Vector3<f64>,
					  accelerometer: &Vector3<f64>,
					  magnetometer: &Vector3<f64>,
					  instant: Instant) -> IterationOutcome {
		let dt = instant.saturating_duration_since(self.last_instant).as_secs_f64();
		self.last_instant = instant;

		if dt == 0.0 {
			trace!("Skipping AHRS update, no time elapsed");
			return IterationOutcome::SkippedZeroDt;
		}

		let outcome = match self.rate_of_change(&math::to_radians(gyroscope), accelerometer, magnetometer) {
			Some((q_dot, outcome)) => {
				// Integrate rate of change of quaternion to yield quaternion
				self.quaternion = (self.quaternion + q_dot * dt).normalize();
				outcome
			}
			None => {
				debug!("Skipping AHRS update, invalid magnetometer reading {:?}", magnetometer);
				return IterationOutcome::SkippedInvalidMagnetometer;
			}
		};

		self.update_body();

		outcome
	}

	/// Heading, pitch and roll in degrees.
	pub fn euler(&self) -> Vector3<f64> {
		math::to_degrees(&math::quaternion_to_euler(&self.body))
	}

	/// Rotation matrix with the north, east and down axes as rows.
	pub fn matrix(&self) -> Matrix3<f64> {
		math::quaternion_to_dcm(&self.body)
	}

	/// Orientation relative to the offset.
	pub fn quaternion(&self) -> Quaternion<f64> {
		self.body
	}

	/// Orientation ignoring the offset.
	pub fn raw_quaternion(&self) -> Quaternion<f64> {
		self.quaternion
	}

	fn update_body(&mut self) {
		self.body = self.quaternion * self.offset.conjugate();
	}

	/// Quaternion derivative from the gyroscope, corrected by the gradient descent step.
	/// `None` when the magnetometer reading cannot be used.
	fn rate_of_change(&self,
					  g: &Vector3<f64>,
					  a: &Vector3<f64>,
					  m: &Vector3<f64>) -> Option<(Quaternion<f64>, IterationOutcome)> {
		let q = self.quaternion;

		// Rate of change of quaternion from gyroscope
		let q_dot = q * Quaternion::from_parts(0.0, *g) * 0.5;

		if !m.norm().is_finite() {
			return None;
		}

		if !a.norm().is_finite() {
			return Some((q_dot, IterationOutcome::UpdatedGyroOnly));
		}

		let a = a.normalize();
		let m = m.normalize();

		let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);

		// Auxiliary variables to avoid repeated arithmetic
		let _2q0mx = 2.0 * q0 * m.x;
		let _2q0my = 2.0 * q0 * m.y;
		let _2q0mz = 2.0 * q0 * m.z;
		let _2q1mx = 2.0 * q1 * m.x;
		let _2q0 = 2.0 * q0;
		let _2q1 = 2.0 * q1;
		let _2q2 = 2.0 * q2;
		let _2q3 = 2.0 * q3;
		let q0q0 = q0 * q0;
		let q0q1 = q0 * q1;
		let q0q2 = q0 * q2;
		let q0q3 = q0 * q3;
		let q1q1 = q1 * q1;
		let q1q2 = q1 * q2;
		let q1q3 = q1 * q3;
		let q2q2 = q2 * q2;
		let q2q3 = q2 * q3;
		let q3q3 = q3 * q3;

		// Reference direction of Earth's magnetic field
		let hx = m.x * q0q0 - _2q0my * q3 + _2q0mz * q2 + m.x * q1q1 + _2q1 * m.y * q2
			+ _2q1 * m.z * q3 - m.x * q2q2 - m.x * q3q3;
		let hy = _2q0mx * q3 + m.y * q0q0 - _2q0mz * q1 + _2q1mx * q2 - m.y * q1q1
			+ m.y * q2q2 + _2q2 * m.z * q3 - m.y * q3q3;
		let _2bx = (hx * hx + hy * hy).sqrt();
		let _2bz = -_2q0mx * q2 + _2q0my * q1 + m.z * q0q0 + _2q1mx * q3 - m.z * q1q1
			+ _2q2 * m.y * q3 - m.z * q2q2 + m.z * q3q3;
		let _4bx = 2.0 * _2bx;
		let _4bz = 2.0 * _2bz;

		// Objective function: estimated minus measured gravity and field directions
		#[rustfmt::skip]
		let f = Vector6::new(
			2.0 * q1q3 - 2.0 * q0q2 - a.x,
			2.0 * q0q1 + 2.0 * q2q3 - a.y,
			1.0 - 2.0 * q1q1 - 2.0 * q2q2 - a.z,
			_2bx * (0.5 - q2q2 - q3q3) + _2bz * (q1q3 - q0q2) - m.x,
			_2bx * (q1q2 - q0q3) + _2bz * (q0q1 + q2q3) - m.y,
			_2bx * (q0q2 + q1q3) + _2bz * (0.5 - q1q1 - q2q2) - m.z,
		);

		#[rustfmt::skip]
		let j_t = Matrix4x6::new(
			-_2q2, _2q1, 0.0, -_2bz * q2, -_2bx * q3 + _2bz * q1, _2bx * q2,
			_2q3, _2q0, -4.0 * q1, _2bz * q3, _2bx * q2 + _2bz * q0, _2bx * q3 - _4bz * q1,
			-_2q0, _2q3, -4.0 * q2, -_4bx * q2 - _2bz * q0, _2bx * q1 + _2bz * q3, _2bx * q0 - _4bz * q2,
			_2q1, _2q2, 0.0, -_4bx * q3 + _2bz * q1, -_2bx * q0 + _2bz * q2, _2bx * q1,
		);

		let gradient: Vector4<f64> = j_t * f;

		// A null gradient means the estimate already matches both references
		let norm = gradient.norm();
		if norm == 0.0 {
			return Some((q_dot, IterationOutcome::Updated));
		}

		// Gradient decent algorithm corrective step
		let step = gradient / norm;
		let q_dot = q_dot - Quaternion::new(step[0], step[1], step[2], step[3]) * self.beta;

		Some((q_dot, IterationOutcome::Updated))
	}
}

impl Ahrs for Madgwick {
	fn iterate_at(&mut self,
				  gyroscope: &Vector3<f64>,
				  accelerometer: &Vector3<f64>,
				  magnetometer: &Vector3<f64>,
				  instant: Instant) -> IterationOutcome {
		Madgwick::iterate_at(self, gyroscope, accelerometer, magnetometer, instant)
	}

	fn orientation(&self) -> UnitQuaternion<f64> {
		UnitQuaternion::from_quaternion(self.body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use std::time::Duration;

	const DT: Duration = Duration::from_millis(20);

	#[test]
	fn init_builds_frame_from_gravity_and_field() {
		// Level, nose pointing east: north is -y in the body frame
		let filter = Madgwick::init(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(0.0, -1.0, 0.0));
		let euler = filter.euler();
		assert!((euler.x - 90.0).abs() < 1e-9, "heading {}", euler.x);
		assert!(euler.y.abs() < 1e-9);
		assert!(euler.z.abs() < 1e-9);
	}

	#[test]
	fn only_field_direction_matters() {
		let a = Madgwick::init(&Vector3::new(0.0, 0.0, 9.81), &Vector3::new(0.2, 0.0, 0.4));
		let b = Madgwick::init(&Vector3::new(0.0, 0.0, 1.0), &Vector3::new(2.0, 0.0, 4.0));
		assert_relative_eq!(a.raw_quaternion(), b.raw_quaternion(), epsilon = 1e-12);
		assert_relative_eq!(a.raw_quaternion(), Quaternion::identity(), epsilon = 1e-12);
	}

	#[test]
	fn gyro_only_when_accelerometer_is_not_finite() {
		let start = Instant::now();
		let mut filter = Madgwick::init_at(&Vector3::z(), &Vector3::x(), start);

		let outcome = filter.iterate_at(
			&Vector3::new(0.0, 0.0, 90.0),
			&Vector3::new(f64::INFINITY, 0.0, 0.0),
			&Vector3::x(),
			start + DT,
		);

		assert_eq!(outcome, IterationOutcome::UpdatedGyroOnly);
		assert!(filter.euler().x > 1.7 && filter.euler().x < 1.9);
	}

	#[test]
	fn clock_going_backwards_counts_as_zero_dt() {
		let start = Instant::now();
		let mut filter = Madgwick::init_at(&Vector3::z(), &Vector3::x(), start + DT);
		let before = filter.raw_quaternion();

		let outcome = filter.iterate_at(&Vector3::new(10.0, 0.0, 0.0), &Vector3::z(), &Vector3::x(), start);

		assert_eq!(outcome, IterationOutcome::SkippedZeroDt);
		assert_eq!(filter.raw_quaternion(), before);
	}

	#[test]
	fn offset_does_not_touch_raw_estimate() {
		let mut filter = Madgwick::init(&Vector3::new(0.1, -0.2, 1.0), &Vector3::new(0.6, 0.3, 0.2));
		let raw = filter.raw_quaternion();

		filter.set_offset(math::quaternion_from_euler(0.3, 0.1, 0.0));
		assert_eq!(filter.raw_quaternion(), raw);

		filter.set_offset_to_current();
		assert_eq!(filter.offset(), raw);
		assert_relative_eq!(filter.quaternion(), Quaternion::identity(), epsilon = 1e-12);
		assert_relative_eq!(filter.matrix(), Matrix3::identity(), epsilon = 1e-12);
	}

	#[test]
	fn beta_setters() {
		let mut filter = Madgwick::init(&Vector3::z(), &Vector3::x()).with_beta(0.5);
		assert_eq!(filter.beta(), 0.5);
		filter.set_beta(-1.0);
		assert_eq!(filter.beta(), -1.0);
	}
}
