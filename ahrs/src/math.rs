//! Vector, quaternion and rotation matrix helpers used by the filters.
//!
//! Quaternions are `(w, x, y, z)` and describe the rotation from the body frame to the
//! north-east-down frame. Rotation matrices hold the north, east and down axes, expressed in
//! body coordinates, as their rows.

use nalgebra::{Matrix3, Quaternion, Vector3};
use std::f64::consts::PI;

/// Component-wise conversion from degrees to radians.
pub fn to_radians(v: &Vector3<f64>) -> Vector3<f64> {
	v * (PI / 180.0)
}

/// Component-wise conversion from radians to degrees.
pub fn to_degrees(v: &Vector3<f64>) -> Vector3<f64> {
	v * (180.0 / PI)
}

pub fn dcm_from_rows(north: &Vector3<f64>, east: &Vector3<f64>, down: &Vector3<f64>) -> Matrix3<f64> {
	#[rustfmt::skip]
	let m = Matrix3::new(
		north.x, north.y, north.z,
		east.x, east.y, east.z,
		down.x, down.y, down.z,
	);
	m
}

/// Builds the quaternion of an orthonormal rotation matrix.
///
/// The branch is picked from the trace, then from the largest diagonal element, which keeps
/// the square root argument away from zero. The sign of the result follows from that choice:
/// the component computed from the square root is always positive. Callers comparing against
/// stored quaternions rely on this exact convention.
pub fn quaternion_from_dcm(m: &Matrix3<f64>) -> Quaternion<f64> {
	let trace = m.trace();

	if trace > 0.0 {
		let s = (trace + 1.0).sqrt() * 2.0;
		Quaternion::new(
			0.25 * s,
			(m[(2, 1)] - m[(1, 2)]) / s,
			(m[(0, 2)] - m[(2, 0)]) / s,
			(m[(1, 0)] - m[(0, 1)]) / s,
		)
	} else if m[(0, 0)] > m[(1, 1)] && m[(0, 0)] > m[(2, 2)] {
		let s = (1.0 + m[(0, 0)] - m[(1, 1)] - m[(2, 2)]).sqrt() * 2.0;
		Quaternion::new(
			(m[(2, 1)] - m[(1, 2)]) / s,
			0.25 * s,
			(m[(0, 1)] + m[(1, 0)]) / s,
			(m[(0, 2)] + m[(2, 0)]) / s,
		)
	} else if m[(1, 1)] > m[(2, 2)] {
		let s = (1.0 + m[(1, 1)] - m[(0, 0)] - m[(2, 2)]).sqrt() * 2.0;
		Quaternion::new(
			(m[(0, 2)] - m[(2, 0)]) / s,
			(m[(0, 1)] + m[(1, 0)]) / s,
			0.25 * s,
			(m[(1, 2)] + m[(2, 1)]) / s,
		)
	} else {
		let s = (1.0 + m[(2, 2)] - m[(0, 0)] - m[(1, 1)]).sqrt() * 2.0;
		Quaternion::new(
			(m[(1, 0)] - m[(0, 1)]) / s,
			(m[(0, 2)] + m[(2, 0)]) / s,
			(m[(1, 2)] + m[(2, 1)]) / s,
			0.25 * s,
		)
	}
}

/// Rotation matrix of a unit quaternion.
pub fn quaternion_to_dcm(q: &Quaternion<f64>) -> Matrix3<f64> {
	let (w, x, y, z) = (q.w, q.i, q.j, q.k);

	#[rustfmt::skip]
	let m = Matrix3::new(
		1.0 - 2.0 * y * y - 2.0 * z * z, 2.0 * x * y - 2.0 * w * z, 2.0 * x * z + 2.0 * w * y,
		2.0 * x * y + 2.0 * w * z, 1.0 - 2.0 * x * x - 2.0 * z * z, 2.0 * y * z - 2.0 * w * x,
		2.0 * x * z - 2.0 * w * y, 2.0 * y * z + 2.0 * w * x, 1.0 - 2.0 * x * x - 2.0 * y * y,
	);
	m
}

/// Heading, pitch and roll in radians (z-y-x sequence).
///
/// Pitch is divided by the squared norm so slightly denormalized inputs still land inside the
/// domain of `asin`.
pub fn quaternion_to_euler(q: &Quaternion<f64>) -> Vector3<f64> {
	let (w, x, y, z) = (q.w, q.i, q.j, q.k);
	let (ww, xx, yy, zz) = (w * w, x * x, y * y, z * z);

	Vector3::new(
		(2.0 * (x * y + z * w)).atan2(xx - yy - zz + ww),
		(-2.0 * (x * z - y * w) / (xx + yy + zz + ww)).asin(),
		(2.0 * (y * z + x * w)).atan2(-xx - yy + zz + ww),
	)
}

/// Inverse of [`quaternion_to_euler`]. Angles in radians.
pub fn quaternion_from_euler(heading: f64, pitch: f64, roll: f64) -> Quaternion<f64> {
	let (sh, ch) = (heading * 0.5).sin_cos();
	let (sp, cp) = (pitch * 0.5).sin_cos();
	let (sr, cr) = (roll * 0.5).sin_cos();

	Quaternion::new(
		cr * cp * ch + sr * sp * sh,
		sr * cp * ch - cr * sp * sh,
		cr * sp * ch + sr * cp * sh,
		cr * cp * sh - sr * sp * ch,
	)
}

/// Expresses the body frame vector `v` in the reference frame.
pub fn rotate(q: &Quaternion<f64>, v: &Vector3<f64>) -> Vector3<f64> {
	quaternion_to_dcm(q) * v
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::{assert_relative_eq, relative_eq};
	use assert_approx_eq::assert_approx_eq;

	fn probes() -> [Vector3<f64>; 3] {
		[
			Vector3::new(1.0, 0.0, 0.0),
			Vector3::new(0.0, 1.0, 0.0),
			Vector3::new(0.3, -0.5, 0.8),
		]
	}

	fn same_rotation(a: &Quaternion<f64>, b: &Quaternion<f64>) -> bool {
		probes().iter().all(|p| relative_eq!(rotate(a, p), rotate(b, p), epsilon = 1e-9))
	}

	#[test]
	fn degree_conversions() {
		let v = to_radians(&Vector3::new(180.0, -90.0, 0.0));
		assert_approx_eq!(v.x, PI);
		assert_approx_eq!(v.y, -PI / 2.0);
		assert_approx_eq!(v.z, 0.0);

		assert_relative_eq!(to_degrees(&v), Vector3::new(180.0, -90.0, 0.0), epsilon = 1e-12);
	}

	#[test]
	fn normalize_of_zero_vector_is_nan() {
		let n = Vector3::<f64>::zeros().normalize();
		assert!(n.x.is_nan() && n.y.is_nan() && n.z.is_nan());
	}

	#[test]
	fn hamilton_product_order() {
		let a = quaternion_from_euler(0.4, 0.0, 0.0);
		let b = quaternion_from_euler(0.0, 0.0, 0.7);
		assert!(!relative_eq!(a * b, b * a, epsilon = 1e-9));

		let undone = a * a.conjugate();
		assert_relative_eq!(undone, Quaternion::identity(), epsilon = 1e-12);
	}

	#[test]
	fn identity_matrix_gives_identity_quaternion() {
		let q = quaternion_from_dcm(&Matrix3::identity());
		assert_eq!(q, Quaternion::new(1.0, 0.0, 0.0, 0.0));
	}

	#[test]
	fn from_dcm_positive_trace_branch() {
		// 90° about down
		#[rustfmt::skip]
		let m = Matrix3::new(
			0.0, -1.0, 0.0,
			1.0, 0.0, 0.0,
			0.0, 0.0, 1.0,
		);
		let q = quaternion_from_dcm(&m);
		let h = std::f64::consts::FRAC_1_SQRT_2;
		assert_relative_eq!(q, Quaternion::new(h, 0.0, 0.0, h), epsilon = 1e-12);
	}

	#[test]
	fn from_dcm_x_branch() {
		let m = Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0));
		assert_eq!(quaternion_from_dcm(&m), Quaternion::new(0.0, 1.0, 0.0, 0.0));
	}

	#[test]
	fn from_dcm_y_branch() {
		let m = Matrix3::from_diagonal(&Vector3::new(-1.0, 1.0, -1.0));
		assert_eq!(quaternion_from_dcm(&m), Quaternion::new(0.0, 0.0, 1.0, 0.0));
	}

	#[test]
	fn from_dcm_z_branch() {
		let m = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
		assert_eq!(quaternion_from_dcm(&m), Quaternion::new(0.0, 0.0, 0.0, 1.0));
	}

	fn branch_input(heading: f64, pitch: f64, roll: f64) -> Matrix3<f64> {
		quaternion_to_dcm(&quaternion_from_euler(heading, pitch, roll))
	}

	#[test]
	fn from_dcm_x_branch_off_diagonal() {
		let m = branch_input(0.3, 0.2, 2.9);
		assert!(m.trace() <= 0.0 && m[(0, 0)] > m[(1, 1)] && m[(0, 0)] > m[(2, 2)]);
		assert_relative_eq!(
			quaternion_from_dcm(&m),
			Quaternion::new(0.1333646, 0.9748644, 0.1595032, -0.0800753),
			epsilon = 1e-6
		);

		// x comes out positive, so this attitude is returned negated
		let m = branch_input(0.3, 0.2, -2.7);
		assert!(m.trace() <= 0.0 && m[(0, 0)] > m[(1, 1)] && m[(0, 0)] > m[(2, 2)]);
		assert_relative_eq!(
			quaternion_from_dcm(&m),
			Quaternion::new(-0.2009089, 0.9632146, 0.1234632, -0.1288804),
			epsilon = 1e-6
		);
	}

	#[test]
	fn from_dcm_y_branch_off_diagonal() {
		let m = branch_input(0.3, 2.9, 0.2);
		assert!(m.trace() <= 0.0 && m[(1, 1)] >= m[(0, 0)] && m[(1, 1)] > m[(2, 2)]);
		assert_relative_eq!(
			quaternion_from_dcm(&m),
			Quaternion::new(0.1333646, -0.1357129, 0.9784599, -0.0800753),
			epsilon = 1e-6
		);
	}

	#[test]
	fn from_dcm_z_branch_off_diagonal() {
		let m = branch_input(2.9, 0.2, -0.3);
		assert!(m.trace() <= 0.0 && m[(2, 2)] >= m[(0, 0)] && m[(2, 2)] >= m[(1, 1)]);
		assert_relative_eq!(
			quaternion_from_dcm(&m),
			Quaternion::new(0.1037442, -0.1159108, -0.1357129, 0.9784599),
			epsilon = 1e-6
		);
	}

	#[test]
	fn dcm_round_trip() {
		let angles = [
			(0.3, 0.2, -0.1),
			(0.3, 0.2, 2.9),
			(0.3, 0.2, -2.7),
			(2.9, -0.4, 1.2),
			(-1.7, 1.1, 3.0),
			(PI, 0.0, PI),
		];

		for &(h, p, r) in angles.iter() {
			let q = quaternion_from_euler(h, p, r);
			let back = quaternion_from_dcm(&quaternion_to_dcm(&q));
			assert_approx_eq!(back.norm(), 1.0, 1e-9);
			assert!(same_rotation(&q, &back), "{:?} != {:?}", q, back);
		}
	}

	#[test]
	fn euler_round_trip() {
		let angles = [
			(0.3, 0.2, -0.1),
			(2.9, -0.4, 1.2),
			(-1.7, 1.1, 3.0),
			(-3.0, -1.4, -2.5),
		];

		for &(h, p, r) in angles.iter() {
			let q = quaternion_from_euler(h, p, r);
			let euler = quaternion_to_euler(&q);
			assert_approx_eq!(euler.x, h, 1e-9);
			assert_approx_eq!(euler.y, p, 1e-9);
			assert_approx_eq!(euler.z, r, 1e-9);

			let back = quaternion_from_euler(euler.x, euler.y, euler.z);
			assert!(same_rotation(&q, &back));
		}
	}

	#[test]
	fn rows_are_reference_axes_in_body_frame() {
		let q = quaternion_from_euler(0.5, -0.3, 0.8);
		let m = quaternion_to_dcm(&q);
		let north = Vector3::new(m[(0, 0)], m[(0, 1)], m[(0, 2)]);
		assert_relative_eq!(rotate(&q, &north), Vector3::x(), epsilon = 1e-12);

		let rebuilt = dcm_from_rows(
			&Vector3::new(m[(0, 0)], m[(0, 1)], m[(0, 2)]),
			&Vector3::new(m[(1, 0)], m[(1, 1)], m[(1, 2)]),
			&Vector3::new(m[(2, 0)], m[(2, 1)], m[(2, 2)]),
		);
		assert_eq!(rebuilt, m);
	}

	#[test]
	fn heading_is_positive_clockwise_seen_from_above() {
		// Nose pointing east
		let q = quaternion_from_euler(PI / 2.0, 0.0, 0.0);
		assert_relative_eq!(rotate(&q, &Vector3::x()), Vector3::y(), epsilon = 1e-12);
	}
}
