use anyhow::Context;
use nalgebra::Vector3;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// One line of a recording: timestamp in microseconds, gyroscope in degrees per second,
/// accelerometer and magnetometer in any consistent unit.
///
/// Non-finite components are written as `null` and read back as NaN, so glitched readings
/// reach the filter instead of ending the replay.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sample {
	pub timestamp_us: u64,
	#[serde(deserialize_with = "reading")]
	pub gyr: [f64; 3],
	#[serde(deserialize_with = "reading")]
	pub acc: [f64; 3],
	#[serde(deserialize_with = "reading")]
	pub mag: [f64; 3],
}

fn reading<'de, D>(deserializer: D) -> Result<[f64; 3], D::Error>
	where D: Deserializer<'de>
{
	let [x, y, z] = <[Option<f64>; 3]>::deserialize(deserializer)?;
	let component = |c: Option<f64>| c.unwrap_or(f64::NAN);

	Ok([component(x), component(y), component(z)])
}

fn vector(v: &[f64; 3]) -> Vector3<f64> {
	Vector3::new(v[0], v[1], v[2])
}

impl Sample {
	pub fn gyr(&self) -> Vector3<f64> {
		vector(&self.gyr)
	}

	pub fn acc(&self) -> Vector3<f64> {
		vector(&self.acc)
	}

	pub fn mag(&self) -> Vector3<f64> {
		vector(&self.mag)
	}
}

/// Reads one JSON sample per line. Blank lines and lines starting with `#` are ignored.
pub struct Recording<R> {
	lines: Lines<R>,
	line_number: usize,
}

impl<R: BufRead> Recording<R> {
	pub fn new(reader: R) -> Self {
		Recording {
			lines: reader.lines(),
			line_number: 0,
		}
	}
}

impl<R: BufRead> Iterator for Recording<R> {
	type Item = anyhow::Result<Sample>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			let line = self.lines.next()?;
			self.line_number += 1;

			let line_number = self.line_number;
			let line = match line.with_context(|| format!("Malformed sample on line {}", line_number)) {
				Ok(line) => line,
				Err(e) => return Some(Err(e)),
			};

			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}

			return Some(serde_json::from_str(line)
				.with_context(|| format!("Malformed sample on line {}", line_number)));
		}
	}
}

pub fn open(path: &Path) -> anyhow::Result<Recording<BufReader<File>>> {
	let file = File::open(path)
		.with_context(|| format!("Failed to open recording {}", path.display()))?;

	Ok(Recording::new(BufReader::new(file)))
}
