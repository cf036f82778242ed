use ahrs::{IterationOutcome, Madgwick};
use std::time::{Duration, Instant};

use crate::recording::Sample;
use crate::replay_config::ReplayConfig;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Summary {
	pub updated: usize,
	pub updated_gyro_only: usize,
	pub skipped_zero_dt: usize,
	pub skipped_invalid_magnetometer: usize,
}

impl Summary {
	fn count(&mut self, outcome: IterationOutcome) {
		match outcome {
			IterationOutcome::Updated => self.updated += 1,
			IterationOutcome::UpdatedGyroOnly => self.updated_gyro_only += 1,
			IterationOutcome::SkippedZeroDt => self.skipped_zero_dt += 1,
			IterationOutcome::SkippedInvalidMagnetometer => self.skipped_invalid_magnetometer += 1,
		}
	}
}

/// Feeds recorded samples to the filter, mapping recording timestamps onto the monotonic clock.
pub struct Player {
	ahrs: Madgwick,
	base_instant: Instant,
	first_timestamp_us: u64,
	summary: Summary,
}

impl Player {
	/// Initializes the filter from the first sample of a recording.
	pub fn start(first: &Sample, config: &ReplayConfig, zero_on_start: bool) -> Self {
		let base_instant = Instant::now();

		let mut ahrs = Madgwick::init_at(&first.acc(), &first.mag(), base_instant)
			.with_beta(config.ahrs_madgwick_beta);

		if zero_on_start {
			ahrs.set_offset_to_current();
		} else if let Some(offset) = config.offset() {
			ahrs.set_offset(offset);
		}

		let euler = ahrs.euler();
		info!("Initial attitude: heading {:.1}, pitch {:.1}, roll {:.1}", euler.x, euler.y, euler.z);

		Player {
			ahrs,
			base_instant,
			first_timestamp_us: first.timestamp_us,
			summary: Summary::default(),
		}
	}

	pub fn play(&mut self, sample: &Sample) -> IterationOutcome {
		let elapsed = Duration::from_micros(sample.timestamp_us.saturating_sub(self.first_timestamp_us));

		let outcome = self.ahrs.iterate_at(
			&sample.gyr(),
			&sample.acc(),
			&sample.mag(),
			self.base_instant + elapsed,
		);

		self.summary.count(outcome);

		match outcome {
			IterationOutcome::Updated | IterationOutcome::UpdatedGyroOnly => {
				let euler = self.ahrs.euler();
				debug!(target: "ahrs", "{} {} {} {}", sample.timestamp_us, euler.x, euler.y, euler.z);
			}
			IterationOutcome::SkippedZeroDt => {
				warn!("Sample at {} µs does not advance time, skipped", sample.timestamp_us);
			}
			IterationOutcome::SkippedInvalidMagnetometer => {
				warn!("Sample at {} µs has an invalid magnetometer reading {:?}, skipped", sample.timestamp_us, sample.mag);
			}
		}

		outcome
	}

	pub fn ahrs(&self) -> &Madgwick {
		&self.ahrs
	}

	pub fn summary(&self) -> Summary {
		self.summary
	}
}
