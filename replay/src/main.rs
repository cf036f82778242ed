#[macro_use]
extern crate anyhow;

#[macro_use]
extern crate log;

use clap::{Arg, Command};
use std::path::{Path, PathBuf};

use crate::player::Player;
use crate::replay_config::{ReplayConfig, TryIntoLevelFilter};

use black_box::BlackBox;

mod player;
mod recording;
mod replay_config;

// Command line arguments
const CONFIG_ARG: &str = "config";
const RECORDING_ARG: &str = "recording";
const WRITE_DEFAULT_CONFIG_ARG: &str = "write-default-config";
const ZERO_ON_START_ARG: &str = "zero-on-start";

fn command() -> Command<'static> {
	Command::new("Replay")
		.version(env!("CARGO_PKG_VERSION"))
		.author("Vincent Leporcher <vincent.leporcher@telecom-paris.fr>")
		.about("Runs recorded IMU samples through the Madgwick AHRS")
		.arg(Arg::new(CONFIG_ARG)
			.long("config")
			.help("Configuration file")
			.takes_value(true)
			.default_value("config.json"))
		.arg(Arg::new(RECORDING_ARG)
			.long("recording")
			.help("JSON lines file of timestamped gyroscope, accelerometer and magnetometer samples")
			.takes_value(true)
			.required_unless_present(WRITE_DEFAULT_CONFIG_ARG))
		.arg(Arg::new(WRITE_DEFAULT_CONFIG_ARG)
			.long("write-default-config")
			.help("Write the default configuration to the configuration file and exit")
			.takes_value(false))
		.arg(Arg::new(ZERO_ON_START_ARG)
			.long("zero-on-start")
			.help("Report the attitude of the first sample as level")
			.takes_value(false))
}

fn main() -> anyhow::Result<()> {
	let args = command().get_matches();

	let config_path = args.value_of(CONFIG_ARG)
		.map(PathBuf::from)
		.ok_or_else(|| anyhow!("No configuration given"))?;

	if args.is_present(WRITE_DEFAULT_CONFIG_ARG) {
		replay_config::save(&config_path, &ReplayConfig::default())?;
		println!("Default configuration written to {}", config_path.display());
		return Ok(());
	}

	// Configuration
	let config = replay_config::read(&config_path)?;

	// Log
	let level_filter = config.log_level_filter
		.try_into_level_filter()
		.map_err(|_| anyhow!("Failed to parse log level filter {:?}", config.log_level_filter))?;

	BlackBox::new(&config.log_directory, "replay")
		.map_err(|e| anyhow!("{}", e))?
		.spawn(level_filter)
		.map_err(|e| anyhow!("{}", e))?;

	info!("Replay {}", env!("CARGO_PKG_VERSION"));

	let recording_path = args.value_of(RECORDING_ARG)
		.ok_or_else(|| anyhow!("No recording given"))?;

	let result = run(Path::new(recording_path), &config, args.is_present(ZERO_ON_START_ARG));

	if let Err(e) = &result {
		error!("{:#}", e);
	}

	log::logger().flush();
	std::thread::sleep(std::time::Duration::from_millis(100));

	result
}

fn run(recording_path: &Path, config: &ReplayConfig, zero_on_start: bool) -> anyhow::Result<()> {
	let mut samples = recording::open(recording_path)?;

	let first = match samples.next() {
		Some(sample) => sample?,
		None => bail!("Recording {} holds no samples", recording_path.display()),
	};

	info!("Initializing AHRS with beta {}", config.ahrs_madgwick_beta);
	let mut player = Player::start(&first, config, zero_on_start);

	for sample in samples {
		player.play(&sample?);
	}

	let summary = player.summary();
	info!("{} updates ({} without correction), {} skipped for zero dt, {} skipped for invalid magnetometer",
		  summary.updated + summary.updated_gyro_only,
		  summary.updated_gyro_only,
		  summary.skipped_zero_dt,
		  summary.skipped_invalid_magnetometer);

	let euler = player.ahrs().euler();
	info!("Final attitude: heading {:.1}, pitch {:.1}, roll {:.1}", euler.x, euler.y, euler.z);

	Ok(())
}
