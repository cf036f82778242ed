use anyhow::Context;
use log::LevelFilter;
use nalgebra::Quaternion;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReplayConfig {
	pub log_level_filter: String,
	pub log_directory: PathBuf,
	pub ahrs_madgwick_beta: f64,
	/// Zero reference as `[w, x, y, z]`.
	#[serde(default)]
	pub ahrs_offset: Option<[f64; 4]>,
}

impl ReplayConfig {
	pub fn offset(&self) -> Option<Quaternion<f64>> {
		self.ahrs_offset.map(|[w, x, y, z]| Quaternion::new(w, x, y, z))
	}
}

pub trait TryIntoLevelFilter {
	fn try_into_level_filter(&self) -> Result<LevelFilter, ()>;
}

impl TryIntoLevelFilter for String {
	fn try_into_level_filter(&self) -> Result<LevelFilter, ()> {
		Ok(match self.as_str() {
			"none" => LevelFilter::Off,
			"error" => LevelFilter::Error,
			"warn" => LevelFilter::Warn,
			"info" => LevelFilter::Info,
			"debug" => LevelFilter::Debug,
			"all" => LevelFilter::Trace,
			_ => return Err(()),
		})
	}
}

impl Default for ReplayConfig {
	fn default() -> Self {
		ReplayConfig {
			log_level_filter: String::from("info"),
			log_directory: PathBuf::from("."),
			ahrs_madgwick_beta: ahrs::Madgwick::DEFAULT_BETA,
			ahrs_offset: None,
		}
	}
}

pub fn read(path: &Path) -> anyhow::Result<ReplayConfig> {
	let config_file = File::open(path)
		.with_context(|| format!("Failed to open configuration {}", path.display()))?;

	let config: ReplayConfig = serde_json::from_reader(config_file)
		.with_context(|| format!("Failed to parse configuration {}", path.display()))?;

	Ok(config)
}

pub fn save(path: &Path, config: &ReplayConfig) -> anyhow::Result<()> {
	let mut config_file = OpenOptions::new()
		.create(true)
		.write(true)
		.truncate(true)
		.open(path)
		.with_context(|| format!("Failed to create configuration {}", path.display()))?;

	write!(config_file, "{}", serde_json::to_string_pretty(config)?)?;

	Ok(())
}
