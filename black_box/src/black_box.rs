use chrono::{DateTime, Datelike, Local, Timelike};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::{
	collections::VecDeque,
	error::Error,
	fs::{File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
	thread,
	thread::JoinHandle,
	time::{Duration, Instant},
};

lazy_static! {
	static ref BLACK_BOX_CHANNEL: (Sender<Message>, Receiver<Message>) = unbounded::<Message>();
	static ref BLACK_BOX_LOGGER: BlackBoxLogger = BlackBoxLogger {
		start_instant: Instant::now()
	};
}

enum Message {
	Log(String),
	Flush,
}

/// Writes every log record to stdout and to a timestamped file, from a dedicated thread.
pub struct BlackBox {
	file: File,
	path: PathBuf,
	buffer: VecDeque<String>,
}

impl BlackBox {
	/// Creates `<directory>/<prefix>_<time>_<date>.log`, truncating any previous content.
	pub fn new(directory: &Path, prefix: &str) -> Result<Self, Box<dyn Error>> {
		let path = directory.join(log_file_name(prefix, &Local::now()));

		let file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.open(&path)?;

		Ok(BlackBox {
			buffer: VecDeque::<String>::new(),
			file,
			path,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn try_flush(&mut self) {
		if let Err(e) = self.flush() {
			self.buffer
				.push_back(format!("Failed to flush black box: {}", e));
		}
	}

	fn flush(&mut self) -> Result<(), Box<dyn Error>> {
		while let Some(message) = self.buffer.pop_front() {
			println!("{}", message);
			writeln!(self.file, "{}", message)?;
		}
		self.file.flush()?;
		Ok(())
	}

	fn receive_loop(&mut self) {
		const RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);

		while let Ok(message) = BLACK_BOX_CHANNEL.1.recv_timeout(RECEIVE_TIMEOUT) {
			match message {
				Message::Log(content) => self.buffer.push_back(content),
				Message::Flush => self.try_flush(),
			}

			const MAX_BUFFER_LEN: usize = 8;
			if self.buffer.len() > MAX_BUFFER_LEN {
				self.try_flush();
			}
		}

		if !self.buffer.is_empty() {
			self.try_flush();
		}
	}

	/// Installs the black box as the global logger. Fails if a logger is already set.
	pub fn spawn(mut self, level_filter: LevelFilter) -> Result<JoinHandle<()>, Box<dyn Error>> {
		log::set_logger(&*BLACK_BOX_LOGGER)
			.map(|()| log::set_max_level(level_filter))
			.map_err(|e| format!("Failed to install black box logger: {}", e))?;

		Ok(thread::spawn(move || loop {
			self.receive_loop()
		}))
	}
}

fn log_file_name(prefix: &str, now: &DateTime<Local>) -> String {
	format!(
		"{}_{}-{}-{}_{}-{}-{}.log",
		prefix,
		now.hour(),
		now.minute(),
		now.second(),
		now.day(),
		now.month(),
		now.year()
	)
}

fn format_record(elapsed: f32, record: &Record) -> String {
	if record.metadata().level() == Level::Error {
		format!(
			"[{:.3}][{:?}][{}] {} ({}:{})",
			elapsed,
			record.level(),
			record.module_path_static().unwrap_or("unknown"),
			record.args(),
			record.file_static().unwrap_or("unknown"),
			record.line().unwrap_or(0)
		)
	} else {
		format!(
			"[{:.3}][{:?}][{}] {}",
			elapsed,
			record.level(),
			record.module_path_static().unwrap_or("unknown"),
			record.args(),
		)
	}
}

struct BlackBoxLogger {
	start_instant: Instant,
}

impl Log for BlackBoxLogger {
	fn enabled(&self, metadata: &Metadata) -> bool {
		metadata.level() <= log::max_level()
	}

	fn log(&self, record: &Record) {
		if self.enabled(record.metadata()) {
			let elapsed = (Instant::now() - self.start_instant).as_secs_f32();
			// The receiver lives in a static, sending cannot fail
			let _ = BLACK_BOX_CHANNEL.0.send(Message::Log(format_record(elapsed, record)));
		}
	}

	fn flush(&self) {
		let _ = BLACK_BOX_CHANNEL.0.send(Message::Flush);
	}
}
