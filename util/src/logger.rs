// Copyright 2020 The Grin Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging, as well as the panic hook that writes backtraces through the
//! logger before the process dies.

use backtrace::Backtrace;
use std::fs::OpenOptions;
use std::panic;
use std::sync::Mutex;

use slog::{Discard, Drain, Duplicate, Level, Logger};
use slog_async;
use slog_term;

use crate::types::{LogLevel, LoggingConfig};

fn convert_log_level(in_level: &LogLevel) -> Level {
	match *in_level {
		LogLevel::Info => Level::Info,
		LogLevel::Warning => Level::Warning,
		LogLevel::Debug => Level::Debug,
		LogLevel::Trace => Level::Trace,
		LogLevel::Error => Level::Error,
	}
}

lazy_static! {
	/// Whether logging was explicitly initialised; nothing is output otherwise.
	static ref WAS_INIT: Mutex<bool> = Mutex::new(false);
	/// Logging configuration, set once before the first logging call.
	static ref LOGGING_CONFIG: Mutex<LoggingConfig> = Mutex::new(LoggingConfig::default());
	/// The root logger all crates in the workspace log through.
	pub static ref LOGGER: Logger = {
		let was_init = *WAS_INIT.lock().unwrap();
		let config = LOGGING_CONFIG.lock().unwrap().clone();
		if !was_init {
			Logger::root(Discard, o!())
		} else {
			let log_to_stdout = config.log_to_stdout;
			let stdout_level = convert_log_level(&config.stdout_log_level);
			let decorator = slog_term::TermDecorator::new().build();
			let drain = slog_term::CompactFormat::new(decorator).build().fuse();
			let terminal = drain
				.filter(move |record| log_to_stdout && record.level().is_at_least(stdout_level))
				.fuse();
			if config.log_to_file {
				let file = OpenOptions::new()
					.create(true)
					.append(true)
					.open(&config.log_file_path)
					.expect("can't open log file");
				let file_level = convert_log_level(&config.file_log_level);
				let decorator = slog_term::PlainDecorator::new(file);
				let drain = slog_term::FullFormat::new(decorator).build().fuse();
				let drain = drain
					.filter(move |record| record.level().is_at_least(file_level))
					.fuse();
				let drain = Duplicate::new(terminal, drain).fuse();
				let drain = slog_async::Async::new(drain).build().fuse();
				Logger::root(drain, o!())
			} else {
				let drain = slog_async::Async::new(terminal).build().fuse();
				Logger::root(drain, o!())
			}
		}
	};
}

/// Initialize the logger with the given configuration.
pub fn init_logger(config: Option<LoggingConfig>) {
	if let Some(c) = config {
		let mut config_ref = LOGGING_CONFIG.lock().unwrap();
		*config_ref = c;
	}
	{
		let mut was_init_ref = WAS_INIT.lock().unwrap();
		*was_init_ref = true;
	}
	send_panic_to_log();
}

/// Initialize the logger for unit and integration tests.
pub fn init_test_logger() {
	let mut was_init_ref = WAS_INIT.lock().unwrap();
	if *was_init_ref {
		return;
	}
	let mut config_ref = LOGGING_CONFIG.lock().unwrap();
	*config_ref = LoggingConfig::default();
	*was_init_ref = true;
}

/// Hook to write panic location and backtrace through the logger, so crashes
/// of detached threads leave a trace in the log file.
fn send_panic_to_log() {
	panic::set_hook(Box::new(|info| {
		let backtrace = Backtrace::new();

		let thread = std::thread::current();
		let thread = thread.name().unwrap_or("unnamed");

		let msg = match info.payload().downcast_ref::<&'static str>() {
			Some(s) => *s,
			None => match info.payload().downcast_ref::<String>() {
				Some(s) => &**s,
				None => "Box<Any>",
			},
		};

		match info.location() {
			Some(location) => {
				error!(
					LOGGER,
					"\nthread '{}' panicked at '{}': {}:{}{:?}\n\n",
					thread,
					msg,
					location.file(),
					location.line(),
					backtrace
				);
			}
			None => error!(
				LOGGER,
				"thread '{}' panicked at '{}'{:?}", thread, msg, backtrace
			),
		}
	}));
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_logger_is_quiet_until_initialised() {
		init_test_logger();
		info!(LOGGER, "logger initialised for tests");
	}
}
