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

//! Logging configuration types.

/// Log level that can be set in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LogLevel {
	Error,
	Warning,
	Info,
	Debug,
	Trace,
}

/// Where and how verbosely to log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
	/// Whether to log to stdout.
	pub log_to_stdout: bool,
	/// Stdout log level.
	pub stdout_log_level: LogLevel,
	/// Whether to log to a file.
	pub log_to_file: bool,
	/// File log level.
	pub file_log_level: LogLevel,
	/// Log file path.
	pub log_file_path: String,
}

impl Default for LoggingConfig {
	fn default() -> LoggingConfig {
		LoggingConfig {
			log_to_stdout: true,
			stdout_log_level: LogLevel::Debug,
			log_to_file: false,
			file_log_level: LogLevel::Trace,
			log_file_path: String::from("mean-miner.log"),
		}
	}
}
