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

//! Errors surfaced by the trimmer and its compute substrate. Every failure
//! propagates to the caller; there are no retries inside the core.

use std::error::Error;
use std::fmt;

/// Errors raised while building or running a trimmer.
#[derive(Debug, Clone, PartialEq)]
pub enum TrimmerError {
	/// The requested device id does not exist on this host.
	DeviceNotFound(usize),
	/// Another trimmer instance is already bound to the device.
	DeviceInUse(usize),
	/// The device cannot satisfy the requested allocation. Fatal at
	/// construction; nothing is partially allocated.
	AllocationFailure {
		/// Device the allocation was attempted on.
		device: usize,
		/// Bytes requested.
		requested: usize,
		/// Bytes still available.
		available: usize,
	},
	/// A parameter combination the pipeline cannot run with.
	InvalidParams(String),
	/// The caller asked for the run to stop; honored between kernels only.
	Aborted,
}

impl fmt::Display for TrimmerError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			TrimmerError::DeviceNotFound(id) => write!(f, "No device with id {}", id),
			TrimmerError::DeviceInUse(id) => {
				write!(f, "Device {} is bound to another trimmer", id)
			}
			TrimmerError::AllocationFailure {
				device,
				requested,
				available,
			} => write!(
				f,
				"Device {} out of memory: requested {} bytes, {} available",
				device, requested, available
			),
			TrimmerError::InvalidParams(ref msg) => write!(f, "Invalid parameters: {}", msg),
			TrimmerError::Aborted => write!(f, "Trimming aborted by caller"),
		}
	}
}

impl Error for TrimmerError {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_names_the_device() {
		let e = TrimmerError::AllocationFailure {
			device: 3,
			requested: 1024,
			available: 512,
		};
		let msg = format!("{}", e);
		assert!(msg.contains("Device 3"));
		assert!(msg.contains("1024"));
	}
}
