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

//! CPU compute substrate the kernels run on. A "device" is a logical slot
//! with its own memory accounting, so a trimmer binds one exclusively, its
//! working set is observable, and everything is released on drop. A kernel
//! launch is a parallel sweep over thread-blocks; one worker thread runs one
//! block to completion, and the host joins at the launch boundary, which
//! gives the same happens-before edges a kernel-boundary sync does.

use std::cmp::min;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;

/// Number of logical device slots on a host.
pub const MAX_DEVICES: usize = 16;

use crate::error::TrimmerError;

#[derive(Clone, Copy)]
struct DeviceSlot {
	in_use: bool,
	capacity: usize,
	allocated: usize,
}

lazy_static! {
	static ref DEVICES: Mutex<[DeviceSlot; MAX_DEVICES]> = Mutex::new(
		[DeviceSlot {
			in_use: false,
			capacity: usize::max_value(),
			allocated: 0,
		}; MAX_DEVICES]
	);
}

/// Caps the memory of a device slot, in bytes. Takes effect for subsequent
/// allocations only.
pub fn set_device_capacity(id: usize, bytes: usize) -> Result<(), TrimmerError> {
	if id >= MAX_DEVICES {
		return Err(TrimmerError::DeviceNotFound(id));
	}
	DEVICES.lock().unwrap()[id].capacity = bytes;
	Ok(())
}

/// Bytes currently allocated on a device slot.
pub fn device_memory_used(id: usize) -> Result<usize, TrimmerError> {
	if id >= MAX_DEVICES {
		return Err(TrimmerError::DeviceNotFound(id));
	}
	Ok(DEVICES.lock().unwrap()[id].allocated)
}

/// Exclusive binding of one trimmer to one device slot.
pub struct DeviceHandle {
	id: usize,
	name: String,
}

impl DeviceHandle {
	/// Claims the device; fails if it does not exist or is already bound.
	pub fn bind(id: usize) -> Result<DeviceHandle, TrimmerError> {
		if id >= MAX_DEVICES {
			return Err(TrimmerError::DeviceNotFound(id));
		}
		let mut devices = DEVICES.lock().unwrap();
		if devices[id].in_use {
			return Err(TrimmerError::DeviceInUse(id));
		}
		devices[id].in_use = true;
		Ok(DeviceHandle {
			id,
			name: format!("cpu-{}", id),
		})
	}

	pub fn id(&self) -> usize {
		self.id
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Allocates a zeroed word buffer against this device's accounting.
	pub fn alloc_words(&self, words: usize) -> Result<WordBuffer, TrimmerError> {
		let bytes = words * 4;
		{
			let mut devices = DEVICES.lock().unwrap();
			let slot = &mut devices[self.id];
			let available = slot.capacity - slot.allocated;
			if bytes > available {
				return Err(TrimmerError::AllocationFailure {
					device: self.id,
					requested: bytes,
					available,
				});
			}
			slot.allocated += bytes;
		}
		let mut v = Vec::with_capacity(words);
		for _ in 0..words {
			v.push(AtomicU32::new(0));
		}
		Ok(WordBuffer {
			device: self.id,
			bytes,
			words: v,
		})
	}
}

impl Drop for DeviceHandle {
	fn drop(&mut self) {
		// Release the binding recorded at construction, so the slot is
		// usable again once every buffer is gone.
		DEVICES.lock().unwrap()[self.id].in_use = false;
	}
}

/// A device-resident buffer of 32-bit words.
pub struct WordBuffer {
	device: usize,
	bytes: usize,
	words: Vec<AtomicU32>,
}

impl WordBuffer {
	pub fn words(&self) -> &[AtomicU32] {
		&self.words
	}

	pub fn len(&self) -> usize {
		self.words.len()
	}

	/// Zeroes a word range, as a memset between kernel dispatches would.
	pub fn clear(&self, from: usize, len: usize) {
		for w in &self.words[from..from + len] {
			w.store(0, Ordering::Relaxed);
		}
	}

	pub fn load(&self, i: usize) -> u32 {
		self.words[i].load(Ordering::Relaxed)
	}

	pub fn store(&self, i: usize, v: u32) {
		self.words[i].store(v, Ordering::Relaxed);
	}
}

impl Drop for WordBuffer {
	fn drop(&mut self) {
		DEVICES.lock().unwrap()[self.device].allocated -= self.bytes;
	}
}

/// Runs `blocks` thread-blocks to completion and joins.
pub fn launch<F>(blocks: usize, kernel: F)
where
	F: Fn(usize) + Sync,
{
	(0..blocks).into_par_iter().for_each(|g| kernel(g));
}

/// Runs `blocks` thread-blocks in parallel windows of `chunk`, committing
/// each block's output in block order. Scatter stages go through this so a
/// bucket's fill order, and therefore which edges a full bucket drops, does
/// not depend on thread scheduling.
pub fn launch_ordered<T, P, C>(blocks: usize, chunk: usize, produce: P, mut commit: C)
where
	T: Send,
	P: Fn(usize) -> T + Sync,
	C: FnMut(usize, T),
{
	let mut start = 0;
	while start < blocks {
		let end = min(start + chunk, blocks);
		let window: Vec<T> = (start..end).into_par_iter().map(|g| produce(g)).collect();
		for (off, out) in window.into_iter().enumerate() {
			commit(start + off, out);
		}
		start = end;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn binding_is_exclusive_and_released_on_drop() {
		let d = DeviceHandle::bind(14).unwrap();
		assert_eq!(
			DeviceHandle::bind(14).err(),
			Some(TrimmerError::DeviceInUse(14))
		);
		drop(d);
		let d2 = DeviceHandle::bind(14).unwrap();
		assert_eq!(d2.name(), "cpu-14");
	}

	#[test]
	fn unknown_device_is_rejected() {
		assert_eq!(
			DeviceHandle::bind(MAX_DEVICES).err(),
			Some(TrimmerError::DeviceNotFound(MAX_DEVICES))
		);
	}

	#[test]
	fn allocation_is_accounted_and_released() {
		let d = DeviceHandle::bind(15).unwrap();
		let before = device_memory_used(15).unwrap();
		let buf = d.alloc_words(1024).unwrap();
		assert_eq!(device_memory_used(15).unwrap(), before + 4096);
		assert_eq!(buf.len(), 1024);
		assert_eq!(buf.load(1023), 0);
		drop(buf);
		assert_eq!(device_memory_used(15).unwrap(), before);
	}

	#[test]
	fn capacity_limits_allocation() {
		let d = DeviceHandle::bind(13).unwrap();
		set_device_capacity(13, 1024).unwrap();
		match d.alloc_words(1024) {
			Err(TrimmerError::AllocationFailure {
				device, requested, ..
			}) => {
				assert_eq!(device, 13);
				assert_eq!(requested, 4096);
			}
			other => panic!("expected allocation failure, got {:?}", other.is_ok()),
		}
		set_device_capacity(13, usize::max_value()).unwrap();
	}

	#[test]
	fn launch_covers_every_block() {
		let buf = {
			let d = DeviceHandle::bind(12).unwrap();
			d.alloc_words(256).unwrap()
		};
		launch(256, |g| {
			buf.words()[g].fetch_add(g as u32, Ordering::Relaxed);
		});
		for g in 0..256 {
			assert_eq!(buf.load(g), g as u32);
		}
	}

	#[test]
	fn ordered_launch_commits_in_block_order() {
		let mut seen = Vec::new();
		launch_ordered(100, 7, |g| g * 2, |g, out| seen.push((g, out)));
		assert_eq!(seen.len(), 100);
		for (i, &(g, out)) in seen.iter().enumerate() {
			assert_eq!(g, i);
			assert_eq!(out, i * 2);
		}
	}
}
