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

//! Types shared between a miner and its solver implementations: tuning
//! parameters, solution containers, run statistics, and the derivation of
//! SipHash key sets from block headers.

extern crate blake2_rfc;
extern crate byteorder;
extern crate serde;
#[macro_use]
extern crate serde_derive;

use blake2_rfc::blake2b::blake2b;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::io::Error;

/// Expected length of a cycle proof.
pub const PROOFSIZE: usize = 42;

/// Most solutions a single solver run will report.
pub const MAX_SOLS: usize = 4;

/// Solver tuning parameters, passed in by the caller when a solver context
/// is created. Zero-valued geometry fields fall back to solver defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverParams {
	/// Number of trim rounds to run.
	pub ntrims: u32,
	/// Seed-A block count.
	pub genablocks: u32,
	/// Seed-A threads per block.
	pub genatpb: u32,
	/// Seed-B threads per block.
	pub genbtpb: u32,
	/// Trim-round threads per block.
	pub trimtpb: u32,
	/// Tail threads per block.
	pub tailtpb: u32,
	/// Recovery block count.
	pub recoverblocks: u32,
	/// Recovery threads per block.
	pub recovertpb: u32,
	/// Edge expansion mode: 0 packed, 1 compact seeds, 2 compact rounds.
	pub expand: u32,
	/// Variant selector: 0 is Cuckoo, anything else Cuckaroo.
	pub selected: u32,
	/// Target device id.
	pub device: u32,
	/// log2 of the graph's edge count.
	pub edge_bits: u32,
	/// Whether the nonce is written over the last header bytes before
	/// hashing, or the header is hashed as delivered.
	pub mutate_nonce: bool,
}

impl Default for SolverParams {
	fn default() -> SolverParams {
		SolverParams {
			ntrims: 0,
			genablocks: 0,
			genatpb: 0,
			genbtpb: 0,
			trimtpb: 0,
			tailtpb: 0,
			recoverblocks: 0,
			recovertpb: 0,
			expand: 0,
			selected: 0,
			device: 0,
			edge_bits: 29,
			mutate_nonce: true,
		}
	}
}

/// A single solution: the nonce that produced the header and the recovered
/// cycle as edge nonces.
#[derive(Debug, Clone, Copy)]
pub struct Solution {
	pub nonce: u64,
	pub proof: [u64; PROOFSIZE],
}

impl Default for Solution {
	fn default() -> Solution {
		Solution {
			nonce: 0,
			proof: [0u64; PROOFSIZE],
		}
	}
}

/// All solutions found in a single solver run.
#[derive(Debug, Clone, Copy)]
pub struct SolverSolutions {
	pub edge_bits: u32,
	pub num_sols: u32,
	pub sols: [Solution; MAX_SOLS],
}

impl Default for SolverSolutions {
	fn default() -> SolverSolutions {
		SolverSolutions {
			edge_bits: 0,
			num_sols: 0,
			sols: [Solution::default(); MAX_SOLS],
		}
	}
}

/// Per-device solver statistics, filled on every run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SolverStats {
	pub device_id: u32,
	pub edge_bits: u32,
	pub device_name: String,
	/// Epoch millis when the last search began.
	pub last_start_time: u64,
	/// Epoch millis when the last search completed.
	pub last_end_time: u64,
	/// Duration of the last search, in millis.
	pub last_solution_time: u64,
	/// Searches performed since the solver was created.
	pub iterations: u32,
}

/// Writes `nonce` over the last four header bytes when `mutate_nonce` is
/// set, then derives the SipHash key set.
pub fn set_header_nonce(
	header: &[u8],
	nonce: Option<u32>,
	mutate_nonce: bool,
) -> Result<[u64; 4], Error> {
	if let Some(n) = nonce {
		let len = header.len();
		let mut header = header.to_owned();
		if mutate_nonce {
			header.truncate(len - 4);
			header.write_u32::<LittleEndian>(n)?;
		}
		create_siphash_keys(&header)
	} else {
		create_siphash_keys(header)
	}
}

/// SipHash key set: the four little-endian words of the header's 32-byte
/// blake2b digest.
pub fn create_siphash_keys(header: &[u8]) -> Result<[u64; 4], Error> {
	let h = blake2b(32, &[], header);
	let hb = h.as_bytes();
	let mut rdr = Cursor::new(hb);
	Ok([
		rdr.read_u64::<LittleEndian>()?,
		rdr.read_u64::<LittleEndian>()?,
		rdr.read_u64::<LittleEndian>()?,
		rdr.read_u64::<LittleEndian>()?,
	])
}

#[cfg(test)]
mod tests {
	extern crate serde_json;
	use super::*;

	#[test]
	fn header_keys_are_deterministic() {
		let header = [0u8; 80];
		let k1 = create_siphash_keys(&header).unwrap();
		let k2 = create_siphash_keys(&header).unwrap();
		assert_eq!(k1, k2);
		let other = [1u8; 80];
		assert_ne!(k1, create_siphash_keys(&other).unwrap());
	}

	#[test]
	fn nonce_mutation_rewrites_the_header_tail() {
		let header = [7u8; 80];
		let base = set_header_nonce(&header, Some(42), false).unwrap();
		let mutated = set_header_nonce(&header, Some(42), true).unwrap();
		assert_ne!(base, mutated);
		// Without mutation the nonce is ignored entirely.
		assert_eq!(base, set_header_nonce(&header, Some(43), false).unwrap());
		// With mutation it selects the key set.
		assert_ne!(
			mutated,
			set_header_nonce(&header, Some(43), true).unwrap()
		);
		assert_eq!(
			mutated,
			set_header_nonce(&header, Some(42), true).unwrap()
		);
	}

	#[test]
	fn params_roundtrip_through_serde() {
		let mut p = SolverParams::default();
		p.ntrims = 80;
		p.edge_bits = 19;
		p.selected = 1;
		let s = serde_json::to_string(&p).unwrap();
		let q: SolverParams = serde_json::from_str(&s).unwrap();
		assert_eq!(p, q);
	}

	#[test]
	fn empty_solutions_by_default() {
		let s = SolverSolutions::default();
		assert_eq!(s.num_sols, 0);
		assert_eq!(s.sols[0].proof[PROOFSIZE - 1], 0);
	}
}
