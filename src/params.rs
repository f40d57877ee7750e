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

//! Graph geometry and trimming parameters.
//!
//! Endpoint bits are split X+Y+Z, giving an NX by NY grid of buckets with an
//! NZ-sized Z-subspace inside each. Bucket capacities carry a fixed headroom
//! over the mean fill of NZ edges per bucket (NEPS_A/NEPS and NEPS_B/NEPS),
//! and the A/B buffers are aliased into a single arena whose offsets are
//! derived here.

use crate::error::TrimmerError;
use crate::plugin::SolverParams;

/// Cycle length of a valid proof.
pub use crate::plugin::PROOFSIZE;

/// log2 of the block size used by the block-keyed (Cuckaroo) oracle.
pub const EDGE_BLOCK_BITS: u32 = 6;
/// Nonces hashed per keyed block.
pub const EDGE_BLOCK_SIZE: usize = 1 << EDGE_BLOCK_BITS;
/// Mask selecting the in-block nonce index.
pub const EDGE_BLOCK_MASK: u32 = (EDGE_BLOCK_SIZE - 1) as u32;

// Per-bucket capacity numerators, in 1/NEPS units of NZ. NEPS_A is chosen so
// that the spare words between the round-1 output and the start of buffer B
// (NEPS_A - NEPS_B in per-bucket terms) cover a half-capacity B bucket.
const NEPS_A: u64 = 133;
const NEPS_B: u64 = 88;
const NEPS: u64 = 128;

/// Number of Seed-B launches over disjoint row ranges of the Seed-A buffer.
pub const NA: usize = 4;
/// Number of partitions the round-0 output is split into.
pub const NB: usize = 2;

/// Seed-A staging tile depth, in edges per row.
pub const FLUSHA: usize = 16;
/// Seed-B staging tile depth, in edges per column.
pub const FLUSHB: usize = 16;

/// Which edge construction the oracle uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
	/// Independent endpoint hashes per nonce.
	Cuckoo,
	/// Block-keyed hashing with xor-fold against the final lane.
	Cuckaroo,
}

impl Variant {
	/// Maps the caller-facing selector: zero is Cuckoo, anything else Cuckaroo.
	pub fn from_selector(selected: u32) -> Variant {
		if selected == 0 {
			Variant::Cuckoo
		} else {
			Variant::Cuckaroo
		}
	}
}

/// Per-kernel launch geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlocksTpb {
	pub blocks: u32,
	pub tpb: u32,
}

/// Trimming parameters, fixed at trimmer construction.
#[derive(Clone, Copy, Debug)]
pub struct TrimParams {
	/// Number of trim rounds; even and at least four.
	pub ntrims: u32,
	/// Seed-A geometry.
	pub gen_a: BlocksTpb,
	/// Seed-B geometry.
	pub gen_b: BlocksTpb,
	/// Trim-round geometry.
	pub trim: BlocksTpb,
	/// Tail geometry.
	pub tail: BlocksTpb,
	/// Recovery geometry.
	pub recover: BlocksTpb,
	/// 0: packed edges throughout; 1: compact through the seed stages;
	/// 2: compact deep into the trim rounds.
	pub expand: u32,
}

impl Default for TrimParams {
	fn default() -> TrimParams {
		TrimParams {
			ntrims: 176,
			gen_a: BlocksTpb {
				blocks: 4096,
				tpb: 256,
			},
			gen_b: BlocksTpb {
				blocks: 4096,
				tpb: 128,
			},
			trim: BlocksTpb {
				blocks: 4096,
				tpb: 512,
			},
			tail: BlocksTpb {
				blocks: 4096,
				tpb: 1024,
			},
			recover: BlocksTpb {
				blocks: 1024,
				tpb: 1024,
			},
			expand: 0,
		}
	}
}

impl TrimParams {
	/// Lifts the caller-facing solver parameters into trim parameters.
	pub fn from_solver_params(p: &SolverParams) -> TrimParams {
		let d = TrimParams::default();
		TrimParams {
			ntrims: if p.ntrims > 0 { p.ntrims } else { d.ntrims },
			gen_a: BlocksTpb {
				blocks: if p.genablocks > 0 {
					p.genablocks
				} else {
					d.gen_a.blocks
				},
				tpb: if p.genatpb > 0 { p.genatpb } else { d.gen_a.tpb },
			},
			gen_b: BlocksTpb {
				blocks: d.gen_b.blocks,
				tpb: if p.genbtpb > 0 { p.genbtpb } else { d.gen_b.tpb },
			},
			trim: BlocksTpb {
				blocks: d.trim.blocks,
				tpb: if p.trimtpb > 0 { p.trimtpb } else { d.trim.tpb },
			},
			tail: BlocksTpb {
				blocks: d.tail.blocks,
				tpb: if p.tailtpb > 0 { p.tailtpb } else { d.tail.tpb },
			},
			recover: BlocksTpb {
				blocks: if p.recoverblocks > 0 {
					p.recoverblocks
				} else {
					d.recover.blocks
				},
				tpb: if p.recovertpb > 0 {
					p.recovertpb
				} else {
					d.recover.tpb
				},
			},
			expand: p.expand,
		}
	}

	fn validate(&self) -> Result<(), TrimmerError> {
		if self.ntrims < 4 || self.ntrims % 2 != 0 {
			return Err(TrimmerError::InvalidParams(format!(
				"ntrims must be even and >= 4, got {}",
				self.ntrims
			)));
		}
		if self.expand > 2 {
			return Err(TrimmerError::InvalidParams(format!(
				"expand must be 0, 1 or 2, got {}",
				self.expand
			)));
		}
		// Deferred expansion only pays off once the edges have been carried
		// compact past the expansion round.
		if self.expand == 2 && self.ntrims < 8 {
			return Err(TrimmerError::InvalidParams(
				"expand 2 needs at least 8 trim rounds".to_owned(),
			));
		}
		Ok(())
	}
}

/// Graph geometry derived from the edge-bits size.
#[derive(Clone, Copy, Debug)]
pub struct Params {
	pub edge_bits: u32,
	pub xbits: u32,
	pub ybits: u32,
	pub zbits: u32,
	/// 2^edge_bits.
	pub nedges: u64,
	/// nedges - 1, masks a hash down to an endpoint.
	pub edge_mask: u32,
	pub nx: usize,
	pub ny: usize,
	pub nz: usize,
	/// nx * ny, the bucket count of the 2D grid.
	pub nx2: usize,
	/// Per-bucket edge capacity of the seed stages.
	pub edges_a: usize,
	/// Per-bucket edge capacity baseline of the trim rounds.
	pub edges_b: usize,
}

impl Params {
	/// Geometry for the given graph size, with the standard 6+6 X/Y split.
	pub fn new(edge_bits: u32) -> Result<Params, TrimmerError> {
		Params::with_split(edge_bits, 6, 6)
	}

	/// Geometry with an explicit X/Y split. X and Y must match so row and
	/// column routing stay interchangeable round to round.
	pub fn with_split(edge_bits: u32, xbits: u32, ybits: u32) -> Result<Params, TrimmerError> {
		if xbits != ybits {
			return Err(TrimmerError::InvalidParams(format!(
				"xbits {} and ybits {} must match",
				xbits, ybits
			)));
		}
		if edge_bits > 31 || edge_bits < xbits + ybits + 5 {
			return Err(TrimmerError::InvalidParams(format!(
				"edge_bits {} out of range for a {}+{} bucket split",
				edge_bits, xbits, ybits
			)));
		}
		let zbits = edge_bits - xbits - ybits;
		let nx = 1usize << xbits;
		let ny = 1usize << ybits;
		let nz = 1usize << zbits;
		if nx % NA != 0 {
			return Err(TrimmerError::InvalidParams(format!(
				"row count {} must divide into {} Seed-B launches",
				nx, NA
			)));
		}
		let edges_a = (nz as u64 * NEPS_A / NEPS) as usize;
		let edges_b = (nz as u64 * NEPS_B / NEPS) as usize;
		let p = Params {
			edge_bits,
			xbits,
			ybits,
			zbits,
			nedges: 1u64 << edge_bits,
			edge_mask: ((1u64 << edge_bits) - 1) as u32,
			nx,
			ny,
			nz,
			nx2: nx * ny,
			edges_a,
			edges_b,
		};
		debug_assert!(p.edges_b % NB == 0);
		Ok(p)
	}

	/// Words per edge going into the seed buffers.
	pub fn seed_words(&self, expand: u32) -> usize {
		if expand > 0 {
			1
		} else {
			2
		}
	}

	/// The round index at which compact edges are expanded to packed pairs.
	/// Rounds before it carry nonces and re-derive endpoints on demand.
	pub fn expand_round(&self, expand: u32) -> u32 {
		match expand {
			1 => 2,
			2 => 7,
			_ => 0,
		}
	}

	/// Words per edge entering round `r`.
	pub fn round_words_in(&self, expand: u32, r: u32) -> usize {
		if r == 0 {
			self.seed_words(expand)
		} else {
			self.round_words_out(expand, r - 1)
		}
	}

	/// Words per edge leaving round `r`.
	pub fn round_words_out(&self, expand: u32, r: u32) -> usize {
		if r < self.expand_round(expand) {
			1
		} else {
			2
		}
	}

	/// Per-bucket edge capacity entering round `r` (per partition for the
	/// NB-way round 1).
	pub fn round_cap_in(&self, r: u32) -> usize {
		match r {
			0 => self.edges_a,
			1 => self.edges_b / NB,
			2 => self.edges_b / 2,
			3 => self.edges_a / 4,
			_ => self.edges_b / 4,
		}
	}

	/// Per-bucket edge capacity leaving round `r`.
	pub fn round_cap_out(&self, r: u32) -> usize {
		match r {
			0 => self.edges_b / NB,
			1 => self.edges_b / 2,
			2 => self.edges_a / 4,
			_ => self.edges_b / 4,
		}
	}

	/// Seed/A-side buffer size in words.
	pub fn size_a(&self, expand: u32) -> usize {
		self.nx2 * self.edges_a * self.seed_words(expand)
	}

	/// B-side buffer size in words. Sized for packed pairs unless expansion
	/// is deferred past the early rounds.
	pub fn size_b(&self, expand: u32) -> usize {
		let ew = if expand > 1 { 1 } else { 2 };
		self.nx2 * self.edges_b * ew
	}

	/// Total arena size in words: buffer A plus one B partition of slack.
	pub fn arena_words(&self, expand: u32) -> usize {
		self.size_a(expand) + self.size_b(expand) / NB
	}

	/// Word offset of the Seed-A target region inside the arena.
	pub fn ab_offset(&self, expand: u32) -> usize {
		self.size_b(expand) / NB
	}

	/// Word offset of buffer B inside the arena.
	pub fn b_offset(&self, expand: u32) -> usize {
		self.size_a(expand) - self.size_b(expand) + self.size_b(expand) / NB
	}

	/// Size in words of one round-0 output partition, at the width round 0
	/// actually writes.
	pub fn part_words(&self, expand: u32) -> usize {
		self.nx2 * (self.edges_b / NB) * self.round_words_out(expand, 0)
	}

	/// Word offset of round-0 output partition `p`. Partitions stack
	/// end-aligned against the top of buffer A: the partition written first
	/// (highest, by the descending launch order) lands in the arena slack
	/// beyond A, and each later one over source chunks already consumed.
	pub fn part_base(&self, expand: u32, p: usize) -> usize {
		self.size_a(expand) - (NB - 1 - p) * self.part_words(expand)
	}

	/// Checks that every stage's writes stay clear of the regions still to be
	/// read under the aliased layout, given the launch ordering the trimmer
	/// uses (Seed B ascending, round 0 descending).
	pub fn check_layout(&self, tp: &TrimParams) -> Result<(), TrimmerError> {
		tp.validate()?;
		let expand = tp.expand;
		let size_a = self.size_a(expand);
		let size_b = self.size_b(expand);
		let b_off = self.b_offset(expand);
		let mut ok = size_b % NB == 0 && size_a % NA == 0 && size_a % NB == 0;
		// Seed B launch i writes strictly below its own source rows.
		ok = ok && size_a / NA <= size_b / NB;
		// B sits inside the arena.
		ok = ok && size_b - size_b / NB <= size_a;
		// A round-0 partition fits over one consumed source chunk, and in
		// the arena slack beyond buffer A.
		ok = ok && self.part_words(expand) <= size_a / NB;
		ok = ok && self.part_words(expand) <= size_b / NB;
		// Round 1 output stays below the lowest partition it reads.
		ok = ok
			&& self.nx2 * (self.edges_b / 2) * self.round_words_out(expand, 1)
				<= self.part_base(expand, 0);
		// Round 2 input sits below buffer B, and later odd rounds write
		// packed pairs below it too.
		ok = ok && self.nx2 * (self.edges_b / 2) * self.round_words_in(expand, 2) <= b_off;
		ok = ok && self.nx2 * (self.edges_b / 4) * 2 <= b_off;
		// Even-round outputs fit the B region, both the round-2 step-down
		// and the packed steady state.
		ok = ok && b_off + self.nx2 * (self.edges_a / 4) * self.round_words_out(expand, 2)
			<= self.arena_words(expand);
		ok = ok && b_off + self.nx2 * (self.edges_b / 4) * 2 <= self.arena_words(expand);
		if ok {
			Ok(())
		} else {
			Err(TrimmerError::InvalidParams(format!(
				"aliased buffer layout does not hold for edge_bits {} expand {}",
				self.edge_bits, expand
			)))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn geometry_splits_edge_bits() {
		let p = Params::new(19).unwrap();
		assert_eq!(p.zbits, 7);
		assert_eq!(p.nx2, 4096);
		assert_eq!(p.nz, 128);
		assert_eq!(p.edges_a, 133);
		assert_eq!(p.edges_b, 88);
		assert_eq!(p.edge_mask, (1u32 << 19) - 1);
	}

	#[test]
	fn rejects_undersized_graphs() {
		assert!(Params::new(12).is_err());
		assert!(Params::new(32).is_err());
	}

	#[test]
	fn layout_holds_for_all_expand_modes() {
		for &bits in &[17, 19, 20, 29, 31] {
			let p = Params::new(bits).unwrap();
			for expand in 0..3 {
				let mut tp = TrimParams::default();
				tp.ntrims = 80;
				tp.expand = expand;
				p.check_layout(&tp).unwrap();
			}
		}
	}

	#[test]
	fn aliased_offsets_partition_the_arena() {
		let p = Params::new(19).unwrap();
		for expand in 0..3 {
			// The partition written first starts exactly at the end of
			// buffer A, in the arena slack; the one written last lands over
			// the source chunk the first launch consumed.
			assert_eq!(p.part_base(expand, NB - 1), p.size_a(expand));
			assert!(
				p.part_base(expand, NB - 1) + p.part_words(expand) <= p.arena_words(expand)
			);
			assert!(p.part_base(expand, 0) >= p.size_a(expand) / 2);
			assert_eq!(
				p.b_offset(expand) + p.size_b(expand),
				p.arena_words(expand)
			);
		}
		// At full width the partition layout coincides with placing buffer B
		// at sizeA - sizeB + sizeB/NB.
		for &expand in &[0, 2] {
			assert_eq!(p.part_base(expand, 0), p.b_offset(expand));
		}
	}

	#[test]
	fn round_caps_follow_the_schedule() {
		let p = Params::new(19).unwrap();
		assert_eq!(p.round_cap_in(0), p.edges_a);
		assert_eq!(p.round_cap_out(0), p.edges_b / NB);
		assert_eq!(p.round_cap_out(1), p.edges_b / 2);
		assert_eq!(p.round_cap_out(2), p.edges_a / 4);
		assert_eq!(p.round_cap_out(3), p.edges_b / 4);
		assert_eq!(p.round_cap_in(7), p.edges_b / 4);
		// Consecutive rounds agree on what they hand over.
		for r in 1..10 {
			assert_eq!(p.round_cap_in(r), p.round_cap_out(r - 1));
		}
	}

	#[test]
	fn expansion_round_per_mode() {
		let p = Params::new(19).unwrap();
		assert_eq!(p.round_words_in(0, 0), 2);
		assert_eq!(p.round_words_in(1, 0), 1);
		assert_eq!(p.round_words_out(1, 1), 1);
		assert_eq!(p.round_words_out(1, 2), 2);
		assert_eq!(p.round_words_out(2, 6), 1);
		assert_eq!(p.round_words_out(2, 7), 2);
	}

	#[test]
	fn trim_params_validation() {
		let p = Params::new(19).unwrap();
		let mut tp = TrimParams::default();
		tp.ntrims = 5;
		assert!(p.check_layout(&tp).is_err());
		tp.ntrims = 6;
		tp.expand = 3;
		assert!(p.check_layout(&tp).is_err());
		tp.expand = 2;
		assert!(p.check_layout(&tp).is_err());
		tp.ntrims = 8;
		assert!(p.check_layout(&tp).is_ok());
	}
}
