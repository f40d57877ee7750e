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

//! The edge trimmer: seeds all edges into an NX by NY bucket grid, then
//! iteratively drops every edge whose counted endpoint has degree below two
//! inside its bucket, until only the residue that can still carry a 42-cycle
//! remains.
//!
//! Buffers A, B and AB share one arena. Seed B consumes the Seed-A region in
//! ascending row chunks that each write strictly below their own source, and
//! round 0 consumes buffer A in descending chunks, each writing its own B
//! partition, so no launch ever writes words a later launch still has to
//! read. Scatter rounds commit through an ordered drain, which keeps the
//! fill order of a bucket, and with it the edges a full bucket drops,
//! independent of thread scheduling.

use std::cmp::min;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::device::{launch, launch_ordered, DeviceHandle, WordBuffer};
use crate::error::TrimmerError;
use crate::params::{
	Params, TrimParams, Variant, EDGE_BLOCK_SIZE, FLUSHA, FLUSHB, NA, NB, PROOFSIZE,
};
use crate::siphash::{block_edge, siphash_block};
use crate::util::LOGGER;

/// Blocks whose output is staged before each ordered drain.
const COMMIT_CHUNK: usize = 256;

/// An edge as it sits in a buffer: a packed endpoint pair with the bucket
/// key first, or a compact nonce that re-derives its endpoints on demand.
#[derive(Clone, Copy)]
enum StoredEdge {
	Pair(u32, u32),
	Nonce(u32),
}

/// Reads edge `i` of a bucket segment, skipping the null sentinel. Compact
/// slots are biased by one so nonce zero stays distinguishable from an
/// empty slot.
#[inline]
fn read_edge(arena: &WordBuffer, base: usize, i: usize, ew: usize) -> Option<StoredEdge> {
	if ew == 2 {
		let lo = arena.load(base + 2 * i);
		let hi = arena.load(base + 2 * i + 1);
		if lo == 0 && hi == 0 {
			None
		} else {
			Some(StoredEdge::Pair(lo, hi))
		}
	} else {
		let w = arena.load(base + i);
		if w == 0 {
			None
		} else {
			Some(StoredEdge::Nonce(w - 1))
		}
	}
}

/// Records one occurrence of `z` in the two-plane degree bitmap. The first
/// plane holds "seen once"; a hit that finds the bit already set promotes
/// the second plane, which saturates at "seen twice or more". The bitmap
/// is owned by the one block counting its bucket, so unlike the GPU
/// kernel's shared-memory counter these are plain ORs; the prior value of
/// the first plane still gates the promotion, which is what makes the
/// counts commutative and saturating in any call order.
#[inline]
fn increase_2b_counter(ecounters: &mut [u32], z: usize) {
	let half = ecounters.len() / 2;
	let word = z >> 5;
	let mask = 1u32 << (z & 31);
	let old = ecounters[word] & mask;
	ecounters[word] |= mask;
	if old != 0 {
		ecounters[half + word] |= mask;
	}
}

/// Whether `z` was seen at least twice.
#[inline]
fn read_2b_counter(ecounters: &[u32], z: usize) -> bool {
	let half = ecounters.len() / 2;
	ecounters[half + (z >> 5)] & (1u32 << (z & 31)) != 0
}

/// Reserves `n` slots of a bucket, clamped to its capacity. The counter
/// itself never exceeds the capacity; excess entries are dropped silently.
#[inline]
fn reserve(idx: &WordBuffer, bucket: usize, n: usize, cap: usize) -> (usize, usize) {
	let cur = idx.load(bucket) as usize;
	let take = min(n, cap.saturating_sub(cur));
	idx.store(bucket, (cur + take) as u32);
	(cur, take)
}

/// Flushes staged tile entries into a bucket segment.
fn flush_tile(
	arena: &WordBuffer,
	idx: &WordBuffer,
	bucket: usize,
	cap: usize,
	region: usize,
	ew: usize,
	entries: &[u64],
) {
	let (start, take) = reserve(idx, bucket, entries.len(), cap);
	let base = region + bucket * cap * ew + start * ew;
	for (i, &e) in entries[..take].iter().enumerate() {
		arena.store(base + i * ew, e as u32);
		if ew == 2 {
			arena.store(base + i * ew + 1, (e >> 32) as u32);
		}
	}
}

/// One input stream of a trim round: a bucket-strided region plus the index
/// array holding its per-bucket counts.
struct RoundSrc<'a> {
	base: usize,
	stride: usize,
	ew: usize,
	cap: usize,
	idx: &'a WordBuffer,
}

/// A trimmer bound to one device, holding the arena and index arrays for
/// one graph size. Stateless across calls apart from its allocations.
pub struct Trimmer {
	params: Params,
	tp: TrimParams,
	variant: Variant,
	// Buffers precede the device handle so drops release the memory
	// accounting before the binding itself.
	arena: WordBuffer,
	indexes: Vec<WordBuffer>,
	recovery: WordBuffer,
	device: DeviceHandle,
	dkeys: [u64; 4],
	abort: Arc<AtomicBool>,
}

impl Trimmer {
	/// Builds a trimmer for the given graph size on the given device. All
	/// device memory is allocated here; a failed allocation leaves nothing
	/// behind.
	pub fn new(
		tp: TrimParams,
		edge_bits: u32,
		device_id: usize,
		variant: Variant,
	) -> Result<Trimmer, TrimmerError> {
		let params = Params::new(edge_bits)?;
		params.check_layout(&tp)?;
		let device = DeviceHandle::bind(device_id)?;
		let arena = device.alloc_words(params.arena_words(tp.expand))?;
		let mut indexes = Vec::with_capacity(NB + 1);
		for _ in 0..NB + 1 {
			indexes.push(device.alloc_words(params.nx2)?);
		}
		let recovery = device.alloc_words(PROOFSIZE)?;
		info!(
			LOGGER,
			"trimmer on {}: {:?} edge_bits {}, {}x{} buckets, {} MB arena",
			device.name(),
			variant,
			edge_bits,
			params.nx,
			params.ny,
			arena.len() * 4 / (1024 * 1024)
		);
		debug!(
			LOGGER,
			"geometry: ntrims {}, genA {}x{}, genB {}x{}, trim {}x{}, tail {}x{}, recover {}x{}, expand {}",
			tp.ntrims,
			tp.gen_a.blocks,
			tp.gen_a.tpb,
			tp.gen_b.blocks,
			tp.gen_b.tpb,
			tp.trim.blocks,
			tp.trim.tpb,
			tp.tail.blocks,
			tp.tail.tpb,
			tp.recover.blocks,
			tp.recover.tpb,
			tp.expand
		);
		Ok(Trimmer {
			params,
			tp,
			variant,
			device,
			arena,
			indexes,
			recovery,
			dkeys: [0u64; 4],
			abort: Arc::new(AtomicBool::new(false)),
		})
	}

	/// Flag honored between kernel dispatches; set it to stop a running
	/// trim at the next launch boundary.
	pub fn abort_handle(&self) -> Arc<AtomicBool> {
		self.abort.clone()
	}

	pub fn device_name(&self) -> &str {
		self.device.name()
	}

	pub fn device_id(&self) -> usize {
		self.device.id()
	}

	pub fn edge_bits(&self) -> u32 {
		self.params.edge_bits
	}

	fn check_abort(&self) -> Result<(), TrimmerError> {
		if self.abort.load(Ordering::Relaxed) {
			Err(TrimmerError::Aborted)
		} else {
			Ok(())
		}
	}

	/// Runs the full pipeline for the given key set and returns the
	/// residual edge count.
	pub fn trim(&mut self, k: &[u64; 4]) -> Result<u32, TrimmerError> {
		// Host-side keys are copied to the device on every call.
		self.dkeys = *k;
		let start = SystemTime::now();
		let nx2 = self.params.nx2;

		self.indexes[1].clear(0, nx2);
		self.check_abort()?;
		self.seed_a();

		self.indexes[0].clear(0, nx2);
		for i in 0..NA {
			self.check_abort()?;
			self.seed_b(i);
		}

		for p in 0..NB {
			self.indexes[1 + p].clear(0, nx2);
		}
		// Descending, so the partition written over buffer A's tail only
		// lands on source chunks already consumed.
		for p in (0..NB).rev() {
			self.check_abort()?;
			self.round0(p);
		}

		self.indexes[0].clear(0, nx2);
		self.check_abort()?;
		self.round_n(1);

		for r in 2..self.tp.ntrims {
			let dst = if r % 2 == 0 { 1 } else { 0 };
			self.indexes[dst].clear(0, nx2);
			self.check_abort()?;
			self.round_n(r);
		}

		self.indexes[1].clear(0, nx2);
		self.check_abort()?;
		let count = self.tail();
		if let Ok(elapsed) = start.elapsed() {
			debug!(
				LOGGER,
				"trimmed {} edges to {} in {} rounds, {:?}",
				self.params.nedges,
				count,
				self.tp.ntrims,
				elapsed
			);
		}
		Ok(count)
	}

	/// The residual edge list left behind by the last trim, as endpoint
	/// pairs in first-endpoint order.
	pub fn edges(&self) -> Vec<(u32, u32)> {
		let count = self.indexes[1].load(0) as usize;
		let base = self.params.b_offset(self.tp.expand);
		(0..count)
			.map(|i| {
				(
					self.arena.load(base + 2 * i),
					self.arena.load(base + 2 * i + 1),
				)
			})
			.collect()
	}

	/// Enumerates every edge into the Seed-A buffer, bucketed by the first
	/// endpoint's row bits. One block owns one column of the grid, so each
	/// bucket has a single writer and a deterministic fill order.
	fn seed_a(&self) {
		let p = self.params;
		let keys = self.dkeys;
		let variant = self.variant;
		let expand = self.tp.expand;
		let ew = p.seed_words(expand);
		let region = p.ab_offset(expand);
		let mask = p.edge_mask;
		let nx = p.nx;
		let row_shift = p.ybits + p.zbits;
		let cap = p.edges_a;
		let per_block = (p.nedges as usize) / nx;
		let arena = &self.arena;
		let idx = &self.indexes[1];
		if self.tp.gen_a.blocks != nx as u32 {
			debug!(LOGGER, "seed A folded onto {} column blocks", nx);
		}
		launch(nx, |col| {
			let mut tile = vec![0u64; nx * FLUSHA];
			let mut fill = vec![0usize; nx];
			let mut block = [0u64; EDGE_BLOCK_SIZE];
			let first = col * per_block;
			for base_nonce in (first..first + per_block).step_by(EDGE_BLOCK_SIZE) {
				if variant == Variant::Cuckaroo {
					siphash_block(&keys, base_nonce as u64, &mut block);
				}
				for s in 0..EDGE_BLOCK_SIZE {
					let nonce = (base_nonce + s) as u32;
					let (u, v) = match variant {
						Variant::Cuckaroo => {
							let e = block_edge(&block, s);
							(e as u32 & mask, (e >> 32) as u32 & mask)
						}
						Variant::Cuckoo => {
							let u = variant.endpoint(&keys, nonce, 0, mask);
							// Compact output re-derives the second
							// endpoint later, skip hashing it here.
							let v = if ew == 2 {
								variant.endpoint(&keys, nonce, 1, mask)
							} else {
								0
							};
							(u, v)
						}
					};
					let row = (u >> row_shift) as usize;
					let entry = if ew == 2 {
						u as u64 | (v as u64) << 32
					} else {
						(nonce + 1) as u64
					};
					tile[row * FLUSHA + fill[row]] = entry;
					fill[row] += 1;
					if fill[row] == FLUSHA {
						flush_tile(
							arena,
							idx,
							row * nx + col,
							cap,
							region,
							ew,
							&tile[row * FLUSHA..row * FLUSHA + FLUSHA],
						);
						fill[row] = 0;
					}
				}
			}
			for row in 0..nx {
				if fill[row] > 0 {
					flush_tile(
						arena,
						idx,
						row * nx + col,
						cap,
						region,
						ew,
						&tile[row * FLUSHA..row * FLUSHA + fill[row]],
					);
				}
			}
		});
	}

	/// Refines one row chunk of the Seed-A buffer into column buckets by
	/// the Y bits of the routing endpoint. Launched NA times in ascending
	/// order; each launch writes strictly below the rows it reads.
	fn seed_b(&self, launch_no: usize) {
		let p = self.params;
		let keys = self.dkeys;
		let variant = self.variant;
		let expand = self.tp.expand;
		let ew = p.seed_words(expand);
		let src_region = p.ab_offset(expand);
		let mask = p.edge_mask;
		let nx = p.nx;
		let cap = p.edges_a;
		let rows_per = nx / NA;
		let arena = &self.arena;
		let src_idx = &self.indexes[1];
		let dst_idx = &self.indexes[0];
		launch(rows_per, |b| {
			let row = launch_no * rows_per + b;
			let mut tile = vec![0u64; nx * FLUSHB];
			let mut fill = vec![0usize; nx];
			for col in 0..nx {
				let slot = row * nx + col;
				let cnt = min(src_idx.load(slot) as usize, cap);
				let base = src_region + slot * cap * ew;
				for k in 0..cnt {
					let e = match read_edge(arena, base, k, ew) {
						Some(e) => e,
						None => continue,
					};
					let (u, entry) = match e {
						StoredEdge::Pair(lo, hi) => (lo, lo as u64 | (hi as u64) << 32),
						StoredEdge::Nonce(n) => {
							(variant.endpoint(&keys, n, 0, mask), (n + 1) as u64)
						}
					};
					let y = ((u >> p.zbits) as usize) & (nx - 1);
					tile[y * FLUSHB + fill[y]] = entry;
					fill[y] += 1;
					if fill[y] == FLUSHB {
						flush_tile(
							arena,
							dst_idx,
							row * nx + y,
							cap,
							0,
							ew,
							&tile[y * FLUSHB..y * FLUSHB + FLUSHB],
						);
						fill[y] = 0;
					}
				}
			}
			for y in 0..nx {
				if fill[y] > 0 {
					flush_tile(
						arena,
						dst_idx,
						row * nx + y,
						cap,
						0,
						ew,
						&tile[y * FLUSHB..y * FLUSHB + fill[y]],
					);
				}
			}
		});
	}

	/// Counts one bucket's edges into the degree bitmap, then re-scans and
	/// keeps the edges whose counted endpoint reached degree two. A barrier
	/// separates the phases so emission sees a consistent bitmap.
	fn round_block(
		&self,
		g: usize,
		round: u32,
		srcs: &[RoundSrc<'_>],
		out_compact: bool,
	) -> Vec<(u32, u64)> {
		let p = self.params;
		let keys = self.dkeys;
		let variant = self.variant;
		let mask = p.edge_mask;
		let zmask = p.nz - 1;
		let parity = round & 1;
		let arena = &self.arena;
		let mut ecounters = vec![0u32; 2 * (p.nz / 32)];

		for s in srcs {
			let cnt = min(s.idx.load(g) as usize, s.cap);
			let base = s.base + g * s.stride;
			for k in 0..cnt {
				if let Some(e) = read_edge(arena, base, k, s.ew) {
					let active = match e {
						StoredEdge::Pair(a, _) => a,
						StoredEdge::Nonce(n) => variant.endpoint(&keys, n, parity, mask),
					};
					increase_2b_counter(&mut ecounters, active as usize & zmask);
				}
			}
		}

		let mut out = Vec::new();
		for s in srcs {
			let cnt = min(s.idx.load(g) as usize, s.cap);
			let base = s.base + g * s.stride;
			for k in 0..cnt {
				let e = match read_edge(arena, base, k, s.ew) {
					Some(e) => e,
					None => continue,
				};
				let (active, other) = match e {
					StoredEdge::Pair(a, b) => (a, b),
					StoredEdge::Nonce(n) => {
						let (u, v) = variant.endpoints(&keys, n, mask);
						if parity == 0 {
							(u, v)
						} else {
							(v, u)
						}
					}
				};
				if !read_2b_counter(&ecounters, active as usize & zmask) {
					continue;
				}
				// Route by the other endpoint; endpoint order swaps so the
				// next round counts the endpoint it is bucketed by.
				let dest = other >> p.zbits;
				let payload = match e {
					StoredEdge::Nonce(n) if out_compact => (n + 1) as u64,
					_ => other as u64 | (active as u64) << 32,
				};
				out.push((dest, payload));
			}
		}
		out
	}

	/// Round 0 over one source chunk, writing one B partition. The caller
	/// iterates partitions in descending order.
	fn round0(&self, part: usize) {
		let p = self.params;
		let expand = self.tp.expand;
		let blocks = p.nx2 / NB;
		let cap_in = p.round_cap_in(0);
		let ew_in = p.round_words_in(expand, 0);
		let cap_out = p.round_cap_out(0);
		let ew_out = p.round_words_out(expand, 0);
		let out_compact = ew_out == 1;
		let seg_stride = (p.edges_b / NB) * ew_out;
		let part_base = p.part_base(expand, part);
		let dst_idx = &self.indexes[1 + part];
		let arena = &self.arena;
		let src = RoundSrc {
			base: 0,
			stride: cap_in * ew_in,
			ew: ew_in,
			cap: cap_in,
			idx: &self.indexes[0],
		};
		launch_ordered(
			blocks,
			COMMIT_CHUNK,
			|b| {
				let g = part * blocks + b;
				self.round_block(g, 0, std::slice::from_ref(&src), out_compact)
			},
			|_, out| {
				for (dest, payload) in out {
					let (start, take) = reserve(dst_idx, dest as usize, 1, cap_out);
					if take == 0 {
						continue;
					}
					let base = part_base + dest as usize * seg_stride + start * ew_out;
					arena.store(base, payload as u32);
					if ew_out == 2 {
						arena.store(base + 1, (payload >> 32) as u32);
					}
				}
			},
		);
	}

	/// Rounds 1 and up. Round 1 folds the NB partitions of each bucket
	/// into a single bitmap; later rounds ping-pong between A and B.
	fn round_n(&self, round: u32) {
		let p = self.params;
		let expand = self.tp.expand;
		let b_off = p.b_offset(expand);
		let cap_in = p.round_cap_in(round);
		let ew_in = p.round_words_in(expand, round);
		let cap_out = p.round_cap_out(round);
		let ew_out = p.round_words_out(expand, round);
		let out_compact = ew_out == 1;
		let even = round % 2 == 0;

		let mut srcs = Vec::new();
		if round == 1 {
			for part in 0..NB {
				srcs.push(RoundSrc {
					base: p.part_base(expand, part),
					stride: (p.edges_b / NB) * p.round_words_out(expand, 0),
					ew: ew_in,
					cap: cap_in,
					idx: &self.indexes[1 + part],
				});
			}
		} else {
			srcs.push(RoundSrc {
				base: if even { 0 } else { b_off },
				stride: cap_in * ew_in,
				ew: ew_in,
				cap: cap_in,
				idx: &self.indexes[if even { 0 } else { 1 }],
			});
		}

		let dst_base = if even { b_off } else { 0 };
		let dst_idx = &self.indexes[if even { 1 } else { 0 }];
		let dst_stride = cap_out * ew_out;
		let arena = &self.arena;
		launch_ordered(
			p.nx2,
			COMMIT_CHUNK,
			|g| self.round_block(g, round, &srcs, out_compact),
			|_, out| {
				for (dest, payload) in out {
					let (start, take) = reserve(dst_idx, dest as usize, 1, cap_out);
					if take == 0 {
						continue;
					}
					let base = dst_base + dest as usize * dst_stride + start * ew_out;
					arena.store(base, payload as u32);
					if ew_out == 2 {
						arena.store(base + 1, (payload >> 32) as u32);
					}
				}
			},
		);
	}

	/// Concatenates the surviving per-bucket lists into one contiguous run
	/// and returns nothing; the total lands in index array 1, slot 0.
	fn tail(&self) -> u32 {
		let p = self.params;
		let expand = self.tp.expand;
		let cap_in = p.round_cap_in(self.tp.ntrims);
		let ew = p.round_words_out(expand, self.tp.ntrims - 1);
		let stride = cap_in * ew;
		let dst_base = p.b_offset(expand);
		let dst_cap = (self.arena.len() - dst_base) / 2;
		let arena = &self.arena;
		let src_idx = &self.indexes[0];
		let dst_idx = &self.indexes[1];
		launch_ordered(
			p.nx2,
			COMMIT_CHUNK,
			|g| {
				let cnt = min(src_idx.load(g) as usize, cap_in);
				let base = g * stride;
				let mut edges = Vec::with_capacity(cnt);
				for k in 0..cnt {
					if let Some(StoredEdge::Pair(lo, hi)) = read_edge(arena, base, k, ew) {
						edges.push((lo, hi));
					}
				}
				edges
			},
			|_, edges: Vec<(u32, u32)>| {
				let (start, take) = reserve(dst_idx, 0, edges.len(), dst_cap);
				for (i, &(lo, hi)) in edges[..take].iter().enumerate() {
					arena.store(dst_base + (start + i) * 2, lo);
					arena.store(dst_base + (start + i) * 2 + 1, hi);
				}
			},
		);
		dst_idx.load(0)
	}

	/// Scans every nonce and records, for each expected endpoint pair, the
	/// nonce whose edge matches it in either orientation. Unmatched slots
	/// stay zero.
	pub fn recover(
		&mut self,
		k: &[u64; 4],
		proof: &[(u32, u32); PROOFSIZE],
	) -> Result<[u32; PROOFSIZE], TrimmerError> {
		self.dkeys = *k;
		self.check_abort()?;
		let keys = self.dkeys;
		let p = self.params;
		let variant = self.variant;
		let mask = p.edge_mask;
		let mut targets = [0u64; PROOFSIZE];
		for (t, &(u, v)) in targets.iter_mut().zip(proof.iter()) {
			*t = u as u64 | (v as u64) << 32;
		}
		self.recovery.clear(0, PROOFSIZE);
		let recovery = &self.recovery;
		let nedges = p.nedges as usize;
		let blocks = min(self.tp.recover.blocks.max(1) as usize, nedges / EDGE_BLOCK_SIZE);
		let sip_blocks = nedges / EDGE_BLOCK_SIZE;
		let per_block = (sip_blocks + blocks - 1) / blocks * EDGE_BLOCK_SIZE;
		launch(blocks, |b| {
			let first = b * per_block;
			if first >= nedges {
				return;
			}
			let last = min(first + per_block, nedges);
			let mut block = [0u64; EDGE_BLOCK_SIZE];
			for base_nonce in (first..last).step_by(EDGE_BLOCK_SIZE) {
				if variant == Variant::Cuckaroo {
					siphash_block(&keys, base_nonce as u64, &mut block);
				}
				for s in 0..EDGE_BLOCK_SIZE {
					let nonce = (base_nonce + s) as u32;
					let (u, v) = match variant {
						Variant::Cuckaroo => {
							let e = block_edge(&block, s);
							(e as u32 & mask, (e >> 32) as u32 & mask)
						}
						Variant::Cuckoo => variant.endpoints(&keys, nonce, mask),
					};
					let fwd = u as u64 | (v as u64) << 32;
					let rev = v as u64 | (u as u64) << 32;
					for i in 0..PROOFSIZE {
						if targets[i] == fwd || targets[i] == rev {
							recovery.store(i, nonce);
						}
					}
				}
			}
		});
		let mut nonces = [0u32; PROOFSIZE];
		for (i, n) in nonces.iter_mut().enumerate() {
			*n = self.recovery.load(i);
		}
		Ok(nonces)
	}

	/// Runs the seed stages only and reads the bucket grid back, for
	/// checking the seed contracts directly.
	#[cfg(test)]
	fn seed_and_collect(&mut self, k: &[u64; 4]) -> Vec<Vec<(u32, u32)>> {
		assert_eq!(self.tp.expand, 0);
		self.dkeys = *k;
		let p = self.params;
		self.indexes[1].clear(0, p.nx2);
		self.seed_a();
		self.indexes[0].clear(0, p.nx2);
		for i in 0..NA {
			self.seed_b(i);
		}
		let mut buckets = Vec::with_capacity(p.nx2);
		for g in 0..p.nx2 {
			let cnt = min(self.indexes[0].load(g) as usize, p.edges_a);
			let base = g * p.edges_a * 2;
			let mut edges = Vec::with_capacity(cnt);
			for i in 0..cnt {
				if let Some(StoredEdge::Pair(lo, hi)) = read_edge(&self.arena, base, i, 2) {
					edges.push((lo, hi));
				}
			}
			buckets.push(edges);
		}
		buckets
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn two_bit_counter_saturates_and_commutes() {
		let apply = |zs: &[usize]| {
			let mut bm = vec![0u32; 8];
			for &z in zs {
				increase_2b_counter(&mut bm, z);
			}
			bm
		};
		// Any ordering of the same multiset yields identical plane-1 bits.
		assert_eq!(apply(&[3, 17, 3, 99]), apply(&[99, 3, 17, 3]));
		assert_eq!(apply(&[5, 5, 5, 5]), apply(&[5, 5]));
		let bm = apply(&[7, 9, 7]);
		assert!(read_2b_counter(&bm, 7));
		assert!(!read_2b_counter(&bm, 9));
		assert!(!read_2b_counter(&bm, 8));
	}

	#[test]
	fn seeded_buckets_respect_row_and_column_bits() {
		let keys = [1u64, 2, 3, 4];
		let mut tp = TrimParams::default();
		tp.ntrims = 4;
		let mut trimmer = Trimmer::new(tp, 17, 11, Variant::Cuckoo).unwrap();
		let p = trimmer.params;
		let buckets = trimmer.seed_and_collect(&keys);

		// Every real edge of the graph, for membership checks.
		let mut all = HashSet::new();
		for nonce in 0..p.nedges as u32 {
			all.insert(Variant::Cuckoo.endpoints(&keys, nonce, p.edge_mask));
		}

		let mut total = 0usize;
		for (g, edges) in buckets.iter().enumerate() {
			let x = (g / p.nx) as u32;
			let y = (g % p.nx) as u32;
			assert!(edges.len() <= p.edges_a);
			for &(u, v) in edges {
				assert_eq!(u >> (p.ybits + p.zbits), x);
				assert_eq!((u >> p.zbits) & (p.nx as u32 - 1), y);
				assert!(u <= p.edge_mask && v <= p.edge_mask);
				assert!(all.contains(&(u, v)));
				total += 1;
			}
		}
		// Bucket overflow may drop a small fraction, nothing more.
		assert!(total <= p.nedges as usize);
		assert!(total > p.nedges as usize * 4 / 5);
	}

	#[test]
	fn trim_then_abort_surfaces_between_kernels() {
		let keys = [11u64, 12, 13, 14];
		let mut tp = TrimParams::default();
		tp.ntrims = 4;
		let mut trimmer = Trimmer::new(tp, 17, 10, Variant::Cuckaroo).unwrap();
		let count = trimmer.trim(&keys).unwrap();
		assert!(count > 0);
		let stop = trimmer.abort_handle();
		stop.store(true, Ordering::Relaxed);
		assert_eq!(trimmer.trim(&keys), Err(TrimmerError::Aborted));
		stop.store(false, Ordering::Relaxed);
		assert_eq!(trimmer.trim(&keys).unwrap(), count);
	}
}
