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

//! SipHash-2-4 edge oracle. The round function is a compatibility contract:
//! any deviation invalidates every downstream bucket assignment and every
//! discovered proof, so both constructions below reproduce the reference
//! kernels bit for bit.

use crate::params::{Variant, EDGE_BLOCK_MASK, EDGE_BLOCK_SIZE};

#[inline]
fn sip_round(v: &mut [u64; 4]) {
	v[0] = v[0].wrapping_add(v[1]);
	v[2] = v[2].wrapping_add(v[3]);
	v[1] = v[1].rotate_left(13);
	v[3] = v[3].rotate_left(16);
	v[1] ^= v[0];
	v[3] ^= v[2];
	v[0] = v[0].rotate_left(32);
	v[2] = v[2].wrapping_add(v[1]);
	v[0] = v[0].wrapping_add(v[3]);
	v[1] = v[1].rotate_left(17);
	v[3] = v[3].rotate_left(21);
	v[1] ^= v[2];
	v[3] ^= v[0];
	v[2] = v[2].rotate_left(32);
}

#[inline]
fn absorb(v: &mut [u64; 4], m: u64) -> u64 {
	v[3] ^= m;
	sip_round(v);
	sip_round(v);
	v[0] ^= m;
	v[2] ^= 0xff;
	sip_round(v);
	sip_round(v);
	sip_round(v);
	sip_round(v);
	v[0] ^ v[1] ^ v[2] ^ v[3]
}

/// Keyed SipHash-2-4 of a single 64-bit message word.
pub fn siphash24(keys: &[u64; 4], nonce: u64) -> u64 {
	let mut v = *keys;
	absorb(&mut v, nonce)
}

/// Digests an aligned block of EDGE_BLOCK_SIZE nonces, carrying the state
/// across absorptions as the reference kernels do, and leaves the per-lane
/// xor digests in `out`.
pub fn siphash_block(keys: &[u64; 4], block_nonce: u64, out: &mut [u64; EDGE_BLOCK_SIZE]) {
	let mut v = *keys;
	for b in 0..EDGE_BLOCK_SIZE as u64 {
		out[b as usize] = absorb(&mut v, block_nonce + b);
	}
}

/// Folds one digest slot of a block against the block's final word. The last
/// slot is the fold word itself rather than a self-cancelling zero.
#[inline]
pub fn block_edge(block: &[u64; EDGE_BLOCK_SIZE], i: usize) -> u64 {
	let last = block[EDGE_BLOCK_SIZE - 1];
	if i == EDGE_BLOCK_SIZE - 1 {
		last
	} else {
		block[i] ^ last
	}
}

impl Variant {
	/// Both endpoints of the edge for `nonce`, masked to the graph size.
	pub fn endpoints(&self, keys: &[u64; 4], nonce: u32, edge_mask: u32) -> (u32, u32) {
		match *self {
			Variant::Cuckoo => (
				(siphash24(keys, 2 * nonce as u64) as u32) & edge_mask,
				(siphash24(keys, 2 * nonce as u64 + 1) as u32) & edge_mask,
			),
			Variant::Cuckaroo => {
				let mut block = [0u64; EDGE_BLOCK_SIZE];
				let block_nonce = nonce & !EDGE_BLOCK_MASK;
				siphash_block(keys, block_nonce as u64, &mut block);
				let edge = block_edge(&block, (nonce & EDGE_BLOCK_MASK) as usize);
				(edge as u32 & edge_mask, (edge >> 32) as u32 & edge_mask)
			}
		}
	}

	/// One endpoint of the edge for `nonce`; `uorv` 0 selects the first.
	pub fn endpoint(&self, keys: &[u64; 4], nonce: u32, uorv: u32, edge_mask: u32) -> u32 {
		match *self {
			Variant::Cuckoo => {
				(siphash24(keys, 2 * nonce as u64 + uorv as u64) as u32) & edge_mask
			}
			Variant::Cuckaroo => {
				let (u, v) = self.endpoints(keys, nonce, edge_mask);
				if uorv == 0 {
					u
				} else {
					v
				}
			}
		}
	}
}
