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

//! Cycle search over the trimmed residue. Edges are folded one at a time
//! into a union of reversible paths; when both endpoints of a new edge lead
//! to the same root, the closed walk is measured and kept if it is exactly
//! proof-sized.

use std::cmp::min;

use hashbrown::HashMap;

use crate::params::PROOFSIZE;
use crate::util::LOGGER;

/// Paths longer than this abandon the edge rather than walk further.
const MAX_PATH_LEN: usize = 8192;

/// A 42-cycle as endpoint pairs, one per edge, ready for nonce recovery.
pub struct CycleSol {
	pub pairs: [(u32, u32); PROOFSIZE],
}

/// Path-following cycle finder.
pub struct Graph;

impl Graph {
	/// Searches the residual edge list for proof-sized cycles. The first
	/// and second members of each pair are nodes on the first and second
	/// partition respectively.
	pub fn search(edges: &[(u32, u32)]) -> Vec<CycleSol> {
		let mut cuckoo: HashMap<u64, u64> = HashMap::with_capacity(2 * edges.len());
		let mut us = vec![0u64; MAX_PATH_LEN];
		let mut vs = vec![0u64; MAX_PATH_LEN];
		let mut sols = Vec::new();
		for &(u, v) in edges {
			// Distinct node namespaces per partition.
			let u0 = (u as u64) << 1;
			let v0 = (v as u64) << 1 | 1;
			let nu = match path(&cuckoo, u0, &mut us) {
				Some(n) => n,
				None => continue,
			};
			let nv = match path(&cuckoo, v0, &mut vs) {
				Some(n) => n,
				None => continue,
			};
			if us[nu] == vs[nv] {
				// Align the tails, then walk to the first common node.
				let m = min(nu, nv);
				let (mut iu, mut iv) = (nu - m, nv - m);
				while us[iu] != vs[iv] {
					iu += 1;
					iv += 1;
				}
				let len = iu + iv + 1;
				debug!(LOGGER, "{}-cycle found", len);
				if len == PROOFSIZE {
					sols.push(solution(&us, iu, &vs, iv));
				}
			} else if nu < nv {
				// Reverse the shorter path and hang it off the new edge.
				for k in (0..nu).rev() {
					cuckoo.insert(us[k + 1], us[k]);
				}
				cuckoo.insert(u0, v0);
			} else {
				for k in (0..nv).rev() {
					cuckoo.insert(vs[k + 1], vs[k]);
				}
				cuckoo.insert(v0, u0);
			}
		}
		sols
	}
}

/// Walks from `u` to its root, recording the nodes passed. Returns the
/// index of the root, or None when the path grows past MAX_PATH_LEN.
fn path(cuckoo: &HashMap<u64, u64>, mut u: u64, nodes: &mut [u64]) -> Option<usize> {
	let mut n = 0usize;
	nodes[0] = u;
	while let Some(&next) = cuckoo.get(&u) {
		n += 1;
		if n >= MAX_PATH_LEN {
			debug!(LOGGER, "path overflow at node {}", u);
			return None;
		}
		nodes[n] = next;
		u = next;
	}
	Some(n)
}

/// Collects the closing edge plus both path legs up to the common node.
/// Even path positions hold first-partition nodes on the u leg, odd ones on
/// the v leg.
fn solution(us: &[u64], nu: usize, vs: &[u64], nv: usize) -> CycleSol {
	let mut pairs = [(0u32, 0u32); PROOFSIZE];
	let mut n = 0;
	let mut push = |a: u64, b: u64, n: &mut usize| {
		pairs[*n] = ((a >> 1) as u32, (b >> 1) as u32);
		*n += 1;
	};
	push(us[0], vs[0], &mut n);
	for k in (0..nu).rev() {
		push(us[(k + 1) & !1], us[k | 1], &mut n);
	}
	for k in (0..nv).rev() {
		push(vs[k | 1], vs[(k + 1) & !1], &mut n);
	}
	debug_assert_eq!(n, PROOFSIZE);
	CycleSol { pairs }
}

#[cfg(test)]
mod tests {
	use super::*;

	// A 42-cycle alternates partitions, so it has 21 nodes on each side:
	// edges (u_i, v_i) and (u_(i+1) mod 21, v_i).
	fn cycle_edges() -> Vec<(u32, u32)> {
		let mut edges = Vec::new();
		for i in 0..21u32 {
			edges.push((100 + i, 200 + i));
			edges.push((100 + (i + 1) % 21, 200 + i));
		}
		edges
	}

	#[test]
	fn finds_a_42_cycle_among_noise() {
		let mut edges = cycle_edges();
		// An acyclic tail that shares no nodes with the cycle.
		for i in 0..50u32 {
			edges.push((1000 + i, 3000 + i));
			edges.push((1000 + i + 1, 3000 + i));
		}
		// Interleave so the cycle does not arrive contiguously.
		edges.reverse();
		let sols = Graph::search(&edges);
		assert_eq!(sols.len(), 1);
		let mut found: Vec<(u32, u32)> = sols[0].pairs.to_vec();
		let mut expected = cycle_edges();
		found.sort();
		expected.sort();
		assert_eq!(found, expected);
	}

	#[test]
	fn ignores_short_cycles() {
		// A 6-cycle.
		let mut edges = Vec::new();
		for i in 0..3u32 {
			edges.push((10 + i, 20 + i));
			edges.push((10 + (i + 1) % 3, 20 + i));
		}
		assert!(Graph::search(&edges).is_empty());
	}

	#[test]
	fn empty_and_acyclic_inputs_yield_nothing() {
		assert!(Graph::search(&[]).is_empty());
		let chain: Vec<(u32, u32)> = (0..100).map(|i| (i, i)).collect();
		assert!(Graph::search(&chain).is_empty());
	}
}
