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

//! End-to-end trimming scenarios. Each test binds its own device slot, so
//! the suite can run multi-threaded against the shared device registry.

extern crate mean_miner;
extern crate mean_miner_util as util;

use mean_miner::device::{device_memory_used, set_device_capacity};
use mean_miner::params::PROOFSIZE;
use mean_miner::{TrimParams, Trimmer, TrimmerError, Variant};
use std::collections::HashMap;

fn build(
	edge_bits: u32,
	ntrims: u32,
	expand: u32,
	device: usize,
	variant: Variant,
) -> Trimmer {
	util::init_test_logger();
	let tp = TrimParams {
		ntrims,
		expand,
		..Default::default()
	};
	Trimmer::new(tp, edge_bits, device, variant).unwrap()
}

fn sorted_edges(t: &Trimmer) -> Vec<(u32, u32)> {
	let mut edges = t.edges();
	edges.sort();
	edges
}

#[test]
fn cuckoo_19_trims_deterministically() {
	let k = [0u64, 0, 0, 0];
	let mut t = build(19, 80, 0, 0, Variant::Cuckoo);
	let c1 = t.trim(&k).unwrap();
	let e1 = sorted_edges(&t);
	assert_eq!(e1.len(), c1 as usize);
	assert!(c1 < 1 << 15);
	let mask = (1u32 << 19) - 1;
	for &(u, v) in &e1 {
		assert!(u <= mask && v <= mask);
	}
	// Back-to-back runs with the same keys yield the same residue.
	let c2 = t.trim(&k).unwrap();
	assert_eq!(c1, c2);
	assert_eq!(e1, sorted_edges(&t));
}

#[test]
fn cuckaroo_19_residue_is_twice_linked() {
	let k = [1u64, 2, 3, 4];
	let mut t = build(19, 80, 0, 1, Variant::Cuckaroo);
	let count = t.trim(&k).unwrap();
	let edges = t.edges();
	assert_eq!(edges.len(), count as usize);
	// The final round counted the second endpoint, so every edge that kept
	// its place shares that endpoint with at least one other survivor.
	let mut by_v: HashMap<u32, usize> = HashMap::new();
	for &(_, v) in &edges {
		*by_v.entry(v).or_insert(0) += 1;
	}
	for (v, n) in by_v {
		assert!(n >= 2, "endpoint {} has degree {}", v, n);
	}
}

#[test]
fn cuckaroo_20_runs_128_rounds() {
	let k = [0xdeadbeefu64, 0, 0, 0];
	let mut t = build(20, 128, 0, 2, Variant::Cuckaroo);
	let c1 = t.trim(&k).unwrap();
	assert!(c1 < 1 << 16);
	let c2 = t.trim(&k).unwrap();
	assert_eq!(c1, c2);
}

#[test]
fn short_trim_leaves_a_live_residue() {
	let k = [5u64, 6, 7, 8];
	let mut t = build(19, 8, 0, 3, Variant::Cuckaroo);
	let count = t.trim(&k).unwrap();
	assert!(count > 100);
	assert!(count < 1 << 19);
}

#[test]
fn expand_modes_yield_the_same_residue() {
	let k = [1u64, 2, 3, 4];
	let mut results = Vec::new();
	for (expand, device) in [(0u32, 4usize), (1, 5), (2, 6)].iter().cloned() {
		let mut t = build(17, 8, expand, device, Variant::Cuckaroo);
		let count = t.trim(&k).unwrap();
		results.push((count, sorted_edges(&t)));
	}
	assert!(results[0].0 > 0);
	assert_eq!(results[0], results[1]);
	assert_eq!(results[0], results[2]);
}

#[test]
fn recovery_reports_matching_nonces() {
	let k = [1u64, 2, 3, 4];
	let mut t = build(19, 8, 0, 7, Variant::Cuckaroo);
	let mask = (1u32 << 19) - 1;
	let mut expected = [0u32; PROOFSIZE];
	let mut pairs = [(0u32, 0u32); PROOFSIZE];
	for i in 0..PROOFSIZE {
		let nonce = 1000 + 137 * i as u32;
		expected[i] = nonce;
		pairs[i] = Variant::Cuckaroo.endpoints(&k, nonce, mask);
	}
	let nonces = t.recover(&k, &pairs).unwrap();
	assert_eq!(nonces, expected);

	// Pairs no edge hashes to leave their slots zeroed.
	let mut bogus = [(0u32, 0u32); PROOFSIZE];
	for (i, b) in bogus.iter_mut().enumerate() {
		*b = (i as u32 + 1, i as u32 + 1);
	}
	assert_eq!(t.recover(&k, &bogus).unwrap(), [0u32; PROOFSIZE]);
}

#[test]
fn dropping_the_trimmer_releases_device_memory() {
	assert_eq!(device_memory_used(8).unwrap(), 0);
	let t = build(17, 8, 0, 8, Variant::Cuckoo);
	let held = device_memory_used(8).unwrap();
	assert!(held > 1 << 20);
	drop(t);
	assert_eq!(device_memory_used(8).unwrap(), 0);
}

#[test]
fn construction_is_all_or_nothing_when_memory_runs_out() {
	util::init_test_logger();
	set_device_capacity(9, 1 << 20).unwrap();
	let tp = TrimParams {
		ntrims: 8,
		..Default::default()
	};
	match Trimmer::new(tp, 19, 9, Variant::Cuckoo) {
		Err(TrimmerError::AllocationFailure { device, .. }) => assert_eq!(device, 9),
		other => panic!("expected allocation failure, got {:?}", other.is_ok()),
	}
	// Nothing stays allocated and the device is rebindable.
	assert_eq!(device_memory_used(9).unwrap(), 0);
	set_device_capacity(9, usize::max_value()).unwrap();
	let t = Trimmer::new(tp, 19, 9, Variant::Cuckoo).unwrap();
	assert!(device_memory_used(9).unwrap() > 0);
	drop(t);
	assert_eq!(device_memory_used(9).unwrap(), 0);
}
