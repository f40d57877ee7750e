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

//! CPU mean solver for the Cuckoo and Cuckaroo cycle proofs of work: an
//! edge trimmer over a bucketed graph representation, a cycle finder for
//! the residue, and nonce recovery for found cycles.

#[macro_use]
extern crate slog;
#[macro_use]
extern crate lazy_static;

extern crate hashbrown;
extern crate rayon;

extern crate mean_miner_plugin as plugin;
extern crate mean_miner_util as util;

pub mod device;
pub mod error;
pub mod graph;
pub mod params;
pub mod siphash;
pub mod trimmer;

pub use crate::error::TrimmerError;
pub use crate::graph::{CycleSol, Graph};
pub use crate::params::{Params, TrimParams, Variant};
pub use crate::plugin::{SolverParams, SolverSolutions, SolverStats};
pub use crate::trimmer::Trimmer;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::plugin::{set_header_nonce, MAX_SOLS};
use crate::util::LOGGER;

fn epoch_millis(t: SystemTime) -> u64 {
	t.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs() * 1000 + d.subsec_millis() as u64)
		.unwrap_or(0)
}

/// A solver instance: one trimmer bound to one device, plus the cycle
/// search and recovery that turn a residue into proofs.
pub struct Solver {
	params: SolverParams,
	trimmer: Trimmer,
	iterations: u32,
}

impl Solver {
	/// Builds a solver for the given parameters, binding its device.
	pub fn new(params: SolverParams) -> Result<Solver, TrimmerError> {
		let tp = TrimParams::from_solver_params(&params);
		let variant = Variant::from_selector(params.selected);
		let trimmer = Trimmer::new(tp, params.edge_bits, params.device as usize, variant)?;
		Ok(Solver {
			params,
			trimmer,
			iterations: 0,
		})
	}

	/// Derives the key set for the given header and nonce, trims, searches
	/// the residue and recovers any proofs found.
	pub fn solve(
		&mut self,
		header: &[u8],
		nonce: u64,
	) -> Result<(SolverSolutions, SolverStats), TrimmerError> {
		let start = SystemTime::now();
		let k = set_header_nonce(header, Some(nonce as u32), self.params.mutate_nonce)
			.map_err(|e| TrimmerError::InvalidParams(format!("can't process header: {}", e)))?;
		let count = self.trimmer.trim(&k)?;
		let edges = self.trimmer.edges();
		debug!(LOGGER, "trimmed to {} edges", count);

		let mut solutions = SolverSolutions::default();
		solutions.edge_bits = self.trimmer.edge_bits();
		for sol in Graph::search(&edges).iter().take(MAX_SOLS) {
			let mut nonces = self.trimmer.recover(&k, &sol.pairs)?;
			nonces.sort();
			let i = solutions.num_sols as usize;
			solutions.sols[i].nonce = nonce;
			for (p, &n) in solutions.sols[i].proof.iter_mut().zip(nonces.iter()) {
				*p = n as u64;
			}
			solutions.num_sols += 1;
			info!(LOGGER, "solution found: {:x?}", &solutions.sols[i].proof[..]);
		}

		let end = SystemTime::now();
		self.iterations += 1;
		let mut stats = SolverStats::default();
		stats.device_id = self.trimmer.device_id() as u32;
		stats.edge_bits = self.trimmer.edge_bits();
		stats.device_name = self.trimmer.device_name().to_owned();
		stats.last_start_time = epoch_millis(start);
		stats.last_end_time = epoch_millis(end);
		stats.last_solution_time = stats.last_end_time.saturating_sub(stats.last_start_time);
		stats.iterations = self.iterations;
		Ok((solutions, stats))
	}

	/// Flag to stop a running solve at the next kernel boundary.
	pub fn abort_handle(&self) -> Arc<AtomicBool> {
		self.trimmer.abort_handle()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_solve() {
		crate::util::init_test_logger();
		let mut params = SolverParams::default();
		params.edge_bits = 17;
		params.ntrims = 16;
		params.selected = 1;
		params.device = 9;
		let mut solver = Solver::new(params).unwrap();
		let header = vec![0u8; 80];
		let (sols, stats) = solver.solve(&header, 23).unwrap();
		assert_eq!(sols.edge_bits, 17);
		assert_eq!(stats.edge_bits, 17);
		assert_eq!(stats.iterations, 1);
		assert_eq!(stats.device_name, "cpu-9");
		assert!((sols.num_sols as usize) <= MAX_SOLS);
		for s in &sols.sols[..sols.num_sols as usize] {
			// Proof nonces come out sorted and within the nonce space.
			for w in s.proof.windows(2) {
				assert!(w[0] <= w[1]);
			}
			assert!(s.proof[41] < 1 << 17);
		}
	}
}
