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

extern crate mean_miner;
extern crate mean_miner_util as util;

use mean_miner::{Graph, TrimParams, Trimmer, TrimmerError, Variant};
use std::time::SystemTime;

fn main() -> Result<(), TrimmerError> {
	util::init_logger(None);

	let tp = TrimParams {
		ntrims: 80,
		..Default::default()
	};
	let mut trimmer = Trimmer::new(tp, 19, 0, Variant::Cuckaroo)?;

	let k = [
		0xf4956dc403730b01,
		0xe6d45de39c2a5a3e,
		0xcbf626a8afee35f6,
		0x4307b94b1a0c9980,
	];

	let start = SystemTime::now();
	let count = trimmer.trim(&k)?;
	if let Ok(elapsed) = start.elapsed() {
		println!("Time: {:?}", elapsed);
	}
	println!("Trimmed to {}", count);

	for sol in Graph::search(&trimmer.edges()) {
		let mut nonces = trimmer.recover(&k, &sol.pairs)?;
		nonces.sort();
		println!("Solution: {:x?}", &nonces[..]);
	}
	Ok(())
}
