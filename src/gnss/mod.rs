
use serde::{Serialize, Deserialize};

pub mod observables;
pub mod tracking;

pub const SPEED_OF_LIGHT_M_PER_S: f64 = 2.99792458e8;

/// Whole-millisecond offset between the receiver epoch and the transmit time
/// reference, chosen so pseudoranges land near the nominal signal travel time.
pub const GPS_STARTOFFSET_MS: f64 = 68.802;

pub const GPS_WEEK_MS: u64 = 604_800_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Band {
	GpsL1Ca,
	GpsL2Cm,
}

/// Satellite identifier: PRN plus the signal band being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sv {
	pub prn: usize,
	pub band: Band,
}

/// Spreading-code and carrier parameters of one signal definition.
#[derive(Debug, Clone, Copy)]
pub struct SignalParams {
	pub band: Band,
	pub carrier_freq_hz: f64,
	pub chip_rate_hz: f64,
	pub code_length_chips: usize,
	pub code_period_s: f64,
	pub symbols_per_bit: usize,
}

impl SignalParams {

	pub fn gps_l1_ca() -> Self {
		Self {
			band: Band::GpsL1Ca,
			carrier_freq_hz: 1.57542e9,
			chip_rate_hz: 1.023e6,
			code_length_chips: 1023,
			code_period_s: 1.0e-3,
			symbols_per_bit: 20,
		}
	}

	pub fn gps_l2_cm() -> Self {
		Self {
			band: Band::GpsL2Cm,
			carrier_freq_hz: 1.2276e9,
			chip_rate_hz: 511.5e3,
			code_length_chips: 10230,
			code_period_s: 20.0e-3,
			symbols_per_bit: 1,
		}
	}

	pub fn for_band(band: Band) -> Self {
		match band {
			Band::GpsL1Ca => Self::gps_l1_ca(),
			Band::GpsL2Cm => Self::gps_l2_cm(),
		}
	}

}

/// Capability set every per-signal channel implementation exposes to the flow
/// graph: assign a channel slot, hand off from acquisition, stop, reset.
pub trait ChannelUnit {
	fn set_channel(&mut self, id: usize);
	fn start_tracking(&mut self, handoff: tracking::Handoff) -> Result<(), crate::Error>;
	fn stop_tracking(&mut self);
	fn reset(&mut self);
}

pub mod gps {

	pub mod l1_ca_signal {

		/// G2 output phase-select taps per PRN (1-based register stages)
		const G2_TAPS: [(usize, usize); 32] = [
			(2, 6), (3, 7), (4, 8), (5, 9), (1, 9), (2, 10), (1, 8), (2, 9),
			(3, 10), (2, 3), (3, 4), (5, 6), (6, 7), (7, 8), (8, 9), (9, 10),
			(1, 4), (2, 5), (3, 6), (4, 7), (5, 8), (6, 9), (1, 3), (4, 6),
			(5, 7), (6, 8), (7, 9), (8, 10), (1, 6), (2, 7), (3, 8), (4, 9),
		];

		/// One period of the C/A code for this PRN as +/-1 chips.
		pub fn prn_int(prn: usize) -> Vec<i8> {
			assert!(prn >= 1 && prn <= 32, "no C/A code defined for PRN {}", prn);
			let (t1, t2) = G2_TAPS[prn - 1];

			let mut g1 = [true; 10];
			let mut g2 = [true; 10];
			let mut code: Vec<i8> = Vec::with_capacity(1023);

			for _ in 0..1023 {
				let chip = g1[9] ^ g2[t1 - 1] ^ g2[t2 - 1];
				code.push(if chip { 1 } else { -1 });

				let g1_fb = g1[2] ^ g1[9];
				let g2_fb = g2[1] ^ g2[2] ^ g2[5] ^ g2[7] ^ g2[8] ^ g2[9];
				for i in (1..10).rev() {
					g1[i] = g1[i - 1];
					g2[i] = g2[i - 1];
				}
				g1[0] = g1_fb;
				g2[0] = g2_fb;
			}

			code
		}

		pub fn prn_float(prn: usize) -> Vec<f64> {
			prn_int(prn).iter().map(|&x| x as f64).collect()
		}

	}

}

#[cfg(test)]
mod tests {

	use super::gps::l1_ca_signal;

	#[test]
	fn ca_code_has_correct_length_and_balance() {
		for prn in 1..=32 {
			let code = l1_ca_signal::prn_int(prn);
			assert_eq!(code.len(), 1023);
			// Gold codes of this family have 512 ones and 511 zeros
			let n_high = code.iter().filter(|&&c| c == 1).count();
			assert_eq!(n_high, 512, "PRN {} chip balance", prn);
		}
	}

	#[test]
	fn ca_code_first_chips_match_published_octal_preambles() {
		// IS-GPS-200 table 3-I lists the first 10 chips of each code in octal
		let first_ten = |prn: usize| -> u16 {
			l1_ca_signal::prn_int(prn).iter().take(10)
				.fold(0u16, |acc, &c| (acc << 1) | if c == 1 { 1 } else { 0 })
		};
		assert_eq!(first_ten(1), 0o1440);
		assert_eq!(first_ten(2), 0o1620);
		assert_eq!(first_ten(3), 0o1710);
		assert_eq!(first_ten(4), 0o1744);
		assert_eq!(first_ten(5), 0o1133);
	}

	#[test]
	fn codes_are_distinct_between_prns() {
		let a = l1_ca_signal::prn_int(5);
		let b = l1_ca_signal::prn_int(6);
		assert_ne!(a, b);
	}

}
