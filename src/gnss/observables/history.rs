
use crate::gnss::tracking::TrackingObservation;
use crate::utils::CircularBuffer;

pub const HISTORY_DEPTH: usize = 500;

/// Bounded history of one channel's tracking output, ordered by insertion.
/// Every retained entry belongs to the satellite currently assigned to the
/// channel; a re-task clears the buffer before the first new entry lands.
pub struct ObservablesHistory {
	entries: CircularBuffer<TrackingObservation>,
}

impl ObservablesHistory {

	pub fn new() -> Self {
		Self::with_depth(HISTORY_DEPTH)
	}

	pub fn with_depth(depth: usize) -> Self {
		Self { entries: CircularBuffer::with_capacity(depth) }
	}

	pub fn len(&self) -> usize { self.entries.len() }
	pub fn is_empty(&self) -> bool { self.entries.is_empty() }

	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn push(&mut self, obs: TrackingObservation) {
		if let Some(last) = self.entries.back() {
			if last.sv != obs.sv {
				self.entries.clear();
			}
		}
		self.entries.push(obs);
	}

	fn stamp(obs: &TrackingObservation) -> f64 {
		obs.sample_counter as f64 + obs.code_phase_samples
	}

	fn nearest(&self, target_samples: f64) -> Option<usize> {
		let mut best: Option<(usize, f64)> = None;
		for i in 0..self.entries.len() {
			if let Some(obs) = self.entries.at(i) {
				let dist = (Self::stamp(obs) - target_samples).abs();
				match best {
					Some((_, d)) if d <= dist => {},
					_ => best = Some((i, dist)),
				}
			}
		}
		best.map(|(i, _)| i)
	}

	/// Linear interpolation of carrier phase, Doppler and TOW onto the target
	/// sample count, using the nearest entry and its neighbor on the far side
	/// of the target.  Returns `None` when fewer than two entries exist or the
	/// nearest entry lies outside the tolerance.  Exact at the bracketing
	/// stamps.
	pub fn interpolate(&self, target_samples: f64, tolerance_samples: f64) -> Option<TrackingObservation> {
		if self.entries.len() < 2 {
			return None;
		}
		let nearest = self.nearest(target_samples)?;
		let t_near = Self::stamp(self.entries.at(nearest)?);
		if (t_near - target_samples).abs() > tolerance_samples {
			return None;
		}

		let last = self.entries.len() - 1;
		let (i1, i2) = if target_samples >= t_near {
			if nearest < last { (nearest, nearest + 1) } else { (nearest - 1, nearest) }
		} else {
			if nearest > 0 { (nearest - 1, nearest) } else { (nearest, nearest + 1) }
		};
		let a = self.entries.at(i1)?;
		let b = self.entries.at(i2)?;
		let ta = Self::stamp(a);
		let tb = Self::stamp(b);
		if tb == ta {
			return None;
		}

		let time_factor = (target_samples - ta) / (tb - ta);
		let mut out = *a;
		out.carrier_phase_rad = a.carrier_phase_rad + (b.carrier_phase_rad - a.carrier_phase_rad) * time_factor;
		out.carrier_doppler_hz = a.carrier_doppler_hz + (b.carrier_doppler_hz - a.carrier_doppler_hz) * time_factor;
		out.interp_tow_ms = a.tow_at_symbol_ms + (b.tow_at_symbol_ms - a.tow_at_symbol_ms) * time_factor;
		out.rx_time_s = target_samples / a.fs;
		Some(out)
	}

}

#[cfg(test)]
mod tests {

	use crate::gnss::{Band, Sv};
	use crate::gnss::tracking::TrackingObservation;

	use super::ObservablesHistory;

	fn obs(prn: usize, sample_counter: u64, tow_ms: f64, doppler_hz: f64, phase_rad: f64) -> TrackingObservation {
		let mut o = TrackingObservation::placeholder(0);
		o.sv = Some(Sv { prn, band: Band::GpsL1Ca });
		o.sample_counter = sample_counter;
		o.tow_at_symbol_ms = tow_ms;
		o.carrier_doppler_hz = doppler_hz;
		o.carrier_phase_rad = phase_rad;
		o.fs = 2.0e6;
		o.flag_valid_symbol = true;
		o.flag_valid_word = true;
		o
	}

	#[test]
	fn interpolates_midway_between_bracketing_entries() {
		let mut h = ObservablesHistory::new();
		h.push(obs(7, 1000, 100_000.0, 1200.0, 40.0));
		h.push(obs(7, 2000, 100_001.0, 1300.0, 50.0));

		let out = h.interpolate(1500.0, 40_000.0).unwrap();
		assert!((out.interp_tow_ms - 100_000.5).abs() < 1e-9);
		assert!((out.carrier_doppler_hz - 1250.0).abs() < 1e-9);
		assert!((out.carrier_phase_rad - 45.0).abs() < 1e-9);
		assert!((out.rx_time_s - 1500.0 / 2.0e6).abs() < 1e-12);
	}

	#[test]
	fn interpolation_is_exact_at_the_bracketing_stamps() {
		let mut h = ObservablesHistory::new();
		h.push(obs(7, 1000, 100_000.0, 1200.0, 40.0));
		h.push(obs(7, 2000, 100_001.0, 1300.0, 50.0));
		h.push(obs(7, 3000, 100_002.0, 1400.0, 60.0));

		let at_first = h.interpolate(1000.0, 40_000.0).unwrap();
		assert_eq!(at_first.carrier_doppler_hz, 1200.0);
		assert_eq!(at_first.carrier_phase_rad, 40.0);
		assert_eq!(at_first.interp_tow_ms, 100_000.0);

		let at_last = h.interpolate(3000.0, 40_000.0).unwrap();
		assert_eq!(at_last.carrier_doppler_hz, 1400.0);
		assert_eq!(at_last.carrier_phase_rad, 60.0);
		assert_eq!(at_last.interp_tow_ms, 100_002.0);
	}

	#[test]
	fn rejects_targets_outside_the_tolerance() {
		let mut h = ObservablesHistory::new();
		h.push(obs(7, 1000, 100_000.0, 1200.0, 40.0));
		h.push(obs(7, 2000, 100_001.0, 1300.0, 50.0));

		// 40000 samples at 2 MHz is the 20 ms default tolerance
		assert!(h.interpolate(50_000.0, 40_000.0).is_none());
		assert!(h.interpolate(1500.0, 40_000.0).is_some());
	}

	#[test]
	fn needs_at_least_two_entries() {
		let mut h = ObservablesHistory::new();
		assert!(h.interpolate(1500.0, 40_000.0).is_none());
		h.push(obs(7, 1000, 100_000.0, 1200.0, 40.0));
		assert!(h.interpolate(1000.0, 40_000.0).is_none());
	}

	#[test]
	fn retasking_the_channel_clears_the_old_satellite() {
		let mut h = ObservablesHistory::new();
		h.push(obs(7, 1000, 100_000.0, 1200.0, 40.0));
		h.push(obs(7, 2000, 100_001.0, 1300.0, 50.0));
		h.push(obs(9, 2500, 200_000.0, -400.0, 10.0));

		assert_eq!(h.len(), 1);
		// No bracketing pair may span the re-task boundary
		assert!(h.interpolate(1500.0, 40_000.0).is_none());
	}

	#[test]
	fn history_depth_is_bounded() {
		let mut h = ObservablesHistory::with_depth(4);
		for k in 0..10u64 {
			h.push(obs(7, 1000 * k, 100_000.0 + k as f64, 0.0, 0.0));
		}
		assert_eq!(h.len(), 4);
		// Only recent stamps survive
		assert!(h.interpolate(1000.0, 500.0).is_none());
		assert!(h.interpolate(8500.0, 40_000.0).is_some());
	}

}
