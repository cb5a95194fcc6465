
//! Common-time-base observables: collects every channel's irregularly-stamped
//! tracking output, aligns all channels onto a shared receiver clock tick by
//! interpolation, resolves the receiver time of week against the subframe
//! grid, and derives pseudoranges.

pub mod dump;
pub mod history;

#[cfg(test)]
mod tests;

use crate::Error;
use crate::gnss::{GPS_STARTOFFSET_MS, SPEED_OF_LIGHT_M_PER_S};
use crate::gnss::tracking::TrackingObservation;
use crate::utils::CircularBuffer;

use self::dump::EpochDump;
use self::history::ObservablesHistory;

/// Receiver clock reference: a bounded FIFO of raw sample counters pushed at
/// a fixed period.  The capacity is a lookahead window; the front tick is not
/// consumed until the buffer is full, which guarantees every channel has had
/// time to produce observations past it.
pub struct ReceiverClockBuffer {
	ring: CircularBuffer<u64>,
}

impl ReceiverClockBuffer {

	pub fn with_depth(depth: usize) -> Self {
		Self { ring: CircularBuffer::with_capacity(depth) }
	}

	pub fn push(&mut self, sample_stamp: u64) {
		self.ring.push(sample_stamp);
	}

	pub fn is_full(&self) -> bool {
		self.ring.is_full()
	}

	/// Oldest pending tick; the interpolation target once the buffer is full.
	pub fn front(&self) -> Option<u64> {
		self.ring.front().copied()
	}

}

/// One synchronized multi-channel snapshot.  `channels` always holds one
/// entry per configured channel slot; slots that could not be interpolated
/// carry an all-invalid placeholder.
#[derive(Debug, Clone)]
pub struct Epoch {
	pub rx_time_s: f64,
	/// Resolved receiver time of week, when at least one channel had valid
	/// telemetry
	pub tow_ref_ms: Option<f64>,
	pub channels: Vec<TrackingObservation>,
}

#[derive(Debug, Clone, Copy)]
pub struct SynchronizerConfig {
	pub n_channels: usize,
	pub fs: f64,
	pub clock_depth: usize,
	pub history_depth: usize,
	/// Maximum distance between the tick and the nearest history entry
	pub interp_tolerance_s: f64,
	/// Subframe grid the resolved TOW is nudged onto
	pub alignment_ms: u64,
	pub max_align_retries: usize,
	/// Whole-millisecond offset folded into every pseudorange
	pub epoch_offset_ms: f64,
}

impl SynchronizerConfig {

	pub fn default_for(n_channels: usize, fs: f64) -> Self {
		Self {
			n_channels,
			fs,
			clock_depth: 10,
			history_depth: history::HISTORY_DEPTH,
			interp_tolerance_s: 20.0e-3,
			alignment_ms: 20,
			max_align_retries: 20,
			epoch_offset_ms: GPS_STARTOFFSET_MS,
		}
	}

	fn validate(&self) -> Result<(), Error> {
		if self.n_channels == 0 {
			return Err(Error::InvalidConfig("synchronizer needs at least one channel slot"));
		}
		if !self.fs.is_finite() || self.fs <= 0.0 {
			return Err(Error::InvalidConfig("sampling rate must be positive"));
		}
		if self.clock_depth == 0 || self.history_depth < 2 {
			return Err(Error::InvalidConfig("clock and history depths are too small"));
		}
		if !self.interp_tolerance_s.is_finite() || self.interp_tolerance_s <= 0.0 {
			return Err(Error::InvalidConfig("interpolation tolerance must be positive"));
		}
		if self.alignment_ms == 0 {
			return Err(Error::InvalidConfig("TOW alignment grid must be nonzero"));
		}
		Ok(())
	}

}

/// The single serialization point of the receiver: sole reader of every
/// channel history and sole owner of the clock buffer.  Emits at most one
/// epoch per clock tick and never blocks.
pub struct ObservablesSynchronizer {
	cfg: SynchronizerConfig,
	clock: ReceiverClockBuffer,
	histories: Vec<ObservablesHistory>,
	dump: Option<EpochDump>,
}

impl ObservablesSynchronizer {

	pub fn new(cfg: SynchronizerConfig) -> Result<Self, Error> {
		cfg.validate()?;
		let histories = (0..cfg.n_channels)
			.map(|_| ObservablesHistory::with_depth(cfg.history_depth))
			.collect();
		Ok(Self {
			cfg,
			clock: ReceiverClockBuffer::with_depth(cfg.clock_depth),
			histories,
			dump: None,
		})
	}

	/// Binary epoch log (see `dump`).  Failure to open is logged and leaves
	/// dumping disabled.
	pub fn enable_dump<P: AsRef<std::path::Path>>(&mut self, path: P) {
		match EpochDump::create(path.as_ref()) {
			Ok(d) => self.dump = Some(d),
			Err(e) => log::warn!("observables: cannot open dump file {}: {}",
				path.as_ref().display(), e),
		}
	}

	/// Feeds one channel observation into that channel's history.  Records
	/// from channels still pulling in are dropped here; the history only ever
	/// holds observations worth interpolating.
	pub fn record_observation(&mut self, channel: usize, obs: TrackingObservation) {
		match self.histories.get_mut(channel) {
			Some(h) => {
				if obs.flag_valid_symbol {
					h.push(obs);
				}
			},
			None => log::warn!("observables: observation for unconfigured channel {}", channel),
		}
	}

	pub fn clear_channel(&mut self, channel: usize) {
		if let Some(h) = self.histories.get_mut(channel) {
			h.clear();
		}
	}

	/// One receiver clock tick.  Returns an epoch once per tick after the
	/// clock buffer has filled, `None` before that.
	pub fn on_clock_tick(&mut self, sample_stamp: u64) -> Option<Epoch> {
		self.clock.push(sample_stamp);
		if !self.clock.is_full() {
			return None;
		}
		let target = self.clock.front()?;
		let epoch = self.build_epoch(target);
		self.dump_epoch(&epoch);
		Some(epoch)
	}

	fn interpolate_all(&self, target_samples: f64) -> Vec<TrackingObservation> {
		let tolerance_samples = self.cfg.interp_tolerance_s * self.cfg.fs;
		self.histories.iter().enumerate().map(|(ch, h)| {
			h.interpolate(target_samples, tolerance_samples)
				.map(|mut obs| { obs.channel_id = ch; obs })
				.unwrap_or_else(|| TrackingObservation::placeholder(ch))
		}).collect()
	}

	fn reference_tow_ms(channels: &[TrackingObservation]) -> Option<f64> {
		channels.iter()
			.filter(|o| o.flag_valid_word)
			.map(|o| o.interp_tow_ms)
			.fold(None, |acc, t| match acc {
				Some(best) if best >= t => Some(best),
				_ => Some(t),
			})
	}

	/// Builds one epoch at the tick, nudging the interpolation offset over the
	/// 0..alignment_ms grid until the resolved receiver TOW lands on a
	/// subframe boundary.  Best effort: on retry exhaustion the last attempt
	/// is emitted as-is.
	fn build_epoch(&self, target: u64) -> Epoch {
		let ms_samples = self.cfg.fs / 1000.0;
		let mut channels = self.interpolate_all(target as f64);
		let mut tow_ref = Self::reference_tow_ms(&channels);
		let mut target_samples = target as f64;

		if tow_ref.is_some() {
			let mut retries = 0;
			loop {
				match tow_ref {
					Some(t) if (t.round() as i64).rem_euclid(self.cfg.alignment_ms as i64) != 0 => {
						if retries >= self.cfg.max_align_retries {
							log::warn!("observables: TOW alignment not reached after {} retries (TOW {:.3} ms), emitting as-is",
								retries, t);
							break;
						}
						retries += 1;
						let offset_ms = (retries as u64 % self.cfg.alignment_ms) as f64;
						target_samples = target as f64 + offset_ms * ms_samples;
						channels = self.interpolate_all(target_samples);
						tow_ref = Self::reference_tow_ms(&channels);
					},
					_ => break,
				}
			}
		}

		if let Some(t_ref) = tow_ref {
			for obs in channels.iter_mut() {
				if obs.flag_valid_word {
					// TODO handle the week rollover in this difference
					let dt_ms = t_ref - obs.interp_tow_ms + self.cfg.epoch_offset_ms;
					obs.pseudorange_m = SPEED_OF_LIGHT_M_PER_S * dt_ms / 1000.0;
					obs.flag_valid_pseudorange = true;
				}
			}
		}

		Epoch {
			rx_time_s: target_samples / self.cfg.fs,
			tow_ref_ms: tow_ref,
			channels,
		}
	}

	fn dump_epoch(&mut self, epoch: &Epoch) {
		let mut drop_dump = false;
		if let Some(dump) = &mut self.dump {
			if let Err(e) = dump.write_epoch(epoch) {
				log::warn!("observables: dump write failed, disabling dump: {}", e);
				drop_dump = true;
			}
		}
		if drop_dump {
			self.dump = None;
		}
	}

}
