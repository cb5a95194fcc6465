
//! Per-satellite tracking channel: carrier wipe-off and five-tap code
//! correlation driven by an FLL-assisted PLL and a carrier-aided DLL.  A
//! channel starts from an acquisition hand-off, pulls in frequency and the
//! data-bit boundary, then switches to narrow-band phase tracking and emits
//! one observation per code period.

pub mod correlator;
pub mod discriminators;
pub mod lock_detector;

use std::f64::consts;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use num_complex::Complex;
use num_traits::Zero;
use serde::{Serialize, Deserialize};

use crate::Error;
use crate::filters::{CarrierLoopFilter, CarrierLoopOrder, CodeLoopFilter};
use crate::gnss::{Band, ChannelUnit, GPS_WEEK_MS, SignalParams, Sv};
use crate::gnss::gps::l1_ca_signal;

use self::correlator::{CorrelationParams, CorrelatorBank, SoftwareCorrelator, NUM_TAPS, EARLY, PROMPT, LATE};
use self::discriminators::{dll_nc_e_minus_l_normalized, fll_four_quadrant, pll_two_quadrant_atan};
use self::lock_detector::LockDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
	/// No satellite assigned; samples are rejected
	Idle,
	/// Wide-band FLL-assisted pull-in and data-bit boundary search
	PullIn,
	/// Narrow-band phase tracking at the data-bit cadence
	Tracking,
}

impl ChannelState {
	fn name(self) -> &'static str {
		match self {
			ChannelState::Idle => "IDLE",
			ChannelState::PullIn => "PULL_IN",
			ChannelState::Tracking => "TRACKING",
		}
	}
}

/// Coarse estimates delivered by acquisition when a satellite is assigned to
/// this channel.
#[derive(Debug, Clone, Copy)]
pub struct Handoff {
	pub sv: Sv,
	/// Offset of the first code boundary from the hand-off sample stamp
	pub code_phase_samples: f64,
	pub doppler_hz: f64,
	/// Stream index of the first sample the channel will see
	pub sample_stamp: u64,
}

/// Out-of-band notification from the channel to its supervisor.  Emitted at
/// most once per lock-loss episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
	TrackingFailed { sv: Sv, channel_id: usize },
}

/// Downstream feedback from the telemetry decoder: the time of week of the
/// last decoded symbol and whether word synchronization currently holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryFeedback {
	pub tow_at_symbol_ms: Option<f64>,
	pub flag_valid_word: bool,
	pub failed: bool,
}

/// Loop and supervision parameters for one channel.
#[derive(Debug, Clone, Copy)]
pub struct TrackingConfig {
	pub fs: f64,
	pub early_late_space_chips: f64,
	pub very_early_late_space_chips: f64,
	pub fll_bw_hz: f64,
	pub pll_bw_hz: f64,
	pub pll_bw_narrow_hz: f64,
	pub dll_bw_hz: f64,
	pub dll_bw_narrow_hz: f64,
	/// Code periods per coherent integration once word sync is available; must
	/// divide the symbols per data bit of the tracked signal
	pub extend_correlation_symbols: usize,
	pub lock_window_periods: usize,
	pub lock_fail_limit: usize,
	pub cn0_threshold_db_hz: f64,
	pub carrier_lock_threshold: f64,
	pub max_doppler_hz: f64,
}

impl TrackingConfig {

	pub fn default_for(fs: f64) -> Self {
		Self {
			fs,
			early_late_space_chips: 0.5,
			very_early_late_space_chips: 0.6,
			fll_bw_hz: 10.0,
			pll_bw_hz: 40.0,
			pll_bw_narrow_hz: 12.0,
			dll_bw_hz: 2.0,
			dll_bw_narrow_hz: 1.5,
			extend_correlation_symbols: 1,
			lock_window_periods: 20,
			lock_fail_limit: 50,
			cn0_threshold_db_hz: 25.0,
			carrier_lock_threshold: 0.85,
			max_doppler_hz: 10_000.0,
		}
	}

	fn validate(&self) -> Result<(), Error> {
		if !self.fs.is_finite() || self.fs <= 0.0 {
			return Err(Error::InvalidConfig("sampling rate must be positive"));
		}
		if !(self.early_late_space_chips > 0.0) || !(self.very_early_late_space_chips > self.early_late_space_chips) {
			return Err(Error::InvalidConfig("correlator tap spacings must satisfy 0 < E-L < VE-VL"));
		}
		if !self.pll_bw_narrow_hz.is_finite() || self.pll_bw_narrow_hz <= 0.0 {
			return Err(Error::InvalidConfig("narrow PLL bandwidth must be positive"));
		}
		if !self.dll_bw_narrow_hz.is_finite() || self.dll_bw_narrow_hz <= 0.0 {
			return Err(Error::InvalidConfig("narrow DLL bandwidth must be positive"));
		}
		if self.extend_correlation_symbols == 0 {
			return Err(Error::InvalidConfig("extended integration length must be at least one symbol"));
		}
		if self.lock_window_periods < 2 {
			return Err(Error::InvalidConfig("lock detector window must cover at least two code periods"));
		}
		if !self.carrier_lock_threshold.is_finite() || self.carrier_lock_threshold.abs() >= 1.0 {
			return Err(Error::InvalidConfig("carrier lock threshold must lie in (-1, 1)"));
		}
		if !self.max_doppler_hz.is_finite() || self.max_doppler_hz <= 0.0 {
			return Err(Error::InvalidConfig("Doppler search range must be positive"));
		}
		Ok(())
	}

}

/// One tracking result per coherent integration, stamped with the receiver
/// sample count so downstream consumers can align channels in time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackingObservation {
	pub sv: Option<Sv>,
	pub channel_id: usize,
	/// Stream index of the first sample after this integration
	pub sample_counter: u64,
	/// Sub-sample offset of the next code boundary from `sample_counter`
	pub code_phase_samples: f64,
	pub rx_time_s: f64,
	pub carrier_phase_rad: f64,
	pub carrier_doppler_hz: f64,
	pub cn0_db_hz: f64,
	pub tow_at_symbol_ms: f64,
	pub interp_tow_ms: f64,
	pub pseudorange_m: f64,
	pub fs: f64,
	pub flag_valid_acquisition: bool,
	pub flag_valid_symbol: bool,
	pub flag_valid_word: bool,
	pub flag_valid_pseudorange: bool,
}

impl TrackingObservation {

	/// All-invalid record used as a placeholder for channels with nothing to
	/// report at an output epoch.
	pub fn placeholder(channel_id: usize) -> Self {
		Self {
			sv: None,
			channel_id,
			sample_counter: 0,
			code_phase_samples: 0.0,
			rx_time_s: 0.0,
			carrier_phase_rad: 0.0,
			carrier_doppler_hz: 0.0,
			cn0_db_hz: 0.0,
			tow_at_symbol_ms: 0.0,
			interp_tow_ms: 0.0,
			pseudorange_m: 0.0,
			fs: 0.0,
			flag_valid_acquisition: false,
			flag_valid_symbol: false,
			flag_valid_word: false,
			flag_valid_pseudorange: false,
		}
	}

}

#[derive(Debug, Serialize)]
struct StepRecord {
	sample_counter: u64,
	state: &'static str,
	prompt_i: f64,
	prompt_q: f64,
	carrier_doppler_hz: f64,
	code_freq_chips: f64,
	cn0_db_hz: f64,
	carrier_lock_value: f64,
	rem_code_phase_samples: f64,
}

struct StepDump {
	writer: BufWriter<File>,
}

impl StepDump {
	fn write(&mut self, rec: &StepRecord) -> io::Result<()> {
		serde_json::to_writer(&mut self.writer, rec)?;
		self.writer.write_all(b"\n")
	}
}

/// One tracking channel.  Generic over the correlator so the same loop code
/// drives the software kernel and the register-mapped device.
pub struct TrackingChannel<C: CorrelatorBank = SoftwareCorrelator> {
	cfg: TrackingConfig,
	signal: SignalParams,
	channel_id: usize,
	sv: Option<Sv>,
	state: ChannelState,

	correlator: C,
	code_loop: CodeLoopFilter,
	carrier_loop: CarrierLoopFilter,
	lock: LockDetector,

	code_freq_chips: f64,
	carrier_doppler_hz: f64,
	acc_carrier_phase_rad: f64,
	rem_carr_phase_rad: f64,
	/// Offset of the next code boundary from the start of the next block
	rem_code_phase_samples: f64,
	current_block_len: usize,
	/// Whole samples to discard before the first correlated block
	pull_in_skip: usize,
	sample_counter: u64,

	accu: [Complex<f64>; NUM_TAPS],
	accu_count: usize,
	accu_target: usize,
	prompt_old: Complex<f64>,
	last_prompt_positive: Option<bool>,
	/// Code periods of the current data bit already processed
	symbol_counter: usize,

	tow_at_symbol_ms: Option<f64>,
	flag_valid_word: bool,

	pending_event: Option<ChannelEvent>,
	failure_notified: bool,
	dump: Option<StepDump>,
}

impl TrackingChannel<SoftwareCorrelator> {

	pub fn new(cfg: TrackingConfig) -> Result<Self, Error> {
		Self::with_correlator(cfg, SoftwareCorrelator::new())
	}

}

impl<C: CorrelatorBank> TrackingChannel<C> {

	pub fn with_correlator(cfg: TrackingConfig, correlator: C) -> Result<Self, Error> {
		cfg.validate()?;
		let signal = SignalParams::gps_l1_ca();
		let code_loop = CodeLoopFilter::new(cfg.dll_bw_hz, signal.code_period_s)?;
		let carrier_loop = CarrierLoopFilter::new(cfg.fll_bw_hz, cfg.pll_bw_hz, CarrierLoopOrder::Three)?;
		let lock = LockDetector::new(cfg.lock_window_periods, cfg.lock_fail_limit,
			cfg.cn0_threshold_db_hz, cfg.carrier_lock_threshold);
		Ok(Self {
			cfg, signal,
			channel_id: 0,
			sv: None,
			state: ChannelState::Idle,
			correlator, code_loop, carrier_loop, lock,
			code_freq_chips: signal.chip_rate_hz,
			carrier_doppler_hz: 0.0,
			acc_carrier_phase_rad: 0.0,
			rem_carr_phase_rad: 0.0,
			rem_code_phase_samples: 0.0,
			current_block_len: 0,
			pull_in_skip: 0,
			sample_counter: 0,
			accu: [Complex::zero(); NUM_TAPS],
			accu_count: 0,
			accu_target: 1,
			prompt_old: Complex::zero(),
			last_prompt_positive: None,
			symbol_counter: 0,
			tow_at_symbol_ms: None,
			flag_valid_word: false,
			pending_event: None,
			failure_notified: false,
			dump: None,
		})
	}

	pub fn state(&self) -> ChannelState { self.state }
	pub fn sv(&self) -> Option<Sv> { self.sv }
	pub fn carrier_doppler_hz(&self) -> f64 { self.carrier_doppler_hz }
	pub fn code_freq_chips(&self) -> f64 { self.code_freq_chips }
	pub fn cn0_db_hz(&self) -> f64 { self.lock.cn0_db_hz() }
	pub fn sample_counter(&self) -> u64 { self.sample_counter }

	/// Number of samples the next `process` call must deliver.
	pub fn block_length(&self) -> usize { self.current_block_len }

	/// One-shot retrieval of the most recent channel event.
	pub fn take_event(&mut self) -> Option<ChannelEvent> { self.pending_event.take() }

	/// Streams one diagnostic record per integration to a JSON-lines file.  A
	/// dump that cannot be opened or written is disabled with a warning; it
	/// never interrupts tracking.
	pub fn enable_dump<P: AsRef<Path>>(&mut self, path: P) {
		match File::create(path.as_ref()) {
			Ok(f) => self.dump = Some(StepDump { writer: BufWriter::new(f) }),
			Err(e) => log::warn!("channel {}: cannot open dump file {}: {}",
				self.channel_id, path.as_ref().display(), e),
		}
	}

	/// Takes over a satellite from acquisition and primes the loops with the
	/// coarse code phase and Doppler estimates.
	pub fn start(&mut self, handoff: Handoff) -> Result<(), Error> {
		if handoff.sample_stamp < self.sample_counter {
			return Err(Error::InvalidHandoff("sample stamp is older than the stream position"));
		}
		if !handoff.doppler_hz.is_finite() || handoff.doppler_hz.abs() > self.cfg.max_doppler_hz {
			return Err(Error::InvalidHandoff("Doppler estimate outside the designed dynamic range"));
		}
		let signal = SignalParams::for_band(handoff.sv.band);
		if self.cfg.extend_correlation_symbols > 1
			&& signal.symbols_per_bit % self.cfg.extend_correlation_symbols != 0 {
			return Err(Error::InvalidConfig("extended integration must divide the data bit length"));
		}
		let code_period_samples = signal.code_period_s * self.cfg.fs;
		if !handoff.code_phase_samples.is_finite()
			|| handoff.code_phase_samples < 0.0
			|| handoff.code_phase_samples >= code_period_samples {
			return Err(Error::InvalidHandoff("code phase outside one code period"));
		}
		let code = match handoff.sv.band {
			Band::GpsL1Ca => {
				if handoff.sv.prn < 1 || handoff.sv.prn > 32 {
					return Err(Error::InvalidHandoff("no spreading code for this PRN"));
				}
				l1_ca_signal::prn_float(handoff.sv.prn)
			},
			Band::GpsL2Cm => return Err(Error::InvalidHandoff("no local code generator for this signal")),
		};
		self.correlator.set_local_code(&code);
		self.correlator.set_tap_spacing(self.cfg.early_late_space_chips, self.cfg.very_early_late_space_chips);

		self.signal = signal;
		self.sv = Some(handoff.sv);
		self.state = ChannelState::PullIn;
		self.carrier_doppler_hz = handoff.doppler_hz;
		self.carrier_loop.set_bandwidths(self.cfg.fll_bw_hz, self.cfg.pll_bw_hz);
		self.carrier_loop.initialize(handoff.doppler_hz);
		self.code_loop.set_update_interval(signal.code_period_s, self.cfg.dll_bw_hz);
		self.code_loop.initialize();
		self.code_freq_chips = self.aided_chip_rate();
		self.lock.reset();
		self.acc_carrier_phase_rad = 0.0;
		self.rem_carr_phase_rad = 0.0;
		self.sample_counter = handoff.sample_stamp;
		self.accu = [Complex::zero(); NUM_TAPS];
		self.accu_count = 0;
		self.accu_target = 1;
		self.prompt_old = Complex::zero();
		self.last_prompt_positive = None;
		self.symbol_counter = 0;
		self.tow_at_symbol_ms = None;
		self.flag_valid_word = false;
		self.pending_event = None;
		self.failure_notified = false;

		// Consume the acquisition code offset in whole samples first, so every
		// correlated block starts within half a sample of a code boundary.
		let skip = handoff.code_phase_samples.round();
		self.pull_in_skip = skip as usize;
		self.rem_code_phase_samples = handoff.code_phase_samples - skip;
		self.current_block_len = if self.pull_in_skip > 0 {
			self.pull_in_skip
		} else {
			let t_prn = self.code_period_samples();
			(t_prn + self.rem_code_phase_samples).round() as usize
		};

		log::info!("channel {}: tracking PRN {} from sample {} (doppler {:+.1} Hz, code phase {:.2} samples)",
			self.channel_id, handoff.sv.prn, handoff.sample_stamp,
			handoff.doppler_hz, handoff.code_phase_samples);
		Ok(())
	}

	/// Telemetry decoder feedback.  A decoder failure resets the channel to
	/// pull-in; otherwise the TOW stamp and word-sync flag gate the transmit
	/// time stream and extended integration.
	pub fn feed_telemetry(&mut self, fb: TelemetryFeedback) {
		if fb.failed {
			if let Some(sv) = self.sv {
				log::warn!("channel {}: telemetry decoder failure on PRN {}, returning to pull-in",
					self.channel_id, sv.prn);
			}
			if self.state == ChannelState::Tracking {
				self.reenter_pull_in();
			}
			return;
		}
		if let Some(tow) = fb.tow_at_symbol_ms {
			self.tow_at_symbol_ms = Some(tow);
		}
		self.flag_valid_word = fb.flag_valid_word;
	}

	/// Consumes exactly one block of samples (of `block_length`) and produces
	/// exactly one observation.  The stream index must be contiguous with the
	/// previous call.
	pub fn process(&mut self, samples: &[Complex<f64>], first_sample_idx: u64) -> Result<TrackingObservation, Error> {
		let sv = match (self.state, self.sv) {
			(ChannelState::Idle, _) | (_, None) => return Err(Error::NotStarted),
			(_, Some(sv)) => sv,
		};
		if first_sample_idx != self.sample_counter {
			return Err(Error::SampleGap { expected: self.sample_counter, got: first_sample_idx });
		}
		if samples.len() != self.current_block_len {
			return Err(Error::BlockLength { expected: self.current_block_len, got: samples.len() });
		}

		// Alignment block: discard the acquisition code offset unprocessed
		if self.pull_in_skip > 0 {
			self.sample_counter += samples.len() as u64;
			self.pull_in_skip = 0;
			let t_prn = self.code_period_samples();
			self.current_block_len = (t_prn + self.rem_code_phase_samples).round() as usize;
			let obs = self.build_observation(sv);
			self.dump_step(&obs);
			return Ok(obs);
		}

		// Correlate with the replica hypothesis this block was sized for
		let code_phase_step_chips = self.code_freq_chips / self.cfg.fs;
		let carrier_phase_step_rad = 2.0 * consts::PI * self.carrier_doppler_hz / self.cfg.fs;
		let params = CorrelationParams {
			code_phase_chips: -self.rem_code_phase_samples * code_phase_step_chips,
			code_phase_step_chips,
			carrier_phase_rad: self.rem_carr_phase_rad,
			carrier_phase_step_rad,
		};
		let taps = self.correlator.integrate(samples, &params)?;
		for k in 0..NUM_TAPS {
			self.accu[k] += taps[k];
		}
		self.accu_count += 1;

		// Lock statistics run at the code-period rate regardless of the
		// coherent integration length
		self.lock.push_prompt(taps[PROMPT]);
		let locked_now = self.lock.update(self.signal.code_period_s);

		match self.state {
			ChannelState::PullIn => self.pull_in_step(sv, taps, locked_now),
			ChannelState::Tracking => self.tracking_step(sv),
			ChannelState::Idle => {},
		}

		// Advance the replica bookkeeping by the block just consumed.  The
		// accumulated carrier phase ramps opposite the Doppler because the
		// replica is conjugated.
		let blk = samples.len() as f64;
		self.acc_carrier_phase_rad -= carrier_phase_step_rad * blk;
		self.rem_carr_phase_rad = (self.rem_carr_phase_rad + carrier_phase_step_rad * blk) % (2.0 * consts::PI);
		self.sample_counter += samples.len() as u64;

		// Next block boundary from the updated code frequency
		let t_prn = self.code_period_samples();
		self.rem_code_phase_samples += t_prn - blk;
		self.current_block_len = (t_prn + self.rem_code_phase_samples).round() as usize;

		// The transmit time advances one code period per integration
		if let Some(tow) = &mut self.tow_at_symbol_ms {
			*tow += self.signal.code_period_s * 1000.0;
			if *tow >= GPS_WEEK_MS as f64 {
				*tow -= GPS_WEEK_MS as f64;
			}
		}

		let obs = self.build_observation(sv);
		self.dump_step(&obs);
		Ok(obs)
	}

	fn code_period_samples(&self) -> f64 {
		(self.signal.code_length_chips as f64 / self.code_freq_chips) * self.cfg.fs
	}

	/// Carrier-aided code rate: the Doppler scaled by the carrier-to-chip
	/// frequency ratio corrects the code rate for line-of-sight dynamics.
	fn aided_chip_rate(&self) -> f64 {
		self.signal.chip_rate_hz * (1.0 + self.carrier_doppler_hz / self.signal.carrier_freq_hz)
	}

	fn pull_in_step(&mut self, sv: Sv, taps: [Complex<f64>; NUM_TAPS], locked_now: bool) {
		let t = self.signal.code_period_s;
		let prompt = taps[PROMPT];

		// Fold data-bit flips out of the frequency discriminant by aligning
		// the new prompt with the previous one
		let dot = self.prompt_old.re * prompt.re + self.prompt_old.im * prompt.im;
		let prompt_aligned = if dot < 0.0 { -prompt } else { prompt };
		let freq_err_hz = fll_four_quadrant(self.prompt_old, prompt_aligned, t);
		let phase_err_cycles = pll_two_quadrant_atan(prompt) / (2.0 * consts::PI);
		self.carrier_doppler_hz = self.carrier_loop.apply(freq_err_hz, phase_err_cycles, t);

		let code_err_chips = dll_nc_e_minus_l_normalized(taps[EARLY], taps[LATE]);
		let code_err_filtered = self.code_loop.apply(code_err_chips);
		self.code_freq_chips = self.aided_chip_rate() - code_err_filtered;

		self.prompt_old = prompt;
		self.accu = [Complex::zero(); NUM_TAPS];
		self.accu_count = 0;

		// Data-bit boundary search: a sign transition on the prompt marks the
		// first code period of a new bit
		let positive = prompt.re > 0.0;
		let edge = self.last_prompt_positive.map_or(false, |last| last != positive);
		self.last_prompt_positive = Some(positive);

		if edge && self.lock.ready() && locked_now {
			self.enter_tracking(sv);
		} else if self.lock.ready() && !self.lock.lock_ok() {
			// Transient failures are expected before first lock; restart the
			// statistics instead of reporting a loss
			self.lock.reset();
		}
	}

	fn enter_tracking(&mut self, sv: Sv) {
		self.state = ChannelState::Tracking;
		self.carrier_loop.set_bandwidths(0.0, self.cfg.pll_bw_narrow_hz);
		self.code_loop.set_bandwidth(self.cfg.dll_bw_narrow_hz);
		// The bit boundary was the period just processed
		self.symbol_counter = 1 % self.signal.symbols_per_bit;
		self.accu = [Complex::zero(); NUM_TAPS];
		self.accu_count = 0;
		self.accu_target = 1;
		self.failure_notified = false;
		log::info!("channel {}: PRN {} bit sync at sample {}, entering steady-state tracking (CN0 {:.1} dB-Hz)",
			self.channel_id, sv.prn, self.sample_counter, self.lock.cn0_db_hz());
	}

	fn tracking_step(&mut self, sv: Sv) {
		self.symbol_counter = (self.symbol_counter + 1) % self.signal.symbols_per_bit;

		if self.accu_count >= self.accu_target {
			let t = self.signal.code_period_s * self.accu_count as f64;
			let prompt = self.accu[PROMPT];
			let phase_err_cycles = pll_two_quadrant_atan(prompt) / (2.0 * consts::PI);
			self.carrier_doppler_hz = self.carrier_loop.apply(0.0, phase_err_cycles, t);

			let code_err_chips = dll_nc_e_minus_l_normalized(self.accu[EARLY], self.accu[LATE]);
			let code_err_filtered = self.code_loop.apply(code_err_chips);
			self.code_freq_chips = self.aided_chip_rate() - code_err_filtered;

			self.accu = [Complex::zero(); NUM_TAPS];
			self.accu_count = 0;

			// Lengthen the coherent integration only from a data-bit boundary
			// and only while word sync holds
			let next_target = if self.flag_valid_word
				&& self.cfg.extend_correlation_symbols > 1
				&& self.symbol_counter == 0 {
				self.cfg.extend_correlation_symbols
			} else {
				1
			};
			if next_target != self.accu_target {
				self.accu_target = next_target;
				let pdi = self.signal.code_period_s * next_target as f64;
				self.code_loop.set_update_interval(pdi, self.cfg.dll_bw_narrow_hz);
			}
		}

		if self.lock.ready() && !self.lock.lock_ok() {
			log::warn!("channel {}: loss of lock on PRN {} (CN0 {:.1} dB-Hz, lock test {:.2})",
				self.channel_id, sv.prn, self.lock.cn0_db_hz(), self.lock.lock_test_value());
			self.notify_failure(sv);
			self.reenter_pull_in();
		}
	}

	fn reenter_pull_in(&mut self) {
		self.state = ChannelState::PullIn;
		self.carrier_loop.set_bandwidths(self.cfg.fll_bw_hz, self.cfg.pll_bw_hz);
		self.carrier_loop.initialize(self.carrier_doppler_hz);
		self.code_loop.set_update_interval(self.signal.code_period_s, self.cfg.dll_bw_hz);
		self.code_loop.initialize();
		self.lock.reset();
		self.accu = [Complex::zero(); NUM_TAPS];
		self.accu_count = 0;
		self.accu_target = 1;
		self.prompt_old = Complex::zero();
		self.last_prompt_positive = None;
		self.symbol_counter = 0;
		self.tow_at_symbol_ms = None;
		self.flag_valid_word = false;
	}

	fn notify_failure(&mut self, sv: Sv) {
		if !self.failure_notified {
			self.pending_event = Some(ChannelEvent::TrackingFailed { sv, channel_id: self.channel_id });
			self.failure_notified = true;
		}
	}

	fn build_observation(&self, sv: Sv) -> TrackingObservation {
		TrackingObservation {
			sv: Some(sv),
			channel_id: self.channel_id,
			sample_counter: self.sample_counter,
			code_phase_samples: self.rem_code_phase_samples,
			rx_time_s: (self.sample_counter as f64 + self.rem_code_phase_samples) / self.cfg.fs,
			carrier_phase_rad: self.acc_carrier_phase_rad,
			carrier_doppler_hz: self.carrier_doppler_hz,
			cn0_db_hz: self.lock.cn0_db_hz(),
			tow_at_symbol_ms: self.tow_at_symbol_ms.unwrap_or(0.0),
			interp_tow_ms: 0.0,
			pseudorange_m: 0.0,
			fs: self.cfg.fs,
			flag_valid_acquisition: true,
			flag_valid_symbol: self.state == ChannelState::Tracking,
			flag_valid_word: self.flag_valid_word && self.tow_at_symbol_ms.is_some(),
			flag_valid_pseudorange: false,
		}
	}

	fn dump_step(&mut self, obs: &TrackingObservation) {
		let mut drop_dump = false;
		if let Some(dump) = &mut self.dump {
			let rec = StepRecord {
				sample_counter: obs.sample_counter,
				state: self.state.name(),
				prompt_i: self.prompt_old.re,
				prompt_q: self.prompt_old.im,
				carrier_doppler_hz: self.carrier_doppler_hz,
				code_freq_chips: self.code_freq_chips,
				cn0_db_hz: self.lock.cn0_db_hz(),
				carrier_lock_value: self.lock.lock_test_value(),
				rem_code_phase_samples: self.rem_code_phase_samples,
			};
			if let Err(e) = dump.write(&rec) {
				log::warn!("channel {}: dump write failed, disabling dump: {}", self.channel_id, e);
				drop_dump = true;
			}
		}
		if drop_dump {
			self.dump = None;
		}
	}

}

impl<C: CorrelatorBank> ChannelUnit for TrackingChannel<C> {

	fn set_channel(&mut self, id: usize) {
		self.channel_id = id;
	}

	fn start_tracking(&mut self, handoff: Handoff) -> Result<(), Error> {
		self.start(handoff)
	}

	fn stop_tracking(&mut self) {
		if let Some(sv) = self.sv {
			log::info!("channel {}: stopped tracking PRN {}", self.channel_id, sv.prn);
		}
		self.state = ChannelState::Idle;
		self.sv = None;
	}

	fn reset(&mut self) {
		if self.state != ChannelState::Idle {
			self.reenter_pull_in();
		}
	}

}
