
use crate::gnss::{Band, SPEED_OF_LIGHT_M_PER_S, Sv};
use crate::gnss::tracking::TrackingObservation;

use super::{ObservablesSynchronizer, SynchronizerConfig};

const FS: f64 = 2.0e6;

fn obs(prn: usize, sample_counter: u64, tow_ms: f64, doppler_hz: f64, phase_rad: f64, valid_word: bool) -> TrackingObservation {
	let mut o = TrackingObservation::placeholder(0);
	o.sv = Some(Sv { prn, band: Band::GpsL1Ca });
	o.sample_counter = sample_counter;
	o.tow_at_symbol_ms = tow_ms;
	o.carrier_doppler_hz = doppler_hz;
	o.carrier_phase_rad = phase_rad;
	o.fs = FS;
	o.flag_valid_symbol = true;
	o.flag_valid_word = valid_word;
	o
}

/// Pushes ticks until the clock buffer fills; the first tick becomes the
/// first interpolation target.
fn fill_clock(sync: &mut ObservablesSynchronizer, first_target: u64, period: u64) -> super::Epoch {
	let mut epoch = None;
	for k in 0..10u64 {
		let e = sync.on_clock_tick(first_target + k * period);
		if k < 9 {
			assert!(e.is_none(), "epoch before the clock buffer filled");
		} else {
			epoch = e;
		}
	}
	epoch.unwrap()
}

#[test]
fn midpoint_interpolation_with_a_partial_epoch() {
	let mut sync = ObservablesSynchronizer::new(SynchronizerConfig::default_for(2, FS)).unwrap();
	// Channel 0 brackets the tick; channel 1 never reports
	sync.record_observation(0, obs(7, 1000, 100_000.0, 1200.0, 40.0, false));
	sync.record_observation(0, obs(7, 2000, 100_001.0, 1300.0, 50.0, false));

	let epoch = fill_clock(&mut sync, 1500, 2000);

	assert_eq!(epoch.channels.len(), 2);
	let a = &epoch.channels[0];
	assert!((a.interp_tow_ms - 100_000.5).abs() < 1e-9);
	assert!((a.carrier_doppler_hz - 1250.0).abs() < 1e-9);
	assert!((a.carrier_phase_rad - 45.0).abs() < 1e-9);
	assert!(!a.flag_valid_pseudorange, "no telemetry, no pseudorange");

	let b = &epoch.channels[1];
	assert!(b.sv.is_none());
	assert!(!b.flag_valid_symbol && !b.flag_valid_pseudorange);
	assert_eq!(b.carrier_doppler_hz, 0.0);

	// No telemetry reference anywhere, so no alignment nudge either
	assert!(epoch.tow_ref_ms.is_none());
	assert!((epoch.rx_time_s - 1500.0 / FS).abs() < 1e-12);
}

#[test]
fn emits_exactly_one_epoch_per_tick_once_full() {
	let mut sync = ObservablesSynchronizer::new(SynchronizerConfig::default_for(1, FS)).unwrap();
	let mut emitted = 0;
	for k in 0..25u64 {
		if sync.on_clock_tick(1000 + k * 2000).is_some() {
			emitted += 1;
		}
	}
	// 25 ticks, the first 9 only fill the buffer
	assert_eq!(emitted, 16);
}

#[test]
fn pseudoranges_recover_a_known_inter_channel_delay() {
	let mut sync = ObservablesSynchronizer::new(SynchronizerConfig::default_for(2, FS)).unwrap();
	// Both channels bracket the 10000-sample tick with 1 ms TOW per ms of
	// samples; channel 1 transmits 5 ms earlier (longer path)
	sync.record_observation(0, obs(7, 8000, 99_998.0, 0.0, 0.0, true));
	sync.record_observation(0, obs(7, 12_000, 100_002.0, 0.0, 0.0, true));
	sync.record_observation(1, obs(4, 8000, 99_993.0, 0.0, 0.0, true));
	sync.record_observation(1, obs(4, 12_000, 99_997.0, 0.0, 0.0, true));

	let epoch = fill_clock(&mut sync, 10_000, 2000);

	// The maximum valid TOW is already on the 20 ms grid, so no nudge
	let tow_ref = epoch.tow_ref_ms.unwrap();
	assert!((tow_ref - 100_000.0).abs() < 1e-9);
	assert!((epoch.rx_time_s - 10_000.0 / FS).abs() < 1e-12);

	let a = &epoch.channels[0];
	let b = &epoch.channels[1];
	assert!(a.flag_valid_pseudorange && b.flag_valid_pseudorange);
	// Channel 0 sits at the reference: pseudorange is the fixed epoch offset
	assert!((a.pseudorange_m - SPEED_OF_LIGHT_M_PER_S * 68.802e-3).abs() < 1e-4);
	// The 5 ms delay comes back scaled by the speed of light
	assert!((b.pseudorange_m - a.pseudorange_m - SPEED_OF_LIGHT_M_PER_S * 5.0e-3).abs() < 1e-4);
}

#[test]
fn alignment_nudges_the_tick_onto_the_subframe_grid() {
	let mut sync = ObservablesSynchronizer::new(SynchronizerConfig::default_for(1, FS)).unwrap();
	// TOW at the raw tick is 100003 ms; 17 ms of nudging reaches the grid
	sync.record_observation(0, obs(7, 8000, 100_002.0, 0.0, 0.0, true));
	sync.record_observation(0, obs(7, 12_000, 100_004.0, 0.0, 0.0, true));

	let epoch = fill_clock(&mut sync, 10_000, 2000);

	let tow_ref = epoch.tow_ref_ms.unwrap();
	assert!((tow_ref - 100_020.0).abs() < 1e-9);
	// The emitted receiver time carries the 17 ms offset
	assert!((epoch.rx_time_s - (10_000.0 + 17.0 * FS / 1000.0) / FS).abs() < 1e-12);
	assert!(epoch.channels[0].flag_valid_pseudorange);
}

#[test]
fn out_of_tolerance_history_yields_a_placeholder() {
	let mut sync = ObservablesSynchronizer::new(SynchronizerConfig::default_for(1, FS)).unwrap();
	// Entries 30 ms before the tick, outside the 20 ms tolerance
	sync.record_observation(0, obs(7, 38_000, 100_000.0, 900.0, 0.0, false));
	sync.record_observation(0, obs(7, 40_000, 100_001.0, 900.0, 0.0, false));

	let epoch = fill_clock(&mut sync, 100_000, 2000);
	assert!(epoch.channels[0].sv.is_none());
	assert!(!epoch.channels[0].flag_valid_pseudorange);
}

#[test]
fn retasked_channel_never_interpolates_across_the_boundary() {
	let mut sync = ObservablesSynchronizer::new(SynchronizerConfig::default_for(1, FS)).unwrap();
	sync.record_observation(0, obs(7, 1000, 100_000.0, 1200.0, 0.0, false));
	sync.record_observation(0, obs(7, 2000, 100_001.0, 1200.0, 0.0, false));
	// Re-task to a new satellite; only one post-clear entry exists
	sync.record_observation(0, obs(9, 2500, 200_000.0, -300.0, 0.0, false));

	let epoch = fill_clock(&mut sync, 1500, 2000);
	assert!(epoch.channels[0].sv.is_none(), "old satellite data must not survive the re-task");
}

#[test]
fn invalid_observations_are_not_recorded() {
	let mut sync = ObservablesSynchronizer::new(SynchronizerConfig::default_for(1, FS)).unwrap();
	let mut bad = obs(7, 1000, 100_000.0, 0.0, 0.0, false);
	bad.flag_valid_symbol = false;
	sync.record_observation(0, bad);
	sync.record_observation(0, obs(7, 2000, 100_001.0, 0.0, 0.0, false));

	let epoch = fill_clock(&mut sync, 1500, 2000);
	// Only one entry made it into the history, not enough to bracket
	assert!(epoch.channels[0].sv.is_none());
}

#[test]
fn config_validation_rejects_degenerate_setups() {
	assert!(ObservablesSynchronizer::new(SynchronizerConfig::default_for(0, FS)).is_err());
	assert!(ObservablesSynchronizer::new(SynchronizerConfig::default_for(4, 0.0)).is_err());
	let mut cfg = SynchronizerConfig::default_for(4, FS);
	cfg.alignment_ms = 0;
	assert!(ObservablesSynchronizer::new(cfg).is_err());
}
