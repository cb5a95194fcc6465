
extern crate clap;
extern crate colored;
extern crate gnss_rx;
extern crate num_complex;
extern crate serde;
extern crate serde_json;

use clap::{Arg, App};
use colored::*;
use num_complex::Complex;
use serde::{Serialize, Deserialize};

use gnss_rx::gnss::{Band, ChannelUnit, SPEED_OF_LIGHT_M_PER_S, Sv};
use gnss_rx::gnss::gps::l1_ca_signal;
use gnss_rx::gnss::observables::{ObservablesSynchronizer, SynchronizerConfig};
use gnss_rx::gnss::tracking::{ChannelState, Handoff, TelemetryFeedback, TrackingChannel, TrackingConfig};

const CHIP_RATE: f64 = 1.023e6;
const BASE_TOW_MS: f64 = 302_400_000.0 / 2.0; // mid-week

#[derive(Debug, Serialize, Deserialize)]
struct ChannelSummary {
	prn: usize,
	state: String,
	doppler_hz: f64,
	cn0_db_hz: f64,
	pseudorange_m: f64,
	pseudorange_valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct EpochSummary {
	rx_time_s: f64,
	tow_ref_ms: Option<f64>,
	channels: Vec<ChannelSummary>,
}

/// One satellite's contribution to the synthesized baseband stream.
struct SimSat {
	prn: usize,
	code: Vec<i8>,
	doppler_hz: f64,
	delay_samples: f64,
	amplitude: f64,
}

impl SimSat {

	fn sample(&self, idx: u64, fs: f64) -> Complex<f64> {
		let t = idx as f64 / fs;
		let tau_chips = (idx as f64 - self.delay_samples) * CHIP_RATE / fs;
		let chip_idx = tau_chips.floor();
		let chip = self.code[chip_idx.rem_euclid(1023.0) as usize] as f64;
		let symbol = (chip_idx / 1023.0).floor() as i64;
		let bit = if symbol.div_euclid(20).rem_euclid(2) == 0 { 1.0 } else { -1.0 };
		let phase = 2.0 * std::f64::consts::PI * self.doppler_hz * t;
		self.amplitude * chip * bit * Complex { re: phase.cos(), im: phase.sin() }
	}

}

fn main() {

	let matches = App::new("Simulated GNSS Receiver")
		.version("0.1.0")
		.about("Synthesizes a noiseless multi-satellite L1 C/A baseband stream and runs it through tracking and observables synchronization")
		.arg(Arg::with_name("sample_rate_sps")
			.short("s").long("sample_rate_sps")
			.takes_value(true))
		.arg(Arg::with_name("prns")
			.short("p").long("prns")
			.help("Comma-separated PRN list, e.g. 3,7,12")
			.takes_value(true))
		.arg(Arg::with_name("duration_ms")
			.short("d").long("duration_ms")
			.takes_value(true))
		.arg(Arg::with_name("epoch_dump")
			.long("epoch_dump")
			.help("Binary epoch dump file")
			.takes_value(true))
		.get_matches();

	let fs: f64 = matches.value_of("sample_rate_sps").unwrap_or("2.046e6").parse().unwrap();
	let duration_ms: usize = matches.value_of("duration_ms").unwrap_or("800").parse().unwrap();
	let prns: Vec<usize> = matches.value_of("prns").unwrap_or("3,7,12")
		.split(',').map(|s| s.trim().parse().unwrap()).collect();

	eprintln!("Simulating PRNs {:?} at {} [samples/sec] for {} ms", prns, fs, duration_ms);

	// One satellite per channel, spread in Doppler and path delay
	let sats: Vec<SimSat> = prns.iter().enumerate().map(|(k, &prn)| SimSat {
		prn,
		code: l1_ca_signal::prn_int(prn),
		doppler_hz: -1800.0 + 1250.0 * k as f64,
		delay_samples: 150.0 + 400.0 * k as f64,
		amplitude: 1.0,
	}).collect();

	let total_samples = (duration_ms as f64 * fs / 1000.0) as u64;
	let stream: Vec<Complex<f64>> = (0..total_samples).map(|idx| {
		sats.iter().map(|s| s.sample(idx, fs)).fold(Complex { re: 0.0, im: 0.0 }, |a, b| a + b)
	}).collect();

	// Channels start from ideal hand-offs; acquisition search is outside this
	// receiver core
	let mut channels: Vec<TrackingChannel> = vec![];
	for (k, sat) in sats.iter().enumerate() {
		let mut ch = TrackingChannel::new(TrackingConfig::default_for(fs)).unwrap();
		ch.set_channel(k);
		ch.start(Handoff {
			sv: Sv { prn: sat.prn, band: Band::GpsL1Ca },
			code_phase_samples: sat.delay_samples % (fs * 1.0e-3),
			doppler_hz: sat.doppler_hz + 20.0,
			sample_stamp: 0,
		}).unwrap();
		channels.push(ch);
	}

	let mut sync = ObservablesSynchronizer::new(SynchronizerConfig::default_for(channels.len(), fs)).unwrap();
	if let Some(path) = matches.value_of("epoch_dump") {
		sync.enable_dump(path);
	}

	let tick_period = (fs / 1000.0) as u64;
	let mut telemetry_fed = vec![false; channels.len()];
	let mut epochs_emitted = 0usize;
	let mut last_epoch: Option<EpochSummary> = None;

	'run: for tick in (tick_period..total_samples).step_by(tick_period as usize) {

		for (k, ch) in channels.iter_mut().enumerate() {
			while ch.sample_counter() < tick {
				let start = ch.sample_counter() as usize;
				let n = ch.block_length();
				if start + n > stream.len() {
					break 'run;
				}
				let obs = match ch.process(&stream[start..start + n], start as u64) {
					Ok(obs) => obs,
					Err(e) => {
						eprintln!("{}", format!("channel {}: {}", k, e).red());
						break 'run;
					},
				};
				sync.record_observation(k, obs);
			}

			// Stand-in for the telemetry decoder: once a channel reaches
			// steady state, give it a TOW consistent with its simulated path
			// delay and declare word sync
			if !telemetry_fed[k] && ch.state() == ChannelState::Tracking {
				let rx_ms = ch.sample_counter() as f64 / fs * 1000.0;
				let delay_ms = sats[k].delay_samples / fs * 1000.0;
				ch.feed_telemetry(TelemetryFeedback {
					tow_at_symbol_ms: Some((BASE_TOW_MS + rx_ms - delay_ms).round()),
					flag_valid_word: true,
					failed: false,
				});
				telemetry_fed[k] = true;
				eprintln!("{}", format!("channel {}: PRN {:02} tracking, doppler {:+8.1} Hz, CN0 {:5.1} dB-Hz",
					k, sats[k].prn, ch.carrier_doppler_hz(), ch.cn0_db_hz()).green());
			}
		}

		if let Some(epoch) = sync.on_clock_tick(tick) {
			epochs_emitted += 1;
			let summary = EpochSummary {
				rx_time_s: epoch.rx_time_s,
				tow_ref_ms: epoch.tow_ref_ms,
				channels: epoch.channels.iter().map(|o| ChannelSummary {
					prn: o.sv.map(|sv| sv.prn).unwrap_or(0),
					state: if o.flag_valid_symbol { "TRACKING".into() } else { "INVALID".into() },
					doppler_hz: o.carrier_doppler_hz,
					cn0_db_hz: o.cn0_db_hz,
					pseudorange_m: o.pseudorange_m,
					pseudorange_valid: o.flag_valid_pseudorange,
				}).collect(),
			};
			if epochs_emitted % 100 == 0 {
				let ranges: Vec<String> = summary.channels.iter()
					.filter(|c| c.pseudorange_valid)
					.map(|c| format!("PRN {:02} {:12.1} m ({:+7.1} km light-ms)", c.prn, c.pseudorange_m,
						(c.pseudorange_m / SPEED_OF_LIGHT_M_PER_S * 1000.0)))
					.collect();
				eprintln!("{}", format!("epoch {:5}: rx {:8.3} s, TOW {:?} ms, {}",
					epochs_emitted, summary.rx_time_s, summary.tow_ref_ms, ranges.join(", ")).cyan());
			}
			last_epoch = Some(summary);
		}

	}

	eprintln!("{}", format!("{} epochs emitted", epochs_emitted).bold());
	if let Some(epoch) = last_epoch {
		println!("{}", serde_json::to_string_pretty(&epoch).unwrap());
	}

}
