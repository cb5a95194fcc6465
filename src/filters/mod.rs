
//! Discrete-time loop filters for code and carrier tracking.  Both filters are
//! deterministic functions of their inputs and their own filter memory, which
//! makes them testable in isolation from the correlator and the channel.

use crate::Error;

const DAMPING: f64 = 0.7;

/// Second-order proportional-plus-integral filter for the code delay-lock loop.
/// The tap weights come from the loop natural frequency for the requested noise
/// bandwidth, applied with trapezoidal integration.  Input is a code phase
/// discriminant in chips; output is a filtered code frequency error in chips/s.
pub struct CodeLoopFilter {
	b0: f64,
	b1: f64,
	pdi_s: f64,
	last_error: f64,
	last_output: f64,
}

impl CodeLoopFilter {

	pub fn new(bw_hz: f64, pdi_s: f64) -> Result<Self, Error> {
		if !bw_hz.is_finite() || bw_hz <= 0.0 {
			return Err(Error::InvalidConfig("DLL bandwidth must be positive"));
		}
		if !pdi_s.is_finite() || pdi_s <= 0.0 {
			return Err(Error::InvalidConfig("DLL update interval must be positive"));
		}
		let mut f = Self { b0: 0.0, b1: 0.0, pdi_s, last_error: 0.0, last_output: 0.0 };
		f.update_coefficients(bw_hz);
		Ok(f)
	}

	fn update_coefficients(&mut self, bw_hz: f64) {
		let wn = (bw_hz * 8.0 * DAMPING) / (4.0 * DAMPING * DAMPING + 1.0);
		let tau1 = 1.0 / (wn * wn);
		let tau2 = (2.0 * DAMPING) / wn;
		self.b0 = (self.pdi_s + 2.0 * tau2) / (2.0 * tau1);
		self.b1 = (self.pdi_s - 2.0 * tau2) / (2.0 * tau1);
	}

	/// Retunes the noise bandwidth without discarding the filter memory, so the
	/// loop can be narrowed once lock is established.  Callers validate the
	/// bandwidth up front, together with the rest of the loop configuration.
	pub fn set_bandwidth(&mut self, bw_hz: f64) {
		debug_assert!(bw_hz.is_finite() && bw_hz > 0.0);
		self.update_coefficients(bw_hz);
	}

	pub fn set_update_interval(&mut self, pdi_s: f64, bw_hz: f64) {
		self.pdi_s = pdi_s;
		self.update_coefficients(bw_hz);
	}

	pub fn initialize(&mut self) {
		self.last_error = 0.0;
		self.last_output = 0.0;
	}

	pub fn apply(&mut self, discriminant_chips: f64) -> f64 {
		let out = self.last_output + self.b0 * discriminant_chips + self.b1 * self.last_error;
		self.last_error = discriminant_chips;
		self.last_output = out;
		out
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierLoopOrder {
	/// 2nd-order PLL assisted by a 1st-order FLL
	Two,
	/// 3rd-order PLL assisted by a 2nd-order FLL
	Three,
}

/// Carrier loop filter combining FLL and PLL discriminants.  The FLL term
/// dominates pull-in (fast frequency convergence from a coarse acquisition
/// estimate); once the FLL bandwidth is set to zero the filter behaves as a
/// pure PLL for precise phase tracking.  Output is the carrier Doppler command
/// in Hz for the next integration interval.
pub struct CarrierLoopFilter {
	order: CarrierLoopOrder,
	pll_w0: f64,
	fll_w0: f64,
	w: f64,
	x: f64,
}

const PLL_A2: f64 = 1.414;
const PLL_A3: f64 = 1.1;
const PLL_B3: f64 = 2.4;

impl CarrierLoopFilter {

	pub fn new(fll_bw_hz: f64, pll_bw_hz: f64, order: CarrierLoopOrder) -> Result<Self, Error> {
		if !pll_bw_hz.is_finite() || pll_bw_hz <= 0.0 {
			return Err(Error::InvalidConfig("PLL bandwidth must be positive"));
		}
		if !fll_bw_hz.is_finite() || fll_bw_hz < 0.0 {
			return Err(Error::InvalidConfig("FLL bandwidth must be nonnegative"));
		}
		let mut f = Self { order, pll_w0: 0.0, fll_w0: 0.0, w: 0.0, x: 0.0 };
		f.set_bandwidths(fll_bw_hz, pll_bw_hz);
		Ok(f)
	}

	/// An FLL bandwidth of zero disables frequency assistance.  Bandwidths are
	/// validated when the loop configuration is built.
	pub fn set_bandwidths(&mut self, fll_bw_hz: f64, pll_bw_hz: f64) {
		debug_assert!(pll_bw_hz.is_finite() && pll_bw_hz > 0.0);
		debug_assert!(fll_bw_hz.is_finite() && fll_bw_hz >= 0.0);
		match self.order {
			CarrierLoopOrder::Three => {
				self.pll_w0 = pll_bw_hz / 0.7845;
				self.fll_w0 = fll_bw_hz / 0.53;
			},
			CarrierLoopOrder::Two => {
				self.pll_w0 = pll_bw_hz / 0.53;
				self.fll_w0 = fll_bw_hz / 0.25;
			},
		}
	}

	/// Seeds the filter memory so that, with zero discriminants, the output is
	/// the acquisition Doppler estimate.
	pub fn initialize(&mut self, doppler_hz: f64) {
		match self.order {
			CarrierLoopOrder::Three => {
				self.x = 2.0 * doppler_hz;
				self.w = 0.0;
			},
			CarrierLoopOrder::Two => {
				self.w = doppler_hz;
				self.x = 0.0;
			},
		}
	}

	pub fn apply(&mut self, freq_error_hz: f64, phase_error_cycles: f64, integration_time_s: f64) -> f64 {
		let t = integration_time_s;
		match self.order {
			CarrierLoopOrder::Three => {
				let w0p = self.pll_w0;
				let w0f = self.fll_w0;
				self.w += t * (w0p.powi(3) * phase_error_cycles + w0f * w0f * freq_error_hz);
				self.x += t * (0.5 * self.w + PLL_A2 * w0f * freq_error_hz + PLL_A3 * w0p * w0p * phase_error_cycles);
				0.5 * self.x + PLL_B3 * w0p * phase_error_cycles
			},
			CarrierLoopOrder::Two => {
				let w0p = self.pll_w0;
				let w0f = self.fll_w0;
				let w_new = self.w + phase_error_cycles * w0p * w0p * t + freq_error_hz * w0f * t;
				let out = 0.5 * (w_new + self.w) + PLL_A2 * w0p * phase_error_cycles;
				self.w = w_new;
				out
			},
		}
	}

}
