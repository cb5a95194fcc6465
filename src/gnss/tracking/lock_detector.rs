
use num_complex::Complex;

use crate::utils::CircularBuffer;

/// Signal-to-noise-variance CN0 estimator over a window of prompt outputs.
pub fn cn0_snv_estimator<'a, I: Iterator<Item=&'a Complex<f64>>>(prompts: I, n: usize, coh_integration_time_s: f64) -> f64 {
	let n = n as f64;
	let mut sum_abs_re = 0.0;
	let mut sum_power = 0.0;
	for c in prompts {
		sum_abs_re += c.re.abs();
		sum_power += c.re * c.re + c.im * c.im;
	}
	let p_sig = (sum_abs_re / n).powi(2);
	let p_tot = sum_power / n;
	let snr = p_sig / (p_tot - p_sig);
	10.0 * snr.log10() - 10.0 * coh_integration_time_s.log10()
}

/// Normalized in-phase/quadrature power ratio in [-1, 1]; near 1 when the
/// carrier phase is locked and the signal energy sits in the I arm.
pub fn carrier_lock_test<'a, I: Iterator<Item=&'a Complex<f64>>>(prompts: I) -> f64 {
	let mut sum_i = 0.0;
	let mut sum_q = 0.0;
	for c in prompts {
		sum_i += c.re;
		sum_q += c.im;
	}
	let nbp = sum_i * sum_i + sum_q * sum_q;
	let nbd = sum_i * sum_i - sum_q * sum_q;
	nbd / nbp
}

/// Sliding CN0 estimate and binary carrier lock status from accumulated
/// prompt correlator power, with a consecutive-failure counter.
pub struct LockDetector {
	prompt_buffer: CircularBuffer<Complex<f64>>,
	cn0_db_hz: f64,
	lock_test_value: f64,
	fail_count: usize,
	fail_limit: usize,
	threshold_cn0_db_hz: f64,
	threshold_carrier_lock: f64,
}

impl LockDetector {

	pub fn new(window: usize, fail_limit: usize, threshold_cn0_db_hz: f64, threshold_carrier_lock: f64) -> Self {
		Self {
			prompt_buffer: CircularBuffer::with_capacity(window),
			cn0_db_hz: 0.0,
			lock_test_value: 0.0,
			fail_count: 0,
			fail_limit,
			threshold_cn0_db_hz,
			threshold_carrier_lock,
		}
	}

	pub fn cn0_db_hz(&self) -> f64 { self.cn0_db_hz }
	pub fn lock_test_value(&self) -> f64 { self.lock_test_value }
	pub fn fail_count(&self) -> usize { self.fail_count }
	pub fn ready(&self) -> bool { self.prompt_buffer.is_full() }

	/// True while the consecutive-failure count stays within the limit
	pub fn lock_ok(&self) -> bool { self.fail_count <= self.fail_limit }

	pub fn push_prompt(&mut self, prompt: Complex<f64>) {
		self.prompt_buffer.push(prompt);
	}

	/// Recomputes the estimates over the current window and updates the
	/// failure counter.  Returns the instantaneous lock decision; before the
	/// window has filled the detector reports locked.
	pub fn update(&mut self, coh_integration_time_s: f64) -> bool {
		if !self.prompt_buffer.is_full() { return true; }

		let n = self.prompt_buffer.len();
		self.cn0_db_hz = cn0_snv_estimator(self.prompt_buffer.iter(), n, coh_integration_time_s);
		self.lock_test_value = carrier_lock_test(self.prompt_buffer.iter());

		let locked = (self.lock_test_value >= self.threshold_carrier_lock)
			&& (self.cn0_db_hz >= self.threshold_cn0_db_hz);
		if locked {
			if self.fail_count > 0 { self.fail_count -= 1; }
		} else {
			self.fail_count += 1;
		}
		locked
	}

	pub fn reset(&mut self) {
		self.prompt_buffer.clear();
		self.cn0_db_hz = 0.0;
		self.lock_test_value = 0.0;
		self.fail_count = 0;
	}

}

#[cfg(test)]
mod tests {

	use num_complex::Complex;
	use rand::SeedableRng;
	use rand_distr::{Distribution, Normal};

	use super::LockDetector;

	fn drive(det: &mut LockDetector, prompts: &[Complex<f64>]) {
		for &p in prompts {
			det.push_prompt(p);
			det.update(1.0e-3);
		}
	}

	#[test]
	fn strong_clean_signal_reports_lock_and_high_cn0() {
		let mut det = LockDetector::new(20, 50, 25.0, 0.85);
		let mut rng = rand::rngs::StdRng::seed_from_u64(1);
		let noise = Normal::new(0.0, 10.0).unwrap();
		let prompts: Vec<Complex<f64>> = (0..60).map(|i| {
			let bit = if (i / 20) % 2 == 0 { 1.0 } else { -1.0 };
			Complex { re: bit * 2000.0 + noise.sample(&mut rng), im: noise.sample(&mut rng) }
		}).collect();
		drive(&mut det, &prompts);

		assert!(det.ready());
		assert!(det.lock_ok());
		assert_eq!(det.fail_count(), 0);
		assert!(det.cn0_db_hz() > 40.0, "cn0 = {}", det.cn0_db_hz());
		assert!(det.lock_test_value() > 0.95);
	}

	#[test]
	fn noise_only_input_accumulates_failures() {
		let mut det = LockDetector::new(20, 5, 25.0, 0.85);
		let mut rng = rand::rngs::StdRng::seed_from_u64(2);
		let noise = Normal::new(0.0, 100.0).unwrap();
		let prompts: Vec<Complex<f64>> = (0..60)
			.map(|_| Complex { re: noise.sample(&mut rng), im: noise.sample(&mut rng) })
			.collect();
		drive(&mut det, &prompts);

		assert!(det.fail_count() > 5);
		assert!(!det.lock_ok());
	}

	#[test]
	fn detector_reports_locked_until_window_fills() {
		let mut det = LockDetector::new(20, 5, 25.0, 0.85);
		for _ in 0..19 {
			det.push_prompt(Complex { re: 0.0, im: 0.0 });
			assert!(det.update(1.0e-3));
		}
		assert!(!det.ready());
		assert_eq!(det.fail_count(), 0);
	}

	#[test]
	fn reset_clears_failure_history() {
		let mut det = LockDetector::new(20, 2, 25.0, 0.85);
		for _ in 0..30 {
			det.push_prompt(Complex { re: 0.0, im: 0.0 });
			det.update(1.0e-3);
		}
		assert!(!det.lock_ok());
		det.reset();
		assert!(det.lock_ok());
		assert!(!det.ready());
	}

}
