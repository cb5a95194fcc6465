
use std::f64::consts;

use num_complex::Complex;
use num_traits::Zero;

use crate::Error;

pub const NUM_TAPS: usize = 5;

pub const VERY_EARLY: usize = 0;
pub const EARLY: usize = 1;
pub const PROMPT: usize = 2;
pub const LATE: usize = 3;
pub const VERY_LATE: usize = 4;

/// Code and carrier replica state for one coherent integration.  The code
/// phase is the replica offset in chips at the first sample of the block; the
/// carrier terms describe the local-oscillator phase ramp (the replica is
/// conjugated, so a positive Doppler means a negative phase ramp).
#[derive(Debug, Clone, Copy)]
pub struct CorrelationParams {
	pub code_phase_chips: f64,
	pub code_phase_step_chips: f64,
	pub carrier_phase_rad: f64,
	pub carrier_phase_step_rad: f64,
}

/// One coherent integration over a small set of code-phase offsets
/// (very-early, early, prompt, late, very-late) at a single carrier
/// phase/frequency hypothesis.  The software kernel and the register-mapped
/// hardware device are interchangeable behind this contract.
pub trait CorrelatorBank {
	fn set_local_code(&mut self, code: &[f64]);
	fn set_tap_spacing(&mut self, early_late_chips: f64, very_early_late_chips: f64);
	fn integrate(&mut self, samples: &[Complex<f64>], params: &CorrelationParams)
		-> Result<[Complex<f64>; NUM_TAPS], Error>;
}

/// Pure-software correlation kernel: carrier wipe-off with a conjugate
/// replica, then per-tap code multiply-accumulate with rollover at one code
/// period.
pub struct SoftwareCorrelator {
	code: Vec<f64>,
	shifts_chips: [f64; NUM_TAPS],
}

impl SoftwareCorrelator {

	pub fn new() -> Self {
		let mut c = Self { code: vec![], shifts_chips: [0.0; NUM_TAPS] };
		c.set_tap_spacing(0.5, 0.6);
		c
	}

}

impl CorrelatorBank for SoftwareCorrelator {

	fn set_local_code(&mut self, code: &[f64]) {
		self.code = code.to_vec();
	}

	fn set_tap_spacing(&mut self, early_late_chips: f64, very_early_late_chips: f64) {
		self.shifts_chips = [
			-very_early_late_chips,
			-early_late_chips,
			0.0,
			early_late_chips,
			very_early_late_chips,
		];
	}

	fn integrate(&mut self, samples: &[Complex<f64>], params: &CorrelationParams)
		-> Result<[Complex<f64>; NUM_TAPS], Error>
	{
		if self.code.is_empty() {
			return Err(Error::CorrelatorFault("no local code loaded"));
		}
		let code_len = self.code.len() as f64;

		let mut accu = [Complex::zero(); NUM_TAPS];
		let mut carr_phase = params.carrier_phase_rad;
		let mut code_phase = params.code_phase_chips;

		for &s in samples {
			let x = s * Complex { re: carr_phase.cos(), im: -carr_phase.sin() };
			for (k, shift) in self.shifts_chips.iter().enumerate() {
				let mut idx = code_phase + shift;
				while idx < 0.0 { idx += code_len; }
				while idx >= code_len { idx -= code_len; }
				accu[k] += self.code[idx as usize] * x;
			}
			carr_phase += params.carrier_phase_step_rad;
			code_phase += params.code_phase_step_chips;
			if code_phase >= code_len { code_phase -= code_len; }
		}

		Ok(accu)
	}

}

// Register-mapped hardware correlator.  The device presents a small bank of
// 32-bit configuration registers, a start command, a completion status bit and
// I/Q accumulator readback registers, all behind one memory-mapped page.

/// Raw register access to the correlator device; a memory-mapped region in
/// production, a mock in tests.
pub trait RegisterMap {
	fn write(&mut self, addr: usize, value: u32);
	fn read(&mut self, addr: usize) -> u32;
}

pub const REG_NSAMPLES: usize = 0;
pub const REG_CODE_LENGTH: usize = 1;
pub const REG_CODE_PHASE: usize = 2;
pub const REG_CODE_PHASE_STEP: usize = 3;
pub const REG_CARR_PHASE: usize = 4;
pub const REG_CARR_PHASE_STEP: usize = 5;
pub const REG_CODE_MEM: usize = 6;
pub const REG_TAP_SPACING: usize = 7;
pub const REG_START: usize = 8;
pub const REG_STATUS: usize = 9;
pub const REG_TEST: usize = 15;
pub const REG_ACCU_BASE: usize = 16;

const TEST_REG_SANITY_CHECK: u32 = 0x55AA;
const LOCAL_CODE_CLEAR_MEM: u32 = 0x1000_0000;
const LAUNCH_CORRELATION: u32 = 1;
const STATUS_DONE: u32 = 1;

/// Phase values cross the register interface as signed Q10.21 fixed point
const PHASE_SCALE: f64 = (1 << 21) as f64;
/// Tap spacings cross as unsigned Q8.8 chips, packed EL | (VEL << 16)
const SPACING_SCALE: f64 = (1 << 8) as f64;

const STATUS_POLL_LIMIT: usize = 1_000_000;

pub struct RegisterCorrelator<M: RegisterMap> {
	map: M,
	code_len: usize,
}

impl<M: RegisterMap> RegisterCorrelator<M> {

	pub fn new(map: M) -> Result<Self, Error> {
		let mut c = Self { map, code_len: 0 };
		c.check_test_register()?;
		Ok(c)
	}

	// Write a known value to the test register and read it back to detect a
	// missing or wedged device before the first real correlation.
	fn check_test_register(&mut self) -> Result<(), Error> {
		self.map.write(REG_TEST, TEST_REG_SANITY_CHECK);
		let readback = self.map.read(REG_TEST);
		if readback != TEST_REG_SANITY_CHECK {
			log::warn!("correlator test register readback 0x{:04X}, expected 0x{:04X}", readback, TEST_REG_SANITY_CHECK);
			return Err(Error::CorrelatorFault("test register sanity check failed"));
		}
		Ok(())
	}

	fn phase_to_reg(x: f64, full_scale: f64) -> u32 {
		((x / full_scale) * PHASE_SCALE).round() as i32 as u32
	}

	fn reg_to_accu(lo: u32, hi: u32) -> Complex<f64> {
		Complex { re: lo as i32 as f64, im: hi as i32 as f64 }
	}

}

impl<M: RegisterMap> CorrelatorBank for RegisterCorrelator<M> {

	fn set_local_code(&mut self, code: &[f64]) {
		self.code_len = code.len();
		self.map.write(REG_CODE_MEM, LOCAL_CODE_CLEAR_MEM);
		for &chip in code {
			self.map.write(REG_CODE_MEM, if chip > 0.0 { 1 } else { 0 });
		}
		self.map.write(REG_CODE_LENGTH, code.len() as u32);
	}

	fn set_tap_spacing(&mut self, early_late_chips: f64, very_early_late_chips: f64) {
		let el = (early_late_chips * SPACING_SCALE).round() as u32 & 0xFFFF;
		let vel = (very_early_late_chips * SPACING_SCALE).round() as u32 & 0xFFFF;
		self.map.write(REG_TAP_SPACING, el | (vel << 16));
	}

	fn integrate(&mut self, samples: &[Complex<f64>], params: &CorrelationParams)
		-> Result<[Complex<f64>; NUM_TAPS], Error>
	{
		if self.code_len == 0 {
			return Err(Error::CorrelatorFault("no local code loaded"));
		}
		let code_len = self.code_len as f64;

		self.map.write(REG_NSAMPLES, samples.len() as u32);
		self.map.write(REG_CODE_PHASE, Self::phase_to_reg(params.code_phase_chips, code_len));
		self.map.write(REG_CODE_PHASE_STEP, Self::phase_to_reg(params.code_phase_step_chips, code_len));
		self.map.write(REG_CARR_PHASE, Self::phase_to_reg(params.carrier_phase_rad, 2.0 * consts::PI));
		self.map.write(REG_CARR_PHASE_STEP, Self::phase_to_reg(params.carrier_phase_step_rad, 2.0 * consts::PI));
		self.map.write(REG_START, LAUNCH_CORRELATION);

		let mut polls = 0;
		while self.map.read(REG_STATUS) & STATUS_DONE == 0 {
			polls += 1;
			if polls >= STATUS_POLL_LIMIT {
				return Err(Error::CorrelatorFault("timed out waiting for completion"));
			}
		}

		let mut accu = [Complex::zero(); NUM_TAPS];
		for k in 0..NUM_TAPS {
			let lo = self.map.read(REG_ACCU_BASE + 2 * k);
			let hi = self.map.read(REG_ACCU_BASE + 2 * k + 1);
			accu[k] = Self::reg_to_accu(lo, hi);
		}
		Ok(accu)
	}

}
