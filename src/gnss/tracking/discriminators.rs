
use std::f64::consts;

use num_complex::Complex;

/// Costas-loop two-quadrant arctangent: carrier phase error in radians,
/// insensitive to data-bit sign flips on the prompt.
pub fn pll_two_quadrant_atan(prompt: Complex<f64>) -> f64 {
	if prompt.re == 0.0 { 0.0 } else { (prompt.im / prompt.re).atan() }
}

/// Cross/dot four-quadrant arctangent over two consecutive prompts: carrier
/// frequency error in Hz.
pub fn fll_four_quadrant(prompt_old: Complex<f64>, prompt_new: Complex<f64>, dt_s: f64) -> f64 {
	let cross = prompt_old.re * prompt_new.im - prompt_new.re * prompt_old.im;
	let dot = prompt_old.re * prompt_new.re + prompt_old.im * prompt_new.im;
	if cross == 0.0 && dot == 0.0 { 0.0 } else {
		cross.atan2(dot) / (2.0 * consts::PI * dt_s)
	}
}

/// Normalized noncoherent early-minus-late envelope: code phase error in
/// chips.  Positive when the local replica runs ahead of the received code.
pub fn dll_nc_e_minus_l_normalized(early: Complex<f64>, late: Complex<f64>) -> f64 {
	let e = early.norm();
	let l = late.norm();
	if e + l == 0.0 { 0.0 } else { 0.5 * (e - l) / (e + l) }
}
