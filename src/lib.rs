
use num_complex::Complex;

pub mod filters;
pub mod gnss;
pub mod runtime;
pub mod utils;

/// One complex baseband sample and its position in the sample stream.
#[derive(Debug, Clone)]
pub struct Sample {
	pub val: Complex<f64>,
	pub idx: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("channel has not been started with an acquisition hand-off")]
	NotStarted,
	#[error("sample stream discontinuity: expected sample {expected}, got {got}")]
	SampleGap { expected: u64, got: u64 },
	#[error("wrong block length: expected {expected} samples, got {got}")]
	BlockLength { expected: usize, got: usize },
	#[error("invalid acquisition hand-off: {0}")]
	InvalidHandoff(&'static str),
	#[error("invalid configuration: {0}")]
	InvalidConfig(&'static str),
	#[error("correlator device fault: {0}")]
	CorrelatorFault(&'static str),
}
