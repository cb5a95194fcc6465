
//! Minimal dataflow runtime: a processing stage wrapped in a tokio task with
//! an input stream, an interleaved control stream and an output stream.  Each
//! stage owns its state outright, so no locking is needed; the observables
//! synchronizer stays outside as the single consumer of all stage outputs,
//! which gives the batch-barrier discipline the receiver relies on.

use num_complex::Complex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{Error, Sample};
use crate::gnss::ChannelUnit;
use crate::gnss::tracking::{ChannelState, Handoff, TelemetryFeedback, TrackingChannel, TrackingObservation};
use crate::gnss::tracking::correlator::CorrelatorBank;

pub enum BlockResult<U> {
	NotReady,
	Ready(U),
	Err(Error),
}

/// A stage consumes inputs of type `T`, reacts to control messages of type
/// `C`, and produces outputs of type `U` when one is ready.
pub trait BlockFunctionality<C, T, U> {
	fn control(&mut self, control: &C) -> Result<(), Error>;
	fn apply(&mut self, input: &T) -> BlockResult<U>;
}

pub struct Block<C: 'static + Send, T: 'static + Send, U: 'static + Send> {
	pub tx_control: mpsc::Sender<C>,
	pub tx_input: mpsc::Sender<T>,
	pub rx_output: mpsc::Receiver<U>,
	pub handles: Vec<JoinHandle<Result<(), &'static str>>>,
}

impl<C: Send + Sync, T: Send + Sync, U: Send + Sync> Block<C, T, U> {

	pub fn from<B: 'static + BlockFunctionality<C, T, U> + Send>(b: B) -> Self {
		let (tx_control, mut rx_control) = mpsc::channel::<C>(10);
		let (tx_input, mut rx_input) = mpsc::channel::<T>(10);
		let (mut tx_output, rx_output) = mpsc::channel::<U>(10);

		let handle: JoinHandle<Result<(), &'static str>> = tokio::spawn(async move {
			let mut owned_b = b;

			'rx: while let Some(t) = rx_input.recv().await {
				// Interleaving control handling with input handling avoids a
				// mutex around the stage state
				if let Ok(c) = rx_control.try_recv() {
					owned_b.control(&c).map_err(|e| {
						log::warn!("block control rejected: {}", e);
						"control message rejected"
					})?;
				}

				match owned_b.apply(&t) {
					BlockResult::Ready(u) => tx_output.send(u).await.map_err(|_| "unable to send output")?,
					BlockResult::NotReady => (),
					BlockResult::Err(e) => {
						log::warn!("block failed: {}", e);
						break 'rx;
					},
				}
			}

			Ok(())
		});

		Block { tx_control, tx_input, rx_output, handles: vec![handle] }
	}

	pub async fn shutdown(self) -> Result<(), &'static str> {
		let Block { tx_control, tx_input, rx_output: _, handles } = self;

		drop(tx_control);
		drop(tx_input);

		for handle in handles {
			handle.await.map_err(|_| "block task panicked")??;
		}

		Ok(())
	}

}

/// Control surface of a tracking stage.
#[derive(Debug, Clone, Copy)]
pub enum ChannelControl {
	Start(Handoff),
	Telemetry(TelemetryFeedback),
	Stop,
}

/// Adapts a `TrackingChannel` to the per-sample stage interface: buffers the
/// incoming stream until one integration block is complete, then runs the
/// channel and emits its observation.
pub struct ChannelBlock<C: CorrelatorBank> {
	channel: TrackingChannel<C>,
	pending: Vec<Complex<f64>>,
	first_idx: Option<u64>,
}

impl<C: CorrelatorBank> ChannelBlock<C> {

	pub fn new(channel: TrackingChannel<C>) -> Self {
		Self { channel, pending: vec![], first_idx: None }
	}

	pub fn channel(&self) -> &TrackingChannel<C> {
		&self.channel
	}

}

impl<C: CorrelatorBank> BlockFunctionality<ChannelControl, Sample, TrackingObservation> for ChannelBlock<C> {

	fn control(&mut self, control: &ChannelControl) -> Result<(), Error> {
		match control {
			ChannelControl::Start(handoff) => {
				self.pending.clear();
				self.first_idx = None;
				self.channel.start_tracking(*handoff)
			},
			ChannelControl::Telemetry(fb) => {
				self.channel.feed_telemetry(*fb);
				Ok(())
			},
			ChannelControl::Stop => {
				self.channel.stop_tracking();
				self.pending.clear();
				self.first_idx = None;
				Ok(())
			},
		}
	}

	fn apply(&mut self, input: &Sample) -> BlockResult<TrackingObservation> {
		if self.channel.state() == ChannelState::Idle {
			return BlockResult::NotReady;
		}
		// Samples from before the hand-off stamp are not part of any block
		if input.idx < self.channel.sample_counter() && self.pending.is_empty() {
			return BlockResult::NotReady;
		}
		if self.first_idx.is_none() {
			self.first_idx = Some(input.idx);
		}
		self.pending.push(input.val);

		if self.pending.len() < self.channel.block_length() {
			return BlockResult::NotReady;
		}
		let first = match self.first_idx.take() {
			Some(i) => i,
			None => return BlockResult::Err(Error::NotStarted),
		};
		let result = self.channel.process(&self.pending, first);
		self.pending.clear();
		match result {
			Ok(obs) => BlockResult::Ready(obs),
			Err(e) => BlockResult::Err(e),
		}
	}

}
