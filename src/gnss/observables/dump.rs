
//! Binary epoch log: per epoch, seven little-endian doubles per channel slot
//! {RX time s, interpolated TOW s, Doppler Hz, carrier phase cycles,
//! pseudorange m, PRN, pseudorange-valid}.  Append-only side file for offline
//! inspection; write failures disable the sink and never reach the control
//! path.

use std::f64::consts;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::Epoch;

pub const DOUBLES_PER_CHANNEL: usize = 7;

pub struct EpochDump {
	writer: BufWriter<File>,
}

impl EpochDump {

	pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
		Ok(Self { writer: BufWriter::new(File::create(path)?) })
	}

	pub fn write_epoch(&mut self, epoch: &Epoch) -> io::Result<()> {
		for obs in &epoch.channels {
			let prn = obs.sv.map(|sv| sv.prn as f64).unwrap_or(0.0);
			let valid = if obs.flag_valid_pseudorange { 1.0 } else { 0.0 };
			self.writer.write_f64::<LittleEndian>(obs.rx_time_s)?;
			self.writer.write_f64::<LittleEndian>(obs.interp_tow_ms / 1000.0)?;
			self.writer.write_f64::<LittleEndian>(obs.carrier_doppler_hz)?;
			self.writer.write_f64::<LittleEndian>(obs.carrier_phase_rad / (2.0 * consts::PI))?;
			self.writer.write_f64::<LittleEndian>(obs.pseudorange_m)?;
			self.writer.write_f64::<LittleEndian>(prn)?;
			self.writer.write_f64::<LittleEndian>(valid)?;
		}
		Ok(())
	}

}
