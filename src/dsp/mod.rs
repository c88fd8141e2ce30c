//! Signal generators and filters used to build voices.

pub mod filter;
pub mod noise;
pub mod oscillator;

pub use filter::LowpassFilter;
pub use noise::{NoiseBuffer, NoiseSource};
pub use oscillator::{Oscillator, Waveform};
