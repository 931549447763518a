//! Signal processing for the IF-to-baseband path

pub mod ddc;

pub use ddc::DownConverter;

/// One complex baseband sample, unit full scale
pub type ComplexSample = num_complex::Complex32;
