pub mod builder;
pub mod codec;
pub mod packet;
pub mod parser;
pub mod rx;
pub mod stream;
pub mod tx;

/// PCMU static payload type.
pub const PT_PCMU: u8 = 0;
/// Timestamp increment per 20ms PCMU packet (160 samples at 8kHz).
pub const TS_INCREMENT_20MS: u32 = 160;
