//! # Wire Format
//!
//! Bit-packed encoding shared by the server and its clients.
//!
//! - [`WireBuffer`] - growable MSB-first bit buffer with string/blob helpers
//! - [`FloatCompressor`] / [`IntCompressor`] - fixed-width range quantization
//! - [`WireCodec`] - trait for values that move through a buffer
//! - [`protocol`] - the client/server control messages

mod buffer;
mod codec;
mod compress;
pub mod protocol;

pub use buffer::WireBuffer;
pub use codec::WireCodec;
pub use compress::{FloatCompressor, IntCompressor};
pub use protocol::{ClientMessage, EntityRecord, RejectReason, ServerMessage};
