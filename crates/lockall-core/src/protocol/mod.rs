//! Protocol module containing the endpoint header, command vocabulary, frame
//! codec, and out-of-band code payload.

pub mod code;
pub mod command;
pub mod frame;
pub mod header;

pub use code::{CodeError, OobCode};
pub use command::*;
pub use frame::{decode_frame, encode_frame, Frame, FrameError};
pub use header::{Header, HeaderError};
