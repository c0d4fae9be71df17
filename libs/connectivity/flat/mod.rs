//! Fixed-width positional codec and its dictionary

mod codec;
mod dictionary;

pub use codec::FlatMessageCodec;
pub use dictionary::{Alignment, FieldDesc, FlatDictionary, FlatMessageDesc, RegexCondition};
