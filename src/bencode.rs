//! Bencode encoding and decoding (BEP-3)
//!
//! Bencode is the serialization format used by `.torrent` files. The decoder
//! here is strict: dictionary keys must be byte strings in strictly ascending
//! order, integers and lengths may not carry leading zeros, and trailing
//! bytes after the top-level value are rejected. Because only canonical input
//! is accepted, any decoded value re-encodes to the exact input bytes.

mod decode;
mod encode;
mod error;
mod value;

pub use decode::{decode, decode_document, decode_prefix, Document};
pub use encode::{encode, encode_into};
pub use error::BencodeError;
pub use value::Value;

#[cfg(test)]
mod tests;
