//! Encodes and decodes [`Command`](crate::Command) against the wire schema:
//! a self-delimiting JSON object, one per UDP datagram.
//!
//! `source` never rides on the wire — it's stripped on encode by
//! `Command`'s `#[serde(skip)]` and filled in by the ingest path on decode.

use crate::command::Command;
use broker_std::errors::CodecError;

/// Decodes one datagram's worth of bytes into a [`Command`].
///
/// A byte sequence that isn't valid JSON is `Malformed`; one whose
/// `command` tag isn't in the closed set is `UnknownCommand`. Both cause
/// the caller to drop the datagram without a reply.
pub fn decode(bytes: &[u8]) -> Result<Command, CodecError> {
    match serde_json::from_slice::<Command>(bytes) {
        Ok(command) => Ok(command),
        Err(e) if e.is_data() => {
            // serde_json reports an unrecognized enum variant as a data
            // error; dig the bad tag back out so callers can log it.
            Err(CodecError::UnknownCommand(
                unknown_tag(bytes).unwrap_or_else(|| e.to_string()),
            ))
        }
        Err(e) => Err(CodecError::Malformed(e)),
    }
}

/// Encodes a [`Command`] back to its wire bytes.
pub fn encode(command: &Command) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(command).map_err(CodecError::EncodeFailure)
}

fn unknown_tag(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value.get("command")?.as_str().map(str::to_owned)
}
