//! Fuzz target for [`Envelope`] wire parsing
//!
//! The signaling wire is peer-controlled input; parsing it must never
//! panic, whatever arrives.
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary (often invalid UTF-8 / invalid JSON) input
//! - Structured JSON: valid JSON objects with fuzzed type/method/id fields
//!
//! # Invariants
//!
//! - `Envelope::decode` NEVER panics
//! - A successfully decoded envelope re-encodes, and the re-encoded form
//!   decodes to an equal value (lossless round trip)
//! - Unknown `type`, `method`, or `name` values are rejected, not mangled

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mezzo_proto::Envelope;

#[derive(Debug, Arbitrary)]
enum FuzzInput {
    /// Raw wire bytes.
    Raw(Vec<u8>),
    /// A JSON object with fuzzed envelope-ish fields.
    Shaped {
        kind: String,
        method: String,
        id: u64,
        error: Option<String>,
        data: String,
    },
}

fuzz_target!(|input: FuzzInput| {
    let raw = match input {
        FuzzInput::Raw(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        FuzzInput::Shaped { kind, method, id, error, data } => serde_json::json!({
            "type": kind,
            "method": method,
            "id": id,
            "error": error,
            "data": data,
        })
        .to_string(),
    };

    let Ok(envelope) = Envelope::decode(&raw) else {
        return;
    };

    let encoded = envelope.encode().expect("decoded envelope must re-encode");
    let reparsed = Envelope::decode(&encoded).expect("re-encoded envelope must decode");
    assert_eq!(reparsed, envelope, "envelope round trip must be lossless");
});
