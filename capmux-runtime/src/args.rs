//! Argument assembly from the `REQ` invocation environment (§4.4).

use crate::error::{Error, Result};
use capmux_urn::Cap;
use ciborium::value::Value as CborValue;
use serde::Deserialize;
use std::collections::BTreeMap;

const CBOR_CONTENT_TYPE: &str = "application/cbor";

#[derive(Deserialize)]
struct ArgRecord {
    media_urn: String,
    value: CborValue,
}

/// The arguments resolved for one invocation, keyed by their declaring `CapArg`'s
/// media URN.
#[derive(Debug, Default, Clone)]
pub struct ResolvedArgs {
    values: BTreeMap<String, CborValue>,
}

impl ResolvedArgs {
    /// The resolved value for a declared argument, if one was supplied.
    pub fn get(&self, media_urn: &str) -> Option<&CborValue> {
        self.values.get(media_urn)
    }
}

/// Resolves `cap`'s declared arguments from a `REQ`'s `content_type` and `payload`.
///
/// When `content_type` is `application/cbor`, `payload` is decoded as a CBOR array
/// of `{media_urn, value}` records; each declared `CapArg` is satisfied by the first
/// record whose `media_urn` matches. Any other `content_type` routes the raw
/// payload to the first declared `CapArg` only (§9 Open Question resolution: other
/// declared args are satisfied only if not `required`).
pub fn assemble(cap: &Cap, content_type: &str, payload: Option<&[u8]>) -> Result<ResolvedArgs> {
    if content_type == CBOR_CONTENT_TYPE {
        assemble_from_cbor_array(cap, payload.unwrap_or(&[]))
    } else {
        assemble_from_raw_payload(cap, payload)
    }
}

fn assemble_from_cbor_array(cap: &Cap, payload: &[u8]) -> Result<ResolvedArgs> {
    let records: Vec<ArgRecord> = if payload.is_empty() {
        Vec::new()
    } else {
        ciborium::de::from_reader(payload)
            .map_err(|e| Error::Wire(capmux_wire::Error::protocol(format!("malformed argument array: {e}"))))?
    };

    let declared: std::collections::HashSet<&str> =
        cap.args.iter().map(|a| a.media_urn.as_str()).collect();

    let mut values = BTreeMap::new();
    for record in records {
        if !declared.contains(record.media_urn.as_str()) {
            return Err(Error::UnknownArgument(record.media_urn));
        }
        values.entry(record.media_urn).or_insert(record.value);
    }

    for arg in &cap.args {
        if arg.required && !values.contains_key(&arg.media_urn) {
            return Err(Error::MissingArgument(arg.media_urn.clone()));
        }
    }

    Ok(ResolvedArgs { values })
}

fn assemble_from_raw_payload(cap: &Cap, payload: Option<&[u8]>) -> Result<ResolvedArgs> {
    let mut values = BTreeMap::new();

    let mut args = cap.args.iter();
    if let Some(first) = args.next() {
        match payload {
            Some(bytes) => {
                values.insert(first.media_urn.clone(), CborValue::Bytes(bytes.to_vec()));
            }
            None if first.required => {
                return Err(Error::MissingArgument(first.media_urn.clone()));
            }
            None => {}
        }
    }
    for arg in args {
        if arg.required {
            return Err(Error::MissingArgument(arg.media_urn.clone()));
        }
    }

    Ok(ResolvedArgs { values })
}
