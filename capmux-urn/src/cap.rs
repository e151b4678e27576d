//! `Cap`: a capability URN bound to the executable metadata that describes how to
//! invoke it (§3.2). Data only — no validation engine or CLI wiring lives here.

use crate::urn::Urn;
use std::collections::BTreeMap;

/// Where one `CapArg`'s value may come from, tried in declared order until one
/// yields a value. `CliFlag`/`Position` are resolved by the (out-of-scope) CLI
/// front-end; they are represented here only so a `Cap` can be parsed and
/// round-tripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSource {
    /// Read from a named input stream described by a media URN.
    Stdin(String),
    /// The Nth positional CLI argument.
    Position(u32),
    /// A named CLI flag, e.g. `--input`.
    CliFlag(String),
}

/// One logical argument a `Cap` declares. `media_urn` is the argument's semantic
/// identity: it uniquely keys the argument among a `Cap`'s `args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapArg {
    pub media_urn: String,
    pub required: bool,
    pub sources: Vec<ArgSource>,
    pub description: String,
}

/// The media URN a `Cap`'s output conforms to, plus a free-text description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapOutput {
    pub media_urn: String,
    pub description: String,
}

/// A dynamically-typed value, used only to carry `ResolvedMediaSpec` schema trees
/// and validation-rule operands without an open reflection surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// An inherent validation rule attached to a `ResolvedMediaSpec`. Never evaluated
/// here (the validation engine is out of scope); carried as data so a `Cap` can be
/// fully constructed and serialized.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationRule {
    Min(f64),
    Max(f64),
    MinLen(usize),
    MaxLen(usize),
    Pattern(String),
    AllowedValues(Vec<Value>),
}

/// The resolved shape of a media URN pattern: MIME type, optional profile URI,
/// optional schema tree, and any inherent validation rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMediaSpec {
    pub mime_type: String,
    pub profile_uri: Option<String>,
    pub schema: Option<Value>,
    pub rules: Vec<ValidationRule>,
}

/// A capability: a URN plus everything needed to describe, validate, and invoke it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cap {
    pub urn: Urn,
    pub command: String,
    pub args: Vec<CapArg>,
    pub output: CapOutput,
    pub media_specs: Vec<(String, ResolvedMediaSpec)>,
}

impl Cap {
    /// Looks up the first declared argument by its media URN.
    pub fn arg(&self, media_urn: &str) -> Option<&CapArg> {
        self.args.iter().find(|a| a.media_urn == media_urn)
    }

    /// The media-spec entry whose pattern key matches `media_urn` exactly.
    pub fn media_spec(&self, media_urn: &str) -> Option<&ResolvedMediaSpec> {
        self.media_specs
            .iter()
            .find(|(pattern, _)| pattern == media_urn)
            .map(|(_, spec)| spec)
    }
}
