//! JSON fragments and the `{"things":[...]}` document posted to the collector.
//!
//! A leaf sends its readings upward as bare array elements (no envelope). The
//! root parses every fragment it receives, appends the elements after its own
//! readings and wraps the whole list in the `things` envelope.

use crate::reading::SensorReading;
use crate::WireError;
use serde::Serialize;
use serde_json::Value;

/// Serialized shape of one `things` element
#[derive(Serialize)]
struct ThingRecord<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    body: &'a str,
    ticks: u64,
    #[serde(rename = "W", skip_serializing_if = "Option::is_none")]
    w: Option<f64>,
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
    #[serde(rename = "Z")]
    z: f64,
}

impl<'a> From<&'a SensorReading> for ThingRecord<'a> {
    fn from(reading: &'a SensorReading) -> Self {
        let (x, y, z) = reading.components.xyz();
        Self {
            kind: reading.kind.as_str(),
            body: reading.body.as_str(),
            ticks: reading.ticks,
            w: reading.components.w(),
            x,
            y,
            z,
        }
    }
}

/// Serialize readings as bare, comma separated array elements
pub fn encode_fragment(readings: &[SensorReading]) -> Result<String, WireError> {
    let mut elements = Vec::with_capacity(readings.len());
    for reading in readings {
        elements.push(serde_json::to_string(&ThingRecord::from(reading))?);
    }
    Ok(elements.join(","))
}

/// Parse a fragment received from a leaf into its array elements.
///
/// Every element must be a JSON object; anything else rejects the whole fragment.
pub fn parse_fragment(fragment: &str) -> Result<Vec<Value>, WireError> {
    let trimmed = fragment.trim().trim_end_matches('\0');
    if trimmed.is_empty() {
        return Err(WireError::Fragment("empty fragment".to_string()));
    }

    let elements: Vec<Value> = serde_json::from_str(&format!("[{}]", trimmed))?;
    if let Some(bad) = elements.iter().find(|value| !value.is_object()) {
        return Err(WireError::Fragment(format!("element is not an object: {}", bad)));
    }

    Ok(elements)
}

/// The document the root publishes: local readings followed by leaf fragments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThingsDocument {
    things: Vec<Value>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    things: &'a [Value],
}

impl ThingsDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a locally taken reading
    pub fn push_reading(&mut self, reading: &SensorReading) -> Result<(), WireError> {
        self.things.push(serde_json::to_value(ThingRecord::from(reading))?);
        Ok(())
    }

    /// Append every element of a leaf fragment, returning how many were merged
    pub fn push_fragment(&mut self, fragment: &str) -> Result<usize, WireError> {
        let elements = parse_fragment(fragment)?;
        let merged = elements.len();
        self.things.extend(elements);
        Ok(merged)
    }

    /// Number of `things` elements
    pub fn len(&self) -> usize {
        self.things.len()
    }

    /// Whether the document has no elements
    pub fn is_empty(&self) -> bool {
        self.things.is_empty()
    }

    /// Elements in document order
    pub fn things(&self) -> &[Value] {
        &self.things
    }

    /// Render the `{"things":[...]}` body
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(&Envelope {
            things: &self.things,
        })?)
    }
}
