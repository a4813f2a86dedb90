//! Native document model
//!
//! This module defines the value vocabulary of the underlying schemaless
//! document store:
//! - NativeValue: one field value as the store holds it
//! - NativeType: discriminant of a NativeValue (recorded in the provider type map)
//! - Document: ordered field-name → value map (one stored document)
//! - ObjectId: 12-byte store-generated identifier
//!
//! ## Type Rules
//!
//! - Different native types are NEVER equal: `Int32(1) != Int64(1)`
//! - Double uses IEEE-754 equality: `NaN != NaN`
//! - Document equality ignores field order
//!
//! ## ObjectId layout
//!
//! | bytes | content |
//! |-------|---------|
//! | 0..4  | seconds since epoch, big-endian |
//! | 4..9  | per-process random |
//! | 9..12 | counter, big-endian |
//!
//! Ids generated by one process therefore sort in creation order, which is
//! what lets the synthetic key stand in for natural insertion order.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the identifier field every stored document carries
pub const NATIVE_ID_FIELD: &str = "_id";

// =============================================================================
// ObjectId
// =============================================================================

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]
});

static OID_COUNTER: Lazy<AtomicU32> = Lazy::new(|| {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    AtomicU32::new(u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]]))
});

/// Store-generated document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a new id (timestamp + process-unique + counter)
    pub fn new() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let counter = OID_COUNTER.fetch_add(1, Ordering::SeqCst) & 0x00FF_FFFF;
        Self::from_parts(seconds, *PROCESS_UNIQUE, counter)
    }

    /// Assemble an id from its components
    pub fn from_parts(seconds: u32, unique: [u8; 5], counter: u32) -> Self {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&unique);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    /// Raw bytes
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Lowercase 24-character hex form
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Creation time encoded in the id (seconds since epoch)
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 24 || !s.is_ascii() {
            return Err(Error::InvalidOperation(format!(
                "'{}' is not a 24-character hex object id",
                s
            )));
        }
        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| {
                Error::InvalidOperation(format!("'{}' is not a 24-character hex object id", s))
            })?;
        }
        Ok(ObjectId(bytes))
    }
}

// =============================================================================
// NativeType
// =============================================================================

/// Discriminant of a native value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// Null / missing
    Null,
    /// Boolean
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// IEEE-754 double
    Double,
    /// UTF-8 string
    String,
    /// Store-generated identifier
    ObjectId,
    /// UTC date-time, milliseconds since epoch
    DateTime,
    /// Internal timestamp (seconds + increment)
    Timestamp,
    /// Raw bytes
    Binary,
    /// Array of values
    Array,
    /// Embedded document
    Document,
}

impl NativeType {
    /// Type name as a string
    pub fn name(&self) -> &'static str {
        match self {
            NativeType::Null => "Null",
            NativeType::Boolean => "Boolean",
            NativeType::Int32 => "Int32",
            NativeType::Int64 => "Int64",
            NativeType::Double => "Double",
            NativeType::String => "String",
            NativeType::ObjectId => "ObjectId",
            NativeType::DateTime => "DateTime",
            NativeType::Timestamp => "Timestamp",
            NativeType::Binary => "Binary",
            NativeType::Array => "Array",
            NativeType::Document => "Document",
        }
    }

    /// True for scalar (non-container, non-null) types
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            NativeType::Null | NativeType::Array | NativeType::Document
        )
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// NativeValue
// =============================================================================

/// One field value as stored by the native document store
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point (IEEE-754)
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Store-generated identifier
    ObjectId(ObjectId),
    /// UTC date-time in milliseconds since epoch
    DateTime(i64),
    /// Internal timestamp
    Timestamp {
        /// Seconds since epoch
        seconds: u32,
        /// Ordinal within the second
        increment: u32,
    },
    /// Raw bytes
    Binary(Vec<u8>),
    /// Array of values
    Array(Vec<NativeValue>),
    /// Embedded document
    Document(Document),
}

impl NativeValue {
    /// Native type of this value
    pub fn native_type(&self) -> NativeType {
        match self {
            NativeValue::Null => NativeType::Null,
            NativeValue::Boolean(_) => NativeType::Boolean,
            NativeValue::Int32(_) => NativeType::Int32,
            NativeValue::Int64(_) => NativeType::Int64,
            NativeValue::Double(_) => NativeType::Double,
            NativeValue::String(_) => NativeType::String,
            NativeValue::ObjectId(_) => NativeType::ObjectId,
            NativeValue::DateTime(_) => NativeType::DateTime,
            NativeValue::Timestamp { .. } => NativeType::Timestamp,
            NativeValue::Binary(_) => NativeType::Binary,
            NativeValue::Array(_) => NativeType::Array,
            NativeValue::Document(_) => NativeType::Document,
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    /// Get as string slice if this is a String
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as document if this is an embedded Document
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            NativeValue::Document(d) => Some(d),
            _ => None,
        }
    }

    /// Get as slice if this is an Array
    pub fn as_array(&self) -> Option<&[NativeValue]> {
        match self {
            NativeValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Convert a JSON value into a native value
    ///
    /// Integers that fit in 32 bits become `Int32`, larger ones `Int64`.
    /// Extended JSON wrappers are recognized: `{"$oid": "<hex>"}`,
    /// `{"$date": <millis>}`, `{"$numberLong": "<digits>"}`.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value as J;
        Ok(match value {
            J::Null => NativeValue::Null,
            J::Bool(b) => NativeValue::Boolean(b),
            J::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => NativeValue::Int32(small),
                        Err(_) => NativeValue::Int64(i),
                    }
                } else if let Some(f) = n.as_f64() {
                    NativeValue::Double(f)
                } else {
                    return Err(Error::unresolvable(
                        n.to_string(),
                        "number outside the 64-bit range",
                    ));
                }
            }
            J::String(s) => NativeValue::String(s),
            J::Array(items) => NativeValue::Array(
                items
                    .into_iter()
                    .map(NativeValue::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            J::Object(map) => {
                if map.len() == 1 {
                    if let Some(J::String(hex)) = map.get("$oid") {
                        return Ok(NativeValue::ObjectId(hex.parse()?));
                    }
                    if let Some(J::Number(n)) = map.get("$date") {
                        if let Some(millis) = n.as_i64() {
                            return Ok(NativeValue::DateTime(millis));
                        }
                    }
                    if let Some(J::String(digits)) = map.get("$numberLong") {
                        let v = digits.parse::<i64>().map_err(|e| {
                            Error::unresolvable(digits.clone(), e.to_string())
                        })?;
                        return Ok(NativeValue::Int64(v));
                    }
                }
                NativeValue::Document(Document::from_json(J::Object(map))?)
            }
        })
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Boolean(b)
    }
}

impl From<i32> for NativeValue {
    fn from(i: i32) -> Self {
        NativeValue::Int32(i)
    }
}

impl From<i64> for NativeValue {
    fn from(i: i64) -> Self {
        NativeValue::Int64(i)
    }
}

impl From<f64> for NativeValue {
    fn from(f: f64) -> Self {
        NativeValue::Double(f)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::String(s.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(s: String) -> Self {
        NativeValue::String(s)
    }
}

impl From<ObjectId> for NativeValue {
    fn from(id: ObjectId) -> Self {
        NativeValue::ObjectId(id)
    }
}

impl From<Document> for NativeValue {
    fn from(doc: Document) -> Self {
        NativeValue::Document(doc)
    }
}

// =============================================================================
// Document
// =============================================================================

/// One stored document: ordered field-name → value map
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<(String, NativeValue)>,
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a JSON object into a document
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the value is not a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(map) => {
                let mut doc = Document::new();
                for (key, val) in map {
                    doc.insert(key, NativeValue::from_json(val)?);
                }
                Ok(doc)
            }
            other => Err(Error::InvalidOperation(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&NativeValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a mutable field value
    pub fn get_mut(&mut self, key: &str) -> Option<&mut NativeValue> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Resolve a dotted path through embedded documents
    pub fn get_path(&self, path: &[String]) -> Option<&NativeValue> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get(first)?;
        for segment in rest {
            current = current.as_document()?.get(segment)?;
        }
        Some(current)
    }

    /// Insert or replace a field, returning the previous value
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<NativeValue>,
    ) -> Option<NativeValue> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, key: &str) -> Option<NativeValue> {
        let idx = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(idx).1)
    }

    /// Check whether a field exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate fields in stored order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &NativeValue)> {
        self.fields.iter().map(|(k, v)| (k, v))
    }

    /// Field names in stored order
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.iter().map(|(k, _)| k)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the document has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Identifier value, if present
    pub fn id(&self) -> Option<&NativeValue> {
        self.get(NATIVE_ID_FIELD)
    }
}

// Field order is not significant for equality
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .fields
                .iter()
                .all(|(k, v)| other.get(k) == Some(v))
    }
}

impl IntoIterator for Document {
    type Item = (String, NativeValue);
    type IntoIter = std::vec::IntoIter<(String, NativeValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl FromIterator<(String, NativeValue)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, NativeValue)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}
