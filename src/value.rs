//! Tagged-union representation of decoded ABI values.
//!
//! The routing contract's calldata and event payloads are dynamically
//! decoded (the ABI is loaded at runtime, per chain). Rather than generating
//! a bespoke Rust struct per function signature, decoded values are kept as
//! a small recursive tree that persists to `jsonb` with an explicit type tag,
//! so stored rows survive a round trip through serde without ambiguity.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;

/// A decoded ABI value, tagged so JSON round-trips unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    #[serde(rename = "int")]
    Int(#[serde(with = "u256_as_decimal_string")] U256),
    #[serde(rename = "bool")]
    Bool(bool),
    #[serde(rename = "bytes")]
    Bytes(HexBytes),
    #[serde(rename = "address")]
    Address(Address),
    #[serde(rename = "string")]
    String(String),
    #[serde(rename = "list")]
    List(Vec<Value>),
    #[serde(rename = "map")]
    Map(BTreeMap<String, Value>),
}

/// A byte string rendered as a `0x`-prefixed lowercase hex string in JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

impl HexBytes {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl serde::Serialize for HexBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for HexBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let stripped = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(stripped).map_err(serde::de::Error::custom)?;
        Ok(HexBytes(bytes))
    }
}

mod u256_as_decimal_string {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The EVM-address-in-a-32-byte-slot collapse rule: any `bytes`/word value
/// prefixed by 12 zero bytes is recognized as an address and collapsed to
/// its 20-byte form.
pub fn collapse_address_like(bytes: &[u8]) -> Option<Address> {
    if bytes.len() == 32 && bytes[..12].iter().all(|b| *b == 0) {
        Some(Address::from_slice(&bytes[12..]))
    } else {
        None
    }
}

/// Converts an `alloy_dyn_abi::DynSolValue` into our tagged-union [`Value`],
/// applying the address-in-32-byte-slot collapse rule to any bytes/fixed-bytes
/// leaf.
pub fn from_dyn_sol_value(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::Int(i.into_raw()),
        DynSolValue::Uint(u, _) => Value::Int(*u),
        DynSolValue::FixedBytes(word, size) => {
            let bytes = &word.as_slice()[..*size];
            if let Some(addr) = collapse_address_like(bytes) {
                Value::Address(addr)
            } else {
                Value::Bytes(HexBytes(bytes.to_vec()))
            }
        }
        DynSolValue::Address(addr) => Value::Address(*addr),
        DynSolValue::Function(f) => Value::Bytes(HexBytes(f.as_slice().to_vec())),
        DynSolValue::Bytes(bytes) => {
            if let Some(addr) = collapse_address_like(bytes) {
                Value::Address(addr)
            } else {
                Value::Bytes(HexBytes(bytes.clone()))
            }
        }
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            Value::List(items.iter().map(from_dyn_sol_value).collect())
        }
        DynSolValue::Tuple(items) => {
            let mut map = BTreeMap::new();
            for (idx, item) in items.iter().enumerate() {
                map.insert(idx.to_string(), from_dyn_sol_value(item));
            }
            Value::Map(map)
        }
        DynSolValue::CustomStruct { prop_names, tuple, .. } => {
            let mut map = BTreeMap::new();
            for (name, item) in prop_names.iter().zip(tuple.iter()) {
                map.insert(name.clone(), from_dyn_sol_value(item));
            }
            Value::Map(map)
        }
    }
}

impl Value {
    /// Interprets this value as a `U256`, if it is an `Int`.
    pub fn as_u256(&self) -> Option<U256> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Interprets this value as an address, collapsing a bytes-like value if needed.
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(a) => Some(*a),
            Value::Bytes(b) => collapse_address_like(&b.0),
            _ => None,
        }
    }

    /// Interprets this value as raw bytes, hex-normalised.
    pub fn as_hex_bytes(&self) -> Option<String> {
        match self {
            Value::Bytes(b) => Some(b.to_hex()),
            Value::Address(a) => Some(a.to_string().to_lowercase()),
            _ => None,
        }
    }

    /// Interprets a positional tuple field at index `i` (our calldata rows are
    /// stored as a `Map` keyed by stringified tuple index).
    pub fn field(&self, i: usize) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(&i.to_string()),
            _ => None,
        }
    }

    /// Interprets this value as a list, if it is one.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_address_in_32_byte_slot() {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&[0xabu8; 20]);
        let addr = collapse_address_like(&word).expect("should collapse");
        assert_eq!(addr.as_slice(), &[0xabu8; 20]);
    }

    #[test]
    fn non_zero_prefix_does_not_collapse() {
        let mut word = [0u8; 32];
        word[0] = 1;
        assert!(collapse_address_like(&word).is_none());
    }

    #[test]
    fn value_round_trips_through_json() {
        let value = Value::Map(BTreeMap::from([
            ("0".to_string(), Value::Int(U256::from(42u64))),
            (
                "1".to_string(),
                Value::Bytes(HexBytes(vec![0xde, 0xad, 0xbe, 0xef])),
            ),
        ]));
        let json = serde_json::to_string(&value).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, parsed);
    }

    #[test]
    fn field_accessor_reads_positional_tuple_index() {
        let value = Value::Map(BTreeMap::from([(
            "6".to_string(),
            Value::Address(Address::ZERO),
        )]));
        assert_eq!(value.field(6).and_then(Value::as_address), Some(Address::ZERO));
        assert!(value.field(2).is_none());
    }
}
