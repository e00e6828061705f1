//! On-chain data model and its canonical CBOR encoding
//!
//! The validator fixes the binary schema of datums and redeemers: algebraic
//! data with zero-based constructor indexes, encoded as CBOR with the
//! constructor-tag convention of UTxO-model ledgers (tags 121..=127 for the
//! first seven alternatives, 1280..=1400 for the next, tag 102 beyond that).
//! Any shape this module does not recognize is a schema mismatch and is
//! surfaced as fatal.

use crate::error::{OracleError, OracleResult};

use ciborium::value::{Integer, Value};
use serde::{Deserialize, Serialize};

const COMPACT_TAG_BASE: u64 = 121;
const COMPACT_TAG_MAX: u64 = 127;
const EXTENDED_TAG_BASE: u64 = 1280;
const EXTENDED_TAG_MAX: u64 = 1400;
const GENERAL_CONSTR_TAG: u64 = 102;

/// Typed on-chain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlutusData {
    Constr { tag: u64, fields: Vec<PlutusData> },
    Int(i128),
    Bytes(Vec<u8>),
    List(Vec<PlutusData>),
    Map(Vec<(PlutusData, PlutusData)>),
}

impl PlutusData {
    pub fn constr(tag: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr { tag, fields }
    }

    pub fn int(value: impl Into<i128>) -> Self {
        PlutusData::Int(value.into())
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        PlutusData::Bytes(value.into())
    }

    /// Canonical CBOR bytes of this value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&self.to_cbor(), &mut bytes)
            .expect("plutus data serialization is infallible");
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> OracleResult<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| OracleError::SchemaMismatch(format!("not valid CBOR: {}", e)))?;
        Self::from_cbor(&value)
    }

    fn to_cbor(&self) -> Value {
        match self {
            PlutusData::Constr { tag, fields } => {
                let fields = Value::Array(fields.iter().map(PlutusData::to_cbor).collect());
                match *tag {
                    t if t <= COMPACT_TAG_MAX - COMPACT_TAG_BASE => {
                        Value::Tag(COMPACT_TAG_BASE + t, Box::new(fields))
                    }
                    t if t <= 7 + EXTENDED_TAG_MAX - EXTENDED_TAG_BASE => {
                        Value::Tag(EXTENDED_TAG_BASE + t - 7, Box::new(fields))
                    }
                    t => Value::Tag(
                        GENERAL_CONSTR_TAG,
                        Box::new(Value::Array(vec![
                            Value::Integer(Integer::from(t)),
                            fields,
                        ])),
                    ),
                }
            }
            PlutusData::Int(value) => Value::Integer(
                Integer::try_from(*value).expect("plutus integers fit CBOR range"),
            ),
            PlutusData::Bytes(bytes) => Value::Bytes(bytes.clone()),
            PlutusData::List(items) => {
                Value::Array(items.iter().map(PlutusData::to_cbor).collect())
            }
            PlutusData::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_cbor(), v.to_cbor()))
                    .collect(),
            ),
        }
    }

    fn from_cbor(value: &Value) -> OracleResult<Self> {
        match value {
            Value::Tag(tag, inner) => match (*tag, inner.as_ref()) {
                (t, Value::Array(fields)) if (COMPACT_TAG_BASE..=COMPACT_TAG_MAX).contains(&t) => {
                    Ok(PlutusData::Constr {
                        tag: t - COMPACT_TAG_BASE,
                        fields: fields.iter().map(Self::from_cbor).collect::<OracleResult<_>>()?,
                    })
                }
                (t, Value::Array(fields))
                    if (EXTENDED_TAG_BASE..=EXTENDED_TAG_MAX).contains(&t) =>
                {
                    Ok(PlutusData::Constr {
                        tag: t - EXTENDED_TAG_BASE + 7,
                        fields: fields.iter().map(Self::from_cbor).collect::<OracleResult<_>>()?,
                    })
                }
                (GENERAL_CONSTR_TAG, Value::Array(parts)) if parts.len() == 2 => {
                    let tag = match &parts[0] {
                        Value::Integer(i) => u64::try_from(i128::from(*i)).map_err(|_| {
                            OracleError::SchemaMismatch("negative constructor index".into())
                        })?,
                        other => {
                            return Err(OracleError::SchemaMismatch(format!(
                                "constructor index is not an integer: {:?}",
                                other
                            )))
                        }
                    };
                    let fields = match &parts[1] {
                        Value::Array(fields) => fields
                            .iter()
                            .map(Self::from_cbor)
                            .collect::<OracleResult<_>>()?,
                        other => {
                            return Err(OracleError::SchemaMismatch(format!(
                                "constructor fields are not a list: {:?}",
                                other
                            )))
                        }
                    };
                    Ok(PlutusData::Constr { tag, fields })
                }
                (t, _) => Err(OracleError::SchemaMismatch(format!(
                    "unrecognized CBOR tag {}",
                    t
                ))),
            },
            Value::Integer(i) => Ok(PlutusData::Int(i128::from(*i))),
            Value::Bytes(bytes) => Ok(PlutusData::Bytes(bytes.clone())),
            Value::Array(items) => Ok(PlutusData::List(
                items.iter().map(Self::from_cbor).collect::<OracleResult<_>>()?,
            )),
            Value::Map(entries) => Ok(PlutusData::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((Self::from_cbor(k)?, Self::from_cbor(v)?)))
                    .collect::<OracleResult<_>>()?,
            )),
            other => Err(OracleError::SchemaMismatch(format!(
                "unsupported CBOR value: {:?}",
                other
            ))),
        }
    }

    /// Expect a constructor with the given index, returning its fields.
    pub fn expect_constr(&self, expected: u64, what: &str) -> OracleResult<&[PlutusData]> {
        match self {
            PlutusData::Constr { tag, fields } if *tag == expected => Ok(fields),
            PlutusData::Constr { tag, .. } => Err(OracleError::SchemaMismatch(format!(
                "{}: expected constructor {}, found {}",
                what, expected, tag
            ))),
            other => Err(OracleError::SchemaMismatch(format!(
                "{}: expected constructor {}, found {:?}",
                what, expected, other
            ))),
        }
    }

    /// Expect a constructor with exactly `arity` fields.
    pub fn expect_fields(&self, expected: u64, arity: usize, what: &str) -> OracleResult<&[PlutusData]> {
        let fields = self.expect_constr(expected, what)?;
        if fields.len() != arity {
            return Err(OracleError::SchemaMismatch(format!(
                "{}: expected {} fields, found {}",
                what,
                arity,
                fields.len()
            )));
        }
        Ok(fields)
    }

    pub fn expect_u64(&self, what: &str) -> OracleResult<u64> {
        match self {
            PlutusData::Int(i) => u64::try_from(*i).map_err(|_| {
                OracleError::SchemaMismatch(format!("{}: integer {} out of range", what, i))
            }),
            other => Err(OracleError::SchemaMismatch(format!(
                "{}: expected integer, found {:?}",
                what, other
            ))),
        }
    }

    pub fn expect_u32(&self, what: &str) -> OracleResult<u32> {
        u32::try_from(self.expect_u64(what)?).map_err(|_| {
            OracleError::SchemaMismatch(format!("{}: integer out of u32 range", what))
        })
    }

    pub fn expect_bytes(&self, what: &str) -> OracleResult<&[u8]> {
        match self {
            PlutusData::Bytes(bytes) => Ok(bytes),
            other => Err(OracleError::SchemaMismatch(format!(
                "{}: expected bytes, found {:?}",
                what, other
            ))),
        }
    }

    pub fn expect_list(&self, what: &str) -> OracleResult<&[PlutusData]> {
        match self {
            PlutusData::List(items) => Ok(items),
            other => Err(OracleError::SchemaMismatch(format!(
                "{}: expected list, found {:?}",
                what, other
            ))),
        }
    }
}
