use crate::{is_probably_prime, RecordError, Result, RECORD_KEY_PREFIX};
use num_bigint::BigUint;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record identifier, unique within a generation batch
pub type RecordId = u64;

/// A unit of work: a decimal number to be checked for primality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: RecordId,

    /// Decimal digits of an arbitrary-precision non-negative integer
    pub value: String,
}

/// The verdict for one work record. `id` and `value` are copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: RecordId,
    pub value: String,
    pub prime: bool,
}

impl WorkRecord {
    pub fn new(id: RecordId, value: impl Into<String>) -> Self {
        WorkRecord {
            id,
            value: value.into(),
        }
    }

    /// A record holding a random value of 1 to `max_digits` digits, no leading zeros
    pub fn random<R: Rng + ?Sized>(id: RecordId, max_digits: usize, rng: &mut R) -> Self {
        let len = rng.gen_range(1..=max_digits.max(1));
        let mut value = String::with_capacity(len);

        value.push(char::from(b'1' + rng.gen_range(0..9u8)));
        for _ in 1..len {
            value.push(char::from(b'0' + rng.gen_range(0..10u8)));
        }

        WorkRecord::new(id, value)
    }

    /// Key under which this record lives in a record store
    pub fn store_key(&self) -> String {
        format!("{}{}", RECORD_KEY_PREFIX, self.id)
    }

    /// Decode and validate an inbound message payload.
    ///
    /// The payload must be a JSON object carrying an integer `id` and a
    /// non-null `value` holding a string of decimal digits.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let json: Value = serde_json::from_slice(payload)?;
        let object = json.as_object().ok_or(RecordError::NotAnObject)?;

        let id = object.get("id").ok_or(RecordError::MissingField("id"))?;
        let value = match object.get("value") {
            None | Some(Value::Null) => return Err(RecordError::MissingField("value")),
            Some(value) => value,
        };

        let id = id
            .as_u64()
            .ok_or_else(|| RecordError::InvalidId(id.to_string()))?;
        let value = value
            .as_str()
            .ok_or_else(|| RecordError::InvalidValue(value.to_string()))?;

        Ok(WorkRecord::new(id, value))
    }

    /// Serialize to the JSON wire form
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(RecordError::from)
    }

    /// Run the primality engine over this record's value
    pub fn evaluate(&self, rounds: u32) -> Result<ResultRecord> {
        let n = parse_value(&self.value)?;
        Ok(ResultRecord::for_record(self, is_probably_prime(&n, rounds)))
    }
}

impl ResultRecord {
    pub fn for_record(record: &WorkRecord, prime: bool) -> Self {
        ResultRecord {
            id: record.id,
            value: record.value.clone(),
            prime,
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(RecordError::from)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(RecordError::from)
    }
}

/// Parse an unsigned decimal string. Signs, whitespace and separators are rejected.
pub fn parse_value(value: &str) -> Result<BigUint> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RecordError::InvalidValue(value.to_string()));
    }

    BigUint::parse_bytes(value.as_bytes(), 10)
        .ok_or_else(|| RecordError::InvalidValue(value.to_string()))
}
