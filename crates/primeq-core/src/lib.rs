mod error;
mod primality;
mod record;

pub use error::{RecordError, Result};
pub use primality::{is_probably_prime, is_probably_prime_with, mod_pow, DEFAULT_ROUNDS};
pub use record::{parse_value, RecordId, ResultRecord, WorkRecord};

/// Key prefix under which work records are namespaced in a record store.
pub const RECORD_KEY_PREFIX: &str = "record:";
