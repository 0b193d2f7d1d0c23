//! Unix timestamp type for envelope origination times and deadlines.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds (or seconds, depending on field) since the Unix epoch.
///
/// Envelope fields serialize this as a plain JSON integer, not a string
/// (`ts` and `*_unix` fields in §3/§4.3) — there's no EIP-712-style
/// precision concern here, so there's nothing to gain from the indirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    pub fn now_ms() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_millis() as u64;
        Self(ms)
    }

    pub fn now_secs() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs();
        Self(secs)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_future(&self, now: UnixTimestamp) -> bool {
        self.0 > now.0
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UnixTimestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
