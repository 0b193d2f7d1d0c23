//! Opaque id/nonce generation. Neither `trade_id` nor `nonce` need to be
//! anything but non-empty and (recommended, not enforced) unique (§3) —
//! plain random hex is sufficient.

pub(crate) fn fresh_id() -> String {
    format!("{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>())
}
