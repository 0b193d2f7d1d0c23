use serde_json::Value;
use swap_types::envelope::{Envelope, UnsignedEnvelope};
use swap_types::kind::EnvelopeKind;
use swap_types::signer::Signer;

use crate::ids::fresh_id;

pub(crate) fn build_and_sign<Sg: Signer>(
    signer: &Sg,
    kind: EnvelopeKind,
    trade_id: &str,
    body: Value,
) -> Result<Envelope, Sg::Error> {
    UnsignedEnvelope::new(kind, trade_id, fresh_id(), body).sign(signer)
}
