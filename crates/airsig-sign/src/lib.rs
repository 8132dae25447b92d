//! # airsig-sign
//!
//! PSBT signing coordination for airsig multisig wallets.
//!
//! A [`SigningSession`] binds an unsigned PSBT template to one wallet and
//! collects partial signatures arriving from offline devices (over the QR
//! transport) until the wallet's threshold is met, then assembles and
//! consensus-validates the final transaction. No private key ever touches
//! this crate; it only verifies and combines what the signers produced.
//!
//! [`summary`] renders a PSBT for human review before anything is signed.

pub mod session;
pub mod summary;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::psbt::Psbt;

pub use session::{SessionError, SessionState, SigningSession};
pub use summary::{summarize, PsbtSummary};

/// Encode a PSBT in the standard base64 interchange form (BIP-174).
pub fn psbt_to_base64(psbt: &Psbt) -> String {
    STANDARD.encode(psbt.serialize())
}

/// Decode a PSBT from its base64 interchange form.
pub fn psbt_from_base64(s: &str) -> Result<Psbt, SessionError> {
    let bytes = STANDARD
        .decode(s.trim())
        .map_err(|e| SessionError::PsbtDecode(e.to_string()))?;
    Psbt::deserialize(&bytes).map_err(|e| SessionError::PsbtDecode(e.to_string()))
}

#[cfg(test)]
pub(crate) mod testutil;
