//! Multisig descriptor construction
//!
//! Builds the two output descriptors (receive and change) that fully
//! describe an M-of-N wallet.
//!
//! # Dialect
//!
//! Native segwit v0 sorted multisig, BIP-383:
//!
//! ```text
//! wsh(sortedmulti(M, [fp1/path]xpub1/0/*, [fp2/path]xpub2/0/*, ...))
//! ```
//!
//! `sortedmulti` orders the derived public keys per address (BIP-67), so
//! independent co-signers converge on identical scripts without agreeing on
//! key order. On top of that the builder sorts the key *expressions*
//! lexicographically, making the descriptor string itself byte-identical
//! for any input ordering of the same signer set, so two parties can compare
//! descriptors to confirm they are looking at the same wallet.

use std::collections::HashSet;

use bitcoin::bip32::Fingerprint;
use miniscript::descriptor::{DescriptorPublicKey, Wsh};
use miniscript::Descriptor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signer::Signer;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Invalid threshold: {0} of {1} signers")]
    InvalidThreshold(usize, usize),

    #[error("Duplicate signer fingerprint: {0}")]
    DuplicateSigner(Fingerprint),

    #[error("Miniscript error: {0}")]
    Miniscript(#[from] miniscript::Error),

    #[error("Descriptor parse error: {0}")]
    Parse(String),

    #[error("Derivation error: {0}")]
    Derivation(String),
}

/// Which chain of the wallet a descriptor or address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Receive addresses, derivation suffix `/0/*`
    Main,
    /// Change addresses, derivation suffix `/1/*`
    Change,
}

impl Chain {
    pub fn index(self) -> u32 {
        match self {
            Chain::Main => 0,
            Chain::Change => 1,
        }
    }
}

/// Build the receive and change descriptors for an M-of-N wallet.
///
/// Pure computation: the only failures are structural (threshold out of
/// range, duplicate fingerprints, a key set miniscript rejects).
///
/// Determinism: for a fixed signer set and threshold the returned
/// descriptors are byte-identical regardless of the order of `signers`.
pub fn build_descriptors(
    signers: &[Signer],
    threshold: usize,
) -> Result<
    (
        Descriptor<DescriptorPublicKey>,
        Descriptor<DescriptorPublicKey>,
    ),
    DescriptorError,
> {
    if threshold == 0 || threshold > signers.len() {
        return Err(DescriptorError::InvalidThreshold(threshold, signers.len()));
    }

    let mut seen = HashSet::new();
    for signer in signers {
        if !seen.insert(signer.fingerprint) {
            return Err(DescriptorError::DuplicateSigner(signer.fingerprint));
        }
    }

    let main = build_one(signers, threshold, Chain::Main)?;
    let change = build_one(signers, threshold, Chain::Change)?;
    Ok((main, change))
}

fn build_one(
    signers: &[Signer],
    threshold: usize,
    chain: Chain,
) -> Result<Descriptor<DescriptorPublicKey>, DescriptorError> {
    let mut keys: Vec<DescriptorPublicKey> =
        signers.iter().map(|s| s.to_descriptor_key(chain)).collect();
    // Canonical ordering of the key expressions, independent of input order
    keys.sort_by_key(|k| k.to_string());

    let thresh = miniscript::Threshold::new(threshold, keys)
        .map_err(|e| DescriptorError::Miniscript(miniscript::Error::Threshold(e)))?;
    let wsh = Wsh::new_sortedmulti(thresh)?;
    Ok(Descriptor::Wsh(wsh))
}
