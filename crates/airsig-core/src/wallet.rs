//! Wallet record
//!
//! The persisted definition of one multisig wallet. Descriptors are
//! derived, cached data: they are always recomputable from the signer set
//! and threshold, and [`Wallet::verify_descriptors`] checks exactly that.

use std::collections::HashSet;
use std::str::FromStr;

use bitcoin::bip32::Fingerprint;
use bitcoin::{Address, Network};
use miniscript::descriptor::DescriptorPublicKey;
use miniscript::Descriptor;
use serde::{Deserialize, Serialize};

use crate::descriptor::{build_descriptors, Chain, DescriptorError};
use crate::signer::Signer;

/// Version tag of the wallet record wire format.
pub const WALLET_RECORD_VERSION: u32 = 1;

/// A multisig wallet definition.
///
/// Created once via [`Wallet::derive`], read many times, deleted as a
/// whole. No field is mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Record format version
    pub version: u32,
    /// Unique, human-chosen name
    pub name: String,
    /// Network the wallet's addresses live on
    pub network: Network,
    /// Ordered signer set; order is display order, not descriptor order
    pub signers: Vec<Signer>,
    /// Signatures required to spend (M of N)
    pub required_sig: usize,
    /// Receive descriptor, `wsh(sortedmulti(M, .../0/*))`
    pub descriptor_main: String,
    /// Change descriptor, `wsh(sortedmulti(M, .../1/*))`
    pub descriptor_change: String,
    /// Chain height at creation time, lower bound for rescans
    pub created_at_height: u32,
}

impl Wallet {
    /// Derive a wallet from its inputs. The only constructor: descriptors
    /// are never authored independently of the signer set and threshold.
    pub fn derive(
        name: impl Into<String>,
        network: Network,
        signers: Vec<Signer>,
        required_sig: usize,
        created_at_height: u32,
    ) -> Result<Self, DescriptorError> {
        let (main, change) = build_descriptors(&signers, required_sig)?;
        Ok(Self {
            version: WALLET_RECORD_VERSION,
            name: name.into(),
            network,
            signers,
            required_sig,
            descriptor_main: main.to_string(),
            descriptor_change: change.to_string(),
            created_at_height,
        })
    }

    /// Recompute both descriptors from the stored signers and threshold and
    /// compare byte-for-byte. Catches tampering and partial writes.
    pub fn verify_descriptors(&self) -> Result<(), DescriptorError> {
        let (main, change) = build_descriptors(&self.signers, self.required_sig)?;
        if main.to_string() != self.descriptor_main || change.to_string() != self.descriptor_change
        {
            return Err(DescriptorError::Parse(
                "stored descriptors do not match recomputation".into(),
            ));
        }
        Ok(())
    }

    /// Fingerprints of all signers, e.g. for "is this output mine" checks.
    pub fn fingerprints(&self) -> HashSet<Fingerprint> {
        self.signers.iter().map(|s| s.fingerprint).collect()
    }

    pub fn signer(&self, fingerprint: Fingerprint) -> Option<&Signer> {
        self.signers.iter().find(|s| s.fingerprint == fingerprint)
    }

    /// Parsed descriptor for one chain.
    pub fn descriptor(
        &self,
        chain: Chain,
    ) -> Result<Descriptor<DescriptorPublicKey>, DescriptorError> {
        let s = match chain {
            Chain::Main => &self.descriptor_main,
            Chain::Change => &self.descriptor_change,
        };
        Descriptor::from_str(s).map_err(|e| DescriptorError::Parse(e.to_string()))
    }

    /// Concrete address at `index` on the given chain.
    pub fn address(&self, chain: Chain, index: u32) -> Result<Address, DescriptorError> {
        let descriptor = self.descriptor(chain)?;
        let definite = descriptor
            .at_derivation_index(index)
            .map_err(|e| DescriptorError::Derivation(e.to_string()))?;
        definite
            .address(self.network)
            .map_err(|e| DescriptorError::Derivation(e.to_string()))
    }
}
