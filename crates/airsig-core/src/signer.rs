//! Signer registry
//!
//! A signer is one offline signing device, known to the wallet by the
//! BIP-32 fingerprint of its master key, its account-level xpub, and the
//! derivation path from the master to that xpub.

use bitcoin::bip32::{ChildNumber, DerivationPath, Fingerprint, Xpub};
use miniscript::descriptor::DescriptorPublicKey;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::descriptor::Chain;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Invalid xpub: {0}")]
    InvalidXpub(String),

    #[error("Missing key origin (fingerprint/path) for xpub")]
    MissingOrigin,

    #[error("Duplicate signer fingerprint: {0}")]
    DuplicateFingerprint(Fingerprint),

    #[error("Parse error: {0}")]
    Parse(#[from] bitcoin::bip32::Error),
}

/// One co-signer of a multisig wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    /// Human-readable label for this device
    pub label: String,
    /// Master fingerprint of the signing device (hex string)
    #[serde(with = "fingerprint_serde")]
    pub fingerprint: Fingerprint,
    /// Account-level extended public key (base58 string)
    #[serde(with = "xpub_serde")]
    pub xpub: Xpub,
    /// Derivation path from the device master key to `xpub`
    #[serde(with = "derivation_path_serde")]
    pub derivation_path: DerivationPath,
}

/// Macro for creating serde modules that use FromStr/ToString
macro_rules! string_serde {
    ($mod_name:ident, $type:ty) => {
        mod $mod_name {
            use super::*;
            use serde::{Deserializer, Serializer};

            pub fn serialize<S>(value: &$type, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&value.to_string())
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<$type, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <$type>::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(fingerprint_serde, Fingerprint);
string_serde!(xpub_serde, Xpub);
string_serde!(derivation_path_serde, DerivationPath);

impl Signer {
    pub fn new(
        label: impl Into<String>,
        fingerprint: Fingerprint,
        xpub: Xpub,
        derivation_path: DerivationPath,
    ) -> Self {
        Self {
            label: label.into(),
            fingerprint,
            xpub,
            derivation_path,
        }
    }

    /// Parse from a descriptor key string like `[fingerprint/path]xpub`,
    /// the format air-gapped devices export over QR.
    pub fn from_descriptor_str(label: impl Into<String>, s: &str) -> Result<Self, SignerError> {
        let desc_key =
            DescriptorPublicKey::from_str(s).map_err(|e| SignerError::InvalidXpub(e.to_string()))?;

        let (origin, xpub) = match desc_key {
            DescriptorPublicKey::XPub(xkey) => (xkey.origin, xkey.xkey),
            DescriptorPublicKey::MultiXPub(xkey) => (xkey.origin, xkey.xkey),
            _ => {
                return Err(SignerError::InvalidXpub(
                    "expected an xpub, got a single key".into(),
                ))
            }
        };

        let (fingerprint, derivation_path) = origin.ok_or(SignerError::MissingOrigin)?;

        Ok(Self {
            label: label.into(),
            fingerprint,
            xpub,
            derivation_path,
        })
    }

    /// Descriptor key expression for one chain of the wallet:
    /// `[fingerprint/path]xpub/<0|1>/*`.
    pub fn to_descriptor_key(&self, chain: Chain) -> DescriptorPublicKey {
        // An empty origin path ([fp]xpub) must not render a trailing slash
        let origin: &[ChildNumber] = self.derivation_path.as_ref();
        let key_str = if origin.is_empty() {
            format!("[{}]{}/{}/*", self.fingerprint, self.xpub, chain.index())
        } else {
            format!(
                "[{}/{}]{}/{}/*",
                self.fingerprint,
                self.derivation_path.to_string().trim_start_matches("m/"),
                self.xpub,
                chain.index(),
            )
        };
        DescriptorPublicKey::from_str(&key_str).expect("constructed from valid components")
    }
}

/// Ordered collection of signers, unique by fingerprint.
///
/// Input order is preserved (it is what the UI shows); the descriptor
/// builder applies its own canonical ordering on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignerRegistry {
    signers: Vec<Signer>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signer. Fails if a signer with the same fingerprint is
    /// already registered.
    pub fn insert(&mut self, signer: Signer) -> Result<(), SignerError> {
        if self.contains(signer.fingerprint) {
            return Err(SignerError::DuplicateFingerprint(signer.fingerprint));
        }
        self.signers.push(signer);
        Ok(())
    }

    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        self.signers.iter().any(|s| s.fingerprint == fingerprint)
    }

    pub fn get(&self, fingerprint: Fingerprint) -> Option<&Signer> {
        self.signers.iter().find(|s| s.fingerprint == fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signer> {
        self.signers.iter()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn into_vec(self) -> Vec<Signer> {
        self.signers
    }
}

impl FromIterator<Signer> for Result<SignerRegistry, SignerError> {
    fn from_iter<I: IntoIterator<Item = Signer>>(iter: I) -> Self {
        let mut registry = SignerRegistry::new();
        for signer in iter {
            registry.insert(signer)?;
        }
        Ok(registry)
    }
}
