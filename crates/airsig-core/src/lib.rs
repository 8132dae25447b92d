//! # airsig-core
//!
//! Wallet model for an air-gapped Bitcoin multisig setup.
//!
//! An airsig wallet is an M-of-N native segwit multisig over a set of
//! signers, each identified by the BIP-32 fingerprint of an offline signing
//! device. The crate covers the pure, I/O-free part of the engine:
//!
//! - [`Signer`] / [`SignerRegistry`]: known co-signer keys
//! - [`build_descriptors`]: deterministic receive/change descriptors
//! - [`Wallet`]: the persisted wallet record, always derived, never
//!   hand-edited
//!
//! Persistence lives in `airsig-store`, QR framing in `airsig-qr`, and the
//! signing session in `airsig-sign`.

pub mod descriptor;
pub mod signer;
pub mod wallet;

pub use descriptor::{build_descriptors, Chain, DescriptorError};
pub use signer::{Signer, SignerError, SignerRegistry};
pub use wallet::{Wallet, WALLET_RECORD_VERSION};
