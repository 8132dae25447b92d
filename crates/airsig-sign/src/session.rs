//! Signing session state machine
//!
//! One session per spend attempt:
//!
//! ```text
//! Created -> Collecting -> Satisfied -> Finalized
//!    \           \
//!     `-----------`-> Abandoned
//! ```
//!
//! Signatures only accumulate; nothing is removed from a session. A
//! session is single-owner; callers invoking `add_signature` from a scan
//! handler hold the session behind their own lock.

use std::collections::BTreeMap;

use bitcoin::bip32::{ChildNumber, Fingerprint};
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::{self, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ecdsa, Transaction, Witness};
use log::{debug, info};
use thiserror::Error;

use airsig_core::signer::Signer;
use airsig_core::wallet::Wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Collecting,
    Satisfied,
    Finalized,
    Abandoned,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown signer: {0}")]
    UnknownSigner(Fingerprint),

    #[error("Signature from a key not in this wallet: {0}")]
    UnknownKey(bitcoin::PublicKey),

    #[error("Signer {0} already contributed")]
    AlreadySigned(Fingerprint),

    #[error("Conflicting signature from {0}")]
    ConflictingSignature(Fingerprint),

    #[error("Invalid signature from {fingerprint} on input {input}")]
    InvalidSignature {
        fingerprint: Fingerprint,
        input: usize,
    },

    #[error("Expected {expected} signature(s), one per input, got {got}")]
    SignatureCount { expected: usize, got: usize },

    #[error("Threshold not met: {have} of {need} signatures")]
    NotSatisfied { have: usize, need: usize },

    #[error("Finalization failed: {0}")]
    FinalizationError(String),

    #[error("Session is closed ({0:?})")]
    SessionClosed(SessionState),

    #[error("Invalid PSBT template: {0}")]
    InvalidTemplate(String),

    #[error("PSBT does not belong to this session's transaction")]
    TemplateMismatch,

    #[error("PSBT contains no signatures")]
    NoSignatures,

    #[error("PSBT decode error: {0}")]
    PsbtDecode(String),
}

/// Collects partial signatures for one unsigned PSBT until the wallet's
/// threshold is met, then assembles the final transaction.
pub struct SigningSession {
    wallet: Wallet,
    psbt: Psbt,
    /// Raw DER signatures per contributing fingerprint, as submitted.
    /// Kept for idempotence and conflict checks.
    contributed: BTreeMap<Fingerprint, Vec<Vec<u8>>>,
    state: SessionState,
}

impl SigningSession {
    /// Bind an unsigned PSBT template to a wallet.
    ///
    /// Every input must carry `witness_utxo`, `witness_script`, and BIP-32
    /// derivation entries; a template already holding signatures is
    /// rejected (signatures enter only through this session).
    pub fn new(wallet: Wallet, psbt: Psbt) -> Result<Self, SessionError> {
        if psbt.inputs.is_empty() {
            return Err(SessionError::InvalidTemplate("no inputs".into()));
        }
        for (i, input) in psbt.inputs.iter().enumerate() {
            if input.witness_utxo.is_none() {
                return Err(SessionError::InvalidTemplate(format!(
                    "input {} has no witness_utxo",
                    i
                )));
            }
            if input.witness_script.is_none() {
                return Err(SessionError::InvalidTemplate(format!(
                    "input {} has no witness_script",
                    i
                )));
            }
            if input.bip32_derivation.is_empty() {
                return Err(SessionError::InvalidTemplate(format!(
                    "input {} has no bip32 derivation entries",
                    i
                )));
            }
            if !input.partial_sigs.is_empty() {
                return Err(SessionError::InvalidTemplate(format!(
                    "input {} already carries signatures",
                    i
                )));
            }
        }
        Ok(Self {
            wallet,
            psbt,
            contributed: BTreeMap::new(),
            state: SessionState::Created,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// The PSBT with all signatures collected so far, for export to
    /// further signers.
    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    /// Number of distinct signers that have contributed.
    pub fn signatures(&self) -> usize {
        self.contributed.len()
    }

    /// Record one signer's contribution: one DER-encoded ECDSA signature
    /// per input, SIGHASH_ALL.
    ///
    /// Resubmitting a byte-identical contribution is a no-op; a differing
    /// one is rejected. Contributions past the threshold are accepted,
    /// `finalize` picks a deterministic subset.
    pub fn add_signature(
        &mut self,
        fingerprint: Fingerprint,
        sigs: &[Vec<u8>],
    ) -> Result<SessionState, SessionError> {
        match self.state {
            SessionState::Created | SessionState::Collecting | SessionState::Satisfied => {}
            closed => return Err(SessionError::SessionClosed(closed)),
        }
        let signer = self
            .wallet
            .signer(fingerprint)
            .cloned()
            .ok_or(SessionError::UnknownSigner(fingerprint))?;

        if let Some(previous) = self.contributed.get(&fingerprint) {
            if previous.as_slice() == sigs {
                debug!("signer {} resubmitted identical signatures", fingerprint);
                return Ok(self.state);
            }
            return Err(SessionError::ConflictingSignature(fingerprint));
        }

        if sigs.len() != self.psbt.inputs.len() {
            return Err(SessionError::SignatureCount {
                expected: self.psbt.inputs.len(),
                got: sigs.len(),
            });
        }

        // Validate everything before mutating any state
        let secp = Secp256k1::verification_only();
        let mut cache = SighashCache::new(&self.psbt.unsigned_tx);
        let mut validated = Vec::with_capacity(sigs.len());
        for (i, der) in sigs.iter().enumerate() {
            let signature = secp256k1::ecdsa::Signature::from_der(der).map_err(|_| {
                SessionError::InvalidSignature {
                    fingerprint,
                    input: i,
                }
            })?;
            let pubkey = self.derived_pubkey(&signer, i)?;
            let msg = self.input_sighash(&mut cache, i)?;
            secp.verify_ecdsa(&msg, &signature, &pubkey).map_err(|_| {
                SessionError::InvalidSignature {
                    fingerprint,
                    input: i,
                }
            })?;
            validated.push((pubkey, signature));
        }

        for (i, (pubkey, signature)) in validated.into_iter().enumerate() {
            self.psbt.inputs[i].partial_sigs.insert(
                bitcoin::PublicKey::new(pubkey),
                ecdsa::Signature {
                    signature,
                    sighash_type: EcdsaSighashType::All,
                },
            );
        }
        self.contributed.insert(fingerprint, sigs.to_vec());

        self.state = if self.contributed.len() >= self.wallet.required_sig {
            SessionState::Satisfied
        } else {
            SessionState::Collecting
        };
        info!(
            "signer {} contributed; {}/{} signatures",
            fingerprint,
            self.contributed.len(),
            self.wallet.required_sig
        );
        Ok(self.state)
    }

    /// Merge the partial signatures out of a PSBT returned by an offline
    /// signer. Every extracted contribution goes through the same
    /// validation as [`Self::add_signature`].
    ///
    /// Fails with `AlreadySigned` when the PSBT adds nothing new, i.e.
    /// the device's signatures are all already recorded.
    pub fn absorb_psbt(&mut self, other: &Psbt) -> Result<SessionState, SessionError> {
        if other.unsigned_tx.compute_txid() != self.psbt.unsigned_tx.compute_txid() {
            return Err(SessionError::TemplateMismatch);
        }

        // Group the foreign PSBT's signatures by signer fingerprint
        let inputs = self.psbt.inputs.len();
        let mut by_signer: BTreeMap<Fingerprint, Vec<Option<Vec<u8>>>> = BTreeMap::new();
        for (i, input) in other.inputs.iter().enumerate().take(inputs) {
            for (pubkey, sig) in &input.partial_sigs {
                let (fingerprint, _) = self.psbt.inputs[i]
                    .bip32_derivation
                    .get(&pubkey.inner)
                    .ok_or(SessionError::UnknownKey(*pubkey))?;
                if !self.wallet.fingerprints().contains(fingerprint) {
                    return Err(SessionError::UnknownSigner(*fingerprint));
                }
                if sig.sighash_type != EcdsaSighashType::All {
                    return Err(SessionError::InvalidSignature {
                        fingerprint: *fingerprint,
                        input: i,
                    });
                }
                by_signer.entry(*fingerprint).or_insert_with(|| vec![None; inputs])[i] =
                    Some(sig.signature.serialize_der().to_vec());
            }
        }
        if by_signer.is_empty() {
            return Err(SessionError::NoSignatures);
        }

        let mut absorbed_new = false;
        for (fingerprint, sigs) in &by_signer {
            let mut complete = Vec::with_capacity(inputs);
            for (i, sig) in sigs.iter().enumerate() {
                match sig {
                    Some(der) => complete.push(der.clone()),
                    // A signer must cover every input or none
                    None => {
                        return Err(SessionError::InvalidSignature {
                            fingerprint: *fingerprint,
                            input: i,
                        })
                    }
                }
            }
            if self.contributed.get(fingerprint) == Some(&complete) {
                continue;
            }
            self.add_signature(*fingerprint, &complete)?;
            absorbed_new = true;
        }
        if !absorbed_new {
            // take the first signer for the error; all were duplicates
            let fingerprint = *by_signer.keys().next().expect("non-empty");
            return Err(SessionError::AlreadySigned(fingerprint));
        }
        Ok(self.state)
    }

    /// Assemble and consensus-validate the final transaction.
    ///
    /// When more than `required_sig` signers contributed, the subset is
    /// chosen deterministically (lowest fingerprints first) so two
    /// parties finalizing the same session bytes produce the same
    /// transaction.
    pub fn finalize(&mut self) -> Result<Transaction, SessionError> {
        match self.state {
            SessionState::Satisfied => {}
            SessionState::Created | SessionState::Collecting => {
                return Err(SessionError::NotSatisfied {
                    have: self.contributed.len(),
                    need: self.wallet.required_sig,
                })
            }
            closed => return Err(SessionError::SessionClosed(closed)),
        }

        // BTreeMap iterates fingerprints in ascending order
        let selected: Vec<Fingerprint> = self
            .contributed
            .keys()
            .take(self.wallet.required_sig)
            .copied()
            .collect();

        let mut tx = self.psbt.unsigned_tx.clone();
        for i in 0..self.psbt.inputs.len() {
            let witness_script = self.psbt.inputs[i]
                .witness_script
                .clone()
                .ok_or_else(|| SessionError::InvalidTemplate(format!("input {} lost its witness script", i)))?;

            // CHECKMULTISIG requires signatures in witness-script key order
            let script_keys: Vec<secp256k1::PublicKey> = witness_script
                .instructions()
                .filter_map(|ins| match ins {
                    Ok(Instruction::PushBytes(push)) => {
                        secp256k1::PublicKey::from_slice(push.as_bytes()).ok()
                    }
                    _ => None,
                })
                .collect();

            let mut ordered: Vec<(usize, Vec<u8>)> = Vec::with_capacity(selected.len());
            for fingerprint in &selected {
                let signer = self
                    .wallet
                    .signer(*fingerprint)
                    .cloned()
                    .ok_or(SessionError::UnknownSigner(*fingerprint))?;
                let pubkey = self.derived_pubkey(&signer, i)?;
                let sig = self.psbt.inputs[i]
                    .partial_sigs
                    .get(&bitcoin::PublicKey::new(pubkey))
                    .ok_or_else(|| {
                        SessionError::FinalizationError(format!(
                            "missing signature for {} on input {}",
                            fingerprint, i
                        ))
                    })?;
                let position = script_keys.iter().position(|k| *k == pubkey).ok_or_else(|| {
                    SessionError::FinalizationError(format!(
                        "key of {} not present in witness script of input {}",
                        fingerprint, i
                    ))
                })?;
                ordered.push((position, sig.to_vec()));
            }
            ordered.sort_by_key(|(position, _)| *position);

            // Leading empty element for the CHECKMULTISIG off-by-one
            let mut items: Vec<Vec<u8>> = Vec::with_capacity(selected.len() + 2);
            items.push(Vec::new());
            items.extend(ordered.into_iter().map(|(_, sig)| sig));
            items.push(witness_script.to_bytes());
            tx.input[i].witness = Witness::from(items);
        }

        self.verify_consensus(&tx)?;
        self.state = SessionState::Finalized;
        info!(
            "finalized {} with {} of {} signers",
            tx.compute_txid(),
            selected.len(),
            self.wallet.signers.len()
        );
        Ok(tx)
    }

    /// Discard the session. Available any time before finalization.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Created | SessionState::Collecting | SessionState::Satisfied => {
                debug!("session abandoned with {} signature(s)", self.contributed.len());
                self.state = SessionState::Abandoned;
                Ok(())
            }
            closed => Err(SessionError::SessionClosed(closed)),
        }
    }

    /// The signer's public key for one input, rederived from the wallet's
    /// stored xpub rather than trusted from the template.
    fn derived_pubkey(
        &self,
        signer: &Signer,
        input: usize,
    ) -> Result<secp256k1::PublicKey, SessionError> {
        let secp = Secp256k1::verification_only();
        let (template_key, (_, full_path)) = self.psbt.inputs[input]
            .bip32_derivation
            .iter()
            .find(|(_, (fp, _))| *fp == signer.fingerprint)
            .ok_or_else(|| {
                SessionError::InvalidTemplate(format!(
                    "input {} has no derivation entry for {}",
                    input, signer.fingerprint
                ))
            })?;

        let full: &[ChildNumber] = full_path.as_ref();
        let base: &[ChildNumber] = signer.derivation_path.as_ref();
        if full.len() < base.len() || &full[..base.len()] != base {
            return Err(SessionError::InvalidTemplate(format!(
                "derivation path {} does not extend signer path {}",
                full_path, signer.derivation_path
            )));
        }
        let suffix: Vec<ChildNumber> = full[base.len()..].to_vec();
        let derived = signer
            .xpub
            .derive_pub(&secp, &suffix)
            .map_err(|e| SessionError::InvalidTemplate(e.to_string()))?
            .public_key;
        if derived != *template_key {
            return Err(SessionError::InvalidTemplate(format!(
                "derivation entry for {} does not match its xpub",
                signer.fingerprint
            )));
        }
        Ok(derived)
    }

    fn input_sighash(
        &self,
        cache: &mut SighashCache<&Transaction>,
        input: usize,
    ) -> Result<Message, SessionError> {
        let witness_script = self.psbt.inputs[input]
            .witness_script
            .as_ref()
            .ok_or_else(|| SessionError::InvalidTemplate(format!("input {} has no witness_script", input)))?;
        let value = self.psbt.inputs[input]
            .witness_utxo
            .as_ref()
            .ok_or_else(|| SessionError::InvalidTemplate(format!("input {} has no witness_utxo", input)))?
            .value;
        let sighash = cache
            .p2wsh_signature_hash(input, witness_script, value, EcdsaSighashType::All)
            .map_err(|e| SessionError::InvalidTemplate(e.to_string()))?;
        Ok(Message::from_digest(sighash.to_byte_array()))
    }

    /// Verify every input against Bitcoin Core's script interpreter.
    fn verify_consensus(&self, tx: &Transaction) -> Result<(), SessionError> {
        let tx_bytes = bitcoin::consensus::serialize(tx);
        let prevouts: Vec<&bitcoin::TxOut> = self
            .psbt
            .inputs
            .iter()
            .map(|input| input.witness_utxo.as_ref().expect("validated at session start"))
            .collect();
        let spent: Vec<bitcoinconsensus::Utxo> = prevouts
            .iter()
            .map(|txout| bitcoinconsensus::Utxo {
                script_pubkey: txout.script_pubkey.as_bytes().as_ptr(),
                script_pubkey_len: txout.script_pubkey.len() as u32,
                value: txout.value.to_sat() as i64,
            })
            .collect();
        for (i, txout) in prevouts.iter().enumerate() {
            bitcoinconsensus::verify(
                txout.script_pubkey.as_bytes(),
                txout.value.to_sat(),
                &tx_bytes,
                Some(&spent),
                i,
            )
            .map_err(|e| SessionError::FinalizationError(format!("input {}: {:?}", i, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;

    fn session(fixture: &Fixture) -> SigningSession {
        SigningSession::new(fixture.wallet.clone(), fixture.psbt.clone()).unwrap()
    }

    fn fingerprint(fixture: &Fixture, i: usize) -> Fingerprint {
        fixture.wallet.signers[i].fingerprint
    }

    #[test]
    fn test_two_signatures_reach_satisfied() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        assert_eq!(session.state(), SessionState::Created);

        let state = session
            .add_signature(fingerprint(&fixture, 0), &fixture.sign(0))
            .unwrap();
        assert_eq!(state, SessionState::Collecting);

        let state = session
            .add_signature(fingerprint(&fixture, 1), &fixture.sign(1))
            .unwrap();
        assert_eq!(state, SessionState::Satisfied);
        assert_eq!(session.signatures(), 2);
    }

    #[test]
    fn test_threshold_minus_one_cannot_finalize() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        session
            .add_signature(fingerprint(&fixture, 0), &fixture.sign(0))
            .unwrap();
        assert!(matches!(
            session.finalize(),
            Err(SessionError::NotSatisfied { have: 1, need: 2 })
        ));
    }

    #[test]
    fn test_finalize_passes_consensus() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        session
            .add_signature(fingerprint(&fixture, 0), &fixture.sign(0))
            .unwrap();
        session
            .add_signature(fingerprint(&fixture, 1), &fixture.sign(1))
            .unwrap();

        let tx = session.finalize().unwrap();
        assert_eq!(session.state(), SessionState::Finalized);
        // empty element + 2 signatures + witness script
        assert_eq!(tx.input[0].witness.len(), 4);
    }

    #[test]
    fn test_idempotent_resubmission() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        let sigs = fixture.sign(0);
        session.add_signature(fingerprint(&fixture, 0), &sigs).unwrap();
        let state = session.add_signature(fingerprint(&fixture, 0), &sigs).unwrap();
        assert_eq!(state, SessionState::Collecting);
        assert_eq!(session.signatures(), 1);
    }

    #[test]
    fn test_conflicting_signature_rejected() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        session
            .add_signature(fingerprint(&fixture, 0), &fixture.sign(0))
            .unwrap();
        // Same fingerprint, different bytes
        let result = session.add_signature(fingerprint(&fixture, 0), &fixture.sign(1));
        assert!(matches!(
            result,
            Err(SessionError::ConflictingSignature(_))
        ));
        assert_eq!(session.signatures(), 1);
    }

    #[test]
    fn test_unknown_signer_rejected() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        let stranger = Fingerprint::from([0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(
            session.add_signature(stranger, &fixture.sign(0)),
            Err(SessionError::UnknownSigner(_))
        ));
    }

    #[test]
    fn test_wrong_key_signature_rejected() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        // Signer 1's signature submitted under signer 0's fingerprint
        let result = session.add_signature(fingerprint(&fixture, 0), &fixture.sign(1));
        assert!(matches!(
            result,
            Err(SessionError::InvalidSignature { input: 0, .. })
        ));
        assert_eq!(session.state(), SessionState::Created);
    }

    #[test]
    fn test_garbage_der_rejected() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        let result = session.add_signature(fingerprint(&fixture, 0), &[vec![0u8; 70]]);
        assert!(matches!(
            result,
            Err(SessionError::InvalidSignature { input: 0, .. })
        ));
    }

    #[test]
    fn test_signature_count_must_match_inputs() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        let result = session.add_signature(fingerprint(&fixture, 0), &[]);
        assert!(matches!(
            result,
            Err(SessionError::SignatureCount { expected: 1, got: 0 })
        ));
    }

    #[test]
    fn test_finalize_selects_lowest_fingerprints() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        for i in 0..3 {
            session
                .add_signature(fingerprint(&fixture, i), &fixture.sign(i))
                .unwrap();
        }
        assert_eq!(session.signatures(), 3);

        let mut fps: Vec<Fingerprint> =
            fixture.wallet.signers.iter().map(|s| s.fingerprint).collect();
        fps.sort();
        let excluded = fps[2];
        let excluded_index = fixture
            .wallet
            .signers
            .iter()
            .position(|s| s.fingerprint == excluded)
            .unwrap();
        let excluded_der = fixture.sign(excluded_index)[0].clone();

        let tx = session.finalize().unwrap();
        let witness: Vec<Vec<u8>> = tx.input[0].witness.iter().map(|w| w.to_vec()).collect();
        assert_eq!(witness.len(), 4);
        // The highest fingerprint's signature must not appear
        assert!(!witness
            .iter()
            .any(|item| item.len() > 1 && item[..item.len() - 1] == excluded_der[..]));
    }

    #[test]
    fn test_absorb_psbt_round_trip() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);

        // Simulate an offline device: sign into a copy of the template
        let mut signed = fixture.psbt.clone();
        let sigs = fixture.sign(0);
        let signature = secp256k1::ecdsa::Signature::from_der(&sigs[0]).unwrap();
        let pubkey = fixture
            .psbt
            .inputs[0]
            .bip32_derivation
            .iter()
            .find(|(_, (fp, _))| *fp == fingerprint(&fixture, 0))
            .map(|(pk, _)| *pk)
            .unwrap();
        signed.inputs[0].partial_sigs.insert(
            bitcoin::PublicKey::new(pubkey),
            ecdsa::Signature {
                signature,
                sighash_type: EcdsaSighashType::All,
            },
        );

        let state = session.absorb_psbt(&signed).unwrap();
        assert_eq!(state, SessionState::Collecting);

        // Absorbing the same PSBT again adds nothing
        assert!(matches!(
            session.absorb_psbt(&signed),
            Err(SessionError::AlreadySigned(_))
        ));
    }

    #[test]
    fn test_absorb_foreign_key_rejected() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);

        // A signature from a key with no origin entry in the template
        let secp = Secp256k1::new();
        let foreign = bitcoin::bip32::Xpriv::new_master(bitcoin::Network::Bitcoin, &[0xAA; 64])
            .unwrap()
            .private_key
            .public_key(&secp);
        let sigs = fixture.sign(0);
        let signature = secp256k1::ecdsa::Signature::from_der(&sigs[0]).unwrap();
        let mut signed = fixture.psbt.clone();
        signed.inputs[0].partial_sigs.insert(
            bitcoin::PublicKey::new(foreign),
            ecdsa::Signature {
                signature,
                sighash_type: EcdsaSighashType::All,
            },
        );

        assert!(matches!(
            session.absorb_psbt(&signed),
            Err(SessionError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_absorb_empty_psbt_rejected() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        assert!(matches!(
            session.absorb_psbt(&fixture.psbt),
            Err(SessionError::NoSignatures)
        ));
    }

    #[test]
    fn test_abandon_closes_session() {
        let fixture = Fixture::two_of_three();
        let mut session = session(&fixture);
        session
            .add_signature(fingerprint(&fixture, 0), &fixture.sign(0))
            .unwrap();
        session.abandon().unwrap();
        assert_eq!(session.state(), SessionState::Abandoned);
        assert!(matches!(
            session.add_signature(fingerprint(&fixture, 1), &fixture.sign(1)),
            Err(SessionError::SessionClosed(SessionState::Abandoned))
        ));
        assert!(matches!(
            session.abandon(),
            Err(SessionError::SessionClosed(SessionState::Abandoned))
        ));
    }

    #[test]
    fn test_template_without_utxo_rejected() {
        let fixture = Fixture::two_of_three();
        let mut psbt = fixture.psbt.clone();
        psbt.inputs[0].witness_utxo = None;
        assert!(matches!(
            SigningSession::new(fixture.wallet.clone(), psbt),
            Err(SessionError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_presigned_template_rejected() {
        let fixture = Fixture::two_of_three();
        let mut session0 = session(&fixture);
        session0
            .add_signature(fingerprint(&fixture, 0), &fixture.sign(0))
            .unwrap();
        let presigned = session0.psbt().clone();
        assert!(matches!(
            SigningSession::new(fixture.wallet.clone(), presigned),
            Err(SessionError::InvalidTemplate(_))
        ));
    }
}
