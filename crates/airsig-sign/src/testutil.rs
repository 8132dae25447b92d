//! Shared fixtures for session and summary tests: a 2-of-3 wallet with
//! in-memory keys and a one-input spend PSBT over it.

use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, Network, OutPoint, Sequence, Transaction, TxIn, TxOut, Witness};

use airsig_core::descriptor::Chain;
use airsig_core::signer::Signer;
use airsig_core::wallet::Wallet;

pub struct Fixture {
    pub secp: Secp256k1<All>,
    pub wallet: Wallet,
    /// Master keys, aligned with `wallet.signers`
    pub masters: Vec<Xpriv>,
    /// Unsigned one-input spend of the funding output
    pub psbt: Psbt,
}

pub const BASE_PATH: &str = "48'/0'/0'/2'";
pub const FUND_SATS: u64 = 100_000_000;
pub const SPEND_SATS: u64 = 99_999_000;

impl Fixture {
    pub fn two_of_three() -> Self {
        Self::new(3, 2)
    }

    pub fn new(n: usize, threshold: usize) -> Self {
        let secp = Secp256k1::new();
        let base_path = DerivationPath::from_str(BASE_PATH).unwrap();

        let mut masters = Vec::new();
        let mut signers = Vec::new();
        for i in 0..n {
            let seed = [(i + 1) as u8; 64];
            let master = Xpriv::new_master(Network::Bitcoin, &seed).unwrap();
            let account = master.derive_priv(&secp, &base_path).unwrap();
            let signer = Signer::new(
                format!("device-{}", i),
                master.fingerprint(&secp),
                Xpub::from_priv(&secp, &account),
                base_path.clone(),
            );
            masters.push(master);
            signers.push(signer);
        }

        let wallet = Wallet::derive("vault", Network::Bitcoin, signers, threshold, 800_000).unwrap();

        // Receive script at index 0 and its witness script
        let definite = wallet
            .descriptor(Chain::Main)
            .unwrap()
            .at_derivation_index(0)
            .unwrap();
        let spk = definite.script_pubkey();
        let witness_script = definite.explicit_script().unwrap();

        let funding = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: Default::default(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(FUND_SATS),
                script_pubkey: spk,
            }],
        };

        let spend = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: funding.compute_txid(),
                    vout: 0,
                },
                script_sig: Default::default(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(SPEND_SATS),
                script_pubkey: wallet.address(Chain::Main, 1).unwrap().script_pubkey(),
            }],
        };

        let mut psbt = Psbt::from_unsigned_tx(spend).unwrap();
        psbt.inputs[0].witness_utxo = Some(funding.output[0].clone());
        psbt.inputs[0].witness_script = Some(witness_script);
        let full_path = base_path
            .child(ChildNumber::from_normal_idx(0).unwrap())
            .child(ChildNumber::from_normal_idx(0).unwrap());
        for (master, signer) in masters.iter().zip(wallet.signers.iter()) {
            let child = master.derive_priv(&secp, &full_path).unwrap();
            let pubkey = child.private_key.public_key(&secp);
            psbt.inputs[0]
                .bip32_derivation
                .insert(pubkey, (signer.fingerprint, full_path.clone()));
        }

        Self {
            secp,
            wallet,
            masters,
            psbt,
        }
    }

    /// DER signature of signer `i` over the single input's p2wsh sighash.
    pub fn sign(&self, i: usize) -> Vec<Vec<u8>> {
        let base_path = DerivationPath::from_str(BASE_PATH).unwrap();
        let full_path = base_path
            .child(ChildNumber::from_normal_idx(0).unwrap())
            .child(ChildNumber::from_normal_idx(0).unwrap());
        let child = self.masters[i].derive_priv(&self.secp, &full_path).unwrap();

        let witness_script = self.psbt.inputs[0].witness_script.clone().unwrap();
        let value = self.psbt.inputs[0].witness_utxo.as_ref().unwrap().value;
        let mut cache = SighashCache::new(&self.psbt.unsigned_tx);
        let sighash = cache
            .p2wsh_signature_hash(0, &witness_script, value, EcdsaSighashType::All)
            .unwrap();
        let msg = Message::from_digest(sighash.to_byte_array());
        let sig = self.secp.sign_ecdsa(&msg, &child.private_key);
        vec![sig.serialize_der().to_vec()]
    }
}
