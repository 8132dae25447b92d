//! Human-readable PSBT review
//!
//! Renders a PSBT into the fields the UI shows before anything is signed:
//! inputs and outputs with derivation paths and "mine" markers, fee, and
//! a handful of privacy warnings. Display only, nothing here mutates the
//! PSBT.

use std::collections::{BTreeMap, HashSet};

use bitcoin::bip32::{Fingerprint, KeySource};
use bitcoin::psbt::Psbt;
use bitcoin::script::Instruction;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Amount, Network, Script, TxOut};
use serde::Serialize;
use thiserror::Error;

type HdKeypaths = BTreeMap<PublicKey, KeySource>;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("Input {0} has no UTXO information")]
    MissingUtxo(usize),

    #[error("Input {0}: non-witness UTXO does not match the outpoint")]
    UtxoMismatch(usize),

    #[error("Outputs exceed inputs; fee would be negative")]
    NegativeFee,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Fee {
    /// Absolute fee in satoshi
    pub absolute: u64,
    /// Fee rate in sat/vB over the estimated final vsize
    pub rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Size {
    /// Vsize with the multisig witnesses estimated in
    pub estimated: usize,
    /// Vsize of the transaction before witnesses are attached
    pub unsigned: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PsbtSummary {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub fee: Fee,
    pub sizes: Size,
    /// Privacy and sanity notes for the user
    pub info: Vec<String>,
}

/// Summarize a PSBT for review. `fingerprints` is the wallet's signer
/// set, used to mark outputs that pay back to the wallet.
pub fn summarize(
    psbt: &Psbt,
    network: Network,
    fingerprints: &HashSet<Fingerprint>,
) -> Result<PsbtSummary, SummaryError> {
    let mut result = PsbtSummary::default();
    let tx = &psbt.unsigned_tx;

    let mut previous_outputs: Vec<TxOut> = Vec::with_capacity(psbt.inputs.len());
    for (i, input) in psbt.inputs.iter().enumerate() {
        let txout = match (&input.witness_utxo, &input.non_witness_utxo) {
            (Some(txout), _) => txout.clone(),
            (None, Some(prev_tx)) => {
                let outpoint = tx.input[i].previous_output;
                if prev_tx.compute_txid() != outpoint.txid {
                    return Err(SummaryError::UtxoMismatch(i));
                }
                prev_tx
                    .output
                    .get(outpoint.vout as usize)
                    .ok_or(SummaryError::UtxoMismatch(i))?
                    .clone()
            }
            (None, None) => return Err(SummaryError::MissingUtxo(i)),
        };
        previous_outputs.push(txout);
    }

    for (i, input) in tx.input.iter().enumerate() {
        result.inputs.push(format!(
            "#{} {} ({}) {}",
            i,
            input.previous_output,
            derivation_paths(&psbt.inputs[i].bip32_derivation),
            previous_outputs[i].value.to_sat(),
        ));
    }

    for (i, output) in tx.output.iter().enumerate() {
        let address = Address::from_script(&output.script_pubkey, network)
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "non-standard".to_string());
        result.outputs.push(format!(
            "#{} {} ({}{}) {}",
            i,
            address,
            derivation_paths(&psbt.outputs[i].bip32_derivation),
            is_mine(&psbt.outputs[i].bip32_derivation, fingerprints),
            output.value.to_sat(),
        ));
    }

    // Outputs of mixed script types stand out on-chain
    let script_types: HashSet<Option<usize>> = tx
        .output
        .iter()
        .map(|o| script_type(&o.script_pubkey))
        .collect();
    if script_types.len() > 1 {
        result
            .info
            .push("Privacy: outputs have different script types".to_string());
    }

    // A round payment amount next to a precise change amount reveals
    // which output is the payment
    let divs: Vec<u8> = tx
        .output
        .iter()
        .map(|o| biggest_dividing_pow(o.value.to_sat()))
        .collect();
    if let (Some(max), Some(min)) = (divs.iter().max(), divs.iter().min()) {
        if max - min >= 3 {
            result
                .info
                .push("Privacy: outputs have different precision".to_string());
        }
    }

    // An output smaller than every input means the smallest input was
    // not needed to fund it, which tags that output as likely change
    if previous_outputs.len() > 1 {
        if let Some(smallest_input) = previous_outputs.iter().map(|o| o.value).min() {
            if tx.output.iter().any(|o| o.value < smallest_input) {
                result
                    .info
                    .push("Privacy: smallest output is smaller than smallest input".to_string());
            }
        }
    }

    // Paying back to an input's script links them trivially
    let input_scripts: HashSet<&Script> = previous_outputs
        .iter()
        .map(|o| o.script_pubkey.as_script())
        .collect();
    if tx
        .output
        .iter()
        .any(|o| input_scripts.contains(o.script_pubkey.as_script()))
    {
        result.info.push("Privacy: address reuse".to_string());
    }

    let total_in: Amount = previous_outputs.iter().map(|o| o.value).sum();
    let total_out: Amount = tx.output.iter().map(|o| o.value).sum();
    let fee = total_in
        .checked_sub(total_out)
        .ok_or(SummaryError::NegativeFee)?
        .to_sat();
    let estimated = estimated_vsize(psbt);
    result.sizes = Size {
        estimated,
        unsigned: tx.vsize(),
    };
    result.fee = Fee {
        absolute: fee,
        rate: fee as f64 / estimated as f64,
    };

    Ok(result)
}

/// Typical size of a DER-encoded ECDSA signature plus the sighash byte.
const SIGNATURE_BYTES: usize = 72;

/// Vsize of the transaction with each input's p2wsh multisig witness
/// estimated in: empty element, threshold signatures, witness script.
fn estimated_vsize(psbt: &Psbt) -> usize {
    let mut witness_bytes = 2; // segwit marker and flag
    for input in &psbt.inputs {
        let script = match &input.witness_script {
            Some(script) => script,
            None => continue,
        };
        let threshold = multisig_threshold(script).unwrap_or(1);
        witness_bytes += 1 // item count
            + 1 // empty element
            + threshold * (1 + SIGNATURE_BYTES)
            + compact_size(script.len())
            + script.len();
    }
    psbt.unsigned_tx.base_size() + witness_bytes.div_ceil(4)
}

/// Threshold M of a `M <key>... N CHECKMULTISIG` script, read off the
/// leading OP_PUSHNUM.
fn multisig_threshold(script: &Script) -> Option<usize> {
    match script.instructions().next() {
        Some(Ok(Instruction::Op(op))) => {
            let value = op.to_u8();
            (0x51..=0x60)
                .contains(&value)
                .then(|| (value - 0x50) as usize)
        }
        _ => None,
    }
}

fn compact_size(n: usize) -> usize {
    match n {
        0..=252 => 1,
        253..=65535 => 3,
        _ => 5,
    }
}

fn derivation_paths(hd_keypaths: &HdKeypaths) -> String {
    let mut paths: Vec<String> = hd_keypaths
        .values()
        .map(|(_, path)| path.to_string())
        .collect();
    paths.sort();
    paths.dedup();
    paths.join(", ")
}

fn is_mine(hd_keypaths: &HdKeypaths, fingerprints: &HashSet<Fingerprint>) -> &'static str {
    if !hd_keypaths.is_empty()
        && hd_keypaths
            .values()
            .all(|(fp, _)| fingerprints.contains(fp))
    {
        " MINE"
    } else {
        ""
    }
}

fn biggest_dividing_pow(num: u64) -> u8 {
    let mut divisor = 10u64;
    let mut count = 0u8;
    while num > 0 && num % divisor == 0 {
        divisor *= 10;
        count += 1;
    }
    count
}

fn script_type(script: &Script) -> Option<usize> {
    const CHECKS: [fn(&Script) -> bool; 6] = [
        Script::is_p2pk,
        Script::is_p2pkh,
        Script::is_p2sh,
        Script::is_p2wpkh,
        Script::is_p2wsh,
        Script::is_p2tr,
    ];
    CHECKS.iter().position(|check| check(script))
}
