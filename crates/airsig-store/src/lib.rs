//! # airsig-store
//!
//! Filesystem persistence for wallet records.
//!
//! Layout is one directory per wallet under a configured root:
//!
//! ```text
//! <root>/<name>/wallet.json     the wallet record
//! <root>/<name>/indexes.json    next unused receive/change indices
//! <root>/<name>/qr/frame-N.bin  cached export frames
//! ```
//!
//! Writes are atomic (temp file in the same directory, then rename), so a
//! reader never observes a half-written record. Loading re-derives the
//! descriptors from the stored signer set and rejects any drift.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bitcoin::Network;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use airsig_core::descriptor::{Chain, DescriptorError};
use airsig_core::signer::Signer;
use airsig_core::wallet::{Wallet, WALLET_RECORD_VERSION};
use airsig_qr::FrameError;

const WALLET_FILE: &str = "wallet.json";
const INDEXES_FILE: &str = "indexes.json";
const QR_DIR: &str = "qr";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid wallet name: {0}")]
    InvalidName(String),

    #[error("Wallet already exists: {0}")]
    NameAlreadyExists(String),

    #[error("Wallet not found: {0}")]
    NotFound(String),

    #[error("Corrupt wallet record {name}: {reason}")]
    CorruptRecord { name: String, reason: String },

    #[error("Invalid wallet: {0}")]
    InvalidWallet(#[from] DescriptorError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// One line of `list()` output: enough for a wallet picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSummary {
    pub name: String,
    pub required_sig: usize,
    pub signer_count: usize,
}

/// Next unused address indices for a wallet.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WalletIndexes {
    pub main: u32,
    pub change: u32,
}

/// Wallet persistence rooted at a configured directory.
///
/// Explicit component, not a singleton: tests point it at a temp
/// directory. `create`/`delete` for the same name are serialized by a
/// per-name lock; reads need no locking because records are immutable
/// once written.
pub struct WalletStore {
    root: PathBuf,
    network: Network,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WalletStore {
    pub fn open(root: impl Into<PathBuf>, network: Network) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            network,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn wallet_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(name.to_string()).or_default().clone()
    }

    /// Derive and persist a new wallet. The record hits disk atomically;
    /// a concurrent reader sees either nothing or the full record.
    pub fn create(
        &self,
        name: &str,
        signers: Vec<Signer>,
        required_sig: usize,
        created_at_height: u32,
    ) -> Result<Wallet, StoreError> {
        validate_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let dir = self.wallet_dir(name);
        if dir.exists() {
            return Err(StoreError::NameAlreadyExists(name.to_string()));
        }

        let wallet = Wallet::derive(name, self.network, signers, required_sig, created_at_height)?;

        fs::create_dir_all(&dir)?;
        write_atomic(
            &dir.join(WALLET_FILE),
            serde_json::to_string_pretty(&wallet)?.as_bytes(),
        )?;
        write_atomic(
            &dir.join(INDEXES_FILE),
            serde_json::to_string_pretty(&WalletIndexes::default())?.as_bytes(),
        )?;
        info!("created wallet {:?} in {:?}", name, dir);
        Ok(wallet)
    }

    /// Load a wallet record, verifying the stored descriptors against a
    /// fresh recomputation from the stored signer set.
    pub fn load(&self, name: &str) -> Result<Wallet, StoreError> {
        let path = self.wallet_dir(name).join(WALLET_FILE);
        debug!("loading wallet record {:?}", path);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let wallet: Wallet =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptRecord {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        if wallet.version != WALLET_RECORD_VERSION {
            return Err(StoreError::CorruptRecord {
                name: name.to_string(),
                reason: format!("unknown record version {}", wallet.version),
            });
        }
        // A record moved into a foreign directory must not load under it
        if wallet.name != name {
            return Err(StoreError::CorruptRecord {
                name: name.to_string(),
                reason: format!("record belongs to wallet {:?}", wallet.name),
            });
        }
        wallet
            .verify_descriptors()
            .map_err(|e| StoreError::CorruptRecord {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(wallet)
    }

    /// Remove a wallet directory and everything in it (record, indexes,
    /// cached frames). Idempotent: deleting an absent wallet is a no-op
    /// and returns `Ok(false)`; `Ok(true)` means a directory was removed.
    pub fn delete(&self, name: &str) -> Result<bool, StoreError> {
        validate_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let dir = self.wallet_dir(name);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;
        info!("deleted wallet {:?}", name);
        Ok(true)
    }

    /// Lazily enumerate wallet summaries. Side-effect-free and
    /// restartable; entries that are not wallets (or fail to parse) are
    /// skipped with a warning.
    pub fn list(&self) -> Result<impl Iterator<Item = WalletSummary> + '_, StoreError> {
        let entries = fs::read_dir(&self.root)?;
        Ok(entries.filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().into_string().ok()?;
            if !entry.path().join(WALLET_FILE).is_file() {
                return None;
            }
            match self.load(&name) {
                Ok(wallet) => Some(WalletSummary {
                    name: wallet.name,
                    required_sig: wallet.required_sig,
                    signer_count: wallet.signers.len(),
                }),
                Err(e) => {
                    warn!("skipping {:?}: {}", name, e);
                    None
                }
            }
        }))
    }

    /// Return the next unused index for a chain and advance it.
    ///
    /// The read-bump-write runs under the wallet's per-name lock, so
    /// concurrent callers never receive the same index.
    pub fn next_index(&self, name: &str, chain: Chain) -> Result<u32, StoreError> {
        let lock = self.name_lock(name);
        let _guard = lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut indexes = self.load_indexes(name)?;
        let current = match chain {
            Chain::Main => {
                let i = indexes.main;
                indexes.main += 1;
                i
            }
            Chain::Change => {
                let i = indexes.change;
                indexes.change += 1;
                i
            }
        };
        self.save_indexes(name, &indexes)?;
        Ok(current)
    }

    /// Hand back the last change index, e.g. after an abandoned spend.
    pub fn rewind_change(&self, name: &str) -> Result<(), StoreError> {
        let lock = self.name_lock(name);
        let _guard = lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut indexes = self.load_indexes(name)?;
        if indexes.change > 0 {
            indexes.change -= 1;
            self.save_indexes(name, &indexes)?;
        }
        Ok(())
    }

    pub fn load_indexes(&self, name: &str) -> Result<WalletIndexes, StoreError> {
        let path = self.wallet_dir(name).join(INDEXES_FILE);
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptRecord {
                name: name.to_string(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.wallet_dir(name).join(WALLET_FILE).is_file() {
                    Ok(WalletIndexes::default())
                } else {
                    Err(StoreError::NotFound(name.to_string()))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save_indexes(&self, name: &str, indexes: &WalletIndexes) -> Result<(), StoreError> {
        let path = self.wallet_dir(name).join(INDEXES_FILE);
        write_atomic(&path, serde_json::to_string_pretty(indexes)?.as_bytes())?;
        Ok(())
    }

    /// Encode the wallet record as QR frames and cache them under the
    /// wallet's `qr/` directory. Returns the frame file paths in order.
    pub fn export_frames(&self, name: &str) -> Result<Vec<PathBuf>, StoreError> {
        let wallet = self.load(name)?;
        let payload = serde_json::to_vec_pretty(&wallet)?;
        let frames = airsig_qr::encode(&payload)?;

        let qr_dir = self.wallet_dir(name).join(QR_DIR);
        fs::create_dir_all(&qr_dir)?;
        let mut paths = Vec::with_capacity(frames.len());
        for frame in &frames {
            let path = qr_dir.join(format!("frame-{}.bin", frame.index));
            write_atomic(&path, &frame.to_bytes())?;
            paths.push(path);
        }
        info!("exported {} frame(s) for wallet {:?}", frames.len(), name);
        Ok(paths)
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Write-to-temp-then-rename in the target's directory, so the rename is
/// on one filesystem and readers never see a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
