//! # airsig-qr
//!
//! Chunked frame codec for transporting byte payloads across an air gap
//! as a sequence of QR codes.
//!
//! The codec knows nothing about what it carries; wallet records and
//! PSBTs both go through it as opaque bytes. Each frame is self-describing
//! (index, total count, integrity tag), so frames can be scanned in any
//! order and completeness is detectable before reassembly.
//!
//! # Frame wire format
//!
//! ```text
//! [version: u8][index: u16 BE][total: u16 BE][tag: 4 bytes][chunk bytes]
//! ```
//!
//! The tag is the first four bytes of SHA256d over the *whole* payload and
//! is embedded redundantly in every frame, so a single scanned frame is
//! enough to know which transfer it belongs to.

use std::collections::BTreeMap;

use bitcoin::hashes::{sha256d, Hash};
use thiserror::Error;

/// Largest binary payload of a version-40 QR code at error-correction
/// level L. Rendering above this capacity is not scannable.
pub const MAX_FRAME_BYTES: usize = 2953;

/// Bytes of header prepended to every chunk.
pub const FRAME_HEADER_BYTES: usize = 9;

/// Largest chunk of payload carried by one frame.
pub const MAX_CHUNK_BYTES: usize = MAX_FRAME_BYTES - FRAME_HEADER_BYTES;

const FRAME_VERSION: u8 = 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Empty payload")]
    EmptyPayload,

    #[error("Payload too large: {0} bytes needs more than 65535 frames")]
    PayloadTooLarge(usize),

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    #[error("Frame index {index} out of range (total {total})")]
    IndexOutOfRange { index: u16, total: u16 },

    #[error("Frame chunk exceeds capacity: {0} bytes")]
    ChunkTooLarge(usize),

    #[error("Frame does not belong to this transfer (total or tag mismatch)")]
    FrameMismatch,

    #[error("Missing frames: {indices:?}")]
    MissingFrames { indices: Vec<u16> },

    #[error("Integrity check failed on reassembled payload")]
    IntegrityError,
}

/// One QR frame: a bounded chunk of a larger payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrFrame {
    pub index: u16,
    pub total: u16,
    pub tag: [u8; 4],
    pub chunk: Vec<u8>,
}

impl QrFrame {
    /// Serialize to the bytes rendered as one QR code.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_BYTES + self.chunk.len());
        out.push(FRAME_VERSION);
        out.extend_from_slice(&self.index.to_be_bytes());
        out.extend_from_slice(&self.total.to_be_bytes());
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.chunk);
        out
    }

    /// Parse the bytes of one scanned QR code.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < FRAME_HEADER_BYTES {
            return Err(FrameError::FrameTooShort(bytes.len()));
        }
        if bytes[0] != FRAME_VERSION {
            return Err(FrameError::UnsupportedVersion(bytes[0]));
        }
        let index = u16::from_be_bytes([bytes[1], bytes[2]]);
        let total = u16::from_be_bytes([bytes[3], bytes[4]]);
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&bytes[5..9]);
        let chunk = bytes[FRAME_HEADER_BYTES..].to_vec();
        let frame = Self {
            index,
            total,
            tag,
            chunk,
        };
        frame.validate()?;
        Ok(frame)
    }

    fn validate(&self) -> Result<(), FrameError> {
        if self.total == 0 || self.index >= self.total {
            return Err(FrameError::IndexOutOfRange {
                index: self.index,
                total: self.total,
            });
        }
        if self.chunk.len() > MAX_CHUNK_BYTES {
            return Err(FrameError::ChunkTooLarge(self.chunk.len()));
        }
        Ok(())
    }
}

/// Integrity tag over a full payload: first four bytes of SHA256d.
pub fn payload_tag(payload: &[u8]) -> [u8; 4] {
    let digest = sha256d::Hash::hash(payload);
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&digest.as_byte_array()[..4]);
    tag
}

/// Split a payload into an ordered sequence of frames.
///
/// Always produces at least one frame; a payload smaller than one chunk
/// yields a single frame with `total = 1`.
pub fn encode(payload: &[u8]) -> Result<Vec<QrFrame>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    let count = payload.len().div_ceil(MAX_CHUNK_BYTES);
    if count > u16::MAX as usize {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }
    let tag = payload_tag(payload);
    let frames = payload
        .chunks(MAX_CHUNK_BYTES)
        .enumerate()
        .map(|(i, chunk)| QrFrame {
            index: i as u16,
            total: count as u16,
            tag,
            chunk: chunk.to_vec(),
        })
        .collect();
    Ok(frames)
}

/// Incremental reassembly of frames scanned in arbitrary order.
///
/// The first accepted frame fixes the transfer identity (total count and
/// tag); later frames that disagree are rejected. Duplicate indices are
/// tolerated since content per index is immutable by construction, so the
/// last write wins.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    expected: Option<(u16, [u8; 4])>,
    chunks: BTreeMap<u16, Vec<u8>>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one scanned frame. Returns the number of distinct indices
    /// received so far.
    pub fn insert(&mut self, frame: QrFrame) -> Result<usize, FrameError> {
        frame.validate()?;
        match self.expected {
            None => self.expected = Some((frame.total, frame.tag)),
            Some((total, tag)) => {
                if frame.total != total || frame.tag != tag {
                    return Err(FrameError::FrameMismatch);
                }
            }
        }
        self.chunks.insert(frame.index, frame.chunk);
        Ok(self.chunks.len())
    }

    /// Total frame count, once known from the first frame.
    pub fn total(&self) -> Option<u16> {
        self.expected.map(|(total, _)| total)
    }

    /// Indices not yet received.
    pub fn missing(&self) -> Vec<u16> {
        match self.expected {
            None => Vec::new(),
            Some((total, _)) => (0..total).filter(|i| !self.chunks.contains_key(i)).collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        match self.expected {
            None => false,
            Some((total, _)) => self.chunks.len() == total as usize,
        }
    }

    /// Reassemble the payload. Fails before completeness and on an
    /// integrity tag mismatch; corrupted data is never returned.
    pub fn assemble(&self) -> Result<Vec<u8>, FrameError> {
        let (_, tag) = self.expected.ok_or(FrameError::MissingFrames {
            indices: Vec::new(),
        })?;
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(FrameError::MissingFrames { indices: missing });
        }
        let payload: Vec<u8> = self.chunks.values().flatten().copied().collect();
        if payload_tag(&payload) != tag {
            return Err(FrameError::IntegrityError);
        }
        Ok(payload)
    }
}

/// Decode a complete set of frames in arbitrary arrival order.
pub fn decode(frames: impl IntoIterator<Item = QrFrame>) -> Result<Vec<u8>, FrameError> {
    let mut accumulator = FrameAccumulator::new();
    for frame in frames {
        accumulator.insert(frame)?;
    }
    accumulator.assemble()
}
