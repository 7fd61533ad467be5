//! Codec failure modes (§4.1). All three degrade to zero readings — the
//! codec itself never propagates these as fatal; callers log at DEBUG.

/// Why a frame yielded no readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecFailure {
    /// Frame-control "encrypted" bit set; `bindkey` decryption is a
    /// non-goal, so encrypted frames are rejected outright.
    #[error("encrypted MiBeacon frame rejected")]
    EncryptedFrame,

    /// Fewer than 11 bytes: not enough for frame-control, product ID,
    /// counter, and embedded MAC.
    #[error("frame too short: {len} bytes (need at least 11)")]
    ShortFrame { len: usize },

    /// The MAC embedded in the frame does not match the advertisement's
    /// own MAC — almost certainly a malformed or spoofed frame.
    #[error("embedded MAC does not match advertisement MAC")]
    BadMac,
}
