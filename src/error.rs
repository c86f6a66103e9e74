use std::io;
use std::time::Duration;

use crate::packet::{ErrorCode, PacketError};

/// Terminal failure of an upload.
///
/// Noise (malformed packets, foreign senders, stale acks) never shows up here;
/// the session drops it and keeps waiting.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Creating, sending on, or receiving from the socket failed.
    #[error("socket: {0}")]
    Io(#[from] io::Error),

    #[error("reading file: {0}")]
    Source(#[source] io::Error),

    /// The device answered with an ERROR packet.
    #[error("TFTP server error code 0x{raw_code:x} ({code}): {message}")]
    Remote {
        code: ErrorCode,
        raw_code: u16,
        message: String,
    },

    #[error("timeout: no reply to the write request within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("timeout: block #{block} not acknowledged within {after:?}")]
    BlockTimeout { block: u16, after: Duration },

    #[error("cannot encode packet: {0}")]
    Encode(#[from] PacketError),
}

impl TransferError {
    pub(crate) fn remote(raw_code: u16, message: String) -> Self {
        TransferError::Remote {
            code: ErrorCode::from(raw_code),
            raw_code,
            message,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            TransferError::HandshakeTimeout(_) | TransferError::BlockTimeout { .. }
        )
    }
}
