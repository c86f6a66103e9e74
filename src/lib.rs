mod cli;
mod error;
mod packet;
mod progress;
mod session;
mod transport;

pub use crate::cli::Cli;
pub use crate::error::TransferError;
pub use crate::packet::{ErrorCode, PacketError, TftpPacket};
pub use crate::progress::Progress;
pub use crate::session::{Session, TransferConfig, TransferSummary};
pub use crate::transport::{Transport, UdpTransport};

pub const SEGMENT_SIZE: usize = 512; // RFC 1350
pub const HEADER_SIZE: usize = 4;
pub const PACKET_SIZE: usize = SEGMENT_SIZE + HEADER_SIZE;

pub const DEF_PORT: u16 = 69;
pub const DEF_REMOTE_NAME: &str = "upgrade";
pub const DEF_MODE: &str = "octet";
