use std::fmt;
use std::str;

use crate::{HEADER_SIZE, SEGMENT_SIZE};

const OP_RRQ: u16 = 1;
const OP_WRQ: u16 = 2;
const OP_DATA: u16 = 3;
const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;

/// Why a buffer could not be encoded or decoded.
///
/// On the receive side every variant means "malformed": the packet is noise and
/// the caller drops it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet length too short ({0} bytes)")]
    TooShort(usize),
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u16),
    #[error("missing cstr terminator")]
    MissingTerminator,
    #[error("invalid cstr encoding")]
    InvalidEncoding,
    #[error("embedded NUL in {0:?}")]
    EmbeddedNul(String),
    #[error("payload of {0} bytes exceeds the 512 byte segment")]
    PayloadTooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TftpPacket {
    RRQ { filename: String, mode: String },
    WRQ { filename: String, mode: String },
    DATA { block: u16, data: Vec<u8> },
    ACK(u16),
    ERROR { code: u16, msg: String },
}

impl TftpPacket {
    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let mut bytes: Vec<u8> = Vec::with_capacity(crate::PACKET_SIZE);

        match self {
            TftpPacket::RRQ { filename, mode } | TftpPacket::WRQ { filename, mode } => {
                let opcode = if let TftpPacket::RRQ { .. } = self {
                    OP_RRQ
                } else {
                    OP_WRQ
                };
                bytes.extend_from_slice(&opcode.to_be_bytes());
                write_cstr(&mut bytes, filename)?;
                write_cstr(&mut bytes, mode)?;
            }
            TftpPacket::DATA { block, data } => {
                if data.len() > SEGMENT_SIZE {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                bytes.extend_from_slice(&OP_DATA.to_be_bytes());
                bytes.extend_from_slice(&block.to_be_bytes());
                bytes.extend_from_slice(data);
            }
            TftpPacket::ACK(block) => {
                bytes.extend_from_slice(&OP_ACK.to_be_bytes());
                bytes.extend_from_slice(&block.to_be_bytes());
            }
            TftpPacket::ERROR { code, msg } => {
                bytes.extend_from_slice(&OP_ERROR.to_be_bytes());
                bytes.extend_from_slice(&code.to_be_bytes());
                write_cstr(&mut bytes, msg)?;
            }
        }
        Ok(bytes)
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_SIZE {
            return Err(PacketError::TooShort(buf.len()));
        }

        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let pkt = match opcode {
            OP_RRQ | OP_WRQ => {
                let filename = read_cstr(&buf[2..])?;
                let mode = read_cstr(&buf[2 + filename.len() + 1..])?;
                if opcode == OP_RRQ {
                    TftpPacket::RRQ { filename, mode }
                } else {
                    TftpPacket::WRQ { filename, mode }
                }
            }
            OP_DATA => {
                let data = &buf[HEADER_SIZE..];
                if data.len() > SEGMENT_SIZE {
                    return Err(PacketError::PayloadTooLarge(data.len()));
                }
                TftpPacket::DATA {
                    block: u16::from_be_bytes([buf[2], buf[3]]),
                    data: data.to_vec(),
                }
            }
            OP_ACK => TftpPacket::ACK(u16::from_be_bytes([buf[2], buf[3]])),
            OP_ERROR => {
                // Embedded targets are sloppy with the terminator, so the message
                // runs to the first NUL or the end of the datagram.
                let raw = &buf[HEADER_SIZE..];
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                TftpPacket::ERROR {
                    code: u16::from_be_bytes([buf[2], buf[3]]),
                    msg: String::from_utf8_lossy(&raw[..end]).into_owned(),
                }
            }
            _ => return Err(PacketError::InvalidOpcode(opcode)),
        };

        Ok(pkt)
    }
}

fn write_cstr(bytes: &mut Vec<u8>, s: &str) -> Result<(), PacketError> {
    if s.as_bytes().contains(&0) {
        return Err(PacketError::EmbeddedNul(s.to_string()));
    }
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    Ok(())
}

fn read_cstr(buf: &[u8]) -> Result<String, PacketError> {
    let pos = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(PacketError::MissingTerminator)?;
    let s = str::from_utf8(&buf[..pos])
        .map_err(|_| PacketError::InvalidEncoding)?
        .to_string();
    Ok(s)
}

/// Error codes carried by an ERROR packet (RFC 1350, appendix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Undefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileExists,
    NoSuchUser,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::Undefined,
        ErrorCode::FileNotFound,
        ErrorCode::AccessViolation,
        ErrorCode::DiskFull,
        ErrorCode::IllegalOperation,
        ErrorCode::UnknownTransferId,
        ErrorCode::FileExists,
        ErrorCode::NoSuchUser,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Undefined => "not defined",
            ErrorCode::FileNotFound => "file not found",
            ErrorCode::AccessViolation => "access violation",
            ErrorCode::DiskFull => "disk full or allocation exceeded",
            ErrorCode::IllegalOperation => "illegal TFTP operation",
            ErrorCode::UnknownTransferId => "unknown transfer ID",
            ErrorCode::FileExists => "file already exists",
            ErrorCode::NoSuchUser => "no such user",
        }
    }
}

/// Codes outside the closed set map to `Undefined`.
impl From<u16> for ErrorCode {
    fn from(code: u16) -> Self {
        ErrorCode::ALL
            .get(usize::from(code))
            .copied()
            .unwrap_or(ErrorCode::Undefined)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
