use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::error::TransferError;
use crate::packet::TftpPacket;
use crate::progress::Progress;
use crate::transport::Transport;
use crate::{DEF_MODE, DEF_REMOTE_NAME, PACKET_SIZE, SEGMENT_SIZE};

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Name put in the write request; the device ignores it.
    pub filename: String,
    pub mode: String,
    pub handshake_deadline: Duration,
    pub handshake_poll: Duration,
    /// Restarted for every fresh block, not for retransmissions.
    pub block_deadline: Duration,
    pub block_poll: Duration,
    /// Write requests sent before the power-cycle hint is shown.
    pub reboot_hint_after: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            filename: DEF_REMOTE_NAME.to_string(),
            mode: DEF_MODE.to_string(),
            handshake_deadline: Duration::from_secs(30),
            handshake_poll: Duration::from_millis(500),
            block_deadline: Duration::from_secs(10),
            block_poll: Duration::from_secs(1),
            reboot_hint_after: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub blocks: u64,
    pub bytes: u64,
    pub request_sends: u32,
    pub retransmissions: u64,
    pub elapsed: Duration,
}

/// One outbound write transfer to a single device.
///
/// There is never more than one unacknowledged packet in flight. The session
/// is consumed by [`Session::upload`], which drops the transport (and closes
/// the socket) whatever the outcome.
pub struct Session<T, W> {
    transport: T,
    out: W,
    config: TransferConfig,
    peer: SocketAddr,
    established: bool,
    block: u16,
    last_sent: Vec<u8>,
    eof: bool,
    rx_buf: [u8; PACKET_SIZE],
}

impl<T: Transport, W: Write> Session<T, W> {
    pub fn new(transport: T, peer: SocketAddr, config: TransferConfig, out: W) -> Self {
        Self {
            transport,
            out,
            config,
            peer,
            established: false,
            block: 0,
            last_sent: Vec::with_capacity(PACKET_SIZE),
            eof: false,
            rx_buf: [0; PACKET_SIZE],
        }
    }

    pub async fn upload<R: Read + Seek>(
        mut self,
        source: &mut R,
    ) -> Result<TransferSummary, TransferError> {
        let start = Instant::now();
        let request_sends = self.handshake().await?;
        let (blocks, bytes, retransmissions) = self.transfer(source).await?;

        let summary = TransferSummary {
            blocks,
            bytes,
            request_sends,
            retransmissions,
            elapsed: start.elapsed(),
        };
        info!(?summary, "transfer complete");
        Ok(summary)
    }

    /// Send the write request until the device acks block 0 or the handshake
    /// deadline runs out. Returns the number of requests sent.
    async fn handshake(&mut self) -> Result<u32, TransferError> {
        let request = TftpPacket::WRQ {
            filename: self.config.filename.clone(),
            mode: self.config.mode.clone(),
        }
        .serialize()?;

        let deadline = Instant::now() + self.config.handshake_deadline;
        let mut sends: u32 = 0;
        while Instant::now() <= deadline {
            self.transport.send_to(&request, self.peer).await?;
            sends += 1;
            trace!(peer = %self.peer, sends, "write request sent");
            if sends == self.config.reboot_hint_after {
                self.say(format_args!(
                    "\nREBOOT the router NOW.. The upgrade will then start\n\
                     Waiting {} seconds for the router to be rebooted\n\n",
                    self.config.handshake_deadline.as_secs()
                ));
            }

            if let Some(from) = self.await_ack(0, self.config.handshake_poll).await? {
                debug!(%from, "write request acknowledged");
                self.peer = from;
                self.transport.connect(from).await?;
                self.established = true;
                self.say(format_args!("Sending:"));
                return Ok(sends);
            }
        }

        Err(TransferError::HandshakeTimeout(
            self.config.handshake_deadline,
        ))
    }

    /// Block-by-block transfer, stop-and-wait. Returns blocks, payload bytes
    /// and retransmissions.
    async fn transfer<R: Read + Seek>(
        &mut self,
        source: &mut R,
    ) -> Result<(u64, u64, u64), TransferError> {
        let size = source
            .seek(SeekFrom::End(0))
            .map_err(TransferError::Source)?;
        source.rewind().map_err(TransferError::Source)?;

        let mut progress = Progress::new(size);
        let mut chunk = [0u8; SEGMENT_SIZE];
        let mut blocks: u64 = 0;
        let mut bytes: u64 = 0;
        let mut retransmissions: u64 = 0;

        while !self.eof {
            self.block = self.block.wrapping_add(1);
            let n = read_chunk(source, &mut chunk).map_err(TransferError::Source)?;
            self.eof = n < SEGMENT_SIZE;
            self.last_sent = TftpPacket::DATA {
                block: self.block,
                data: chunk[..n].to_vec(),
            }
            .serialize()?;
            if progress.tick() {
                self.say(format_args!("."));
            }

            let deadline = Instant::now() + self.config.block_deadline;
            let mut attempts: u64 = 0;
            loop {
                if Instant::now() > deadline {
                    return Err(TransferError::BlockTimeout {
                        block: self.block,
                        after: self.config.block_deadline,
                    });
                }
                self.transport.send_to(&self.last_sent, self.peer).await?;
                attempts += 1;
                if attempts > 1 {
                    debug!(block = self.block, attempts, "retransmitting");
                }
                if self
                    .await_ack(self.block, self.config.block_poll)
                    .await?
                    .is_some()
                {
                    break;
                }
            }

            blocks += 1;
            bytes += n as u64;
            retransmissions += attempts - 1;
        }

        self.say(format_args!(" OK\n"));
        Ok((blocks, bytes, retransmissions))
    }

    /// Wait up to `poll` for an ACK of `block`. Anything else that arrives is
    /// dropped without touching the poll window, except an ERROR packet which
    /// ends the session.
    async fn await_ack(
        &mut self,
        block: u16,
        poll: Duration,
    ) -> Result<Option<SocketAddr>, TransferError> {
        let until = Instant::now() + poll;
        loop {
            let remaining = until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let (n, from) = match self.transport.recv_from(&mut self.rx_buf, remaining).await {
                Ok(Some(received)) => received,
                Ok(None) => return Ok(None),
                // ICMP feedback from a device that is still booting
                Err(e) if is_icmp_feedback(&e) => {
                    trace!(error = %e, "ignoring receive error");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !self.established && from.ip() != self.peer.ip() {
                trace!(%from, "datagram from unexpected host");
                continue;
            }

            match TftpPacket::deserialize(&self.rx_buf[..n]) {
                Ok(TftpPacket::ACK(acked)) if acked == block => return Ok(Some(from)),
                Ok(TftpPacket::ERROR { code, msg }) => {
                    debug!(code, %msg, "device reported an error");
                    return Err(TransferError::remote(code, msg));
                }
                Ok(other) => trace!(expected = block, packet = ?other, "ignoring packet"),
                // Short and undecodable datagrams are plain noise: no resend,
                // the poll window keeps running.
                Err(e) => trace!(error = %e, len = n, "ignoring malformed packet"),
            }
        }
    }

    fn say(&mut self, args: fmt::Arguments<'_>) {
        if let Err(e) = self.out.write_fmt(args).and_then(|()| self.out.flush()) {
            debug!(error = %e, "progress output failed");
        }
    }
}

fn is_icmp_feedback(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

/// Fill `buf` as far as the source allows; a short count means end of file.
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
