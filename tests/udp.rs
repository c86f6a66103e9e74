//! End-to-end uploads over loopback UDP.
//!
//! A fake device runs in a background task: it takes the write request on one
//! socket and answers from a second one, the way a real TFTP server hands the
//! transfer off to a fresh port.

use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use tftp_upgrade::{
    ErrorCode, Session, TftpPacket, TransferConfig, TransferError, UdpTransport, PACKET_SIZE,
};

async fn ephemeral() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("bind failed")
}

fn quick() -> TransferConfig {
    TransferConfig {
        handshake_deadline: Duration::from_secs(2),
        handshake_poll: Duration::from_millis(100),
        block_deadline: Duration::from_secs(2),
        block_poll: Duration::from_millis(100),
        ..TransferConfig::default()
    }
}

async fn send(socket: &UdpSocket, pkt: TftpPacket, to: SocketAddr) {
    socket.send_to(&pkt.serialize().unwrap(), to).await.unwrap();
}

/// Wait for the write request; returns the client's address.
async fn accept(listener: &UdpSocket) -> SocketAddr {
    let mut buf = [0u8; PACKET_SIZE];
    let (n, client) = listener.recv_from(&mut buf).await.unwrap();
    assert_eq!(
        TftpPacket::deserialize(&buf[..n]).unwrap(),
        TftpPacket::WRQ {
            filename: "upgrade".into(),
            mode: "octet".into()
        }
    );
    client
}

async fn upload(server: SocketAddr, content: Vec<u8>) -> Result<u64, TransferError> {
    let transport = UdpTransport::bind_for(server).await?;
    let session = Session::new(transport, server, quick(), Vec::new());
    let summary = session.upload(&mut Cursor::new(content)).await?;
    Ok(summary.bytes)
}

#[tokio::test]
async fn upload_over_loopback() {
    let listener = ephemeral().await;
    let server = listener.local_addr().unwrap();
    let content: Vec<u8> = (0..1300u32).map(|i| (i % 256) as u8).collect();

    let device = tokio::spawn(async move {
        let client = accept(&listener).await;
        let transfer = ephemeral().await;
        send(&transfer, TftpPacket::ACK(0), client).await;

        let mut received = Vec::new();
        let mut dropped_once = false;
        let mut buf = [0u8; PACKET_SIZE];
        loop {
            let (n, from) = transfer.recv_from(&mut buf).await.unwrap();
            assert_eq!(from, client);
            let TftpPacket::DATA { block, data } = TftpPacket::deserialize(&buf[..n]).unwrap()
            else {
                panic!("expected data");
            };
            // lose the first copy of block 2 to force a resend
            if block == 2 && !dropped_once {
                dropped_once = true;
                continue;
            }
            if usize::from(block) == received.len() / 512 + 1 {
                received.extend_from_slice(&data);
            }
            send(&transfer, TftpPacket::ACK(block), client).await;
            if data.len() < 512 {
                return received;
            }
        }
    });

    let sent = tokio::time::timeout(Duration::from_secs(10), upload(server, content.clone()))
        .await
        .expect("upload hung")
        .expect("upload failed");
    assert_eq!(sent, 1300);

    let received = device.await.unwrap();
    assert_eq!(received, content);
}

#[tokio::test]
async fn packets_from_other_ports_are_filtered() {
    let listener = ephemeral().await;
    let server = listener.local_addr().unwrap();

    let device = tokio::spawn(async move {
        let client = accept(&listener).await;
        let transfer = ephemeral().await;
        send(&transfer, TftpPacket::ACK(0), client).await;

        let mut buf = [0u8; PACKET_SIZE];
        let (n, _) = transfer.recv_from(&mut buf).await.unwrap();
        assert!(matches!(
            TftpPacket::deserialize(&buf[..n]).unwrap(),
            TftpPacket::DATA { block: 1, .. }
        ));
        // the original listener is no longer the peer
        let bogus = TftpPacket::ERROR {
            code: 5,
            msg: "unknown transfer ID".into(),
        };
        send(&listener, bogus, client).await;
        send(&transfer, TftpPacket::ACK(1), client).await;
    });

    let result = tokio::time::timeout(Duration::from_secs(10), upload(server, vec![1, 2, 3]))
        .await
        .expect("upload hung");
    assert_eq!(result.unwrap(), 3);
    device.await.unwrap();
}

#[tokio::test]
async fn device_error_aborts() {
    let listener = ephemeral().await;
    let server = listener.local_addr().unwrap();

    let device = tokio::spawn(async move {
        let client = accept(&listener).await;
        let refusal = TftpPacket::ERROR {
            code: 2,
            msg: "read only".into(),
        };
        send(&listener, refusal, client).await;
    });

    let result = tokio::time::timeout(Duration::from_secs(10), upload(server, vec![0; 100]))
        .await
        .expect("upload hung");
    match result {
        Err(TransferError::Remote { code, message, .. }) => {
            assert_eq!(code, ErrorCode::AccessViolation);
            assert_eq!(message, "read only");
        }
        other => panic!("unexpected result {other:?}"),
    }
    device.await.unwrap();
}

#[tokio::test]
async fn silent_device_times_out() {
    let listener = ephemeral().await;
    let server = listener.local_addr().unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), upload(server, vec![0; 100]))
        .await
        .expect("upload hung");
    assert!(matches!(result, Err(TransferError::HandshakeTimeout(_))));
    drop(listener);
}
