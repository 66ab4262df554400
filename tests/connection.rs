//! End-to-end tests over loopback TCP.
//!
//! The server side parses the request head with a plain `BufReader`, the
//! way a minimal HTTP layer would, and hands the reader to `accept`.

use std::collections::HashMap;
use std::time::Duration;

use hijack_ws::protocol::{apply_mask, decode};
use hijack_ws::{Connection, ConnectionState, Error, OpCode, Packet, accept};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
const ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

type ServerConn = Connection<TcpStream>;

async fn read_head(reader: &mut BufReader<TcpStream>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let mut line = String::new();
    loop {
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            return headers;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
}

fn request(key: Option<&str>) -> String {
    let mut req = String::from(
        "GET /chat HTTP/1.1\r\n\
         Host: localhost\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Version: 13\r\n",
    );
    if let Some(key) = key {
        req.push_str(&format!("Sec-WebSocket-Key: {key}\r\n"));
    }
    req.push_str("\r\n");
    req
}

/// Read the response head one byte at a time so no frame bytes are consumed.
async fn read_response(client: &mut TcpStream) -> String {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(client.read_u8().await.unwrap());
    }
    String::from_utf8(head).unwrap()
}

async fn upgraded_pair() -> (ServerConn, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let headers = read_head(&mut reader).await;
        accept(&headers, reader).await.unwrap()
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(request(Some(KEY)).as_bytes()).await.unwrap();
    let response = read_response(&mut client).await;
    assert!(response.contains(ACCEPT));

    (server.await.unwrap(), client)
}

fn masked(opcode: OpCode, payload: &[u8]) -> Vec<u8> {
    let mask = [0x37, 0xfa, 0x21, 0x3d];
    let mut data = payload.to_vec();
    apply_mask(&mut data, mask);
    let mut frame = vec![opcode.as_u8(), 0x80 | payload.len() as u8];
    frame.extend_from_slice(&mask);
    frame.extend_from_slice(&data);
    frame
}

async fn read_packet(client: &mut TcpStream) -> Packet {
    let mut buf = Vec::new();
    loop {
        match decode(&buf) {
            Ok((packet, _)) => return packet,
            Err(e) if e.is_incomplete() => buf.push(client.read_u8().await.unwrap()),
            Err(e) => panic!("decode failed: {e}"),
        }
    }
}

async fn wait_for_subscriber(conn: &ServerConn) {
    while conn.subscriber_count().await == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn test_handshake_response_is_exact() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let headers = read_head(&mut reader).await;
        accept(&headers, reader).await.unwrap()
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(request(Some(KEY)).as_bytes()).await.unwrap();

    assert_eq!(
        read_response(&mut client).await,
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
         \r\n"
    );
    assert_eq!(server.await.unwrap().state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_missing_key_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let headers = read_head(&mut reader).await;
        accept(&headers, reader).await.map(|_| ())
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(request(None).as_bytes()).await.unwrap();

    assert!(matches!(server.await.unwrap(), Err(Error::Handshake(_))));
}

#[tokio::test]
async fn test_text_and_binary_reach_subscribers() {
    let (conn, mut client) = upgraded_pair().await;

    let received = tokio::spawn({
        let conn = conn.clone();
        async move {
            conn.subscribe(|mut sub| async move {
                let mut packets = Vec::new();
                while let Some(packet) = sub.recv().await {
                    packets.push(packet);
                }
                packets
            })
            .await
        }
    });
    wait_for_subscriber(&conn).await;

    client.write_all(&masked(OpCode::Text, b"abcd")).await.unwrap();
    client.write_all(&masked(OpCode::Binary, &[0, 1, 2])).await.unwrap();
    client.write_all(&masked(OpCode::Close, b"")).await.unwrap();

    assert_eq!(
        received.await.unwrap(),
        vec![Packet::text("abcd"), Packet::binary(vec![0, 1, 2])]
    );
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_every_subscriber_gets_a_copy() {
    let (conn, mut client) = upgraded_pair().await;

    let spawn_subscriber = |conn: ServerConn| {
        tokio::spawn(async move {
            conn.subscribe(|mut sub| async move { sub.recv().await })
                .await
        })
    };
    let first = spawn_subscriber(conn.clone());
    let second = spawn_subscriber(conn.clone());
    while conn.subscriber_count().await < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    client.write_all(&masked(OpCode::Text, b"fan-out")).await.unwrap();

    assert_eq!(first.await.unwrap(), Some(Packet::text("fan-out")));
    assert_eq!(second.await.unwrap(), Some(Packet::text("fan-out")));
}

#[tokio::test]
async fn test_ping_pong_round_trip() {
    let (conn, mut client) = upgraded_pair().await;

    client.write_all(&masked(OpCode::Ping, b"hello")).await.unwrap();
    assert_eq!(read_packet(&mut client).await, Packet::pong(&b"hello"[..]));

    let checker = conn.clone();
    let check = tokio::spawn(async move { checker.check_alive(Duration::from_secs(5)).await });
    assert_eq!(read_packet(&mut client).await, Packet::ping(&b""[..]));
    client.write_all(&masked(OpCode::Pong, b"")).await.unwrap();
    assert_eq!(check.await.unwrap(), Ok(true));

    // One pong per ping and nothing else before the close frame
    conn.shutdown().await.unwrap();
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert_eq!(rest, Packet::close().encode().unwrap());
}

#[tokio::test]
async fn test_check_alive_times_out_on_silent_peer() {
    let (conn, mut client) = upgraded_pair().await;

    assert_eq!(conn.check_alive(Duration::from_millis(50)).await, Ok(false));
    // The ping went out even though nobody answered
    assert_eq!(read_packet(&mut client).await.opcode, OpCode::Ping);
}

#[tokio::test]
async fn test_server_send_is_unmasked() {
    let (conn, mut client) = upgraded_pair().await;
    conn.send_text("Hello").await.unwrap();

    let mut buf = [0u8; 7];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
}

#[tokio::test]
async fn test_shutdown_closes_stream() {
    let (conn, mut client) = upgraded_pair().await;
    conn.shutdown().await.unwrap();

    assert_eq!(read_packet(&mut client).await, Packet::close());
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    assert_eq!(conn.shutdown().await, Err(Error::ConnectionClosed));
}

#[tokio::test]
async fn test_peer_disconnect_ends_subscriptions() {
    let (conn, client) = upgraded_pair().await;

    let received = tokio::spawn({
        let conn = conn.clone();
        async move { conn.subscribe(|mut sub| async move { sub.recv().await }).await }
    });
    wait_for_subscriber(&conn).await;

    drop(client);
    assert_eq!(received.await.unwrap(), None);
    assert_eq!(conn.state(), ConnectionState::Closed);
}
