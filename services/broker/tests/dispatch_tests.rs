//! # Broker Integration Tests
//!
//! Drives `serve_connection` over an in-memory duplex stream exactly as a
//! client would: encoded frames in, encoded frames out.
//!
//! - declare / bind / publish flows and delivery into queues
//! - mandatory publish of an unroutable message comes back as basic.return
//! - channel-level vs connection-level failures
//! - framing errors end the connection with FRAME_ERROR
//! - configuration files drive the startup exchanges

use broker::{serve_connection, Broker, BrokerConfig, BrokerError};
use codec::{
    reply_code, BasicProperties, BasicPublish, Body, ByteCursor, ChannelClose, ChannelCloseOk,
    ChannelOpen, ConnectionClose, ConnectionCloseOk, ContentBody, ExchangeDeclare, FieldTable,
    Frame, FrameCodec, HeaderBody, MethodBody, MethodRegistry, QueueBind, QueueDeclare,
    QueueUnbind, FRAME_END,
};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

struct Client {
    stream: DuplexStream,
    codec: FrameCodec,
    input: ByteCursor,
}

impl Client {
    fn connect(broker: &Broker) -> (Self, JoinHandle<Result<(), BrokerError>>) {
        let (client, server) = duplex(64 * 1024);
        let handle = tokio::spawn(serve_connection(
            server,
            broker.codec(),
            broker.dispatcher(),
        ));
        let client = Self {
            stream: client,
            codec: FrameCodec::new(Arc::new(MethodRegistry::new())),
            input: ByteCursor::new(),
        };
        (client, handle)
    }

    fn encode(&self, channel: u16, body: impl Into<Body>) -> Vec<u8> {
        let mut cursor = ByteCursor::new();
        self.codec
            .encode(&Frame::new(channel, body), &mut cursor)
            .unwrap();
        cursor.as_slice().to_vec()
    }

    async fn send(&mut self, channel: u16, body: impl Into<Body>) {
        let bytes = self.encode(channel, body);
        self.stream.write_all(&bytes).await.unwrap();
    }

    async fn recv(&mut self) -> Frame {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.codec.decode(&mut self.input).unwrap() {
                self.input.compact();
                return frame;
            }
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed before replying");
            self.input.extend_from_slice(&buf[..n]);
        }
    }

    async fn recv_method(&mut self) -> MethodBody {
        match self.recv().await.into_body() {
            Some(Body::Method(method)) => method,
            other => panic!("expected method frame, got {:?}", other),
        }
    }

    async fn open(&mut self, channel: u16) {
        self.send(channel, ChannelOpen::default()).await;
        assert_eq!(self.recv_method().await.name(), "channel.open-ok");
    }

    /// Queue depth as reported by a passive declare
    async fn message_count(&mut self, channel: u16, queue: &str) -> u32 {
        self.send(
            channel,
            QueueDeclare {
                queue: queue.into(),
                passive: true,
                ..Default::default()
            },
        )
        .await;
        match self.recv_method().await {
            MethodBody::QueueDeclareOk(ok) => ok.message_count,
            other => panic!("expected queue.declare-ok, got {}", other.name()),
        }
    }
}

fn broker() -> Broker {
    Broker::from_config(BrokerConfig::default()).unwrap()
}

fn publish(exchange: &str, routing_key: &str, mandatory: bool) -> BasicPublish {
    BasicPublish {
        exchange: exchange.into(),
        routing_key: routing_key.into(),
        mandatory,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_topic_publish_reaches_bound_queue() {
    let broker = broker();
    let (mut client, _handle) = Client::connect(&broker);
    client.open(1).await;

    client
        .send(
            1,
            ExchangeDeclare {
                exchange: "market".into(),
                kind: "topic".into(),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(client.recv_method().await.name(), "exchange.declare-ok");

    client
        .send(
            1,
            QueueDeclare {
                queue: "quotes".into(),
                ..Default::default()
            },
        )
        .await;
    match client.recv_method().await {
        MethodBody::QueueDeclareOk(ok) => assert_eq!(ok.queue, "quotes"),
        other => panic!("unexpected {}", other.name()),
    }

    client
        .send(
            1,
            QueueBind {
                queue: "quotes".into(),
                exchange: "market".into(),
                routing_key: "*.stock.quote".into(),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(client.recv_method().await.name(), "queue.bind-ok");

    for key in ["usd.stock.quote", "usd.stock.quote.extra", "stock.quote"] {
        client.send(1, publish("market", key, false)).await;
        client
            .send(1, HeaderBody::basic(2, BasicProperties::default()))
            .await;
        client.send(1, ContentBody::new(&b"42"[..])).await;
    }

    assert_eq!(client.message_count(1, "quotes").await, 1);
    let message = broker.queues().get("quotes").unwrap().pop().unwrap();
    assert_eq!(message.routing_key, "usd.stock.quote");
    assert_eq!(&message.payload[..], b"42");
}

#[tokio::test]
async fn test_frames_split_at_every_byte() {
    let broker = broker();
    let (mut client, _handle) = Client::connect(&broker);
    client.open(1).await;
    client
        .send(
            1,
            QueueDeclare {
                queue: "inbox".into(),
                ..Default::default()
            },
        )
        .await;
    client.recv_method().await;

    let properties = BasicProperties {
        content_type: Some("text/plain".into()),
        ..Default::default()
    };
    let mut bytes = client.encode(1, publish("", "inbox", false));
    bytes.extend(client.encode(1, HeaderBody::basic(11, properties.clone())));
    bytes.extend(client.encode(1, ContentBody::new(&b"hello "[..])));
    bytes.extend(client.encode(1, ContentBody::new(&b"world"[..])));
    for byte in bytes {
        client.stream.write_all(&[byte]).await.unwrap();
        client.stream.flush().await.unwrap();
    }

    assert_eq!(client.message_count(1, "inbox").await, 1);
    let message = broker.queues().get("inbox").unwrap().pop().unwrap();
    assert_eq!(&message.payload[..], b"hello world");
    assert_eq!(message.properties, properties);
}

#[tokio::test]
async fn test_mandatory_unroutable_is_returned() {
    let broker = broker();
    let (mut client, _handle) = Client::connect(&broker);
    client.open(2).await;

    let mut headers = FieldTable::new();
    headers.insert("trace", "abc");
    let properties = BasicProperties {
        headers: Some(headers),
        ..Default::default()
    };

    client.send(2, publish("amq.direct", "nobody", true)).await;
    client
        .send(2, HeaderBody::basic(4, properties.clone()))
        .await;
    client.send(2, ContentBody::new(&b"ping"[..])).await;

    match client.recv_method().await {
        MethodBody::BasicReturn(ret) => {
            assert_eq!(ret.reply_code, reply_code::NO_ROUTE);
            assert_eq!(ret.exchange, "amq.direct");
            assert_eq!(ret.routing_key, "nobody");
        }
        other => panic!("expected basic.return, got {}", other.name()),
    }
    let header = client.recv().await;
    assert_eq!(
        header.body,
        Some(Body::Header(HeaderBody::basic(4, properties)))
    );
    let content = client.recv().await;
    assert_eq!(content.body, Some(Body::Content(ContentBody::new(&b"ping"[..]))));
}

#[tokio::test]
async fn test_non_mandatory_unroutable_is_dropped() {
    let broker = broker();
    let (mut client, _handle) = Client::connect(&broker);
    client.open(1).await;

    client.send(1, publish("amq.fanout", "", false)).await;
    client
        .send(1, HeaderBody::basic(1, BasicProperties::default()))
        .await;
    client.send(1, ContentBody::new(&b"x"[..])).await;

    // next reply belongs to the next command; nothing came back for the publish
    client.send(1, ChannelClose::default()).await;
    assert_eq!(client.recv_method().await.name(), "channel.close-ok");
}

#[tokio::test]
async fn test_unbind_stops_delivery() {
    let broker = broker();
    let (mut client, _handle) = Client::connect(&broker);
    client.open(1).await;
    client
        .send(
            1,
            QueueDeclare {
                queue: "q".into(),
                ..Default::default()
            },
        )
        .await;
    client.recv_method().await;

    client
        .send(
            1,
            QueueBind {
                exchange: "amq.direct".into(),
                routing_key: "abc".into(),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(client.recv_method().await.name(), "queue.bind-ok");

    client
        .send(
            1,
            QueueUnbind {
                queue: "q".into(),
                exchange: "amq.direct".into(),
                routing_key: "abc".into(),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(client.recv_method().await.name(), "queue.unbind-ok");

    client.send(1, publish("amq.direct", "abc", true)).await;
    client
        .send(1, HeaderBody::basic(0, BasicProperties::default()))
        .await;
    assert_eq!(client.recv_method().await.name(), "basic.return");
    // returned header; an empty body has no content frames
    assert!(matches!(client.recv().await.body, Some(Body::Header(_))));
    assert_eq!(client.message_count(1, "q").await, 0);
}

#[tokio::test]
async fn test_channel_error_closes_only_the_channel() {
    let broker = broker();
    let (mut client, _handle) = Client::connect(&broker);
    client.open(1).await;
    client.open(2).await;

    client
        .send(
            1,
            QueueDeclare {
                queue: "q".into(),
                ..Default::default()
            },
        )
        .await;
    client.recv_method().await;
    client
        .send(
            1,
            QueueBind {
                queue: "q".into(),
                exchange: "missing".into(),
                routing_key: "k".into(),
                ..Default::default()
            },
        )
        .await;
    match client.recv_method().await {
        MethodBody::ChannelClose(close) => {
            assert_eq!(close.reply_code, reply_code::NOT_FOUND);
            assert_eq!((close.class_id, close.method_id), (50, 20));
            assert!(close.reply_text.contains("missing"));
        }
        other => panic!("expected channel.close, got {}", other.name()),
    }
    client.send(1, ChannelCloseOk).await;

    // channel 2 is unaffected and channel 1 can be reopened
    assert_eq!(client.message_count(2, "q").await, 0);
    client.open(1).await;
}

#[tokio::test]
async fn test_content_without_publish_closes_connection() {
    let broker = broker();
    let (mut client, handle) = Client::connect(&broker);
    client.open(1).await;

    client.send(1, ContentBody::new(&b"stray"[..])).await;
    match client.recv_method().await {
        MethodBody::ConnectionClose(close) => {
            assert_eq!(close.reply_code, reply_code::UNEXPECTED_FRAME)
        }
        other => panic!("expected connection.close, got {}", other.name()),
    }
    assert!(handle.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_bad_terminator_is_frame_error() {
    let broker = broker();
    let (mut client, handle) = Client::connect(&broker);

    let mut bytes = client.encode(1, ChannelOpen::default());
    let last = bytes.len() - 1;
    assert_eq!(bytes[last], FRAME_END);
    bytes[last] = 0x00;
    client.stream.write_all(&bytes).await.unwrap();

    match client.recv_method().await {
        MethodBody::ConnectionClose(close) => {
            assert_eq!(close.reply_code, reply_code::FRAME_ERROR);
            assert!(close.reply_text.contains("Frame end not found"));
        }
        other => panic!("expected connection.close, got {}", other.name()),
    }
    assert!(matches!(
        handle.await.unwrap(),
        Err(BrokerError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_close_handshake_bytes() {
    let broker = broker();
    let codec = broker.codec();
    let encode = |frame: Frame| {
        let mut cursor = ByteCursor::new();
        codec.encode(&frame, &mut cursor).unwrap();
        cursor.as_slice().to_vec()
    };

    let close = encode(Frame::new(
        0,
        ConnectionClose {
            reply_code: 200,
            reply_text: "bye".into(),
            ..Default::default()
        },
    ));
    let close_ok = encode(Frame::new(0, ConnectionCloseOk));

    let mock = tokio_test::io::Builder::new()
        .read(&close)
        .write(&close_ok)
        .build();
    serve_connection(mock, broker.codec(), broker.dispatcher())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_peer_eof_ends_connection() {
    let broker = broker();
    let (client, handle) = Client::connect(&broker);
    drop(client);
    assert!(handle.await.unwrap().is_ok());
}

#[test]
fn test_config_file_declares_exchanges() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[server]
port = 15672

[exchanges]
declare_defaults = true

[[exchanges.declare]]
name = "market.ticks"
kind = "topic"

[[exchanges.declare]]
name = "alerts"
kind = "headers"
"#
    )
    .unwrap();

    let config = BrokerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.listen_address(), "127.0.0.1:15672");

    let broker = Broker::from_config(config).unwrap();
    let names = broker.exchanges().names();
    let expected = [
        "",
        "amq.direct",
        "amq.topic",
        "amq.fanout",
        "amq.match",
        "market.ticks",
        "alerts",
    ];
    for name in expected {
        assert!(names.iter().any(|n| n == name), "missing exchange {:?}", name);
    }
}

#[test]
fn test_missing_config_file() {
    let err = BrokerConfig::from_file("/nonexistent/burrow.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
