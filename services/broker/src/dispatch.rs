//! # Command Dispatcher
//!
//! ## Purpose
//!
//! Applies decoded frames from one connection to the broker's exchange and
//! queue registries and produces the reply frames. One `Dispatcher` per
//! connection; the registries behind it are shared by every connection.
//!
//! ## Frame Flow
//!
//! ```text
//! channel.open      → channel.open-ok
//! exchange.*        → ExchangeRegistry           → -ok (unless nowait)
//! queue.declare     → QueueTable + default bind  → queue.declare-ok
//! queue.bind/unbind → ExchangeRegistry           → -ok
//! basic.publish ─┐
//! content header ├─ assembled per channel → ExchangeRegistry::publish
//! content body*  ┘     mandatory + unroutable → basic.return + header + body
//! ```
//!
//! ## Failure Handling
//!
//! - Command failures (unknown exchange, reserved name, ...) close only the
//!   channel: `channel.close` with the reply code, then every frame on that
//!   channel is discarded until the client's `channel.close-ok`.
//! - Protocol misuse (content without a publish, methods on an unopened
//!   channel) closes the connection with `connection.close`.

use crate::queues::QueueTable;
use crate::{BrokerError, BrokerResult};
use bytes::{Bytes, BytesMut};
use codec::{
    reply_code, BasicPublish, BasicReturn, Body, ChannelClose, ChannelCloseOk, ChannelOpenOk,
    ConnectionClose, ConnectionCloseOk, ContentBody, ExchangeDeclare, ExchangeDeclareOk,
    ExchangeDelete, ExchangeDeleteOk, Frame, HeaderBody, Method, MethodBody, QueueBind,
    QueueBindOk, QueueDeclare, QueueDeclareOk, QueueUnbind, QueueUnbindOk,
    DEFAULT_MAX_FRAME_SIZE, FRAME_OVERHEAD,
};
use exchange::{
    ExchangeError, ExchangeKind, ExchangeRegistry, Message, QueueRef, DEFAULT_EXCHANGE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Channel reserved for connection-class methods
pub const CONNECTION_CHANNEL: u16 = 0;

/// Reply texts are short strings on the wire
const MAX_REPLY_TEXT: usize = 255;

/// Whether the connection should keep reading after a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// A publish waiting for its content header and bodies
#[derive(Debug)]
struct PendingContent {
    publish: BasicPublish,
    header: Option<HeaderBody>,
    payload: BytesMut,
}

#[derive(Debug, Default)]
struct ChannelState {
    /// Sent channel.close; waiting for close-ok
    closing: bool,
    /// Target of `queue.bind` / `queue.unbind` with an empty queue name
    last_queue: Option<String>,
    pending: Option<PendingContent>,
}

/// Error plus the method that caused it
#[derive(Debug)]
struct Failure {
    error: BrokerError,
    class_id: u16,
    method_id: u16,
}

impl Failure {
    fn new(error: BrokerError, class_id: u16, method_id: u16) -> Self {
        Self {
            error,
            class_id,
            method_id,
        }
    }
}

impl From<BrokerError> for Failure {
    fn from(error: BrokerError) -> Self {
        Self::new(error, 0, 0)
    }
}

/// Per-connection command processor
#[derive(Debug)]
pub struct Dispatcher {
    exchanges: Arc<ExchangeRegistry>,
    queues: Arc<QueueTable>,
    channels: HashMap<u16, ChannelState>,
    max_frame_size: usize,
    closing: bool,
}

impl Dispatcher {
    pub fn new(exchanges: Arc<ExchangeRegistry>, queues: Arc<QueueTable>) -> Self {
        Self {
            exchanges,
            queues,
            channels: HashMap::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            closing: false,
        }
    }

    /// Frame size used when splitting returned content
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn open_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn is_open(&self, channel: u16) -> bool {
        self.channels
            .get(&channel)
            .map(|state| !state.closing)
            .unwrap_or(false)
    }

    /// Apply one frame, appending any replies to `replies`
    pub fn dispatch(&mut self, frame: Frame, replies: &mut Vec<Frame>) -> Flow {
        if self.closing {
            return Flow::Close;
        }

        let channel = frame.channel;
        let result = match frame.body {
            None | Some(Body::Heartbeat(_)) => Ok(Flow::Continue),
            Some(Body::Method(method)) => {
                let (class_id, method_id) = (method.class_id(), method.method_id());
                self.handle_method(channel, method, replies)
                    .map_err(|error| Failure::new(error, class_id, method_id))
            }
            Some(Body::Header(header)) => self.handle_header(channel, header, replies),
            Some(Body::Content(content)) => self.handle_content(channel, content, replies),
        };

        match result {
            Ok(flow) => flow,
            Err(failure) => self.fail(channel, failure, replies),
        }
    }

    fn fail(&mut self, channel: u16, failure: Failure, replies: &mut Vec<Frame>) -> Flow {
        let reply_code = failure.error.reply_code();
        let reply_text = reply_text(&failure.error);

        if failure.error.is_connection_error() || channel == CONNECTION_CHANNEL {
            warn!(
                "Closing connection on channel {} error: {}",
                channel, failure.error
            );
            replies.push(Frame::new(
                CONNECTION_CHANNEL,
                ConnectionClose {
                    reply_code,
                    reply_text,
                    class_id: failure.class_id,
                    method_id: failure.method_id,
                },
            ));
            self.closing = true;
            return Flow::Close;
        }

        warn!("Closing channel {}: {}", channel, failure.error);
        let state = self.channels.entry(channel).or_default();
        state.closing = true;
        state.pending = None;
        replies.push(Frame::new(
            channel,
            ChannelClose {
                reply_code,
                reply_text,
                class_id: failure.class_id,
                method_id: failure.method_id,
            },
        ));
        Flow::Continue
    }

    fn handle_method(
        &mut self,
        channel: u16,
        method: MethodBody,
        replies: &mut Vec<Frame>,
    ) -> BrokerResult<Flow> {
        match method {
            MethodBody::ConnectionClose(close) => {
                info!(
                    "Client closed connection: {} {}",
                    close.reply_code, close.reply_text
                );
                replies.push(Frame::new(CONNECTION_CHANNEL, ConnectionCloseOk));
                self.closing = true;
                return Ok(Flow::Close);
            }
            MethodBody::ConnectionCloseOk(_) => {
                self.closing = true;
                return Ok(Flow::Close);
            }
            _ => {}
        }

        if channel == CONNECTION_CHANNEL {
            return Err(BrokerError::CommandInvalid(format!(
                "{} is not allowed on channel 0",
                method.name()
            )));
        }

        if let MethodBody::ChannelOpen(_) = method {
            if self.channels.contains_key(&channel) {
                return Err(BrokerError::Channel(format!(
                    "channel {} is already open",
                    channel
                )));
            }
            self.channels.insert(channel, ChannelState::default());
            debug!("Channel {} opened", channel);
            replies.push(Frame::new(channel, ChannelOpenOk));
            return Ok(Flow::Continue);
        }

        let state = self
            .channels
            .get_mut(&channel)
            .ok_or_else(|| BrokerError::Channel(format!("channel {} is not open", channel)))?;

        match method {
            MethodBody::ChannelClose(close) => {
                debug!(
                    "Client closed channel {}: {} {}",
                    channel, close.reply_code, close.reply_text
                );
                self.channels.remove(&channel);
                replies.push(Frame::new(channel, ChannelCloseOk));
                return Ok(Flow::Continue);
            }
            MethodBody::ChannelCloseOk(_) => {
                self.channels.remove(&channel);
                return Ok(Flow::Continue);
            }
            _ if state.closing => return Ok(Flow::Continue),
            _ => {}
        }

        if state.pending.is_some() {
            return Err(BrokerError::UnexpectedFrame(format!(
                "{} on channel {} while basic.publish content is outstanding",
                method.name(),
                channel
            )));
        }

        let reply = match method {
            MethodBody::ExchangeDeclare(m) => exchange_declare(&self.exchanges, m)?,
            MethodBody::ExchangeDelete(m) => exchange_delete(&self.exchanges, m)?,
            MethodBody::QueueDeclare(m) => queue_declare(&self.exchanges, &self.queues, state, m)?,
            MethodBody::QueueBind(m) => queue_bind(&self.exchanges, &self.queues, state, m)?,
            MethodBody::QueueUnbind(m) => queue_unbind(&self.exchanges, &self.queues, state, m)?,
            MethodBody::BasicPublish(m) => {
                start_publish(&self.exchanges, state, m)?;
                None
            }
            other => {
                return Err(BrokerError::CommandInvalid(format!(
                    "unexpected method {} from client",
                    other.name()
                )))
            }
        };

        if let Some(reply) = reply {
            replies.push(Frame::new(channel, reply));
        }
        Ok(Flow::Continue)
    }

    fn handle_header(
        &mut self,
        channel: u16,
        header: HeaderBody,
        replies: &mut Vec<Frame>,
    ) -> Result<Flow, Failure> {
        let state = self.content_state(channel, "content header")?;
        if state.closing {
            return Ok(Flow::Continue);
        }

        let pending = match state.pending.as_mut() {
            Some(pending) if pending.header.is_none() => pending,
            _ => {
                return Err(BrokerError::UnexpectedFrame(format!(
                    "content header on channel {} without basic.publish",
                    channel
                ))
                .into())
            }
        };
        if header.class_id != HeaderBody::BASIC_CLASS_ID {
            return Err(BrokerError::UnexpectedFrame(format!(
                "content header for class {} on channel {}",
                header.class_id, channel
            ))
            .into());
        }

        pending.header = Some(header);
        self.complete_publish(channel, replies)
    }

    fn handle_content(
        &mut self,
        channel: u16,
        content: ContentBody,
        replies: &mut Vec<Frame>,
    ) -> Result<Flow, Failure> {
        let state = self.content_state(channel, "content body")?;
        if state.closing {
            return Ok(Flow::Continue);
        }

        let (pending, body_size) = match state.pending.as_mut() {
            Some(pending) => match pending.header.as_ref().map(|h| h.body_size) {
                Some(body_size) => (pending, body_size),
                None => {
                    return Err(BrokerError::UnexpectedFrame(format!(
                        "content body on channel {} before its content header",
                        channel
                    ))
                    .into())
                }
            },
            None => {
                return Err(BrokerError::UnexpectedFrame(format!(
                    "content body on channel {} without basic.publish",
                    channel
                ))
                .into())
            }
        };

        pending.payload.extend_from_slice(&content.payload);
        if pending.payload.len() as u64 > body_size {
            return Err(BrokerError::UnexpectedFrame(format!(
                "content on channel {} exceeds declared body size {}",
                channel, body_size
            ))
            .into());
        }
        self.complete_publish(channel, replies)
    }

    fn content_state(&mut self, channel: u16, what: &str) -> Result<&mut ChannelState, Failure> {
        self.channels.get_mut(&channel).ok_or_else(|| {
            BrokerError::UnexpectedFrame(format!("{} on unopened channel {}", what, channel))
                .into()
        })
    }

    /// Publish the assembled message once every declared byte has arrived
    fn complete_publish(
        &mut self,
        channel: u16,
        replies: &mut Vec<Frame>,
    ) -> Result<Flow, Failure> {
        let Some(state) = self.channels.get_mut(&channel) else {
            return Ok(Flow::Continue);
        };
        let ready = matches!(
            &state.pending,
            Some(PendingContent { header: Some(header), payload, .. })
                if payload.len() as u64 == header.body_size
        );
        if !ready {
            return Ok(Flow::Continue);
        }
        let Some(PendingContent {
            publish,
            header: Some(header),
            payload,
        }) = state.pending.take()
        else {
            return Ok(Flow::Continue);
        };

        self.publish(channel, publish, header, payload.freeze(), replies)
            .map_err(|error| Failure::new(error, BasicPublish::CLASS_ID, BasicPublish::METHOD_ID))
    }

    fn publish(
        &self,
        channel: u16,
        publish: BasicPublish,
        header: HeaderBody,
        payload: Bytes,
        replies: &mut Vec<Frame>,
    ) -> BrokerResult<Flow> {
        let message = Arc::new(
            Message::new(
                publish.exchange.as_str(),
                publish.routing_key.as_str(),
                payload,
            )
            .with_properties(header.properties.clone()),
        );
        let matched = self.exchanges.publish(
            &publish.exchange,
            &publish.routing_key,
            message.headers(),
            Arc::clone(&message),
        )?;
        debug!(
            "Published {} bytes to exchange '{}' with key '{}': {} queues",
            message.size(),
            publish.exchange,
            publish.routing_key,
            matched
        );

        if matched == 0 && publish.mandatory {
            debug!(
                "Returning unroutable mandatory message on channel {}",
                channel
            );
            replies.push(Frame::new(
                channel,
                BasicReturn {
                    reply_code: reply_code::NO_ROUTE,
                    reply_text: "NO_ROUTE".to_string(),
                    exchange: publish.exchange,
                    routing_key: publish.routing_key,
                },
            ));
            replies.push(Frame::new(channel, header));
            self.push_content(channel, &message.payload, replies);
        }
        Ok(Flow::Continue)
    }

    /// Split `payload` into content frames no larger than the frame limit
    fn push_content(&self, channel: u16, payload: &Bytes, replies: &mut Vec<Frame>) {
        let chunk = self.max_frame_size.saturating_sub(FRAME_OVERHEAD).max(1);
        let mut offset = 0;
        while offset < payload.len() {
            let end = (offset + chunk).min(payload.len());
            replies.push(Frame::new(channel, ContentBody::new(payload.slice(offset..end))));
            offset = end;
        }
    }
}

fn exchange_declare(
    exchanges: &ExchangeRegistry,
    m: ExchangeDeclare,
) -> BrokerResult<Option<MethodBody>> {
    if m.passive {
        if !exchanges.contains(&m.exchange) {
            return Err(ExchangeError::NotFound(m.exchange).into());
        }
    } else {
        let kind: ExchangeKind = m.kind.parse()?;
        exchanges.declare_exchange(&m.exchange, kind)?;
    }
    Ok((!m.nowait).then(|| ExchangeDeclareOk.into()))
}

fn exchange_delete(
    exchanges: &ExchangeRegistry,
    m: ExchangeDelete,
) -> BrokerResult<Option<MethodBody>> {
    exchanges.delete_exchange(&m.exchange, m.if_unused)?;
    Ok((!m.nowait).then(|| ExchangeDeleteOk.into()))
}

fn queue_declare(
    exchanges: &ExchangeRegistry,
    queues: &QueueTable,
    state: &mut ChannelState,
    m: QueueDeclare,
) -> BrokerResult<Option<MethodBody>> {
    let declared = queues.declare(&m.queue, m.passive)?;
    if declared.created {
        let queue = QueueRef::from(Arc::clone(&declared.queue));
        if let Err(e) = exchanges.bind(DEFAULT_EXCHANGE, queue, &declared.name, None) {
            debug!(
                "Queue {} not bound to the default exchange: {}",
                declared.name, e
            );
        }
    }

    let message_count = u32::try_from(declared.queue.len()).unwrap_or(u32::MAX);
    state.last_queue = Some(declared.name.clone());
    Ok((!m.nowait).then(|| {
        QueueDeclareOk {
            queue: declared.name,
            message_count,
            consumer_count: 0,
        }
        .into()
    }))
}

/// Resolve a queue name, where `""` means the channel's last declared queue
fn resolve_queue(
    queues: &QueueTable,
    state: &ChannelState,
    name: &str,
) -> BrokerResult<QueueRef> {
    if name.is_empty() {
        let last = state
            .last_queue
            .as_deref()
            .ok_or_else(|| BrokerError::QueueNotFound(String::new()))?;
        return queues.lookup(last);
    }
    queues.lookup(name)
}

fn queue_bind(
    exchanges: &ExchangeRegistry,
    queues: &QueueTable,
    state: &mut ChannelState,
    m: QueueBind,
) -> BrokerResult<Option<MethodBody>> {
    let queue = resolve_queue(queues, state, &m.queue)?;
    exchanges.bind(&m.exchange, queue, &m.routing_key, Some(&m.arguments))?;
    Ok((!m.nowait).then(|| QueueBindOk.into()))
}

fn queue_unbind(
    exchanges: &ExchangeRegistry,
    queues: &QueueTable,
    state: &mut ChannelState,
    m: QueueUnbind,
) -> BrokerResult<Option<MethodBody>> {
    let queue = resolve_queue(queues, state, &m.queue)?;
    exchanges.unbind(&m.exchange, &queue, &m.routing_key, Some(&m.arguments))?;
    Ok(Some(QueueUnbindOk.into()))
}

fn start_publish(
    exchanges: &ExchangeRegistry,
    state: &mut ChannelState,
    m: BasicPublish,
) -> BrokerResult<()> {
    if m.immediate {
        return Err(BrokerError::NotImplemented(
            "immediate delivery is not supported".to_string(),
        ));
    }
    if !exchanges.contains(&m.exchange) {
        return Err(ExchangeError::NotFound(m.exchange).into());
    }
    state.pending = Some(PendingContent {
        publish: m,
        header: None,
        payload: BytesMut::new(),
    });
    Ok(())
}

/// `connection.close` frame for `error`, e.g. after a framing failure
pub fn connection_close(error: &BrokerError) -> Frame {
    Frame::new(
        CONNECTION_CHANNEL,
        ConnectionClose {
            reply_code: error.reply_code(),
            reply_text: reply_text(error),
            class_id: 0,
            method_id: 0,
        },
    )
}

fn reply_text(error: &BrokerError) -> String {
    let mut text = error.to_string();
    if text.len() > MAX_REPLY_TEXT {
        let mut end = MAX_REPLY_TEXT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
