//! # Method Bodies (AMQP 8-0)
//!
//! Typed method bodies for the connection, channel, exchange, queue and basic
//! classes. Each struct implements [`Method`], which carries its class/method
//! ids and knows how to read, write and size its argument list. The
//! [`MethodBody`] sum type wraps them all so frame decoding stays exhaustive.
//!
//! ## Wire layout
//!
//! ```text
//! class_id:u16 | method_id:u16 | arguments...
//! ```
//!
//! Consecutive boolean arguments share one octet, packed least-significant
//! bit first.

use crate::body::Body;
use crate::buffer::{short_string_size, ByteCursor};
use crate::error::ProtocolResult;
use crate::field_table::FieldTable;

/// A protocol command with a fixed class and method id
pub trait Method: Sized {
    const CLASS_ID: u16;
    const METHOD_ID: u16;
    const NAME: &'static str;

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self>;
    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()>;
    fn fields_size(&self) -> usize;
}

fn pack_bits(bits: &[bool]) -> u8 {
    bits.iter()
        .enumerate()
        .fold(0u8, |acc, (i, &set)| if set { acc | (1 << i) } else { acc })
}

fn bit(octet: u8, index: u8) -> bool {
    octet & (1 << index) != 0
}

/// Decode `M` and wrap it; used as the registry's constructor entry
pub(crate) fn decode_method<M>(cursor: &mut ByteCursor) -> ProtocolResult<MethodBody>
where
    M: Method + Into<MethodBody>,
{
    M::decode_fields(cursor).map(Into::into)
}

macro_rules! empty_method {
    ($(#[$meta:meta])* $name:ident, $class:expr, $method:expr, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl Method for $name {
            const CLASS_ID: u16 = $class;
            const METHOD_ID: u16 = $method;
            const NAME: &'static str = $label;

            fn decode_fields(_cursor: &mut ByteCursor) -> ProtocolResult<Self> {
                Ok($name)
            }

            fn encode_fields(&self, _cursor: &mut ByteCursor) -> ProtocolResult<()> {
                Ok(())
            }

            fn fields_size(&self) -> usize {
                0
            }
        }
    };
}

macro_rules! method_bodies {
    ($($variant:ident),* $(,)?) => {
        /// Every method body this codec can decode
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum MethodBody {
            $($variant($variant),)*
        }

        impl MethodBody {
            pub fn class_id(&self) -> u16 {
                match self {
                    $(MethodBody::$variant(_) => <$variant as Method>::CLASS_ID,)*
                }
            }

            pub fn method_id(&self) -> u16 {
                match self {
                    $(MethodBody::$variant(_) => <$variant as Method>::METHOD_ID,)*
                }
            }

            /// Dotted protocol name, e.g. `queue.bind`
            pub fn name(&self) -> &'static str {
                match self {
                    $(MethodBody::$variant(_) => <$variant as Method>::NAME,)*
                }
            }

            fn fields_size(&self) -> usize {
                match self {
                    $(MethodBody::$variant(m) => m.fields_size(),)*
                }
            }

            fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
                match self {
                    $(MethodBody::$variant(m) => m.encode_fields(cursor),)*
                }
            }
        }

        $(
            impl From<$variant> for MethodBody {
                fn from(method: $variant) -> Self {
                    MethodBody::$variant(method)
                }
            }

            impl From<$variant> for Body {
                fn from(method: $variant) -> Self {
                    Body::Method(MethodBody::$variant(method))
                }
            }
        )*
    };
}

method_bodies! {
    ConnectionClose,
    ConnectionCloseOk,
    ChannelOpen,
    ChannelOpenOk,
    ChannelClose,
    ChannelCloseOk,
    ExchangeDeclare,
    ExchangeDeclareOk,
    ExchangeDelete,
    ExchangeDeleteOk,
    QueueDeclare,
    QueueDeclareOk,
    QueueBind,
    QueueBindOk,
    QueueUnbind,
    QueueUnbindOk,
    BasicPublish,
    BasicReturn,
    BasicDeliver,
}

impl MethodBody {
    /// Encoded length: class id, method id and arguments
    pub fn size(&self) -> usize {
        4 + self.fields_size()
    }

    pub fn encode(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.class_id());
        cursor.put_short(self.method_id());
        self.encode_fields(cursor)
    }

    /// Methods followed by a content header and content bodies
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            MethodBody::BasicPublish(_) | MethodBody::BasicReturn(_) | MethodBody::BasicDeliver(_)
        )
    }
}

// connection

/// Close the connection with a reply code naming the failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionClose {
    pub reply_code: u16,
    pub reply_text: String,
    pub class_id: u16,
    pub method_id: u16,
}

impl Method for ConnectionClose {
    const CLASS_ID: u16 = 10;
    const METHOD_ID: u16 = 50;
    const NAME: &'static str = "connection.close";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        Ok(Self {
            reply_code: cursor.get_short()?,
            reply_text: cursor.get_short_string()?,
            class_id: cursor.get_short()?,
            method_id: cursor.get_short()?,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.reply_code);
        cursor.put_short_string(&self.reply_text)?;
        cursor.put_short(self.class_id);
        cursor.put_short(self.method_id);
        Ok(())
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.reply_text) + 2 + 2
    }
}

empty_method!(ConnectionCloseOk, 10, 51, "connection.close-ok");

// channel

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOpen {
    pub out_of_band: String,
}

impl Method for ChannelOpen {
    const CLASS_ID: u16 = 20;
    const METHOD_ID: u16 = 10;
    const NAME: &'static str = "channel.open";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        Ok(Self {
            out_of_band: cursor.get_short_string()?,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short_string(&self.out_of_band)
    }

    fn fields_size(&self) -> usize {
        short_string_size(&self.out_of_band)
    }
}

empty_method!(ChannelOpenOk, 20, 11, "channel.open-ok");

/// Close a channel; carries the method that caused the failure, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelClose {
    pub reply_code: u16,
    pub reply_text: String,
    pub class_id: u16,
    pub method_id: u16,
}

impl Method for ChannelClose {
    const CLASS_ID: u16 = 20;
    const METHOD_ID: u16 = 40;
    const NAME: &'static str = "channel.close";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        Ok(Self {
            reply_code: cursor.get_short()?,
            reply_text: cursor.get_short_string()?,
            class_id: cursor.get_short()?,
            method_id: cursor.get_short()?,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.reply_code);
        cursor.put_short_string(&self.reply_text)?;
        cursor.put_short(self.class_id);
        cursor.put_short(self.method_id);
        Ok(())
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.reply_text) + 2 + 2
    }
}

empty_method!(ChannelCloseOk, 20, 41, "channel.close-ok");

// exchange

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeDeclare {
    pub ticket: u16,
    pub exchange: String,
    /// Exchange type name: direct, topic, fanout or headers
    pub kind: String,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub nowait: bool,
    pub arguments: FieldTable,
}

impl Method for ExchangeDeclare {
    const CLASS_ID: u16 = 40;
    const METHOD_ID: u16 = 10;
    const NAME: &'static str = "exchange.declare";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        let ticket = cursor.get_short()?;
        let exchange = cursor.get_short_string()?;
        let kind = cursor.get_short_string()?;
        let bits = cursor.get_octet()?;
        let arguments = FieldTable::decode(cursor)?;
        Ok(Self {
            ticket,
            exchange,
            kind,
            passive: bit(bits, 0),
            durable: bit(bits, 1),
            auto_delete: bit(bits, 2),
            internal: bit(bits, 3),
            nowait: bit(bits, 4),
            arguments,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.ticket);
        cursor.put_short_string(&self.exchange)?;
        cursor.put_short_string(&self.kind)?;
        cursor.put_octet(pack_bits(&[
            self.passive,
            self.durable,
            self.auto_delete,
            self.internal,
            self.nowait,
        ]));
        self.arguments.encode(cursor)
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.exchange)
            + short_string_size(&self.kind)
            + 1
            + self.arguments.encoded_size()
    }
}

empty_method!(ExchangeDeclareOk, 40, 11, "exchange.declare-ok");

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeDelete {
    pub ticket: u16,
    pub exchange: String,
    pub if_unused: bool,
    pub nowait: bool,
}

impl Method for ExchangeDelete {
    const CLASS_ID: u16 = 40;
    const METHOD_ID: u16 = 20;
    const NAME: &'static str = "exchange.delete";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        let ticket = cursor.get_short()?;
        let exchange = cursor.get_short_string()?;
        let bits = cursor.get_octet()?;
        Ok(Self {
            ticket,
            exchange,
            if_unused: bit(bits, 0),
            nowait: bit(bits, 1),
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.ticket);
        cursor.put_short_string(&self.exchange)?;
        cursor.put_octet(pack_bits(&[self.if_unused, self.nowait]));
        Ok(())
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.exchange) + 1
    }
}

empty_method!(ExchangeDeleteOk, 40, 21, "exchange.delete-ok");

// queue

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDeclare {
    pub ticket: u16,
    pub queue: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub nowait: bool,
    pub arguments: FieldTable,
}

impl Method for QueueDeclare {
    const CLASS_ID: u16 = 50;
    const METHOD_ID: u16 = 10;
    const NAME: &'static str = "queue.declare";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        let ticket = cursor.get_short()?;
        let queue = cursor.get_short_string()?;
        let bits = cursor.get_octet()?;
        let arguments = FieldTable::decode(cursor)?;
        Ok(Self {
            ticket,
            queue,
            passive: bit(bits, 0),
            durable: bit(bits, 1),
            exclusive: bit(bits, 2),
            auto_delete: bit(bits, 3),
            nowait: bit(bits, 4),
            arguments,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.ticket);
        cursor.put_short_string(&self.queue)?;
        cursor.put_octet(pack_bits(&[
            self.passive,
            self.durable,
            self.exclusive,
            self.auto_delete,
            self.nowait,
        ]));
        self.arguments.encode(cursor)
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.queue) + 1 + self.arguments.encoded_size()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDeclareOk {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

impl Method for QueueDeclareOk {
    const CLASS_ID: u16 = 50;
    const METHOD_ID: u16 = 11;
    const NAME: &'static str = "queue.declare-ok";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        Ok(Self {
            queue: cursor.get_short_string()?,
            message_count: cursor.get_long()?,
            consumer_count: cursor.get_long()?,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short_string(&self.queue)?;
        cursor.put_long(self.message_count);
        cursor.put_long(self.consumer_count);
        Ok(())
    }

    fn fields_size(&self) -> usize {
        short_string_size(&self.queue) + 4 + 4
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueBind {
    pub ticket: u16,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub nowait: bool,
    pub arguments: FieldTable,
}

impl Method for QueueBind {
    const CLASS_ID: u16 = 50;
    const METHOD_ID: u16 = 20;
    const NAME: &'static str = "queue.bind";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        let ticket = cursor.get_short()?;
        let queue = cursor.get_short_string()?;
        let exchange = cursor.get_short_string()?;
        let routing_key = cursor.get_short_string()?;
        let bits = cursor.get_octet()?;
        let arguments = FieldTable::decode(cursor)?;
        Ok(Self {
            ticket,
            queue,
            exchange,
            routing_key,
            nowait: bit(bits, 0),
            arguments,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.ticket);
        cursor.put_short_string(&self.queue)?;
        cursor.put_short_string(&self.exchange)?;
        cursor.put_short_string(&self.routing_key)?;
        cursor.put_octet(pack_bits(&[self.nowait]));
        self.arguments.encode(cursor)
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.queue)
            + short_string_size(&self.exchange)
            + short_string_size(&self.routing_key)
            + 1
            + self.arguments.encoded_size()
    }
}

empty_method!(QueueBindOk, 50, 21, "queue.bind-ok");

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueUnbind {
    pub ticket: u16,
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub arguments: FieldTable,
}

impl Method for QueueUnbind {
    const CLASS_ID: u16 = 50;
    const METHOD_ID: u16 = 50;
    const NAME: &'static str = "queue.unbind";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        Ok(Self {
            ticket: cursor.get_short()?,
            queue: cursor.get_short_string()?,
            exchange: cursor.get_short_string()?,
            routing_key: cursor.get_short_string()?,
            arguments: FieldTable::decode(cursor)?,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.ticket);
        cursor.put_short_string(&self.queue)?;
        cursor.put_short_string(&self.exchange)?;
        cursor.put_short_string(&self.routing_key)?;
        self.arguments.encode(cursor)
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.queue)
            + short_string_size(&self.exchange)
            + short_string_size(&self.routing_key)
            + self.arguments.encoded_size()
    }
}

empty_method!(QueueUnbindOk, 50, 51, "queue.unbind-ok");

// basic

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicPublish {
    pub ticket: u16,
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
}

impl Method for BasicPublish {
    const CLASS_ID: u16 = 60;
    const METHOD_ID: u16 = 40;
    const NAME: &'static str = "basic.publish";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        let ticket = cursor.get_short()?;
        let exchange = cursor.get_short_string()?;
        let routing_key = cursor.get_short_string()?;
        let bits = cursor.get_octet()?;
        Ok(Self {
            ticket,
            exchange,
            routing_key,
            mandatory: bit(bits, 0),
            immediate: bit(bits, 1),
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.ticket);
        cursor.put_short_string(&self.exchange)?;
        cursor.put_short_string(&self.routing_key)?;
        cursor.put_octet(pack_bits(&[self.mandatory, self.immediate]));
        Ok(())
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.exchange) + short_string_size(&self.routing_key) + 1
    }
}

/// Hands an unroutable mandatory message back to its publisher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicReturn {
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
}

impl Method for BasicReturn {
    const CLASS_ID: u16 = 60;
    const METHOD_ID: u16 = 50;
    const NAME: &'static str = "basic.return";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        Ok(Self {
            reply_code: cursor.get_short()?,
            reply_text: cursor.get_short_string()?,
            exchange: cursor.get_short_string()?,
            routing_key: cursor.get_short_string()?,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.reply_code);
        cursor.put_short_string(&self.reply_text)?;
        cursor.put_short_string(&self.exchange)?;
        cursor.put_short_string(&self.routing_key)
    }

    fn fields_size(&self) -> usize {
        2 + short_string_size(&self.reply_text)
            + short_string_size(&self.exchange)
            + short_string_size(&self.routing_key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicDeliver {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

impl Method for BasicDeliver {
    const CLASS_ID: u16 = 60;
    const METHOD_ID: u16 = 60;
    const NAME: &'static str = "basic.deliver";

    fn decode_fields(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        Ok(Self {
            consumer_tag: cursor.get_short_string()?,
            delivery_tag: cursor.get_longlong()?,
            redelivered: bit(cursor.get_octet()?, 0),
            exchange: cursor.get_short_string()?,
            routing_key: cursor.get_short_string()?,
        })
    }

    fn encode_fields(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short_string(&self.consumer_tag)?;
        cursor.put_longlong(self.delivery_tag);
        cursor.put_octet(pack_bits(&[self.redelivered]));
        cursor.put_short_string(&self.exchange)?;
        cursor.put_short_string(&self.routing_key)
    }

    fn fields_size(&self) -> usize {
        short_string_size(&self.consumer_tag)
            + 8
            + 1
            + short_string_size(&self.exchange)
            + short_string_size(&self.routing_key)
    }
}
