//! Content header body: announces the class, total payload size and the
//! basic-class message properties that precede a run of content bodies.
//!
//! Properties are present-if-flagged. Flag bits run from bit 15 downward in
//! declaration order; bit 0 is the continuation bit, which this codec does not
//! support.

use crate::buffer::{short_string_size, ByteCursor};
use crate::error::{ProtocolError, ProtocolResult};
use crate::field_table::FieldTable;

const FLAG_CONTENT_TYPE: u16 = 1 << 15;
const FLAG_CONTENT_ENCODING: u16 = 1 << 14;
const FLAG_HEADERS: u16 = 1 << 13;
const FLAG_DELIVERY_MODE: u16 = 1 << 12;
const FLAG_PRIORITY: u16 = 1 << 11;
const FLAG_CORRELATION_ID: u16 = 1 << 10;
const FLAG_REPLY_TO: u16 = 1 << 9;
const FLAG_EXPIRATION: u16 = 1 << 8;
const FLAG_MESSAGE_ID: u16 = 1 << 7;
const FLAG_TIMESTAMP: u16 = 1 << 6;
const FLAG_TYPE: u16 = 1 << 5;
const FLAG_USER_ID: u16 = 1 << 4;
const FLAG_APP_ID: u16 = 1 << 3;
const FLAG_CLUSTER_ID: u16 = 1 << 2;
const FLAG_CONTINUATION: u16 = 1;

/// Basic-class message properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |present: bool, bit: u16| {
            if present {
                flags |= bit;
            }
        };
        set(self.content_type.is_some(), FLAG_CONTENT_TYPE);
        set(self.content_encoding.is_some(), FLAG_CONTENT_ENCODING);
        set(self.headers.is_some(), FLAG_HEADERS);
        set(self.delivery_mode.is_some(), FLAG_DELIVERY_MODE);
        set(self.priority.is_some(), FLAG_PRIORITY);
        set(self.correlation_id.is_some(), FLAG_CORRELATION_ID);
        set(self.reply_to.is_some(), FLAG_REPLY_TO);
        set(self.expiration.is_some(), FLAG_EXPIRATION);
        set(self.message_id.is_some(), FLAG_MESSAGE_ID);
        set(self.timestamp.is_some(), FLAG_TIMESTAMP);
        set(self.kind.is_some(), FLAG_TYPE);
        set(self.user_id.is_some(), FLAG_USER_ID);
        set(self.app_id.is_some(), FLAG_APP_ID);
        set(self.cluster_id.is_some(), FLAG_CLUSTER_ID);
        flags
    }

    /// Encoded size of the flags word plus present properties
    pub fn size(&self) -> usize {
        let shortstr = |v: &Option<String>| v.as_deref().map_or(0, short_string_size);
        2 + shortstr(&self.content_type)
            + shortstr(&self.content_encoding)
            + self.headers.as_ref().map_or(0, FieldTable::encoded_size)
            + self.delivery_mode.map_or(0, |_| 1)
            + self.priority.map_or(0, |_| 1)
            + shortstr(&self.correlation_id)
            + shortstr(&self.reply_to)
            + shortstr(&self.expiration)
            + shortstr(&self.message_id)
            + self.timestamp.map_or(0, |_| 8)
            + shortstr(&self.kind)
            + shortstr(&self.user_id)
            + shortstr(&self.app_id)
            + shortstr(&self.cluster_id)
    }

    pub fn encode(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.flags());
        let shortstr = |cursor: &mut ByteCursor, v: &Option<String>| match v {
            Some(s) => cursor.put_short_string(s),
            None => Ok(()),
        };
        shortstr(cursor, &self.content_type)?;
        shortstr(cursor, &self.content_encoding)?;
        if let Some(headers) = &self.headers {
            headers.encode(cursor)?;
        }
        if let Some(mode) = self.delivery_mode {
            cursor.put_octet(mode);
        }
        if let Some(priority) = self.priority {
            cursor.put_octet(priority);
        }
        shortstr(cursor, &self.correlation_id)?;
        shortstr(cursor, &self.reply_to)?;
        shortstr(cursor, &self.expiration)?;
        shortstr(cursor, &self.message_id)?;
        if let Some(ts) = self.timestamp {
            cursor.put_longlong(ts);
        }
        shortstr(cursor, &self.kind)?;
        shortstr(cursor, &self.user_id)?;
        shortstr(cursor, &self.app_id)?;
        shortstr(cursor, &self.cluster_id)?;
        Ok(())
    }

    pub fn decode(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        let flags = cursor.get_short()?;
        if flags & FLAG_CONTINUATION != 0 {
            return Err(ProtocolError::InvalidPropertyFlags { flags });
        }
        let shortstr = |cursor: &mut ByteCursor, bit: u16| -> ProtocolResult<Option<String>> {
            if flags & bit != 0 {
                cursor.get_short_string().map(Some)
            } else {
                Ok(None)
            }
        };
        let octet = |cursor: &mut ByteCursor, bit: u16| -> ProtocolResult<Option<u8>> {
            if flags & bit != 0 {
                cursor.get_octet().map(Some)
            } else {
                Ok(None)
            }
        };

        let content_type = shortstr(cursor, FLAG_CONTENT_TYPE)?;
        let content_encoding = shortstr(cursor, FLAG_CONTENT_ENCODING)?;
        let headers = if flags & FLAG_HEADERS != 0 {
            Some(FieldTable::decode(cursor)?)
        } else {
            None
        };
        let delivery_mode = octet(cursor, FLAG_DELIVERY_MODE)?;
        let priority = octet(cursor, FLAG_PRIORITY)?;
        let correlation_id = shortstr(cursor, FLAG_CORRELATION_ID)?;
        let reply_to = shortstr(cursor, FLAG_REPLY_TO)?;
        let expiration = shortstr(cursor, FLAG_EXPIRATION)?;
        let message_id = shortstr(cursor, FLAG_MESSAGE_ID)?;
        let timestamp = if flags & FLAG_TIMESTAMP != 0 {
            Some(cursor.get_longlong()?)
        } else {
            None
        };
        let kind = shortstr(cursor, FLAG_TYPE)?;
        let user_id = shortstr(cursor, FLAG_USER_ID)?;
        let app_id = shortstr(cursor, FLAG_APP_ID)?;
        let cluster_id = shortstr(cursor, FLAG_CLUSTER_ID)?;

        Ok(Self {
            content_type,
            content_encoding,
            headers,
            delivery_mode,
            priority,
            correlation_id,
            reply_to,
            expiration,
            message_id,
            timestamp,
            kind,
            user_id,
            app_id,
            cluster_id,
        })
    }
}

/// Content header frame body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBody {
    pub class_id: u16,
    pub weight: u16,
    /// Total payload size across all following content bodies
    pub body_size: u64,
    pub properties: BasicProperties,
}

impl HeaderBody {
    /// Basic class id, the only content class routed by this broker
    pub const BASIC_CLASS_ID: u16 = 60;

    pub fn basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: Self::BASIC_CLASS_ID,
            weight: 0,
            body_size,
            properties,
        }
    }

    pub fn size(&self) -> usize {
        2 + 2 + 8 + self.properties.size()
    }

    pub fn encode(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_short(self.class_id);
        cursor.put_short(self.weight);
        cursor.put_longlong(self.body_size);
        self.properties.encode(cursor)
    }

    pub fn decode(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        let class_id = cursor.get_short()?;
        let weight = cursor.get_short()?;
        let body_size = cursor.get_longlong()?;
        let properties = BasicProperties::decode(cursor)?;
        Ok(Self {
            class_id,
            weight,
            body_size,
            properties,
        })
    }
}
