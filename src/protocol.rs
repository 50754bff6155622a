//! WebSocket message protocol
//!
//! This module is sans-io: it turns decoded frames into [`Event`]s and
//! messages into encoded frames, but never touches a transport. It handles:
//! - Message fragmentation and reassembly
//! - Control frames interleaved with fragments
//! - UTF-8 validation of text messages
//! - permessage-deflate on both directions (feature `permessage-deflate`)
//!
//! A [`Protocol`] can be [`split`](Protocol::split) into its [`Inbound`] and
//! [`Outbound`] halves so a reader and a writer can each own one.

use bytes::{Bytes, BytesMut};

use crate::MAX_CONTROL_PAYLOAD;
use crate::error::{CloseReason, Error, Result};
use crate::frame::{DecodeOptions, Frame, OpCode, close_payload, encode_frame_with_rsv};
use crate::mask::generate_mask;
use crate::utf8::{validate_utf8, validate_utf8_incomplete};

#[cfg(feature = "permessage-deflate")]
use crate::deflate::{DeflateConfig, DeflateContext, DeflateDecoder, DeflateEncoder};

/// WebSocket endpoint role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client (must mask frames)
    Client,
    /// Server (must not mask frames)
    Server,
}

impl Role {
    /// Whether frames sent in this role carry a mask
    #[inline]
    pub fn masks_outbound(&self) -> bool {
        *self == Role::Client
    }
}

/// WebSocket data message (complete, possibly assembled from fragments)
///
/// Text payloads are UTF-8 validated before a `Text` message is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text message
    Text(Bytes),
    /// Binary message
    Binary(Bytes),
}

impl Message {
    /// Create a text message from a string
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(Bytes::from(s.into()))
    }

    /// Create a binary message
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary(data.into())
    }

    /// Check if this is a text message
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Check if this is a binary message
    #[inline]
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Get message as text (returns None for non-text messages)
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(b) => std::str::from_utf8(b).ok(),
            Message::Binary(_) => None,
        }
    }

    /// Get message as bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(b) | Message::Binary(b) => b,
        }
    }

    /// Convert to an owned string (returns None for non-text messages)
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(b) => String::from_utf8(b.to_vec()).ok(),
            Message::Binary(_) => None,
        }
    }

    /// Convert to the payload bytes
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Message::Text(b) | Message::Binary(b) => b,
        }
    }

    /// Payload length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Check if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(Bytes::from(s))
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message::Binary(Bytes::from(v))
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Message::Binary(b)
    }
}

impl From<&[u8]> for Message {
    fn from(b: &[u8]) -> Self {
        Message::Binary(Bytes::copy_from_slice(b))
    }
}

/// Something the peer did, as seen after frame classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A complete data message
    Message(Message),
    /// Ping; the payload must be echoed in a Pong
    Ping(Bytes),
    /// Pong
    Pong(Bytes),
    /// Close, with the peer's status if it sent one
    Close(Option<CloseReason>),
}

/// Inbound half: frame classification and message reassembly
pub struct Inbound {
    max_message_size: usize,
    /// Fragment buffer for message reassembly
    fragment_buf: BytesMut,
    /// Opcode of current fragmented message
    fragment_opcode: Option<OpCode>,
    /// Whether the current fragmented message is compressed
    fragment_compressed: bool,
    #[cfg(feature = "permessage-deflate")]
    decoder: Option<DeflateDecoder>,
}

impl Inbound {
    fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            fragment_buf: BytesMut::new(),
            fragment_opcode: None,
            fragment_compressed: false,
            #[cfg(feature = "permessage-deflate")]
            decoder: None,
        }
    }

    /// Check if a fragmented message is in progress
    #[inline]
    pub fn is_fragmenting(&self) -> bool {
        self.fragment_opcode.is_some()
    }

    #[inline]
    fn compression_enabled(&self) -> bool {
        #[cfg(feature = "permessage-deflate")]
        {
            self.decoder.is_some()
        }
        #[cfg(not(feature = "permessage-deflate"))]
        {
            false
        }
    }

    /// Handle a single decoded frame
    ///
    /// Returns `None` while a fragmented message is still incomplete.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<Option<Event>> {
        if frame.header.rsv1 && (frame.is_control() || !self.compression_enabled()) {
            return Err(Error::Protocol("unexpected RSV1 bit"));
        }
        // Only the first frame of a message carries the compressed flag
        if frame.header.rsv1 && frame.header.opcode == OpCode::Continuation {
            return Err(Error::Protocol("RSV1 set on continuation frame"));
        }

        match frame.header.opcode {
            OpCode::Text | OpCode::Binary => self.handle_data(frame),
            OpCode::Continuation => self.handle_continuation(frame),
            OpCode::Ping => Ok(Some(Event::Ping(frame.payload))),
            OpCode::Pong => Ok(Some(Event::Pong(frame.payload))),
            OpCode::Close => Ok(Some(Event::Close(frame.parse_close()))),
        }
    }

    /// Handle text or binary frame
    fn handle_data(&mut self, frame: Frame) -> Result<Option<Event>> {
        if self.fragment_opcode.is_some() {
            return Err(Error::Protocol("expected continuation frame"));
        }

        let opcode = frame.header.opcode;
        let compressed = frame.header.rsv1;
        self.check_size(frame.payload.len())?;

        if frame.header.fin {
            // Complete message in one frame (fast path)
            return self.complete(opcode, compressed, frame.payload).map(Some);
        }

        self.fragment_opcode = Some(opcode);
        self.fragment_compressed = compressed;
        self.fragment_buf.clear();
        self.fragment_buf.extend_from_slice(&frame.payload);
        self.check_partial_utf8()?;
        Ok(None)
    }

    /// Handle continuation frame
    fn handle_continuation(&mut self, frame: Frame) -> Result<Option<Event>> {
        let opcode = self
            .fragment_opcode
            .ok_or(Error::Protocol("unexpected continuation frame"))?;

        self.check_size(self.fragment_buf.len() + frame.payload.len())?;
        self.fragment_buf.extend_from_slice(&frame.payload);

        if !frame.header.fin {
            self.check_partial_utf8()?;
            return Ok(None);
        }

        self.fragment_opcode = None;
        let compressed = std::mem::take(&mut self.fragment_compressed);
        let data = self.fragment_buf.split().freeze();
        self.complete(opcode, compressed, data).map(Some)
    }

    #[inline]
    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            return Err(Error::MessageTooLarge {
                limit: self.max_message_size,
            });
        }
        Ok(())
    }

    /// Fail fast on text fragments that can never become valid UTF-8
    fn check_partial_utf8(&self) -> Result<()> {
        if self.fragment_opcode == Some(OpCode::Text) && !self.fragment_compressed {
            let (valid, _incomplete) = validate_utf8_incomplete(&self.fragment_buf);
            if !valid {
                return Err(Error::InvalidUtf8);
            }
        }
        Ok(())
    }

    fn complete(&mut self, opcode: OpCode, compressed: bool, data: Bytes) -> Result<Event> {
        let data = if compressed { self.inflate(&data)? } else { data };

        match opcode {
            OpCode::Text => {
                if !validate_utf8(&data) {
                    return Err(Error::InvalidUtf8);
                }
                Ok(Event::Message(Message::Text(data)))
            }
            OpCode::Binary => Ok(Event::Message(Message::Binary(data))),
            _ => Err(Error::Protocol("invalid fragment opcode")),
        }
    }

    #[cfg(feature = "permessage-deflate")]
    fn inflate(&mut self, data: &[u8]) -> Result<Bytes> {
        match self.decoder.as_mut() {
            Some(decoder) => decoder.decompress(data, self.max_message_size),
            None => Err(Error::Protocol("unexpected RSV1 bit")),
        }
    }

    #[cfg(not(feature = "permessage-deflate"))]
    fn inflate(&mut self, _data: &[u8]) -> Result<Bytes> {
        Err(Error::Protocol("unexpected RSV1 bit"))
    }
}

/// Outbound half: message and control frame encoding
pub struct Outbound {
    masking: bool,
    #[cfg(feature = "permessage-deflate")]
    encoder: Option<DeflateEncoder>,
    #[cfg(feature = "permessage-deflate")]
    compression_threshold: usize,
}

impl Outbound {
    fn new(masking: bool) -> Self {
        Self {
            masking,
            #[cfg(feature = "permessage-deflate")]
            encoder: None,
            #[cfg(feature = "permessage-deflate")]
            compression_threshold: 0,
        }
    }

    #[inline]
    fn mask(&self) -> Option<[u8; 4]> {
        if self.masking {
            Some(generate_mask())
        } else {
            None
        }
    }

    /// Encode a data message as a single frame
    ///
    /// Messages at or above the compression threshold are deflated and sent
    /// with RSV1 set when compression is enabled.
    pub fn encode_message(&mut self, msg: &Message, buf: &mut BytesMut) -> Result<()> {
        let mask = self.mask();

        #[cfg(feature = "permessage-deflate")]
        if let Some(encoder) = self.encoder.as_mut() {
            if msg.len() >= self.compression_threshold {
                let compressed = encoder.compress(msg.as_bytes())?;
                encode_frame_with_rsv(buf, msg.opcode(), &compressed, true, mask, true);
                return Ok(());
            }
        }

        encode_frame_with_rsv(buf, msg.opcode(), msg.as_bytes(), true, mask, false);
        Ok(())
    }

    /// Encode a ping frame
    pub fn encode_ping(&mut self, payload: &[u8], buf: &mut BytesMut) -> Result<()> {
        self.encode_control(OpCode::Ping, payload, buf)
    }

    /// Encode a pong frame
    pub fn encode_pong(&mut self, payload: &[u8], buf: &mut BytesMut) -> Result<()> {
        self.encode_control(OpCode::Pong, payload, buf)
    }

    /// Encode a close frame; `None` sends an empty payload
    pub fn encode_close(&mut self, reason: Option<&CloseReason>, buf: &mut BytesMut) -> Result<()> {
        let payload = match reason {
            Some(r) => close_payload(r.code, &r.reason),
            None => Bytes::new(),
        };
        self.encode_control(OpCode::Close, &payload, buf)
    }

    fn encode_control(&mut self, opcode: OpCode, payload: &[u8], buf: &mut BytesMut) -> Result<()> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::Protocol("control frame too large"));
        }
        encode_frame_with_rsv(buf, opcode, payload, true, self.mask(), false);
        Ok(())
    }
}

/// WebSocket protocol handler
///
/// Handles message assembly, control frame classification and outbound
/// encoding for one endpoint.
pub struct Protocol {
    role: Role,
    inbound: Inbound,
    outbound: Outbound,
}

impl Protocol {
    /// Create a new protocol handler
    ///
    /// Outbound masking follows the role until overridden.
    pub fn new(role: Role, max_message_size: usize) -> Self {
        Self {
            role,
            inbound: Inbound::new(max_message_size),
            outbound: Outbound::new(role.masks_outbound()),
        }
    }

    /// Override outbound masking
    #[must_use]
    pub fn with_masking(mut self, masking: bool) -> Self {
        self.outbound.masking = masking;
        self
    }

    /// Enable permessage-deflate with negotiated parameters
    #[cfg(feature = "permessage-deflate")]
    #[must_use]
    pub fn with_compression(mut self, config: DeflateConfig) -> Self {
        let threshold = config.compression_threshold;
        let context = match self.role {
            Role::Server => DeflateContext::server(config),
            Role::Client => DeflateContext::client(config),
        };
        let (encoder, decoder) = context.into_parts();
        self.outbound.encoder = Some(encoder);
        self.outbound.compression_threshold = threshold;
        self.inbound.decoder = Some(decoder);
        self
    }

    /// Endpoint role
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Check if permessage-deflate is active
    #[inline]
    pub fn compression_enabled(&self) -> bool {
        self.inbound.compression_enabled()
    }

    /// Frame decoding rules for this endpoint
    pub fn decode_options(&self, max_frame_size: usize) -> DecodeOptions {
        let options = match self.role {
            Role::Server => DecodeOptions::server(max_frame_size),
            Role::Client => DecodeOptions::client(max_frame_size),
        };
        options.with_rsv1(self.compression_enabled())
    }

    /// Handle a decoded frame, see [`Inbound::handle_frame`]
    #[inline]
    pub fn handle_frame(&mut self, frame: Frame) -> Result<Option<Event>> {
        self.inbound.handle_frame(frame)
    }

    /// Encode a data message, see [`Outbound::encode_message`]
    #[inline]
    pub fn encode_message(&mut self, msg: &Message, buf: &mut BytesMut) -> Result<()> {
        self.outbound.encode_message(msg, buf)
    }

    /// Encode a ping frame
    #[inline]
    pub fn encode_ping(&mut self, payload: &[u8], buf: &mut BytesMut) -> Result<()> {
        self.outbound.encode_ping(payload, buf)
    }

    /// Encode a pong frame
    #[inline]
    pub fn encode_pong(&mut self, payload: &[u8], buf: &mut BytesMut) -> Result<()> {
        self.outbound.encode_pong(payload, buf)
    }

    /// Encode a close frame
    #[inline]
    pub fn encode_close(&mut self, reason: Option<&CloseReason>, buf: &mut BytesMut) -> Result<()> {
        self.outbound.encode_close(reason, buf)
    }

    /// Split into independently owned inbound and outbound halves
    pub fn split(self) -> (Inbound, Outbound) {
        (self.inbound, self.outbound)
    }
}
