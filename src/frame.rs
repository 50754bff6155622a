//! WebSocket frame parsing and serialization
//!
//! This module implements the RFC 6455 frame layout:
//! - Minimal 7/16/64-bit payload length encoding
//! - XOR masking with a 4-byte key
//! - Control frame rules (FIN set, payload ≤ 125 bytes)
//!
//! [`decode`] is a pure function over a byte slice. It keeps no state between
//! calls: it either returns a complete frame and the number of bytes it
//! occupied, or `None` when the slice does not yet hold the whole frame.
//! [`FrameCodec`] wraps it as a `tokio_util` codec so a session can read
//! frames straight off a transport.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{CloseReason, Error, Result};
use crate::mask::apply_mask;
use crate::{
    MAX_CONTROL_PAYLOAD, MAX_FRAME_HEADER_SIZE, MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD,
};

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Connection close
    Close = 0x8,
    /// Ping
    Ping = 0x9,
    /// Pong
    Pong = 0xA,
}

impl OpCode {
    /// Parse opcode from the low nibble of the first header byte
    ///
    /// Reserved values (0x3-0x7, 0xB-0xF) yield `None`.
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        (*self as u8) >= 0x8
    }

    /// Check if this is a data frame
    #[inline]
    pub fn is_data(&self) -> bool {
        (*self as u8) <= 0x2
    }
}

/// A parsed WebSocket frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag
    pub fin: bool,
    /// RSV1 (set on compressed messages)
    pub rsv1: bool,
    /// RSV2 (reserved)
    pub rsv2: bool,
    /// RSV3 (reserved)
    pub rsv3: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Mask flag (must be true for client->server)
    pub masked: bool,
    /// Payload length
    pub payload_len: u64,
    /// Masking key (if masked)
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Get the total header size in bytes
    #[inline]
    pub fn header_size(&self) -> usize {
        let mut size = 2;

        if self.payload_len > MEDIUM_MESSAGE_THRESHOLD as u64 {
            size += 8;
        } else if self.payload_len > SMALL_MESSAGE_THRESHOLD as u64 {
            size += 2;
        }

        if self.masked {
            size += 4;
        }

        size
    }

    /// Encode the frame header into a buffer
    #[inline]
    pub fn encode(&self, buf: &mut BytesMut) {
        // First byte: FIN, RSV1-3, opcode
        let mut b0 = self.opcode as u8;
        if self.fin {
            b0 |= 0x80;
        }
        if self.rsv1 {
            b0 |= 0x40;
        }
        if self.rsv2 {
            b0 |= 0x20;
        }
        if self.rsv3 {
            b0 |= 0x10;
        }
        buf.put_u8(b0);

        // Second byte: mask flag, payload length
        let mask_bit = if self.masked { 0x80 } else { 0x00 };

        if self.payload_len <= SMALL_MESSAGE_THRESHOLD as u64 {
            buf.put_u8(mask_bit | self.payload_len as u8);
        } else if self.payload_len <= MEDIUM_MESSAGE_THRESHOLD as u64 {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(self.payload_len as u16);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(self.payload_len);
        }

        if let Some(mask) = self.mask {
            buf.put_slice(&mask);
        }
    }
}

/// A complete WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Frame payload (always unmasked)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new unmasked frame
    pub fn new(opcode: OpCode, payload: Bytes, fin: bool) -> Self {
        Self {
            header: FrameHeader {
                fin,
                rsv1: false,
                rsv2: false,
                rsv3: false,
                opcode,
                masked: false,
                payload_len: payload.len() as u64,
                mask: None,
            },
            payload,
        }
    }

    /// Create a text frame
    #[inline]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Text, data.into(), true)
    }

    /// Create a binary frame
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, data.into(), true)
    }

    /// Create a ping frame
    #[inline]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Ping, data.into(), true)
    }

    /// Create a pong frame
    #[inline]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, data.into(), true)
    }

    /// Create a close frame carrying a status code and reason
    #[inline]
    pub fn close(code: u16, reason: &str) -> Self {
        Self::new(OpCode::Close, close_payload(code, reason), true)
    }

    /// Create an empty close frame
    #[inline]
    pub fn close_empty() -> Self {
        Self::new(OpCode::Close, Bytes::new(), true)
    }

    /// Set the masking key used when the frame is encoded
    #[must_use]
    pub fn with_mask(mut self, mask: Option<[u8; 4]>) -> Self {
        self.header.masked = mask.is_some();
        self.header.mask = mask;
        self
    }

    /// Set the RSV1 ("compressed") bit
    #[must_use]
    pub fn with_rsv1(mut self, rsv1: bool) -> Self {
        self.header.rsv1 = rsv1;
        self
    }

    /// Frame opcode
    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        self.header.opcode.is_control()
    }

    /// Check if this is the final fragment
    #[inline]
    pub fn is_final(&self) -> bool {
        self.header.fin
    }

    /// Parse a close frame payload
    ///
    /// An empty or one-byte payload carries no status and yields `None`.
    /// The reason text is decoded lossily; codes are not range-checked here.
    pub fn parse_close(&self) -> Option<CloseReason> {
        if self.payload.len() < 2 {
            return None;
        }
        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let reason = String::from_utf8_lossy(&self.payload[2..]).into_owned();
        Some(CloseReason::new(code, reason))
    }

    /// Encode this frame, masking the payload with the header's key if set
    ///
    /// Control frames must be final and carry at most 125 bytes.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        check_control(self.header.opcode, self.header.fin, self.payload.len())?;

        let mut header = self.header.clone();
        header.payload_len = self.payload.len() as u64;
        header.masked = header.mask.is_some();

        buf.reserve(header.header_size() + self.payload.len());
        header.encode(buf);

        let start = buf.len();
        buf.put_slice(&self.payload);
        if let Some(mask) = header.mask {
            apply_mask(&mut buf[start..], mask);
        }
        Ok(())
    }
}

/// Build a close frame payload: big-endian status code followed by the reason
pub fn close_payload(code: u16, reason: &str) -> Bytes {
    let mut payload = BytesMut::with_capacity(2 + reason.len());
    payload.put_u16(code);
    payload.put_slice(reason.as_bytes());
    payload.freeze()
}

#[inline]
fn check_control(opcode: OpCode, fin: bool, len: usize) -> Result<()> {
    if opcode.is_control() {
        if !fin {
            return Err(Error::Protocol("control frame must not be fragmented"));
        }
        if len > MAX_CONTROL_PAYLOAD {
            return Err(Error::Protocol("control frame too large"));
        }
    }
    Ok(())
}

/// Rules applied while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Largest payload a single frame may declare
    pub max_frame_size: usize,
    /// Whether inbound frames must be masked (server) or must not be (client)
    pub expect_masked: bool,
    /// Whether RSV1 may be set (compression negotiated)
    pub allow_rsv1: bool,
}

impl DecodeOptions {
    /// Options for a server reading client frames
    pub fn server(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            expect_masked: true,
            allow_rsv1: false,
        }
    }

    /// Options for a client reading server frames
    pub fn client(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            expect_masked: false,
            allow_rsv1: false,
        }
    }

    /// Allow or forbid RSV1
    #[must_use]
    pub fn with_rsv1(mut self, allow: bool) -> Self {
        self.allow_rsv1 = allow;
        self
    }
}

/// Parse and validate a frame header
///
/// Returns the header and its encoded size, or `None` if `buf` is too short
/// to hold it. All header-level protocol checks happen here, so an oversized
/// frame is rejected before any of its payload is buffered.
fn parse_header(buf: &[u8], opts: &DecodeOptions) -> Result<Option<(FrameHeader, usize)>> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let b0 = buf[0];
    let b1 = buf[1];

    let fin = b0 & 0x80 != 0;
    let rsv1 = b0 & 0x40 != 0;
    let rsv2 = b0 & 0x20 != 0;
    let rsv3 = b0 & 0x10 != 0;

    if rsv1 && !opts.allow_rsv1 {
        return Err(Error::Protocol(
            "RSV1 must be 0 (compression not negotiated)",
        ));
    }
    if rsv2 || rsv3 {
        return Err(Error::Protocol("RSV2 and RSV3 must be 0"));
    }

    let opcode = OpCode::from_u8(b0 & 0x0F).ok_or(Error::InvalidFrame("invalid opcode"))?;

    if opcode.is_control() && !fin {
        return Err(Error::Protocol("control frame must not be fragmented"));
    }

    let masked = b1 & 0x80 != 0;
    if opts.expect_masked && !masked {
        return Err(Error::Protocol("client frames must be masked"));
    }
    if !opts.expect_masked && masked {
        return Err(Error::Protocol("server frames must not be masked"));
    }

    let len_byte = b1 & 0x7F;
    let (payload_len, mut offset) = match len_byte {
        0..=125 => (len_byte as u64, 2),
        126 => {
            if buf.len() < 4 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([buf[2], buf[3]]) as u64;
            if len <= SMALL_MESSAGE_THRESHOLD as u64 {
                return Err(Error::Protocol("payload length not minimal"));
            }
            (len, 4)
        }
        _ => {
            if buf.len() < 10 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            let len = u64::from_be_bytes(raw);
            if len <= MEDIUM_MESSAGE_THRESHOLD as u64 {
                return Err(Error::Protocol("payload length not minimal"));
            }
            if len >> 63 != 0 {
                return Err(Error::Protocol("payload length MSB must be 0"));
            }
            (len, 10)
        }
    };

    if opcode.is_control() && payload_len > MAX_CONTROL_PAYLOAD as u64 {
        return Err(Error::Protocol("control frame too large"));
    }

    if payload_len > opts.max_frame_size as u64 {
        return Err(Error::FrameTooLarge {
            size: payload_len,
            limit: opts.max_frame_size,
        });
    }

    let mask = if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let key = [
            buf[offset],
            buf[offset + 1],
            buf[offset + 2],
            buf[offset + 3],
        ];
        offset += 4;
        Some(key)
    } else {
        None
    };

    let header = FrameHeader {
        fin,
        rsv1,
        rsv2,
        rsv3,
        opcode,
        masked,
        payload_len,
        mask,
    };
    Ok(Some((header, offset)))
}

/// Decode one frame from the front of `buf`
///
/// Returns:
/// - `Ok(Some((frame, consumed)))` with the unmasked frame and the number of
///   bytes it occupied
/// - `Ok(None)` if `buf` holds less than the frame declares
/// - `Err(e)` on any protocol violation
pub fn decode(buf: &[u8], opts: &DecodeOptions) -> Result<Option<(Frame, usize)>> {
    let Some((header, header_len)) = parse_header(buf, opts)? else {
        return Ok(None);
    };

    // Bounded by max_frame_size, so this fits in usize
    let total = header_len + header.payload_len as usize;
    if buf.len() < total {
        return Ok(None);
    }

    let mut payload = BytesMut::from(&buf[header_len..total]);
    if let Some(mask) = header.mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Some((
        Frame {
            header,
            payload: payload.freeze(),
        },
        total,
    )))
}

/// Encode a frame into a buffer
///
/// For masked frames (client mode) the payload is copied and masked.
#[inline]
pub fn encode_frame(
    buf: &mut BytesMut,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    mask: Option<[u8; 4]>,
) {
    encode_frame_with_rsv(buf, opcode, payload, fin, mask, false)
}

/// Encode a frame with RSV1 bit control (for compression)
pub fn encode_frame_with_rsv(
    buf: &mut BytesMut,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    mask: Option<[u8; 4]>,
    rsv1: bool,
) {
    let header = FrameHeader {
        fin,
        rsv1,
        rsv2: false,
        rsv3: false,
        opcode,
        masked: mask.is_some(),
        payload_len: payload.len() as u64,
        mask,
    };

    buf.reserve(header.header_size() + payload.len());
    header.encode(buf);

    let start = buf.len();
    buf.put_slice(payload);
    if let Some(m) = mask {
        apply_mask(&mut buf[start..], m);
    }
}

/// `tokio_util` codec over [`decode`] and [`Frame::encode`]
///
/// The decoder splits payloads out of the read buffer without copying.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    options: DecodeOptions,
}

impl FrameCodec {
    /// Create a codec applying the given decode rules
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let Some((header, header_len)) = parse_header(src, &self.options)? else {
            src.reserve(MAX_FRAME_HEADER_SIZE);
            return Ok(None);
        };

        let payload_len = header.payload_len as usize;
        let total = header_len + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let mut payload = src.split_to(payload_len);
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        Ok(Some(Frame {
            header,
            payload: payload.freeze(),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        frame.encode(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024 * 1024;

    fn roundtrip(frame: &Frame, opts: &DecodeOptions) -> Frame {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        let (decoded, consumed) = decode(&buf, opts).unwrap().unwrap();
        assert_eq!(consumed, buf.len());
        decoded
    }

    #[test]
    fn test_opcode() {
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(OpCode::Close.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(OpCode::Continuation.is_data());
        assert!(OpCode::from_u8(0x3).is_none());
        assert!(OpCode::from_u8(0xB).is_none());
    }

    #[test]
    fn test_client_hello_scenario() {
        let mask = [0x01, 0x02, 0x03, 0x04];
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, OpCode::Text, b"hello", true, Some(mask));

        assert_eq!(buf[0], 0x81);
        assert_eq!(buf[1], 0x85);
        assert_eq!(&buf[2..6], &mask);
        assert_eq!(&buf[6..], &[b'h' ^ 1, b'e' ^ 2, b'l' ^ 3, b'l' ^ 4, b'o' ^ 1]);

        let (frame, consumed) = decode(&buf, &DecodeOptions::server(MAX)).unwrap().unwrap();
        assert_eq!(consumed, 11);
        assert_eq!(frame.opcode(), OpCode::Text);
        assert!(frame.is_final());
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn test_roundtrip_all_length_tiers() {
        for len in [0usize, 1, 125, 126, 65535, 65536, 70_000] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

            let unmasked = Frame::binary(payload.clone());
            assert_eq!(roundtrip(&unmasked, &DecodeOptions::client(MAX)), unmasked);

            let masked = Frame::binary(payload).with_mask(Some([9, 8, 7, 6]));
            assert_eq!(roundtrip(&masked, &DecodeOptions::server(MAX)), masked);
        }
    }

    #[test]
    fn test_roundtrip_preserves_fin_and_rsv1() {
        let frame = Frame::new(OpCode::Text, Bytes::from_static(b"part"), false).with_rsv1(true);
        let opts = DecodeOptions::client(MAX).with_rsv1(true);
        let decoded = roundtrip(&frame, &opts);
        assert!(!decoded.header.fin);
        assert!(decoded.header.rsv1);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_length_header_selection() {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, OpCode::Binary, &[0u8; 125], true, None);
        assert_eq!(buf[1], 125);

        buf.clear();
        encode_frame(&mut buf, OpCode::Binary, &[0u8; 126], true, None);
        assert_eq!(buf[1], 126);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 126);

        buf.clear();
        encode_frame(&mut buf, OpCode::Binary, &vec![0u8; 65536], true, None);
        assert_eq!(buf[1], 127);
        assert_eq!(buf.len(), 10 + 65536);

        // Longest possible header: 64-bit length plus mask key
        buf.clear();
        encode_frame(&mut buf, OpCode::Binary, &vec![0u8; 65536], true, Some([1, 2, 3, 4]));
        assert_eq!(buf.len(), crate::MAX_FRAME_HEADER_SIZE + 65536);
    }

    #[test]
    fn test_different_masks_same_payload() {
        let payload = b"the same payload";
        let mut a = BytesMut::new();
        let mut b = BytesMut::new();
        encode_frame(&mut a, OpCode::Binary, payload, true, Some([1, 2, 3, 4]));
        encode_frame(&mut b, OpCode::Binary, payload, true, Some([0xAA, 0xBB, 0xCC, 0xDD]));
        assert_ne!(a, b);

        let opts = DecodeOptions::server(MAX);
        let (fa, _) = decode(&a, &opts).unwrap().unwrap();
        let (fb, _) = decode(&b, &opts).unwrap().unwrap();
        assert_eq!(fa.payload.as_ref(), payload);
        assert_eq!(fb.payload.as_ref(), payload);
    }

    #[test]
    fn test_incomplete_input() {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, OpCode::Binary, &[7u8; 300], true, Some([1, 1, 1, 1]));
        let opts = DecodeOptions::server(MAX);

        for cut in 0..buf.len() {
            assert!(decode(&buf[..cut], &opts).unwrap().is_none(), "cut at {}", cut);
        }
        assert!(decode(&buf, &opts).unwrap().is_some());
    }

    #[test]
    fn test_masking_policy_enforced() {
        let mut masked = BytesMut::new();
        encode_frame(&mut masked, OpCode::Text, b"x", true, Some([1, 2, 3, 4]));
        assert!(matches!(
            decode(&masked, &DecodeOptions::client(MAX)),
            Err(Error::Protocol(_))
        ));

        let mut unmasked = BytesMut::new();
        encode_frame(&mut unmasked, OpCode::Text, b"x", true, None);
        assert!(matches!(
            decode(&unmasked, &DecodeOptions::server(MAX)),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected_from_header() {
        // Only the header is present; the declared length alone triggers rejection
        let mut buf = BytesMut::new();
        buf.put_u8(0x82);
        buf.put_u8(126);
        buf.put_u16(2000);
        let err = decode(&buf, &DecodeOptions::client(1000)).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { size: 2000, limit: 1000 }));
    }

    #[test]
    fn test_reserved_opcode_and_bits() {
        let opts = DecodeOptions::client(MAX);
        assert!(matches!(
            decode(&[0x83, 0x00], &opts),
            Err(Error::InvalidFrame(_))
        ));
        assert!(decode(&[0xC1, 0x00], &opts).is_err()); // RSV1 without compression
        assert!(decode(&[0xA1, 0x00], &opts).is_err()); // RSV2
        assert!(decode(&[0xC1, 0x00], &opts.with_rsv1(true)).unwrap().is_some());
    }

    #[test]
    fn test_control_frame_rules() {
        let opts = DecodeOptions::client(MAX);
        // Ping without FIN
        assert!(decode(&[0x09, 0x00], &opts).is_err());
        // Ping declaring 126 bytes
        assert!(decode(&[0x89, 126, 0x00, 126], &opts).is_err());

        let mut buf = BytesMut::new();
        let too_big = Frame::ping(vec![0u8; 126]);
        assert!(too_big.encode(&mut buf).is_err());
        let fragmented = Frame::new(OpCode::Pong, Bytes::new(), false);
        assert!(fragmented.encode(&mut buf).is_err());
    }

    #[test]
    fn test_non_minimal_length_rejected() {
        let opts = DecodeOptions::client(MAX);
        assert!(decode(&[0x82, 126, 0x00, 0x05], &opts).is_err());
        let mut buf = BytesMut::new();
        buf.put_u8(0x82);
        buf.put_u8(127);
        buf.put_u64(200);
        assert!(decode(&buf, &opts).is_err());
    }

    #[test]
    fn test_close_payload() {
        let frame = Frame::close(1000, "goodbye");
        assert_eq!(frame.opcode(), OpCode::Close);

        let close = frame.parse_close().unwrap();
        assert_eq!(close.code, 1000);
        assert_eq!(close.reason, "goodbye");

        assert!(Frame::close_empty().parse_close().is_none());
        assert!(Frame::new(OpCode::Close, Bytes::from_static(&[0x03]), true)
            .parse_close()
            .is_none());
    }

    #[test]
    fn test_codec_splits_back_to_back_frames() {
        let mut codec = FrameCodec::new(DecodeOptions::server(MAX));
        let mut wire = BytesMut::new();
        codec
            .encode(Frame::text("one").with_mask(Some([4, 3, 2, 1])), &mut wire)
            .unwrap();
        codec
            .encode(Frame::ping("p").with_mask(Some([5, 5, 5, 5])), &mut wire)
            .unwrap();

        // Feed the bytes one at a time
        let mut src = BytesMut::new();
        let mut frames = Vec::new();
        for byte in wire.iter() {
            src.put_u8(*byte);
            if let Some(frame) = codec.decode(&mut src).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload.as_ref(), b"one");
        assert_eq!(frames[1].opcode(), OpCode::Ping);
        assert!(src.is_empty());
    }
}
