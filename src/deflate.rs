//! Per-Message Deflate Extension (RFC 7692)
//!
//! This module implements the permessage-deflate WebSocket extension,
//! which compresses message payloads using the DEFLATE algorithm.
//!
//! Each session owns one [`DeflateEncoder`] and one [`DeflateDecoder`] for
//! its whole lifetime. Both work on raw (header-less) deflate streams and
//! flush with `Z_SYNC_FLUSH` at every message boundary, so every compressed
//! message ends with the `00 00 FF FF` marker. The marker is removed before
//! a message goes on the wire and restored before it is inflated; see
//! [`strip_trailer`] and [`with_trailer`].

use bytes::Bytes;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::error::{Error, Result};

/// Trailer bytes that must be removed after compression and added before decompression
pub const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Sync-flushed empty stored block; what an empty message deflates to
const EMPTY_BLOCK: [u8; 5] = [0x00, 0x00, 0x00, 0xff, 0xff];

/// Size of the scratch buffer output is pulled through
const CHUNK_SIZE: usize = 8 * 1024;

/// Default LZ77 window size (32KB = 2^15)
pub const DEFAULT_WINDOW_BITS: u8 = 15;

/// Minimum LZ77 window size (256 bytes = 2^8)
pub const MIN_WINDOW_BITS: u8 = 8;

/// Maximum LZ77 window size (32KB = 2^15)
pub const MAX_WINDOW_BITS: u8 = 15;

/// Configuration for permessage-deflate extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflateConfig {
    /// Server's maximum LZ77 window bits (for compression when server, decompression when client)
    pub server_max_window_bits: u8,
    /// Client's maximum LZ77 window bits (for compression when client, decompression when server)
    pub client_max_window_bits: u8,
    /// If true, server must reset compression context after each message
    pub server_no_context_takeover: bool,
    /// If true, client must reset compression context after each message
    pub client_no_context_takeover: bool,
    /// Compression level (0-9, where 0 is no compression, 9 is max)
    pub compression_level: u32,
    /// Messages shorter than this are sent uncompressed
    pub compression_threshold: usize,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            server_max_window_bits: DEFAULT_WINDOW_BITS,
            client_max_window_bits: DEFAULT_WINDOW_BITS,
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            compression_level: 6,
            compression_threshold: 32,
        }
    }
}

impl DeflateConfig {
    /// Create config optimized for low memory usage
    pub fn low_memory() -> Self {
        Self {
            server_max_window_bits: 10,
            client_max_window_bits: 10,
            server_no_context_takeover: true,
            client_no_context_takeover: true,
            compression_level: 1,
            compression_threshold: 64,
        }
    }

    /// Create config optimized for best compression
    pub fn best_compression() -> Self {
        Self {
            server_max_window_bits: MAX_WINDOW_BITS,
            client_max_window_bits: MAX_WINDOW_BITS,
            server_no_context_takeover: false,
            client_no_context_takeover: false,
            compression_level: 9,
            compression_threshold: 16,
        }
    }

    /// Build a config from the parameters agreed during the upgrade
    pub fn from_params(params: &[(&str, Option<&str>)]) -> Result<Self> {
        let mut config = Self::default();

        for (name, value) in params {
            match *name {
                "server_no_context_takeover" => {
                    if value.is_some() {
                        return Err(Error::InvalidConfig(
                            "server_no_context_takeover must not have a value",
                        ));
                    }
                    config.server_no_context_takeover = true;
                }
                "client_no_context_takeover" => {
                    if value.is_some() {
                        return Err(Error::InvalidConfig(
                            "client_no_context_takeover must not have a value",
                        ));
                    }
                    config.client_no_context_takeover = true;
                }
                "server_max_window_bits" => {
                    if let Some(v) = value {
                        config.server_max_window_bits = parse_window_bits(v)?;
                    }
                }
                "client_max_window_bits" => {
                    // A bare parameter only signals support
                    if let Some(v) = value {
                        config.client_max_window_bits = parse_window_bits(v)?;
                    }
                }
                _ => {
                    return Err(Error::InvalidConfig(
                        "unknown permessage-deflate parameter",
                    ));
                }
            }
        }

        Ok(config)
    }

    /// Build a config from an agreed `Sec-WebSocket-Extensions` value
    ///
    /// e.g. `permessage-deflate; client_no_context_takeover; server_max_window_bits=10`
    pub fn from_header(value: &str) -> Result<Self> {
        let rest = value
            .trim()
            .strip_prefix("permessage-deflate")
            .ok_or(Error::InvalidConfig("not a permessage-deflate extension"))?
            .trim_start();

        let mut params = Vec::new();
        if !rest.is_empty() {
            let rest = rest
                .strip_prefix(';')
                .ok_or(Error::InvalidConfig("malformed permessage-deflate parameters"))?;
            for part in rest.split(';').map(str::trim).filter(|p| !p.is_empty()) {
                match part.split_once('=') {
                    Some((name, value)) => {
                        params.push((name.trim(), Some(value.trim().trim_matches('"'))))
                    }
                    None => params.push((part, None)),
                }
            }
        }

        Self::from_params(&params)
    }
}

fn parse_window_bits(value: &str) -> Result<u8> {
    let bits: u8 = value
        .parse()
        .map_err(|_| Error::InvalidConfig("invalid max_window_bits value"))?;
    if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
        return Err(Error::InvalidConfig("max_window_bits out of range (8-15)"));
    }
    Ok(bits)
}

/// Remove the sync-flush marker from the end of a deflated message
#[inline]
pub fn strip_trailer(data: &mut Vec<u8>) {
    if data.ends_with(&DEFLATE_TRAILER) {
        data.truncate(data.len() - DEFLATE_TRAILER.len());
    }
}

/// Restore the sync-flush marker on a received compressed payload
#[inline]
pub fn with_trailer(data: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(data.len() + DEFLATE_TRAILER.len());
    input.extend_from_slice(data);
    input.extend_from_slice(&DEFLATE_TRAILER);
    input
}

/// Deflate compressor for outgoing messages
pub struct DeflateEncoder {
    compress: Compress,
    no_context_takeover: bool,
}

impl DeflateEncoder {
    /// Create a new encoder
    pub fn new(window_bits: u8, no_context_takeover: bool, level: u32) -> Self {
        // zlib refuses an 8-bit window for raw deflate and bumps it to 9
        let window_bits = window_bits.clamp(MIN_WINDOW_BITS + 1, MAX_WINDOW_BITS);
        let compress = Compress::new_with_window_bits(Compression::new(level), false, window_bits);

        Self {
            compress,
            no_context_takeover,
        }
    }

    /// Deflate `data` and sync-flush
    ///
    /// The returned bytes end with the `00 00 FF FF` marker. Any input,
    /// including an empty one, is accepted.
    pub fn deflate_fully(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        if self.no_context_takeover {
            self.compress.reset();
        }

        // A second flush with no input in between emits nothing, so the
        // empty block is written out by hand.
        if data.is_empty() {
            return Ok(EMPTY_BLOCK.to_vec());
        }

        let mut output = Vec::with_capacity(data.len() / 2 + 16);
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut consumed = 0;

        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();

            self.compress
                .compress(&data[consumed..], &mut chunk, FlushCompress::Sync)
                .map_err(|e| Error::Compression(format!("deflate error: {}", e)))?;

            let read = (self.compress.total_in() - before_in) as usize;
            let written = (self.compress.total_out() - before_out) as usize;
            consumed += read;
            output.extend_from_slice(&chunk[..written]);

            // A partially filled chunk means the flush completed
            if consumed >= data.len() && written < chunk.len() {
                break;
            }
            if read == 0 && written == 0 {
                return Err(Error::Compression("deflate made no progress".into()));
            }
        }

        Ok(output)
    }

    /// Compress one message for the wire, trailer stripped
    pub fn compress(&mut self, data: &[u8]) -> Result<Bytes> {
        let mut output = self.deflate_fully(data)?;
        strip_trailer(&mut output);
        Ok(Bytes::from(output))
    }

    /// Reset the compression context
    pub fn reset(&mut self) {
        self.compress.reset();
    }
}

/// Deflate decompressor for incoming messages
pub struct DeflateDecoder {
    decompress: Decompress,
    no_context_takeover: bool,
}

impl DeflateDecoder {
    /// Create a new decoder
    pub fn new(window_bits: u8, no_context_takeover: bool) -> Self {
        let window_bits = window_bits.clamp(MIN_WINDOW_BITS, MAX_WINDOW_BITS);
        let decompress = Decompress::new_with_window_bits(false, window_bits);

        Self {
            decompress,
            no_context_takeover,
        }
    }

    /// Inflate a sync-flushed deflate stream segment
    pub fn inflate_fully(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.inflate_bounded(data, usize::MAX)
    }

    /// Inflate, failing once the output would exceed `max_size` bytes
    pub fn inflate_bounded(&mut self, data: &[u8], max_size: usize) -> Result<Vec<u8>> {
        if self.no_context_takeover {
            self.decompress.reset(false);
        }

        let mut output = Vec::with_capacity(data.len().saturating_mul(2).min(max_size));
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut consumed = 0;

        loop {
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();

            let status = self
                .decompress
                .decompress(&data[consumed..], &mut chunk, FlushDecompress::Sync)
                .map_err(|e| Error::Compression(format!("inflate error: {}", e)))?;

            let read = (self.decompress.total_in() - before_in) as usize;
            let written = (self.decompress.total_out() - before_out) as usize;
            consumed += read;

            if output.len() + written > max_size {
                return Err(Error::MessageTooLarge { limit: max_size });
            }
            output.extend_from_slice(&chunk[..written]);

            if status == Status::StreamEnd {
                // The peer ended the stream with a final block; start afresh
                self.decompress.reset(false);
                break;
            }
            if consumed >= data.len() && written < chunk.len() {
                break;
            }
            if read == 0 && written == 0 {
                return Err(Error::Compression("truncated deflate stream".into()));
            }
        }

        Ok(output)
    }

    /// Decompress one received RSV1 payload, restoring its trailer first
    pub fn decompress(&mut self, data: &[u8], max_size: usize) -> Result<Bytes> {
        let output = self.inflate_bounded(&with_trailer(data), max_size)?;
        Ok(Bytes::from(output))
    }

    /// Reset the decompression context
    pub fn reset(&mut self) {
        self.decompress.reset(false);
    }
}

/// Combined compressor/decompressor context for a WebSocket connection
pub struct DeflateContext {
    /// Encoder for outgoing messages
    pub encoder: DeflateEncoder,
    /// Decoder for incoming messages
    pub decoder: DeflateDecoder,
    /// Configuration
    pub config: DeflateConfig,
}

impl DeflateContext {
    /// Create context for server role
    pub fn server(config: DeflateConfig) -> Self {
        let encoder = DeflateEncoder::new(
            config.server_max_window_bits,
            config.server_no_context_takeover,
            config.compression_level,
        );
        let decoder = DeflateDecoder::new(
            config.client_max_window_bits,
            config.client_no_context_takeover,
        );

        Self {
            encoder,
            decoder,
            config,
        }
    }

    /// Create context for client role
    pub fn client(config: DeflateConfig) -> Self {
        let encoder = DeflateEncoder::new(
            config.client_max_window_bits,
            config.client_no_context_takeover,
            config.compression_level,
        );
        let decoder = DeflateDecoder::new(
            config.server_max_window_bits,
            config.server_no_context_takeover,
        );

        Self {
            encoder,
            decoder,
            config,
        }
    }

    /// Separate the context into its outbound and inbound halves
    pub fn into_parts(self) -> (DeflateEncoder, DeflateDecoder) {
        (self.encoder, self.decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (DeflateEncoder, DeflateDecoder) {
        (
            DeflateEncoder::new(DEFAULT_WINDOW_BITS, false, 6),
            DeflateDecoder::new(DEFAULT_WINDOW_BITS, false),
        )
    }

    #[test]
    fn test_deflate_inflate_empty() {
        let (mut encoder, mut decoder) = pair();
        let deflated = encoder.deflate_fully(&[]).unwrap();
        assert!(deflated.ends_with(&DEFLATE_TRAILER));
        assert!(decoder.inflate_fully(&deflated).unwrap().is_empty());

        // Repeated empty messages keep both sides in step
        let again = encoder.deflate_fully(&[]).unwrap();
        assert!(decoder.inflate_fully(&again).unwrap().is_empty());
        let text = encoder.deflate_fully(b"after empties").unwrap();
        assert_eq!(decoder.inflate_fully(&text).unwrap(), b"after empties");
    }

    #[test]
    fn test_empty_message_strips_to_single_byte() {
        let (mut encoder, mut decoder) = DeflateContext::client(DeflateConfig::default()).into_parts();
        let compressed = encoder.compress(&[]).unwrap();
        assert_eq!(compressed.as_ref(), &[0x00]);
        assert!(decoder.decompress(&compressed, 1024).unwrap().is_empty());
    }

    #[test]
    fn test_deflate_inflate_random_data() {
        let (mut encoder, mut decoder) = pair();
        for i in 0..200 {
            let len = fastrand::usize(0..10_000);
            let data: Vec<u8> = if i % 2 == 0 {
                (0..len).map(|_| fastrand::u8(..)).collect()
            } else {
                // Compressible input as well
                (0..len).map(|_| fastrand::u8(b'a'..=b'e')).collect()
            };

            let deflated = encoder.deflate_fully(&data).unwrap();
            let inflated = decoder.inflate_fully(&deflated).unwrap();
            assert_eq!(inflated, data, "iteration {}", i);
        }
    }

    #[test]
    fn test_output_larger_than_chunk() {
        let (mut encoder, mut decoder) = pair();
        // Incompressible and several chunks long on both sides
        let data: Vec<u8> = (0..5 * CHUNK_SIZE).map(|_| fastrand::u8(..)).collect();
        let deflated = encoder.deflate_fully(&data).unwrap();
        assert!(deflated.len() > CHUNK_SIZE);
        assert_eq!(decoder.inflate_fully(&deflated).unwrap(), data);
    }

    #[test]
    fn test_compress_decompress() {
        let mut server = DeflateContext::server(DeflateConfig::default());
        let mut client = DeflateContext::client(DeflateConfig::default());

        let original = b"Hello, World! This is a test message that should be compressed.";

        let compressed = server.encoder.compress(original).unwrap();
        assert!(!compressed.ends_with(&DEFLATE_TRAILER));
        assert!(compressed.len() < original.len());

        let decompressed = client.decoder.decompress(&compressed, 1024).unwrap();
        assert_eq!(&decompressed[..], &original[..]);
    }

    #[test]
    fn test_context_takeover() {
        let (mut encoder, _) = DeflateContext::server(DeflateConfig::default()).into_parts();
        let (_, mut decoder) = DeflateContext::client(DeflateConfig::default()).into_parts();

        let msg = b"Hello, World! Hello, World! Hello, World!";
        let first = encoder.compress(msg).unwrap();
        let second = encoder.compress(msg).unwrap();

        // The second message back-references the first
        assert!(second.len() < first.len());

        assert_eq!(&decoder.decompress(&first, 1024).unwrap()[..], msg);
        assert_eq!(&decoder.decompress(&second, 1024).unwrap()[..], msg);
    }

    #[test]
    fn test_no_context_takeover() {
        let config = DeflateConfig {
            server_no_context_takeover: true,
            ..Default::default()
        };
        let mut server = DeflateContext::server(config.clone());
        let mut client = DeflateContext::client(config);

        let msg = b"Hello, World! Hello, World! Hello, World!";
        let first = server.encoder.compress(msg).unwrap();
        let second = server.encoder.compress(msg).unwrap();
        assert_eq!(first, second);

        // Each message inflates on its own
        assert_eq!(&client.decoder.decompress(&second, 1024).unwrap()[..], msg);
    }

    #[test]
    fn test_corrupt_input() {
        let mut ctx = DeflateContext::client(DeflateConfig::default());
        let err = ctx.decoder.decompress(&[0xff, 0xff, 0xff, 0xff], 1024).unwrap_err();
        assert!(matches!(err, Error::Compression(_)));
    }

    #[test]
    fn test_decompression_limit() {
        let mut server = DeflateContext::server(DeflateConfig::default());
        let mut client = DeflateContext::client(DeflateConfig::default());

        let bomb = vec![0u8; 100_000];
        let compressed = server.encoder.compress(&bomb).unwrap();
        let err = client.decoder.decompress(&compressed, 1000).unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { limit: 1000 }));
    }

    #[test]
    fn test_config_from_params() {
        let params = vec![
            ("server_no_context_takeover", None),
            ("client_max_window_bits", Some("12")),
        ];

        let config = DeflateConfig::from_params(&params).unwrap();
        assert!(config.server_no_context_takeover);
        assert!(!config.client_no_context_takeover);
        assert_eq!(config.client_max_window_bits, 12);
        assert_eq!(config.server_max_window_bits, DEFAULT_WINDOW_BITS);

        assert!(DeflateConfig::from_params(&[("server_max_window_bits", Some("16"))]).is_err());
        assert!(DeflateConfig::from_params(&[("bogus", None)]).is_err());
    }

    #[test]
    fn test_config_from_header() {
        let config = DeflateConfig::from_header(
            "permessage-deflate; client_no_context_takeover; server_max_window_bits=10",
        )
        .unwrap();
        assert!(config.client_no_context_takeover);
        assert_eq!(config.server_max_window_bits, 10);

        assert_eq!(
            DeflateConfig::from_header("permessage-deflate").unwrap(),
            DeflateConfig::default()
        );
        assert!(DeflateConfig::from_header("x-webkit-deflate-frame").is_err());
    }
}
