//! Wire framing for sample batches.
//!
//! A frame is one marker byte followed by `batch_len` little-endian IEEE-754
//! `f32` values. There is no length field and no checksum: the decoder finds
//! frame boundaries by scanning for the marker and then reads a fixed-size
//! payload. A marker-valued byte inside a payload can therefore misframe one
//! batch, but scanning recovers on the next genuine marker.

use crate::source::{ByteSource, SourceError};

pub const DEFAULT_MARKER: u8 = 0xAA;
pub const DEFAULT_BATCH_LEN: usize = 64;
pub const SAMPLE_BYTES: usize = 4;

/// Frames scanned without a marker before a call gives up with `NoData`.
const SCAN_LIMIT_FRAMES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFormat {
    pub marker: u8,
    pub batch_len: usize,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER,
            batch_len: DEFAULT_BATCH_LEN,
        }
    }
}

impl FrameFormat {
    pub fn payload_len(&self) -> usize {
        self.batch_len * SAMPLE_BYTES
    }

    pub fn frame_len(&self) -> usize {
        1 + self.payload_len()
    }
}

#[derive(Debug, PartialEq)]
pub enum DecodeOutcome<'a> {
    /// Nothing ready on the source.
    NoData,
    /// A marker was found but the payload ran short. The bytes are dropped.
    IncompletePayload { received: usize },
    Decoded(&'a [f32]),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub decoded: u64,
    pub incomplete: u64,
    pub discarded_bytes: u64,
}

pub struct FrameDecoder {
    format: FrameFormat,
    payload: Vec<u8>,
    batch: Vec<f32>,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            format,
            payload: vec![0u8; format.payload_len()],
            batch: vec![0.0; format.batch_len],
            stats: DecoderStats::default(),
        }
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Attempt to read one complete frame from `source`.
    ///
    /// Partial payloads are never carried across calls; every call starts
    /// with a fresh marker search.
    pub fn try_read_batch<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<DecodeOutcome<'_>, SourceError> {
        if !self.seek_marker(source)? {
            return Ok(DecodeOutcome::NoData);
        }

        let received = read_payload(source, &mut self.payload)?;
        if received < self.payload.len() {
            self.stats.incomplete += 1;
            return Ok(DecodeOutcome::IncompletePayload { received });
        }

        decode_payload(&self.payload, &mut self.batch);
        self.stats.decoded += 1;
        Ok(DecodeOutcome::Decoded(&self.batch))
    }

    fn seek_marker<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<bool, SourceError> {
        let limit = self.format.frame_len() * SCAN_LIMIT_FRAMES;
        let mut byte = [0u8; 1];
        for _ in 0..limit {
            if source.read_available(&mut byte)? == 0 {
                return Ok(false);
            }
            if byte[0] == self.format.marker {
                return Ok(true);
            }
            self.stats.discarded_bytes += 1;
        }
        Ok(false)
    }
}

fn read_payload<S: ByteSource + ?Sized>(
    source: &mut S,
    payload: &mut [u8],
) -> Result<usize, SourceError> {
    let mut received = 0;
    while received < payload.len() {
        let n = source.read_available(&mut payload[received..])?;
        if n == 0 {
            break;
        }
        received += n;
    }
    Ok(received)
}

fn decode_payload(payload: &[u8], out: &mut [f32]) {
    for (value, chunk) in out.iter_mut().zip(payload.chunks_exact(SAMPLE_BYTES)) {
        *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

/// Build the wire bytes for one frame.
pub fn encode_frame(marker: u8, values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + values.len() * SAMPLE_BYTES);
    bytes.push(marker);
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReaderSource;
    use std::collections::VecDeque;
    use std::io::Cursor;

    const N: usize = 8;

    fn format() -> FrameFormat {
        FrameFormat {
            marker: DEFAULT_MARKER,
            batch_len: N,
        }
    }

    fn cursor(bytes: Vec<u8>) -> ReaderSource<Cursor<Vec<u8>>> {
        ReaderSource::new(Cursor::new(bytes), "test")
    }

    /// Delivers queued bursts; each burst ends with one empty read.
    struct BurstSource {
        bursts: VecDeque<VecDeque<u8>>,
    }

    impl BurstSource {
        fn new(bursts: Vec<Vec<u8>>) -> Self {
            Self {
                bursts: bursts.into_iter().map(VecDeque::from).collect(),
            }
        }
    }

    impl ByteSource for BurstSource {
        fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
            let Some(burst) = self.bursts.front_mut() else {
                return Ok(0);
            };
            if burst.is_empty() {
                self.bursts.pop_front();
                return Ok(0);
            }
            let n = buf.len().min(burst.len());
            for (slot, byte) in buf.iter_mut().zip(burst.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }

        fn describe(&self) -> String {
            "bursts".to_string()
        }
    }

    fn ramp(offset: f32) -> Vec<f32> {
        (0..N).map(|i| offset + i as f32 * 0.5).collect()
    }

    #[test]
    fn test_decodes_valid_frame_exactly() {
        let values = vec![0.0, -1.5, 3.25, f32::MAX, f32::MIN_POSITIVE, 1e-30, 42.0, -0.0];
        let mut source = cursor(encode_frame(DEFAULT_MARKER, &values));
        let mut decoder = FrameDecoder::new(format());

        match decoder.try_read_batch(&mut source).unwrap() {
            DecodeOutcome::Decoded(batch) => {
                let got: Vec<u32> = batch.iter().map(|v| v.to_bits()).collect();
                let want: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
                assert_eq!(got, want);
            }
            other => panic!("expected a decoded batch, got {other:?}"),
        }
        assert_eq!(decoder.stats().decoded, 1);
    }

    #[test]
    fn test_all_zero_frame() {
        let mut bytes = vec![DEFAULT_MARKER];
        bytes.extend(std::iter::repeat(0u8).take(N * SAMPLE_BYTES));
        let mut source = cursor(bytes);
        let mut decoder = FrameDecoder::new(format());

        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::Decoded(&[0.0; N])
        );
    }

    #[test]
    fn test_nan_and_infinity_pass_through() {
        let mut values = ramp(0.0);
        values[1] = f32::NAN;
        values[2] = f32::INFINITY;
        let mut source = cursor(encode_frame(DEFAULT_MARKER, &values));
        let mut decoder = FrameDecoder::new(format());

        let DecodeOutcome::Decoded(batch) = decoder.try_read_batch(&mut source).unwrap() else {
            panic!("expected a decoded batch");
        };
        assert!(batch[1].is_nan());
        assert_eq!(batch[2], f32::INFINITY);
    }

    #[test]
    fn test_special_values_keep_their_exact_bits() {
        let bits = [0x7FC0_1234u32, 0xFF80_0001, 0x0000_0001, 0x8000_0000];
        let values: Vec<f32> = bits.iter().map(|&b| f32::from_bits(b)).collect();
        let mut source = cursor(encode_frame(DEFAULT_MARKER, &values));
        let mut decoder = FrameDecoder::new(FrameFormat {
            marker: DEFAULT_MARKER,
            batch_len: bits.len(),
        });

        let DecodeOutcome::Decoded(batch) = decoder.try_read_batch(&mut source).unwrap() else {
            panic!("expected a decoded batch");
        };
        let decoded: Vec<u32> = batch.iter().map(|v| v.to_bits()).collect();
        assert_eq!(decoded, bits);
    }

    #[test]
    fn test_empty_source_is_no_data() {
        let mut source = cursor(Vec::new());
        let mut decoder = FrameDecoder::new(format());
        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::NoData
        );
    }

    #[test]
    fn test_short_payload_is_incomplete() {
        let mut bytes = vec![DEFAULT_MARKER];
        bytes.extend(std::iter::repeat(7u8).take(N * 2));
        let mut source = cursor(bytes);
        let mut decoder = FrameDecoder::new(format());

        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::IncompletePayload { received: N * 2 }
        );
        assert_eq!(decoder.stats().incomplete, 1);
        assert_eq!(decoder.stats().decoded, 0);
    }

    #[test]
    fn test_incomplete_bytes_are_not_carried_over() {
        let frame = encode_frame(DEFAULT_MARKER, &ramp(1.0));
        let (head, tail) = frame.split_at(10);
        let mut source = BurstSource::new(vec![head.to_vec(), tail.to_vec()]);
        let mut decoder = FrameDecoder::new(format());

        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::IncompletePayload { received: 9 }
        );
        // The tail has no marker of its own, so it cannot complete the frame.
        let outcome = decoder.try_read_batch(&mut source).unwrap();
        assert!(!matches!(outcome, DecodeOutcome::Decoded(_)));
    }

    #[test]
    fn test_payload_split_across_reads_within_one_call() {
        use std::io::Read;

        // Hands out three bytes per read.
        struct Trickle(Cursor<Vec<u8>>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let len = buf.len().min(3);
                self.0.read(&mut buf[..len])
            }
        }

        let values = ramp(2.0);
        let frame = encode_frame(DEFAULT_MARKER, &values);
        let mut source = ReaderSource::new(Trickle(Cursor::new(frame)), "trickle");
        let mut decoder = FrameDecoder::new(format());

        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::Decoded(values.as_slice())
        );
    }

    #[test]
    fn test_markerless_stream_never_decodes() {
        let bytes: Vec<u8> = (0..2_000u32)
            .map(|i| (i % 251) as u8)
            .filter(|b| *b != DEFAULT_MARKER)
            .collect();
        let total = bytes.len() as u64;
        let mut source = cursor(bytes);
        let mut decoder = FrameDecoder::new(format());

        for _ in 0..100 {
            assert_eq!(
                decoder.try_read_batch(&mut source).unwrap(),
                DecodeOutcome::NoData
            );
        }
        assert_eq!(decoder.stats().discarded_bytes, total);
    }

    #[test]
    fn test_noise_before_marker_is_discarded_and_counted() {
        let values = ramp(3.0);
        let mut bytes = vec![0x01, 0x55, 0xFF];
        bytes.extend(encode_frame(DEFAULT_MARKER, &values));
        let mut source = cursor(bytes);
        let mut decoder = FrameDecoder::new(format());

        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::Decoded(values.as_slice())
        );
        assert_eq!(decoder.stats().discarded_bytes, 3);
    }

    #[test]
    fn test_resynchronizes_after_stray_marker() {
        // A stray marker followed by a truncated payload, then a clean frame.
        let good = ramp(10.0);
        let mut first = vec![DEFAULT_MARKER, 0x00, 0x00, 0x80];
        first.extend(std::iter::repeat(0x11u8).take(5));
        let mut source = BurstSource::new(vec![first, encode_frame(DEFAULT_MARKER, &good)]);
        let mut decoder = FrameDecoder::new(format());

        assert!(matches!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::IncompletePayload { .. }
        ));
        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::Decoded(good.as_slice())
        );
    }

    #[test]
    fn test_misframed_batch_then_recovery() {
        // A marker byte inside the first frame's payload shifts framing by
        // one batch at most; the following frames line up again.
        let mut corrupted = ramp(0.0);
        corrupted[0] = f32::from_le_bytes([0x00, DEFAULT_MARKER, 0x00, 0x00]);
        let good = ramp(100.0);

        let mut bytes = vec![0x13, 0x37];
        bytes.extend_from_slice(&encode_frame(DEFAULT_MARKER, &corrupted)[1..]);
        bytes.extend(encode_frame(DEFAULT_MARKER, &good));
        bytes.extend(encode_frame(DEFAULT_MARKER, &good));
        let mut source = cursor(bytes);
        let mut decoder = FrameDecoder::new(format());

        let mut decoded = Vec::new();
        loop {
            match decoder.try_read_batch(&mut source).unwrap() {
                DecodeOutcome::Decoded(batch) => decoded.push(batch.to_vec()),
                DecodeOutcome::IncompletePayload { .. } => continue,
                DecodeOutcome::NoData => break,
            }
        }
        assert_eq!(decoded.last(), Some(&good));
    }

    #[test]
    fn test_back_to_back_frames() {
        let first = ramp(1.0);
        let second = ramp(-1.0);
        let mut bytes = encode_frame(DEFAULT_MARKER, &first);
        bytes.extend(encode_frame(DEFAULT_MARKER, &second));
        let mut source = cursor(bytes);
        let mut decoder = FrameDecoder::new(format());

        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::Decoded(first.as_slice())
        );
        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::Decoded(second.as_slice())
        );
        assert_eq!(decoder.stats().decoded, 2);
    }

    #[test]
    fn test_custom_marker() {
        let format = FrameFormat {
            marker: 0x7E,
            batch_len: 2,
        };
        let mut bytes = vec![DEFAULT_MARKER];
        bytes.extend(encode_frame(0x7E, &[1.0, 2.0]));
        let mut source = cursor(bytes);
        let mut decoder = FrameDecoder::new(format);

        assert_eq!(
            decoder.try_read_batch(&mut source).unwrap(),
            DecodeOutcome::Decoded(&[1.0, 2.0])
        );
        assert_eq!(decoder.stats().discarded_bytes, 1);
    }

    #[test]
    fn test_frame_lengths() {
        let format = FrameFormat::default();
        assert_eq!(format.payload_len(), 256);
        assert_eq!(format.frame_len(), 257);
        assert_eq!(encode_frame(format.marker, &[0.0; 64]).len(), 257);
    }
}
