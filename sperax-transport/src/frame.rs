//! Frame codec
//!
//! Frames are the only thing that crosses the BLE link. They are built
//! exclusively through [`Frame::encode`] so the header/trailer/checksum
//! invariants live in one place; call sites never assemble framing
//! bytes inline.

use thiserror::Error;

use crate::checksum::crc16;
use crate::protocol::{FRAME_HEADER, FRAME_OVERHEAD, FRAME_RESERVED, FRAME_TRAILER, MAX_PAYLOAD};

/// Framing errors. Decode failures are never fatal to a session; the
/// offending notification is logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("bad header byte 0x{0:02X}")]
    BadHeader(u8),

    #[error("bad trailer byte 0x{0:02X}")]
    BadTrailer(u8),

    #[error("declared length {declared} does not match frame length {actual}")]
    LengthMismatch { declared: u8, actual: usize },

    #[error("checksum mismatch: computed 0x{computed:04X}, frame carries 0x{carried:04X}")]
    ChecksumMismatch { computed: u16, carried: u16 },

    #[error("payload too long: {0} bytes")]
    PayloadTooLong(usize),
}

/// An encoded wire frame. Immutable after construction; discarded after
/// transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap `payload` in header, length, reserved byte, checksum and
    /// trailer. The length byte counts the whole frame, so payloads
    /// above [`MAX_PAYLOAD`] are rejected.
    pub fn encode(payload: &[u8]) -> Result<Frame, FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }

        let total = payload.len() + FRAME_OVERHEAD;
        let mut bytes = Vec::with_capacity(total);
        bytes.push(FRAME_HEADER);
        bytes.push(total as u8);
        bytes.push(FRAME_RESERVED);
        bytes.extend_from_slice(payload);

        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.push(FRAME_TRAILER);

        Ok(Frame { bytes })
    }

    /// Validate an inbound byte sequence and extract its payload.
    ///
    /// Checks run in a fixed order (minimum length, header, trailer,
    /// declared length, checksum) and the first failure is returned.
    /// There is no lenient acceptance: any mismatch is a hard reject.
    pub fn decode(data: &[u8]) -> Result<Vec<u8>, FrameError> {
        if data.len() < FRAME_OVERHEAD {
            return Err(FrameError::TooShort(data.len()));
        }
        if data[0] != FRAME_HEADER {
            return Err(FrameError::BadHeader(data[0]));
        }
        let trailer = data[data.len() - 1];
        if trailer != FRAME_TRAILER {
            return Err(FrameError::BadTrailer(trailer));
        }
        let declared = data[1];
        if declared as usize != data.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: data.len(),
            });
        }

        let crc_offset = data.len() - 3;
        let computed = crc16(&data[..crc_offset]);
        let carried = u16::from_le_bytes([data[crc_offset], data[crc_offset + 1]]);
        if computed != carried {
            return Err(FrameError::ChecksumMismatch { computed, carried });
        }

        Ok(data[3..crc_offset].to_vec())
    }

    /// Raw frame bytes, ready for the control characteristic.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, yielding its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The documented capture of the vendor app: payload `[0x0E, 0x02]`
    /// framed as `F5 08 00 0E 02 14 47 FA`.
    const CAPTURE: [u8; 8] = [0xF5, 0x08, 0x00, 0x0E, 0x02, 0x14, 0x47, 0xFA];

    #[test]
    fn encode_reproduces_documented_capture() {
        let frame = Frame::encode(&[0x0E, 0x02]).unwrap();
        assert_eq!(frame.as_bytes(), &CAPTURE);
    }

    #[test]
    fn round_trip_all_payload_lengths() {
        for len in 0..=MAX_PAYLOAD {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frame = Frame::encode(&payload).unwrap();
            assert_eq!(Frame::decode(frame.as_bytes()).unwrap(), payload);
        }
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert_eq!(
            Frame::encode(&payload),
            Err(FrameError::PayloadTooLong(MAX_PAYLOAD + 1))
        );
    }

    #[test]
    fn truncated_input_is_too_short() {
        assert_eq!(Frame::decode(&CAPTURE[..5]), Err(FrameError::TooShort(5)));
        assert_eq!(Frame::decode(&[]), Err(FrameError::TooShort(0)));
    }

    /// Flipping any single byte of a valid frame must fail decode. Every
    /// position maps to a deterministic error variant: header, trailer
    /// and length corruption are caught by their dedicated checks, and
    /// everything else lands on the checksum.
    #[test]
    fn any_single_byte_flip_fails_decode() {
        for i in 0..CAPTURE.len() {
            let mut corrupted = CAPTURE;
            corrupted[i] ^= 0x01;
            let err = Frame::decode(&corrupted).unwrap_err();
            match i {
                0 => assert!(matches!(err, FrameError::BadHeader(_))),
                1 => assert!(matches!(err, FrameError::LengthMismatch { .. })),
                7 => assert!(matches!(err, FrameError::BadTrailer(_))),
                _ => assert!(
                    matches!(err, FrameError::ChecksumMismatch { .. }),
                    "byte {i}: {err:?}"
                ),
            }
        }
    }

    /// Checksum corruption across many random-ish flips: with a 16-bit
    /// check a collision over single-bit flips of a short frame is not
    /// possible in practice; assert it never parses.
    #[test]
    fn checksum_corruption_never_parses() {
        let frame = Frame::encode(&[0x15, 0x01, 0x14, 0x00]).unwrap();
        let bytes = frame.as_bytes();
        for i in 2..bytes.len() - 1 {
            for bit in 0..8 {
                let mut corrupted = bytes.to_vec();
                corrupted[i] ^= 1 << bit;
                assert!(
                    Frame::decode(&corrupted).is_err(),
                    "flip bit {bit} of byte {i} parsed"
                );
            }
        }
    }

    #[test]
    fn empty_payload_frame_is_six_bytes() {
        let frame = Frame::encode(&[]).unwrap();
        assert_eq!(frame.as_bytes().len(), FRAME_OVERHEAD);
        assert_eq!(Frame::decode(frame.as_bytes()).unwrap(), Vec::<u8>::new());
    }
}
