//! CRC-8 frame checksum
//!
//! CRC-8/MAXIM-DOW: polynomial 0x31 reflected (0x8C processed LSB first),
//! initial value 0x00, no final XOR. The firmware on the mesh nodes uses the
//! same routine, so the variant is part of the wire format.

use crc::{Crc, CRC_8_MAXIM_DOW};

const FRAME_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Compute the 8-bit checksum of `data`
pub fn checksum(data: &[u8]) -> u8 {
    FRAME_CRC.checksum(data)
}

/// Recompute the checksum of `data` and compare it with `expected`
pub fn verify(data: &[u8], expected: u8) -> bool {
    checksum(data) == expected
}
