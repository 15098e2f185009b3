//! Bit-level stream primitives and the Golomb-Rice integer code used by the
//! compressed postings format.
//!
//! Bits are packed MSB-first within each byte. A truncated stream is not an
//! error at this level: readers report end-of-stream through `None` and the
//! caller keeps whatever was decoded before the cut.

/// MSB-first bit stream writer.
#[derive(Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    current: u8,
    bit_count: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current |= 1 << (7 - self.bit_count);
        }
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.buf.push(self.current);
            self.current = 0;
            self.bit_count = 0;
        }
    }

    /// Write the low `bits` bits of `value`, most significant first.
    pub fn write_bits(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Unary code: `q` one-bits terminated by a zero-bit.
    pub fn write_unary(&mut self, q: u32) {
        for _ in 0..q {
            self.write_bit(true);
        }
        self.write_bit(false);
    }

    /// Flush the partial byte (zero-padded) and return the stream.
    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.buf.push(self.current);
        }
        self.buf
    }
}

/// MSB-first bit stream reader over a borrowed byte slice.
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_index: usize,
    bit_index: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_index: 0,
            bit_index: 0,
        }
    }

    pub fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.data.get(self.byte_index)?;
        let bit = (byte >> (7 - self.bit_index)) & 1 == 1;
        self.bit_index += 1;
        if self.bit_index == 8 {
            self.bit_index = 0;
            self.byte_index += 1;
        }
        Some(bit)
    }

    pub fn read_bits(&mut self, bits: u32) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..bits {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Some(value)
    }

    pub fn read_unary(&mut self) -> Option<u32> {
        let mut q = 0u32;
        while self.read_bit()? {
            q += 1;
        }
        Some(q)
    }
}

/// Bit width of the truncated-binary remainder for divisor `m`.
fn remainder_bits(m: u32) -> u32 {
    let mut b = 0;
    while (1u32 << b) < m {
        b += 1;
    }
    b
}

/// Golomb code of `x` with divisor `m`: quotient in unary, remainder in
/// truncated binary.
pub fn golomb_encode(x: u32, m: u32, writer: &mut BitWriter) {
    debug_assert!(m >= 1);
    let q = x / m;
    let r = x % m;
    writer.write_unary(q);

    let b = remainder_bits(m);
    if b == 0 {
        return;
    }
    let cutoff = (1u32 << b) - m;
    if r < cutoff {
        writer.write_bits(r, b - 1);
    } else {
        writer.write_bits(r + cutoff, b);
    }
}

/// Inverse of [`golomb_encode`]; `None` once the stream runs out.
pub fn golomb_decode(m: u32, reader: &mut BitReader<'_>) -> Option<u32> {
    debug_assert!(m >= 1);
    let q = reader.read_unary()?;

    let b = remainder_bits(m);
    if b == 0 {
        return Some(q * m);
    }
    let cutoff = (1u32 << b) - m;
    let mut r = reader.read_bits(b - 1)?;
    if r >= cutoff {
        let next = reader.read_bits(1)?;
        r = ((r << 1) | next) - cutoff;
    }
    Some(q * m + r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_writer_packs_msb_first() {
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bit(false);
        w.write_bit(true);
        assert_eq!(w.into_bytes(), vec![0b1010_0000]);
    }

    #[test]
    fn write_bits_round_trips_through_reader() {
        let mut w = BitWriter::new();
        w.write_bits(0b1101_0110_1, 9);
        w.write_bits(0b111, 3);
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(9), Some(0b1101_0110_1));
        assert_eq!(r.read_bits(3), Some(0b111));
    }

    #[test]
    fn unary_round_trip() {
        let mut w = BitWriter::new();
        for q in [0u32, 1, 7, 20] {
            w.write_unary(q);
        }
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        for q in [0u32, 1, 7, 20] {
            assert_eq!(r.read_unary(), Some(q));
        }
    }

    #[test]
    fn reader_reports_end_of_stream() {
        let mut r = BitReader::new(&[0b1111_1111]);
        // An unterminated unary run hits the end of the stream.
        assert_eq!(r.read_unary(), None);
    }

    #[test]
    fn golomb_round_trip_power_of_two_divisors() {
        for m in [8u32, 16, 128] {
            let values = [0u32, 1, 2, m - 1, m, m + 1, 3 * m + 5, 1000];
            let mut w = BitWriter::new();
            for &v in &values {
                golomb_encode(v, m, &mut w);
            }
            let bytes = w.into_bytes();
            let mut r = BitReader::new(&bytes);
            for &v in &values {
                assert_eq!(golomb_decode(m, &mut r), Some(v), "m={m} v={v}");
            }
        }
    }

    #[test]
    fn golomb_round_trip_non_power_of_two_divisors() {
        for m in [1u32, 3, 5, 10, 100] {
            let values = [0u32, 1, m.saturating_sub(1), m, m + 1, 7 * m + 2];
            let mut w = BitWriter::new();
            for &v in &values {
                golomb_encode(v, m, &mut w);
            }
            let bytes = w.into_bytes();
            let mut r = BitReader::new(&bytes);
            for &v in &values {
                assert_eq!(golomb_decode(m, &mut r), Some(v), "m={m} v={v}");
            }
        }
    }
}
