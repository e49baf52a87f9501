//! Packed, MSB-first bit set over piece indices.
//!
//! Bit `i` lives in byte `i / 8` at bit position `7 - (i % 8)`. Peers
//! advertise possession of pieces with this layout both in the initial
//! `Bitfield` message and in subsequent `Have` updates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitfield(pub Vec<u8>);

impl Bitfield {
    pub fn new(len_bytes: usize) -> Self {
        Self(vec![0u8; len_bytes])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Out-of-range indices return `false` rather than panicking: peers
    /// may send a `Have` for an index beyond our declared piece count
    /// only if malformed, and we ignore that defensively.
    pub fn has(&self, index: usize) -> bool {
        let byte_index = index / 8;
        let bit_offset = index % 8;
        match self.0.get(byte_index) {
            Some(byte) => (byte >> (7 - bit_offset)) & 1 != 0,
            None => false,
        }
    }

    /// Silent no-op on an out-of-range index.
    pub fn set(&mut self, index: usize) {
        let byte_index = index / 8;
        let bit_offset = index % 8;
        if let Some(byte) = self.0.get_mut(byte_index) {
            *byte |= 1 << (7 - bit_offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_piece_is_msb_first() {
        let bf = Bitfield::from_bytes(vec![0b0101_0100, 0b0101_0100]);
        let expected = [
            false, true, false, true, false, true, false, false, false, true, false, true, false,
            true, false, false,
        ];
        for (i, &want) in expected.iter().enumerate() {
            assert_eq!(bf.has(i), want, "bit {i}");
        }
    }

    #[test]
    fn set_piece_sets_only_target_bit() {
        let mut bf = Bitfield::from_bytes(vec![0b0101_0100, 0b0101_0100]);
        bf.set(4);
        assert_eq!(bf, Bitfield::from_bytes(vec![0b0101_1100, 0b0101_0100]));

        let mut bf = Bitfield::from_bytes(vec![0b0101_0100, 0b0101_0100]);
        bf.set(15);
        assert_eq!(bf, Bitfield::from_bytes(vec![0b0101_0100, 0b0101_0101]));
    }

    #[test]
    fn out_of_range_is_noop() {
        let mut bf = Bitfield::from_bytes(vec![0b0101_0100, 0b0101_0100]);
        assert!(!bf.has(100));
        bf.set(100);
        assert_eq!(bf, Bitfield::from_bytes(vec![0b0101_0100, 0b0101_0100]));
    }

    #[test]
    fn empty_bitfield_has_nothing() {
        let bf = Bitfield::new(0);
        assert!(!bf.has(0));
    }
}
