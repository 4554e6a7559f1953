//! Generalized table-driven CRC engine
//!
//! Supports arbitrary widths from 1 to 64 bits with configurable polynomial,
//! seed, final XOR and input/output bit reflection. A model pre-computes its
//! 256-entry lookup table once at construction and is immutable afterwards,
//! so it can be shared read-only (e.g. behind an `Arc`) between threads.

use std::fmt;

/// Mask covering the low `width` bits of a `u64`.
fn width_mask(width: u32) -> u64 {
    if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Reverse the low `width` bits of `value`, discarding the rest.
fn reverse_bits(value: u64, width: u32) -> u64 {
    (value & width_mask(width)).reverse_bits() >> (64 - width)
}

/// A CRC model definition with its pre-computed lookup table.
///
/// The model parameters cannot be changed after construction; all numeric
/// parameters are masked to the configured bit size.
#[derive(Clone)]
pub struct CrcModel {
    name: String,
    size: u32,
    poly: u64,
    seed: u64,
    xor_out: u64,
    reflect_in: bool,
    reflect_out: bool,
    mask: u64,
    table: [u64; 256],
}

impl CrcModel {
    /// Create a new CRC model and pre-compute its lookup table.
    ///
    /// # Panics
    ///
    /// Panics if `size` is not in `1..=64`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        size: u32,
        poly: u64,
        seed: u64,
        xor_out: u64,
        reflect_in: bool,
        reflect_out: bool,
    ) -> Self {
        assert!(
            (1..=64).contains(&size),
            "CRC width must be between 1 and 64 bits, got {size}"
        );

        let mask = width_mask(size);
        let mut model = Self {
            name: name.to_string(),
            size,
            poly: poly & mask,
            seed: seed & mask,
            xor_out: xor_out & mask,
            reflect_in,
            reflect_out,
            mask,
            table: [0u64; 256],
        };
        model.table = model.generate_lookup_table();
        model
    }

    /// CRC-8 (poly 0x07, no reflection)
    pub fn crc8() -> Self {
        Self::new("CRC-8", 8, 0x07, 0x00, 0x00, false, false)
    }

    /// CRC-16/CCITT-FALSE (poly 0x1021, seed 0xFFFF)
    pub fn crc16_ccitt_false() -> Self {
        Self::new("CRC-16/CCITT-FALSE", 16, 0x1021, 0xFFFF, 0x0000, false, false)
    }

    /// CRC-32 (poly 0x04C11DB7, reflected, as used by zip/png/ethernet)
    pub fn crc32() -> Self {
        Self::new(
            "CRC-32",
            32,
            0x04C1_1DB7,
            0xFFFF_FFFF,
            0xFFFF_FFFF,
            true,
            true,
        )
    }

    /// CRC-5/USB (poly 0x05, reflected)
    pub fn crc5_usb() -> Self {
        Self::new("CRC-5/USB", 5, 0x05, 0x1F, 0x1F, true, true)
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Width of the CRC in bits
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Polynomial, masked to the model width
    pub fn poly(&self) -> u64 {
        self.poly
    }

    /// Initial value, masked to the model width
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Value XORed into the CRC before it is returned
    pub fn xor_out(&self) -> u64 {
        self.xor_out
    }

    /// Whether input bytes are bit-reversed before processing
    pub fn reflect_in(&self) -> bool {
        self.reflect_in
    }

    /// Whether the final CRC value is bit-reversed before the output XOR
    pub fn reflect_out(&self) -> bool {
        self.reflect_out
    }

    /// The pre-computed 256-entry lookup table
    pub fn lookup_table(&self) -> &[u64; 256] {
        &self.table
    }

    /// Compute the CRC of `data` using the model's seed.
    pub fn compute(&self, data: &[u8]) -> u64 {
        self.compute_seeded(data, self.seed)
    }

    /// Compute the CRC of `data` starting from an explicit seed.
    ///
    /// Passing the running value of a previous block allows chained
    /// computation over data split across buffers (for models without
    /// output reflection or XOR, the previous `compute` result can be fed
    /// back directly).
    pub fn compute_seeded(&self, data: &[u8], seed: u64) -> u64 {
        let mut crc;

        if self.size >= 8 {
            let shift = self.size - 8;
            crc = seed & self.mask;
            for &b in data {
                let byte = if self.reflect_in {
                    b.reverse_bits() as u64
                } else {
                    b as u64
                };
                let pos = (0xFF & ((crc >> shift) ^ byte)) as usize;
                crc = self.mask & ((crc << 8) ^ self.table[pos]);
            }
        } else if self.reflect_in {
            // Narrow reflected models keep the running value bit-reversed
            // and flip it back before the output stage.
            crc = reverse_bits(seed & self.mask, self.size);
            for &b in data {
                let pos = (0xFF & (crc ^ b as u64)) as usize;
                crc = self.mask & ((crc >> 8) ^ self.table[pos]);
            }
            crc = reverse_bits(crc, self.size);
        } else {
            // Narrow straight models work left-aligned within a byte.
            let shift = 8 - self.size;
            crc = (seed & self.mask) << shift;
            for &b in data {
                let pos = (0xFF & (crc ^ b as u64)) as usize;
                crc = (self.mask << shift) & ((crc << self.size) ^ (self.table[pos] << shift));
            }
            crc >>= shift;
        }

        if self.reflect_out {
            crc = reverse_bits(crc, self.size);
        }
        crc ^ self.xor_out
    }

    fn generate_lookup_table(&self) -> [u64; 256] {
        let mut table = [0u64; 256];

        if self.size >= 8 {
            let shift = self.size - 8;
            let check = 1u64 << (self.size - 1);

            for (idx, entry) in table.iter_mut().enumerate() {
                let mut byte = (idx as u64) << shift;
                for _ in 0..8 {
                    byte = if byte & check != 0 {
                        (byte << 1) ^ self.poly
                    } else {
                        byte << 1
                    };
                }
                *entry = self.mask & byte;
            }
        } else {
            let shift = 8 - self.size;
            let check = 0x80u64;

            for (idx, entry) in table.iter_mut().enumerate() {
                let mut byte = if self.reflect_in {
                    reverse_bits(idx as u64, 8)
                } else {
                    idx as u64
                };
                for _ in 0..8 {
                    byte = if byte & check != 0 {
                        (byte << 1) ^ (self.poly << shift)
                    } else {
                        byte << 1
                    };
                }
                let folded = if self.reflect_in {
                    reverse_bits(byte >> shift, self.size)
                } else {
                    byte >> shift
                };
                *entry = self.mask & folded;
            }
        }

        table
    }
}

impl Default for CrcModel {
    fn default() -> Self {
        Self::crc16_ccitt_false()
    }
}

impl fmt::Debug for CrcModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_width = (2 * ((self.size + 7) / 8)) as usize;
        f.debug_struct("CrcModel")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("poly", &format_args!("{:#0w$x}", self.poly, w = hex_width + 2))
            .field("seed", &format_args!("{:#0w$x}", self.seed, w = hex_width + 2))
            .field(
                "xor_out",
                &format_args!("{:#0w$x}", self.xor_out, w = hex_width + 2),
            )
            .field("reflect_in", &self.reflect_in)
            .field("reflect_out", &self.reflect_out)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Standard check input used by CRC catalogs.
    const CHECK_INPUT: &[u8] = b"123456789";

    #[test]
    fn test_crc8_check_value() {
        assert_eq!(CrcModel::crc8().compute(CHECK_INPUT), 0xF4);
    }

    #[test]
    fn test_crc8_ebu_check_value() {
        let model = CrcModel::new("CRC-8/EBU", 8, 0x1D, 0xFF, 0x00, true, true);
        assert_eq!(model.compute(CHECK_INPUT), 0x97);
    }

    #[test]
    fn test_crc16_ccitt_false_check_value() {
        assert_eq!(CrcModel::crc16_ccitt_false().compute(CHECK_INPUT), 0x29B1);
    }

    #[test]
    fn test_crc16_maxim_check_value() {
        let model = CrcModel::new("CRC-16/MAXIM", 16, 0x8005, 0x0000, 0xFFFF, true, true);
        assert_eq!(model.compute(CHECK_INPUT), 0x44C2);
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(CrcModel::crc32().compute(CHECK_INPUT), 0xCBF4_3926);
    }

    #[test]
    fn test_crc32_posix_check_value() {
        let model = CrcModel::new(
            "CRC-32/POSIX",
            32,
            0x04C1_1DB7,
            0x0000_0000,
            0xFFFF_FFFF,
            false,
            false,
        );
        assert_eq!(model.compute(CHECK_INPUT), 0x765E_7680);
    }

    #[test]
    fn test_crc4_itu_check_value() {
        let model = CrcModel::new("CRC-4/ITU", 4, 0x03, 0x00, 0x00, true, true);
        assert_eq!(model.compute(CHECK_INPUT), 0x07);
    }

    #[test]
    fn test_crc5_epc_check_value() {
        let model = CrcModel::new("CRC-5/EPC", 5, 0x09, 0x09, 0x00, false, false);
        assert_eq!(model.compute(CHECK_INPUT), 0x00);
    }

    #[test]
    fn test_crc5_usb_check_value() {
        assert_eq!(CrcModel::crc5_usb().compute(CHECK_INPUT), 0x19);
    }

    #[test]
    fn test_crc32_matches_crc32fast() {
        let model = CrcModel::crc32();
        for data in [
            &b""[..],
            &b"a"[..],
            &b"123456789"[..],
            &b"The quick brown fox jumps over the lazy dog"[..],
            &[0x00, 0xFF, 0x55, 0xAA, 0x01][..],
        ] {
            assert_eq!(
                model.compute(data),
                crc32fast::hash(data) as u64,
                "mismatch for input {data:02X?}"
            );
        }
    }

    #[test]
    fn test_empty_input_yields_seed_transform() {
        // With no data the result is just the (reflected) seed XOR xor_out.
        let model = CrcModel::crc16_ccitt_false();
        assert_eq!(model.compute(&[]), 0xFFFF);
    }

    #[test]
    fn test_chained_compute_matches_single_pass() {
        let model = CrcModel::crc16_ccitt_false();
        let data = b"framed transport payload";
        let (head, tail) = data.split_at(9);

        let whole = model.compute(data);
        let chained = model.compute_seeded(tail, model.compute(head));
        assert_eq!(whole, chained);
    }

    #[test]
    fn test_parameters_masked_to_width() {
        let model = CrcModel::new("CRC-8/WIDE-ARGS", 8, 0xFF07, 0xFF00, 0xAA00, false, false);
        assert_eq!(model.poly(), 0x07);
        assert_eq!(model.seed(), 0x00);
        assert_eq!(model.xor_out(), 0x00);
        assert_eq!(model.compute(CHECK_INPUT), CrcModel::crc8().compute(CHECK_INPUT));
    }

    #[test]
    fn test_table_entries_fit_width() {
        for model in [
            CrcModel::new("CRC-1", 1, 0x01, 0x00, 0x00, false, false),
            CrcModel::crc5_usb(),
            CrcModel::crc8(),
            CrcModel::new("CRC-64", 64, 0x42F0_E1EB_A9EA_3693, 0, 0, false, false),
        ] {
            let mask = model.lookup_table().iter().fold(0u64, |acc, &v| acc | v);
            if model.size() < 64 {
                assert!(mask < (1u64 << model.size()), "{} overflows", model.name());
            }
        }
    }

    #[test]
    fn test_crc64_xz_check_value() {
        // 64-bit model exercises the shift edge cases at the top of u64.
        let model = CrcModel::new(
            "CRC-64/XZ",
            64,
            0x42F0_E1EB_A9EA_3693,
            u64::MAX,
            u64::MAX,
            true,
            true,
        );
        assert_eq!(model.compute(CHECK_INPUT), 0x995D_C9BB_DF19_39FA);
    }

    #[test]
    #[should_panic]
    fn test_zero_width_rejected() {
        let _ = CrcModel::new("CRC-0", 0, 0x00, 0x00, 0x00, false, false);
    }

    #[test]
    #[should_panic]
    fn test_oversized_width_rejected() {
        let _ = CrcModel::new("CRC-65", 65, 0x00, 0x00, 0x00, false, false);
    }
}
