//! CRC-8/MAXIM (Dallas 1-Wire): reflected polynomial 0x8C, init 0, no final xor.

const POLY_REFLECTED: u8 = 0x8C;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Running CRC-8/MAXIM accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc8 {
    value: u8,
}

impl Crc8 {
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    pub fn update(&mut self, byte: u8) {
        self.value = TABLE[(self.value ^ byte) as usize];
    }

    pub fn update_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.update(byte);
        }
    }

    pub fn finalize(self) -> u8 {
        self.value
    }
}

/// One-shot CRC-8/MAXIM over `bytes`.
pub fn crc8_maxim(bytes: &[u8]) -> u8 {
    let mut crc = Crc8::new();
    crc.update_slice(bytes);
    crc.finalize()
}
