use std::sync::LazyLock;

/// Log/antilog tables for GF(2^m).
#[derive(Debug, Clone)]
pub struct GaloisField {
    bits: u32,
    order: usize,
    exp: Vec<u8>,
    log: Vec<usize>,
}

/// GF(64) with primitive polynomial x^6 + x + 1.
pub static GF64: LazyLock<GaloisField> = LazyLock::new(|| GaloisField::new(6, 0x43));
/// GF(256) with primitive polynomial x^8 + x^4 + x^3 + x^2 + 1.
pub static GF256: LazyLock<GaloisField> = LazyLock::new(|| GaloisField::new(8, 0x11D));

impl GaloisField {
    /// `poly` must be primitive of degree `bits`, with `bits` at most 8.
    #[must_use]
    pub fn new(bits: u32, poly: u32) -> Self {
        let order = (1usize << bits) - 1;
        let mut exp = vec![0u8; 2 * order];
        let mut log = vec![0usize; order + 1];
        let mut x = 1u32;
        for i in 0..order {
            exp[i] = x as u8;
            log[x as usize] = i;
            x <<= 1;
            if x & (1 << bits) != 0 {
                x ^= poly;
            }
        }
        for i in order..2 * order {
            exp[i] = exp[i - order];
        }
        GaloisField {
            bits,
            order,
            exp,
            log,
        }
    }

    #[must_use]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of non-zero elements.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// alpha^power
    #[must_use]
    pub fn alpha(&self, power: usize) -> u8 {
        self.exp[power % self.order]
    }

    /// Discrete log of a non-zero element.
    #[must_use]
    pub fn log(&self, a: u8) -> usize {
        self.log[a as usize]
    }

    #[must_use]
    pub fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            0
        } else {
            self.exp[self.log[a as usize] + self.log[b as usize]]
        }
    }

    /// `a / b`; division by zero yields zero.
    #[must_use]
    pub fn div(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            0
        } else {
            self.exp[self.log[a as usize] + self.order - self.log[b as usize]]
        }
    }

    #[must_use]
    pub fn inv(&self, a: u8) -> u8 {
        self.div(1, a)
    }

    /// Evaluate a polynomial, coefficients indexed by power, at `x`.
    #[must_use]
    pub fn eval(&self, poly: &[u8], x: u8) -> u8 {
        poly.iter().rev().fold(0, |acc, c| self.mul(acc, x) ^ c)
    }
}
