//! Reed-Solomon decoding over small binary extension fields.
//!
//! Codewords are symbol slices where index `i` holds the coefficient of `x^i`. The parity
//! symbols occupy indexes `0..n-k` and the data `n-k..n`.
use std::sync::LazyLock;

use tracing::debug;

use super::{GaloisField, GF256, GF64};
use crate::{Error, Result};

/// Result of [ReedSolomon::decode].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RsOutcome {
    /// Errors exceed the code's capability. The codeword was left untouched.
    pub irrecoverable: bool,
    /// Number of symbols changed.
    pub corrected: usize,
}

const IRRECOVERABLE: RsOutcome = RsOutcome {
    irrecoverable: true,
    corrected: 0,
};

#[derive(Debug, Clone)]
pub struct ReedSolomon {
    field: &'static GaloisField,
    n: usize,
    k: usize,
    first_root: usize,
    generator: Vec<u8>,
}

/// RS(63,47,17) over GF(64), used for P25 headers.
pub static RS_63_47_17: LazyLock<ReedSolomon> =
    LazyLock::new(|| ReedSolomon::new(&GF64, 63, 47, 1));
/// RS(12,9,4) over GF(256), used for DMR full link control.
pub static RS_12_9_4: LazyLock<ReedSolomon> =
    LazyLock::new(|| ReedSolomon::new(&GF256, 12, 9, 1));

impl ReedSolomon {
    /// Code with generator roots `alpha^first_root ..= alpha^(first_root + n - k - 1)`.
    #[must_use]
    pub fn new(field: &'static GaloisField, n: usize, k: usize, first_root: usize) -> Self {
        let mut generator = vec![1u8];
        for i in 0..(n - k) {
            let root = field.alpha(first_root + i);
            let mut next = vec![0u8; generator.len() + 1];
            for (j, c) in generator.iter().enumerate() {
                next[j + 1] ^= c;
                next[j] ^= field.mul(*c, root);
            }
            generator = next;
        }
        ReedSolomon {
            field,
            n,
            k,
            first_root,
            generator,
        }
    }

    #[must_use]
    pub fn n(&self) -> usize {
        self.n
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Maximum number of correctable symbol errors.
    #[must_use]
    pub fn t(&self) -> usize {
        (self.n - self.k) / 2
    }

    #[must_use]
    pub fn generator(&self) -> &[u8] {
        &self.generator
    }

    fn parity_len(&self) -> usize {
        self.n - self.k
    }

    fn check_symbols(&self, symbols: &[u8]) -> Result<()> {
        let max = self.field.order();
        match symbols.iter().find(|s| usize::from(**s) > max) {
            Some(symbol) => Err(Error::SymbolOutOfRange {
                symbol: *symbol,
                max,
            }),
            None => Ok(()),
        }
    }

    /// Systematic codeword for `data`, where `data[j]` is the coefficient of
    /// `x^(n-k+j)` in the result.
    ///
    /// # Errors
    /// [Error::InvalidLength] unless `data` has exactly `k` symbols, or
    /// [Error::SymbolOutOfRange] if a symbol is not a field element.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() != self.k {
            return Err(Error::InvalidLength {
                expected: self.k,
                actual: data.len(),
            });
        }
        self.check_symbols(data)?;
        let nk = self.parity_len();
        let mut rem = vec![0u8; self.n];
        rem[nk..].copy_from_slice(data);
        for i in (nk..self.n).rev() {
            let coef = rem[i];
            if coef != 0 {
                for (j, g) in self.generator.iter().enumerate() {
                    rem[i - nk + j] ^= self.field.mul(coef, *g);
                }
            }
        }
        let mut codeword = rem;
        codeword[nk..].copy_from_slice(data);
        Ok(codeword)
    }

    fn syndromes(&self, codeword: &[u8]) -> Vec<u8> {
        (0..self.parity_len())
            .map(|j| {
                self.field
                    .eval(codeword, self.field.alpha(self.first_root + j))
            })
            .collect()
    }

    /// Berlekamp-Massey error locator, coefficients indexed by power.
    fn locator(&self, syndromes: &[u8]) -> Vec<u8> {
        let gf = self.field;
        let nk = syndromes.len();
        let mut lambda = vec![0u8; nk + 1];
        lambda[0] = 1;
        let mut prev = lambda.clone();
        let mut l = 0usize;
        let mut m = 1usize;
        let mut prev_discrepancy = 1u8;

        for r in 0..nk {
            let mut d = syndromes[r];
            for i in 1..=l {
                d ^= gf.mul(lambda[i], syndromes[r - i]);
            }
            if d == 0 {
                m += 1;
                continue;
            }
            let scale = gf.div(d, prev_discrepancy);
            let saved = lambda.clone();
            for (i, p) in prev.iter().enumerate() {
                if i + m <= nk {
                    lambda[i + m] ^= gf.mul(scale, *p);
                }
            }
            if 2 * l <= r {
                l = r + 1 - l;
                prev = saved;
                prev_discrepancy = d;
                m = 1;
            } else {
                m += 1;
            }
        }
        lambda.truncate(l + 1);
        lambda
    }

    /// Correct `codeword` in place.
    ///
    /// # Errors
    /// [Error::InvalidLength] unless `codeword` has exactly `n` symbols, or
    /// [Error::SymbolOutOfRange] if a symbol is not a field element.
    pub fn decode(&self, codeword: &mut [u8]) -> Result<RsOutcome> {
        if codeword.len() != self.n {
            return Err(Error::InvalidLength {
                expected: self.n,
                actual: codeword.len(),
            });
        }
        self.check_symbols(codeword)?;
        let gf = self.field;
        let order = gf.order();
        let syndromes = self.syndromes(codeword);
        if syndromes.iter().all(|s| *s == 0) {
            return Ok(RsOutcome {
                irrecoverable: false,
                corrected: 0,
            });
        }

        let lambda = self.locator(&syndromes);
        let degree = lambda.len() - 1;
        if degree == 0 || degree > self.t() {
            debug!(degree, "error locator degree beyond capability");
            return Ok(IRRECOVERABLE);
        }

        // Chien search; roots beyond n would be in the shortened region
        let mut locations = Vec::with_capacity(degree);
        for i in 0..order {
            let x_inv = gf.alpha(order - i);
            if gf.eval(&lambda, x_inv) == 0 {
                locations.push(i);
            }
        }
        if locations.len() != degree || locations.iter().any(|i| *i >= self.n) {
            debug!(
                roots = locations.len(),
                degree, "error locator roots do not match"
            );
            return Ok(IRRECOVERABLE);
        }

        // Forney
        let nk = self.parity_len();
        let mut omega = vec![0u8; nk];
        for (i, s) in syndromes.iter().enumerate() {
            for (j, l) in lambda.iter().enumerate() {
                if i + j < nk {
                    omega[i + j] ^= gf.mul(*s, *l);
                }
            }
        }
        let derivative: Vec<u8> = lambda
            .iter()
            .enumerate()
            .skip(1)
            .map(|(j, c)| if j % 2 == 1 { *c } else { 0 })
            .collect();

        let mut fixed = codeword.to_vec();
        for i in &locations {
            let x_inv = gf.alpha(order - i);
            let denom = gf.eval(&derivative, x_inv);
            if denom == 0 {
                return Ok(IRRECOVERABLE);
            }
            let mut magnitude = gf.div(gf.eval(&omega, x_inv), denom);
            // X^(1 - first_root)
            let adjust = (i * ((order + 1 - self.first_root % order) % order)) % order;
            magnitude = gf.mul(magnitude, gf.alpha(adjust));
            fixed[*i] ^= magnitude;
        }
        if self.syndromes(&fixed).iter().any(|s| *s != 0) {
            return Ok(IRRECOVERABLE);
        }
        codeword.copy_from_slice(&fixed);
        Ok(RsOutcome {
            irrecoverable: false,
            corrected: locations.len(),
        })
    }
}
