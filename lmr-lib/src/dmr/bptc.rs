//! Block product turbo code BPTC(196,96) carrying the info field of DMR data bursts.
//!
//! After deinterleaving, bit 0 is reserved and bits `1..196` form a 13 row by 15 column
//! matrix. Each row is a Hamming(15,11) codeword and each column a Hamming(13,9)
//! codeword. Rows 9..13 hold the column parity.
//!
//! Decoding alternates row and column corrections. Two or three errors in a row or
//! column hide each other from the Hamming codes; when a small grid of rows and columns
//! fails, flipping every intersection of the grid is tried as a second candidate and
//! the consistent candidate closest to the received bits wins.
use std::sync::LazyLock;

use tracing::trace;

use crate::bits::BitBuffer;
use crate::fec::{Integrity, Located, Residual, SyndromeCorrector, SyndromeTable};
use crate::{Error, Result};

pub const BPTC_BITS: usize = 196;
pub const BPTC_DATA_BITS: usize = 96;

const ROWS: usize = 13;
const COLUMNS: usize = 15;
const DATA_ROWS: usize = 9;
const INTERLEAVE_STEP: usize = 181;
const MAX_PASSES: usize = 4;
/// Failing row and column counts treated as a grid of shadowed errors.
const SHADOW_GRID: std::ops::RangeInclusive<usize> = 2..=3;

static ROW_HAMMING: LazyLock<SyndromeCorrector> = LazyLock::new(|| {
    SyndromeCorrector::new(
        SyndromeTable::from_signatures(&[9, 13, 15, 14, 7, 10, 5, 11, 12, 6, 3], 4, 0),
        Residual::Null,
    )
});

static COLUMN_HAMMING: LazyLock<SyndromeCorrector> = LazyLock::new(|| {
    SyndromeCorrector::new(
        SyndromeTable::from_signatures(&[15, 14, 7, 10, 5, 11, 12, 6, 3], 4, 0),
        Residual::Null,
    )
});

static ROW_POSITIONS: LazyLock<Vec<Vec<usize>>> = LazyLock::new(|| {
    (0..ROWS)
        .map(|r| (0..COLUMNS).map(|c| 1 + r * COLUMNS + c).collect())
        .collect()
});

static COLUMN_POSITIONS: LazyLock<Vec<Vec<usize>>> = LazyLock::new(|| {
    (0..COLUMNS)
        .map(|c| (0..ROWS).map(|r| 1 + r * COLUMNS + c).collect())
        .collect()
});

/// Matrix positions of the data bits: row 0 columns 3..11, then rows 1..9 columns 0..11.
static DATA_POSITIONS: LazyLock<Vec<usize>> = LazyLock::new(|| {
    (0..DATA_ROWS)
        .flat_map(|r| {
            let first = if r == 0 { 3 } else { 0 };
            (first..11).map(move |c| 1 + r * COLUMNS + c)
        })
        .collect()
});

/// Received position of deinterleaved bit `i`.
fn interleaved(i: usize) -> usize {
    (i * INTERLEAVE_STEP) % BPTC_BITS
}

fn matrix_position(row: usize, column: usize) -> usize {
    1 + row * COLUMNS + column
}

/// Indexes of the rows (or columns) whose Hamming check fails.
fn failing(
    matrix: &BitBuffer,
    lines: &[Vec<usize>],
    code: &SyndromeCorrector,
) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if code.check(matrix, line)? != Integrity::Passed {
            out.push(i);
        }
    }
    Ok(out)
}

fn is_consistent(matrix: &BitBuffer) -> Result<bool> {
    Ok(failing(matrix, &ROW_POSITIONS, &ROW_HAMMING)?.is_empty()
        && failing(matrix, &COLUMN_POSITIONS, &COLUMN_HAMMING)?.is_empty())
}

fn located(
    matrix: &BitBuffer,
    lines: &[Vec<usize>],
    code: &SyndromeCorrector,
) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for line in lines {
        if let Located::At(pos) = code.locate(matrix, line)? {
            out.push(pos);
        }
    }
    Ok(out)
}

/// Flip bits both their row and their column point at, then run row and column passes
/// until nothing changes.
fn iterate(matrix: &mut BitBuffer) -> Result<()> {
    let rows = located(matrix, &ROW_POSITIONS, &ROW_HAMMING)?;
    for pos in located(matrix, &COLUMN_POSITIONS, &COLUMN_HAMMING)? {
        if rows.contains(&pos) {
            matrix.flip(pos)?;
        }
    }
    for _ in 0..MAX_PASSES {
        let mut changed = false;
        for row in ROW_POSITIONS.iter() {
            changed |= ROW_HAMMING.correct(matrix, row)? == Integrity::Corrected;
        }
        for column in COLUMN_POSITIONS.iter() {
            changed |= COLUMN_HAMMING.correct(matrix, column)? == Integrity::Corrected;
        }
        if !changed {
            break;
        }
    }
    Ok(())
}

fn distance(a: &BitBuffer, b: &BitBuffer) -> u32 {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count() as u32
}

/// Correct a deinterleaved matrix. Returns the chosen matrix and the number of bits that
/// differ from the received one, or `None` if no candidate is consistent.
fn correct(received: &BitBuffer) -> Result<(BitBuffer, Option<u32>)> {
    let mut turbo = received.clone();
    iterate(&mut turbo)?;
    let mut candidates = vec![turbo.clone()];

    let rows = failing(received, &ROW_POSITIONS, &ROW_HAMMING)?;
    let columns = failing(received, &COLUMN_POSITIONS, &COLUMN_HAMMING)?;
    if SHADOW_GRID.contains(&rows.len()) && SHADOW_GRID.contains(&columns.len()) {
        trace!(?rows, ?columns, "trying shadowed error grid");
        let mut grid = received.clone();
        for row in &rows {
            for column in &columns {
                grid.flip(matrix_position(*row, *column))?;
            }
        }
        iterate(&mut grid)?;
        candidates.push(grid);
    }

    let mut best: Option<(BitBuffer, u32)> = None;
    for candidate in candidates {
        if !is_consistent(&candidate)? {
            continue;
        }
        let d = distance(received, &candidate);
        if best.as_ref().map_or(true, |(_, best_d)| d < *best_d) {
            best = Some((candidate, d));
        }
    }
    Ok(match best {
        Some((matrix, d)) => (matrix, Some(d)),
        None => (turbo, None),
    })
}

/// Deinterleave, correct and extract the 96 data bits.
///
/// The returned buffer carries the number of matrix bits that were corrected.
///
/// # Errors
/// [Error::InvalidLength] if `info` is not 196 bits long.
pub fn decode(info: &BitBuffer) -> Result<(BitBuffer, Integrity)> {
    if info.len() != BPTC_BITS {
        return Err(Error::InvalidLength {
            expected: BPTC_BITS,
            actual: info.len(),
        });
    }
    let positions: Vec<usize> = (0..BPTC_BITS).map(interleaved).collect();
    let received = info.gather(&positions)?;

    let (matrix, corrected, integrity) = if is_consistent(&received)? {
        (received, 0, Integrity::Passed)
    } else {
        match correct(&received)? {
            (matrix, Some(corrected)) => (matrix, corrected, Integrity::Corrected),
            (matrix, None) => {
                let corrected = distance(&received, &matrix);
                (matrix, corrected, Integrity::Failed)
            }
        }
    };
    trace!(?integrity, corrected, "bptc");

    let mut data = matrix.gather(&DATA_POSITIONS)?;
    data.add_corrected(corrected);
    Ok((data, integrity))
}

/// Encode and interleave 96 data bits into 196 transmitted bits.
///
/// # Errors
/// [Error::InvalidLength] if `data` is not 96 bits long.
pub fn encode(data: &BitBuffer) -> Result<BitBuffer> {
    if data.len() != BPTC_DATA_BITS {
        return Err(Error::InvalidLength {
            expected: BPTC_DATA_BITS,
            actual: data.len(),
        });
    }
    let mut matrix = BitBuffer::new(BPTC_BITS);
    for (pos, bit) in DATA_POSITIONS.iter().zip(data.iter()) {
        matrix.put(*pos, bit)?;
    }
    for row in ROW_POSITIONS.iter().take(DATA_ROWS) {
        ROW_HAMMING.encode_at(&mut matrix, row)?;
    }
    // Column parity of row codewords is itself a row codeword
    for column in COLUMN_POSITIONS.iter() {
        COLUMN_HAMMING.encode_at(&mut matrix, column)?;
    }
    let mut out = BitBuffer::new(BPTC_BITS);
    for (i, bit) in matrix.iter().enumerate() {
        out.put(interleaved(i), bit)?;
    }
    Ok(out)
}
