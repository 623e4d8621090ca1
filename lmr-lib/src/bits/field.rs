/// Location of a multi-bit field within a [super::BitBuffer].
///
/// Protocol fields are either a contiguous `[start, end)` range or an ordered list of
/// absolute bit positions for fields that are spread across non-adjacent bits. In both
/// cases the first position is the most significant bit of the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Range { start: usize, end: usize },
    Sparse(&'static [usize]),
}

impl Field {
    #[must_use]
    pub const fn range(start: usize, end: usize) -> Self {
        Field::Range { start, end }
    }

    /// Field of `width` bits starting at `start`.
    #[must_use]
    pub const fn bits(start: usize, width: usize) -> Self {
        Field::Range {
            start,
            end: start + width,
        }
    }

    #[must_use]
    pub const fn sparse(indexes: &'static [usize]) -> Self {
        Field::Sparse(indexes)
    }

    /// Number of bits in the field.
    #[must_use]
    pub const fn width(&self) -> usize {
        match self {
            Field::Range { start, end } => end.saturating_sub(*start),
            Field::Sparse(indexes) => indexes.len(),
        }
    }

    /// Absolute position of the `i`th bit of the field.
    ///
    /// # Panics
    /// If `i` is not less than [Field::width] for a sparse field.
    #[must_use]
    pub fn position(&self, i: usize) -> usize {
        match self {
            Field::Range { start, .. } => start + i,
            Field::Sparse(indexes) => indexes[i],
        }
    }

    /// All absolute positions, most significant first.
    pub fn positions(self) -> impl Iterator<Item = usize> {
        (0..self.width()).map(move |i| self.position(i))
    }

    /// Collects the positions, e.g. to hand to a corrector that also accepts computed
    /// index lists.
    #[must_use]
    pub fn to_vec(self) -> Vec<usize> {
        self.positions().collect()
    }
}
