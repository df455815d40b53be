use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const TILE_ID_PREFIX: &str = "tile_";
const COLUMN_LETTERS: u32 = 26;

/// A discrete board position. Columns map to letters in tile ids, rows stay numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinates {
    col: i32,
    row: i32,
}

/// Inclusive min/max limits used when clipping neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridBounds {
    pub min_col: i32,
    pub max_col: i32,
    pub min_row: i32,
    pub max_row: i32,
}

impl GridBounds {
    pub const fn new(min_col: i32, max_col: i32, min_row: i32, max_row: i32) -> Self {
        Self {
            min_col,
            max_col,
            min_row,
            max_row,
        }
    }

    /// Bounds of a `width` x `height` board anchored at (0, 0).
    pub fn from_size(width: u32, height: u32) -> Self {
        let max_col = i32::try_from(width).unwrap_or(i32::MAX).saturating_sub(1);
        let max_row = i32::try_from(height).unwrap_or(i32::MAX).saturating_sub(1);
        Self::new(0, max_col, 0, max_row)
    }

    pub fn contains(&self, coordinates: Coordinates) -> bool {
        (self.min_col..=self.max_col).contains(&coordinates.col)
            && (self.min_row..=self.max_row).contains(&coordinates.row)
    }
}

impl Coordinates {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    pub const fn col(self) -> i32 {
        self.col
    }

    pub const fn row(self) -> i32 {
        self.row
    }

    /// Neighbours that stay inside `bounds`, ordered west, east, south, north.
    pub fn adjacent(self, bounds: GridBounds) -> Vec<Coordinates> {
        let mut adjacent = Vec::with_capacity(4);
        if self.col > bounds.min_col {
            adjacent.push(Self::new(self.col - 1, self.row));
        }
        if self.col < bounds.max_col {
            adjacent.push(Self::new(self.col + 1, self.row));
        }
        if self.row > bounds.min_row {
            adjacent.push(Self::new(self.col, self.row - 1));
        }
        if self.row < bounds.max_row {
            adjacent.push(Self::new(self.col, self.row + 1));
        }
        adjacent
    }

    /// Neighbours without board clipping; callers bounds-check separately. Cells past the
    /// `i32` range are skipped, so the result never contains `self`.
    pub fn adjacent_unbounded(self) -> Vec<Coordinates> {
        [
            self.row.checked_add(1).map(|row| Self::new(self.col, row)),
            self.row.checked_sub(1).map(|row| Self::new(self.col, row)),
            self.col.checked_add(1).map(|col| Self::new(col, self.row)),
            self.col.checked_sub(1).map(|col| Self::new(col, self.row)),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn is_adjacent(self, other: Coordinates) -> bool {
        self.distance(other) == 1
    }

    /// Manhattan distance.
    pub fn distance(self, other: Coordinates) -> u32 {
        self.col
            .abs_diff(other.col)
            .saturating_add(self.row.abs_diff(other.row))
    }

    /// Uniform pick in `[0, max_col) x [0, max_row)`. Empty ranges collapse to 0.
    pub fn random_within<R: Rng + ?Sized>(max_col: i32, max_row: i32, rng: &mut R) -> Self {
        let col = if max_col > 0 { rng.gen_range(0..max_col) } else { 0 };
        let row = if max_row > 0 { rng.gen_range(0..max_row) } else { 0 };
        Self::new(col, row)
    }

    /// Column letters: 0 -> `A`, 25 -> `Z`, 26 -> `AA`. Negative columns get a `-` prefix.
    pub fn column_name(self) -> String {
        if self.col < 0 {
            let mirrored = self.col.unsigned_abs() - 1;
            format!("-{}", column_label(mirrored))
        } else {
            column_label(self.col.unsigned_abs())
        }
    }

    pub fn tile_id(self) -> String {
        format!("{TILE_ID_PREFIX}{}_{}", self.column_name(), self.row)
    }

    pub fn from_tile_id(tile_id: &str) -> Option<Self> {
        let body = tile_id.strip_prefix(TILE_ID_PREFIX)?;
        let (column, row) = body.split_once('_')?;
        let col = match column.strip_prefix('-') {
            Some(mirrored) => {
                let index = parse_column_label(mirrored)?;
                i32::try_from(index).ok()?.checked_add(1)?.checked_neg()?
            }
            None => i32::try_from(parse_column_label(column)?).ok()?,
        };
        let row = row.parse::<i32>().ok()?;
        Some(Self::new(col, row))
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

fn column_label(mut index: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(char::from(b'A' + (index % COLUMN_LETTERS) as u8));
        if index < COLUMN_LETTERS {
            break;
        }
        index = index / COLUMN_LETTERS - 1;
    }
    letters.iter().rev().collect()
}

fn parse_column_label(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }
    let mut value = 0u32;
    for letter in label.chars() {
        if !letter.is_ascii_uppercase() {
            return None;
        }
        let digit = letter as u32 - 'A' as u32 + 1;
        value = value.checked_mul(COLUMN_LETTERS)?.checked_add(digit)?;
    }
    Some(value - 1)
}
