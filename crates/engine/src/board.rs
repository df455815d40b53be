use thiserror::Error;

use crate::grid::{Coordinates, GridBounds};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("tile id '{tile_id}' does not name a board cell")]
    UnknownTile { tile_id: String },
    #[error("tile '{tile_id}' at {coordinates} lies outside the board")]
    OutOfBounds {
        tile_id: String,
        coordinates: Coordinates,
    },
}

/// Turns wire-level tile ids into grid positions.
pub trait Board {
    fn bounds(&self) -> GridBounds;

    fn resolve_tile(&self, tile_id: &str) -> Result<Coordinates, BoardError>;

    /// Preserves input order. Fails on the first id that is not a cell of this board.
    fn resolve_tiles(&self, tile_ids: &[String]) -> Result<Vec<Coordinates>, BoardError> {
        tile_ids
            .iter()
            .map(|tile_id| self.resolve_tile(tile_id))
            .collect()
    }
}

/// Rectangular board whose cells are addressed by `tile_<column>_<row>` ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridBoard {
    width: u32,
    height: u32,
}

impl GridBoard {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Board for GridBoard {
    fn bounds(&self) -> GridBounds {
        GridBounds::from_size(self.width, self.height)
    }

    fn resolve_tile(&self, tile_id: &str) -> Result<Coordinates, BoardError> {
        let coordinates =
            Coordinates::from_tile_id(tile_id).ok_or_else(|| BoardError::UnknownTile {
                tile_id: tile_id.to_string(),
            })?;
        if !self.bounds().contains(coordinates) {
            return Err(BoardError::OutOfBounds {
                tile_id: tile_id.to_string(),
                coordinates,
            });
        }
        Ok(coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn resolves_ids_in_wire_order() {
        let board = GridBoard::new(8, 8);
        let path = board
            .resolve_tiles(&ids(&["tile_C_1", "tile_B_1", "tile_A_1"]))
            .expect("resolve");
        assert_eq!(
            path,
            vec![
                Coordinates::new(2, 1),
                Coordinates::new(1, 1),
                Coordinates::new(0, 1)
            ]
        );
    }

    #[test]
    fn unknown_and_out_of_bounds_ids_fail() {
        let board = GridBoard::new(4, 4);
        assert_eq!(
            board.resolve_tiles(&ids(&["tile_A_0", "door_3"])),
            Err(BoardError::UnknownTile {
                tile_id: "door_3".to_string()
            })
        );
        assert_eq!(
            board.resolve_tile("tile_E_0"),
            Err(BoardError::OutOfBounds {
                tile_id: "tile_E_0".to_string(),
                coordinates: Coordinates::new(4, 0),
            })
        );
    }

    #[test]
    fn empty_board_rejects_everything() {
        let board = GridBoard::new(0, 0);
        assert!(board.resolve_tile("tile_A_0").is_err());
    }
}
