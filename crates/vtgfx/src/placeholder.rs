//! Unicode placeholder cells (U+10EEEE).
//!
//! A virtual placement is painted by writing U+10EEEE cells whose
//! foreground color carries the low 24 bits of the image id and whose
//! combining diacritics encode the cell's row, column, and the id's
//! fourth byte. Omitted diacritics inherit from the left neighbor
//! under two published rules, both conditional on matching foreground
//! and underline colors.

/// The placeholder code point.
pub const PLACEHOLDER: char = '\u{10EEEE}';

/// The row/column diacritic table: combining characters in the
/// published order, so `DIACRITICS[n]` encodes value `n`. The prefix
/// here covers values 0..84, beyond the largest grids placements are
/// addressed on in practice.
pub const DIACRITICS: &[u32] = &[
    0x0305, 0x030D, 0x030E, 0x0310, 0x0312, 0x033D, 0x033E, 0x033F, 0x0346, 0x034A, 0x034B,
    0x034C, 0x0350, 0x0351, 0x0352, 0x0357, 0x035B, 0x0363, 0x0364, 0x0365, 0x0366, 0x0367,
    0x0368, 0x0369, 0x036A, 0x036B, 0x036C, 0x036D, 0x036E, 0x036F, 0x0483, 0x0484, 0x0485,
    0x0486, 0x0487, 0x0592, 0x0593, 0x0594, 0x0595, 0x0597, 0x0598, 0x0599, 0x059C, 0x059D,
    0x059E, 0x059F, 0x05A0, 0x05A1, 0x05A8, 0x05A9, 0x05AB, 0x05AC, 0x05AF, 0x05C4, 0x0610,
    0x0611, 0x0612, 0x0613, 0x0614, 0x0615, 0x0616, 0x0617, 0x0657, 0x0658, 0x0659, 0x065A,
    0x065B, 0x065D, 0x065E, 0x06D6, 0x06D7, 0x06D8, 0x06D9, 0x06DA, 0x06DB, 0x06DC, 0x06DF,
    0x06E0, 0x06E1, 0x06E2, 0x06E4, 0x06E7, 0x06E8, 0x06EB, 0x06EC,
];

/// Value encoded by a diacritic, or `None` for foreign combining
/// characters.
#[must_use]
pub fn diacritic_value(ch: char) -> Option<u32> {
    DIACRITICS
        .iter()
        .position(|&cp| cp == ch as u32)
        .and_then(|i| u32::try_from(i).ok())
}

/// Diacritic encoding `value`, when the table covers it.
#[must_use]
pub fn diacritic_index(value: u32) -> Option<char> {
    DIACRITICS
        .get(value as usize)
        .and_then(|&cp| char::from_u32(cp))
}

/// A placeholder cell before inheritance resolution.
///
/// `color_key` identifies the foreground+underline color pair; the
/// inheritance rules only carry values across cells with equal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderCell {
    /// Low 24 bits of the image id, from the foreground color.
    pub id_low: u32,
    /// Row diacritic value, if present.
    pub row: Option<u32>,
    /// Column diacritic value, if present.
    pub col: Option<u32>,
    /// Fourth-byte diacritic value, if present.
    pub id_high: Option<u32>,
    /// Foreground/underline color identity for inheritance checks.
    pub color_key: u64,
}

/// A fully resolved placeholder reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPlaceholder {
    pub image_id: u32,
    pub row: u32,
    pub col: u32,
}

/// Resolve one screen row of placeholder cells, applying the two
/// inheritance rules:
///
/// 1. No diacritics at all: inherit the row, column + 1, and high
///    byte from the left neighbor.
/// 2. Only the row diacritic: inherit column + 1 and the high byte.
///
/// Both rules require the neighbor to share the same foreground and
/// underline colors; anything else breaks the run.
#[must_use]
pub fn resolve_row(cells: &[Option<PlaceholderCell>]) -> Vec<Option<ResolvedPlaceholder>> {
    let mut out = Vec::with_capacity(cells.len());
    let mut prev: Option<(PlaceholderCell, ResolvedPlaceholder)> = None;
    for slot in cells {
        let Some(cell) = slot else {
            prev = None;
            out.push(None);
            continue;
        };
        let inherited = prev.filter(|(p, _)| p.color_key == cell.color_key);
        let resolved = match (cell.row, cell.col) {
            (Some(row), Some(col)) => {
                let high = cell.id_high.unwrap_or_else(|| {
                    inherited.map_or(0, |(p, _)| p.id_high.unwrap_or(0))
                });
                Some(ResolvedPlaceholder {
                    image_id: cell.id_low | (high << 24),
                    row,
                    col,
                })
            }
            (Some(row), None) => inherited.and_then(|(p, r)| {
                // Rule 2: row present, column inherited.
                if r.row == row || p.row == Some(row) {
                    Some(ResolvedPlaceholder {
                        image_id: r.image_id,
                        row,
                        col: r.col + 1,
                    })
                } else {
                    None
                }
            }),
            (None, None) => inherited.map(|(_, r)| {
                // Rule 1: everything inherited.
                ResolvedPlaceholder {
                    image_id: r.image_id,
                    row: r.row,
                    col: r.col + 1,
                }
            }),
            (None, Some(_)) => None,
        };
        prev = resolved.map(|r| (*cell, r));
        out.push(resolved);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cell(
        id_low: u32,
        row: Option<u32>,
        col: Option<u32>,
        high: Option<u32>,
        color_key: u64,
    ) -> Option<PlaceholderCell> {
        Some(PlaceholderCell {
            id_low,
            row,
            col,
            id_high: high,
            color_key,
        })
    }

    #[test]
    fn diacritic_table_roundtrip() {
        for value in 0..u32::try_from(DIACRITICS.len()).unwrap() {
            let ch = diacritic_index(value).unwrap();
            assert_eq!(diacritic_value(ch), Some(value));
        }
        assert_eq!(diacritic_value('x'), None);
    }

    #[test]
    fn explicit_diacritics_resolve_directly() {
        let row = resolve_row(&[cell(42, Some(0), Some(0), None, 1)]);
        assert_eq!(
            row[0],
            Some(ResolvedPlaceholder {
                image_id: 42,
                row: 0,
                col: 0
            })
        );
    }

    #[test]
    fn bare_cells_inherit_from_left() {
        let row = resolve_row(&[
            cell(7, Some(1), Some(0), None, 1),
            cell(7, None, None, None, 1),
            cell(7, None, None, None, 1),
        ]);
        assert_eq!(row[1].unwrap().col, 1);
        assert_eq!(row[2].unwrap().col, 2);
        assert_eq!(row[2].unwrap().row, 1);
    }

    #[test]
    fn row_only_cells_inherit_column() {
        let row = resolve_row(&[
            cell(7, Some(2), Some(5), None, 1),
            cell(7, Some(2), None, None, 1),
        ]);
        assert_eq!(row[1].unwrap().col, 6);
        assert_eq!(row[1].unwrap().row, 2);
    }

    #[test]
    fn color_change_breaks_inheritance() {
        let row = resolve_row(&[
            cell(7, Some(0), Some(0), None, 1),
            cell(7, None, None, None, 2),
        ]);
        assert_eq!(row[1], None);
    }

    #[test]
    fn high_byte_extends_image_id() {
        let row = resolve_row(&[cell(0x00AB_CDEF, Some(0), Some(0), Some(1), 1)]);
        assert_eq!(row[0].unwrap().image_id, 0x01AB_CDEF);
    }
}
