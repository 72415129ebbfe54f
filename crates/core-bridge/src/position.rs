//! Flat offset ↔ row/column conversion.
//!
//! Both sides of the bridge address text differently: the wire protocol uses
//! flat character offsets, editor widgets use row/column. Conversion walks
//! the per-line lengths, charging one character for the separator between
//! adjacent lines. An offset equal to a line's length maps to the end of
//! that line (not column 0 of the next); the separator itself belongs to the
//! following line's start. Remote selection application depends on this
//! being exact, including at line boundaries.

use core_page::CursorPos;

/// Convert a flat offset into the row/column model described by
/// `line_lengths`. Offsets past the end of the text clamp to the end of the
/// last line.
pub fn offset_to_position(line_lengths: &[usize], offset: usize) -> CursorPos {
    let mut consumed = 0usize;
    for (row, &len) in line_lengths.iter().enumerate() {
        if offset <= consumed + len {
            return CursorPos::new(row, offset - consumed);
        }
        consumed += len + 1;
    }
    match line_lengths.len() {
        0 => CursorPos::default(),
        n => CursorPos::new(n - 1, line_lengths[n - 1]),
    }
}

/// Convert a row/column position back to a flat offset. Positions past the
/// end of their line (or past the last line) clamp.
pub fn position_to_offset(line_lengths: &[usize], pos: CursorPos) -> usize {
    if line_lengths.is_empty() {
        return 0;
    }
    let row = pos.row.min(line_lengths.len() - 1);
    let col = pos.col.min(line_lengths[row]);
    let preceding: usize = line_lengths[..row].iter().map(|len| len + 1).sum();
    preceding + col
}
