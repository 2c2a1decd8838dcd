//! Constant tables describing the 13 distinct relative directions two
//! neighbouring cells can have, and how a pair task along one of those
//! directions decomposes into sub-pairs of progeny cells.
//!
//! A pair of cells at integer grid offset `(dx, dy, dz)` with each component
//! in `{-1, 0, 1}` is mapped to one of 13 direction classes (plus the
//! degenerate "same cell", which never occurs for distinct neighbours). The
//! mapping folds each direction onto its opposite, halving the 27 raw offsets
//! down to 14 symmetry-distinct sort handles, with handle 13 left as a pure
//! alias of handle 0's opposite, handle 12.

/// Maps a raw `(dx+1) + 3*(dy+1) + 9*(dz+1)` offset index into one of the 13
/// sort handles shared by a pair of cells along that direction.
pub const SORTLIST_ID: [u8; 27] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 0, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0,
];

/// For a self-interaction split into progeny pairs `(j, k)` with `j < k`,
/// gives the sort handle shared by progeny `j` and `k`. Indexed `[j][k]`;
/// entries with `j >= k` are unused (`-1` in the source table) and encoded
/// here as `u8::MAX`.
pub const PROGENY_PAIR_SID: [[u8; 8]; 7] = [
    [u8::MAX, 12, 10, 9, 4, 3, 1, 0],
    [u8::MAX, u8::MAX, 11, 10, 5, 4, 2, 1],
    [u8::MAX, u8::MAX, u8::MAX, 12, 7, 6, 4, 3],
    [u8::MAX, u8::MAX, u8::MAX, u8::MAX, 8, 7, 5, 4],
    [u8::MAX, u8::MAX, u8::MAX, u8::MAX, u8::MAX, 12, 10, 9],
    [u8::MAX, u8::MAX, u8::MAX, u8::MAX, u8::MAX, u8::MAX, 11, 10],
    [u8::MAX, u8::MAX, u8::MAX, u8::MAX, u8::MAX, u8::MAX, u8::MAX, 12],
];

/// One sub-pair produced when splitting a pair task along a given `sid`:
/// the progeny index within `ci`, the progeny index within `cj`, and the
/// sort handle the new pair task should wait on (and itself carries).
pub type SubPair = (u8, u8, u8);

const SID_0: &[SubPair] = &[(7, 0, 0)];
const SID_1: &[SubPair] = &[(6, 0, 1), (7, 1, 1), (6, 1, 0), (7, 0, 2)];
const SID_2: &[SubPair] = &[(6, 1, 2)];
const SID_3: &[SubPair] = &[(5, 0, 3), (7, 2, 3), (5, 2, 0), (7, 0, 6)];
const SID_4: &[SubPair] = &[
    (4, 0, 4),
    (5, 0, 5),
    (6, 0, 7),
    (7, 0, 8),
    (4, 1, 3),
    (5, 1, 4),
    (6, 1, 6),
    (7, 1, 7),
    (4, 2, 1),
    (5, 2, 2),
    (6, 2, 4),
    (7, 2, 5),
    (4, 3, 0),
    (5, 3, 1),
    (6, 3, 3),
    (7, 3, 4),
];
const SID_5: &[SubPair] = &[(4, 1, 5), (6, 3, 5), (4, 3, 2), (6, 1, 8)];
const SID_6: &[SubPair] = &[(5, 2, 6)];
const SID_7: &[SubPair] = &[(4, 3, 6), (5, 2, 8), (4, 2, 7), (5, 3, 7)];
const SID_8: &[SubPair] = &[(4, 3, 8)];
const SID_9: &[SubPair] = &[(3, 0, 9), (7, 4, 9), (3, 4, 0), (7, 0, 8)];
const SID_10: &[SubPair] = &[
    (2, 0, 10),
    (3, 0, 11),
    (6, 0, 7),
    (7, 0, 6),
    (2, 1, 9),
    (3, 1, 10),
    (6, 1, 8),
    (7, 1, 7),
    (2, 4, 1),
    (3, 4, 2),
    (6, 4, 10),
    (7, 4, 11),
    (2, 5, 0),
    (3, 5, 1),
    (6, 5, 9),
    (7, 5, 10),
];
const SID_11: &[SubPair] = &[(2, 1, 11), (6, 5, 11), (2, 5, 2), (6, 1, 6)];
const SID_12: &[SubPair] = &[
    (1, 0, 12),
    (3, 0, 11),
    (5, 0, 5),
    (7, 0, 2),
    (1, 2, 9),
    (3, 2, 12),
    (5, 2, 8),
    (7, 2, 5),
    (1, 4, 3),
    (3, 4, 6),
    (5, 4, 12),
    (7, 4, 11),
    (1, 6, 0),
    (3, 6, 3),
    (5, 6, 9),
    (7, 6, 12),
];

/// Sub-pairs a pair task along `sid` (0..=12) decomposes into when both
/// cells are split further. Corner directions (0, 2, 6, 8) give a single
/// sub-pair, edge directions (1, 3, 5, 7, 9, 11) give four, and face
/// directions (4, 10, 12) give sixteen.
pub fn sid_expansion(sid: u8) -> &'static [SubPair] {
    match sid {
        0 => SID_0,
        1 => SID_1,
        2 => SID_2,
        3 => SID_3,
        4 => SID_4,
        5 => SID_5,
        6 => SID_6,
        7 => SID_7,
        8 => SID_8,
        9 => SID_9,
        10 => SID_10,
        11 => SID_11,
        12 => SID_12,
        _ => panic!("sid out of range: {}", sid),
    }
}

/// Corner directions split into exactly one sub-pair.
pub fn is_corner_sid(sid: u8) -> bool {
    matches!(sid, 0 | 2 | 6 | 8)
}

/// Computes the sort handle for the relative offset `(dx, dy, dz)`, each in
/// `{-1, 0, 1}`.
pub fn sid_of_offset(dx: i8, dy: i8, dz: i8) -> u8 {
    let idx = (dx as isize + 1) + 3 * (dy as isize + 1) + 9 * (dz as isize + 1);
    SORTLIST_ID[idx as usize]
}
