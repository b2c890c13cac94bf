#![no_main]
//! Fuzz target for the terminal grid
//!
//! Arbitrary output, escape sequences included, must keep the grid at its
//! fixed geometry with the cursor inside it.

use libfuzzer_sys::fuzz_target;

use terminal::Grid;

const COLS: u16 = 30;
const ROWS: u16 = 6;

fuzz_target!(|data: &[u8]| {
    let grid = Grid::new(COLS, ROWS);
    grid.write(data);

    let cursor = grid.cursor();
    assert!(cursor.row < ROWS as usize);
    assert!(cursor.column < COLS as usize);
    assert_eq!(grid.render().split('\n').count(), ROWS as usize);
    let _ = grid.take_responses();
});
