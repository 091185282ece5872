// Copyright 2018 Ian Johnson

// This file is part of Yac8.

// Yac8 is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Yac8 is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Yac8.  If not, see <http://www.gnu.org/licenses/>.

//! The Chip-8 display buffer.

use std::default::Default;

use failure::Fail;

/// The width of the display, in pixels.
pub const WIDTH: usize = 64;
/// The height of the display, in pixels.
pub const HEIGHT: usize = 32;

/// The height of a font sprite, in bytes (rows).
pub const FONT_HEIGHT: usize = 5;

/// The built-in hex digit sprites, installed at the bottom of memory.
///
/// Each glyph is 4 pixels wide, stored most-significant-bit-first per row.
pub const FONT_SPRITES: [[u8; FONT_HEIGHT]; 16] = [
    [0xF0, 0x90, 0x90, 0x90, 0xF0],
    [0x20, 0x60, 0x20, 0x20, 0x70],
    [0xF0, 0x10, 0xF0, 0x80, 0xF0],
    [0xF0, 0x10, 0xF0, 0x10, 0xF0],
    [0x90, 0x90, 0xF0, 0x10, 0x10],
    [0xF0, 0x80, 0xF0, 0x10, 0xF0],
    [0xF0, 0x80, 0xF0, 0x90, 0xF0],
    [0xF0, 0x10, 0x20, 0x40, 0x40],
    [0xF0, 0x90, 0xF0, 0x90, 0xF0],
    [0xF0, 0x90, 0xF0, 0x10, 0xF0],
    [0xF0, 0x90, 0xF0, 0x90, 0x90],
    [0xE0, 0x90, 0xE0, 0x90, 0xE0],
    [0xF0, 0x80, 0x80, 0x80, 0xF0],
    [0xE0, 0x90, 0x90, 0x90, 0xE0],
    [0xF0, 0x80, 0xF0, 0x80, 0xF0],
    [0xF0, 0x80, 0xF0, 0x80, 0x80],
];

/// A Chip-8 display buffer.
///
/// The buffer is a 64x32 monochrome grid, stored row-major.  Every mutation
/// marks the buffer as needing a refresh; the host consumes (and thereby
/// clears) that flag through the `refresh` method.
pub struct Buffer {
    /// The underlying pixel data, indexed as `data[y][x]`.
    data: [[bool; WIDTH]; HEIGHT],
    /// Whether the display needs to be refreshed.
    needs_refresh: bool,
}

impl Buffer {
    /// Returns a new display buffer with all pixels clear.
    pub fn new() -> Self {
        Buffer {
            data: [[false; WIDTH]; HEIGHT],
            needs_refresh: true,
        }
    }

    /// Clears the display.
    pub fn clear(&mut self) {
        for row in self.data.iter_mut() {
            for elem in row.iter_mut() {
                *elem = false;
            }
        }
        self.needs_refresh = true;
    }

    /// Returns a reference to the underlying pixel data.
    pub fn data(&self) -> &[[bool; WIDTH]; HEIGHT] {
        &self.data
    }

    /// Returns whether the buffer has changed since the host last consumed it.
    pub fn dirty(&self) -> bool {
        self.needs_refresh
    }

    /// Draws the given sprite at the given position, one byte per row with
    /// the most significant bit leftmost.
    ///
    /// Coordinates wrap modulo the display size.  Returns whether there was a
    /// collision (some pixel flipped from on to off).
    pub fn draw_sprite(&mut self, sprite: &[u8], x: usize, y: usize) -> bool {
        let mut collision = false;

        for (j, row) in sprite.iter().enumerate() {
            for i in 0..8 {
                if row & (1 << (7 - i)) != 0 {
                    if self.toggle(x + i, y + j) {
                        collision = true;
                    }
                }
            }
        }

        collision
    }

    /// Forces a refresh on the next call to `refresh`, even if no draw
    /// operation has been performed.
    pub fn force_refresh(&mut self) {
        self.needs_refresh = true;
    }

    /// Refreshes the display using the given refresh function.
    ///
    /// If a refresh is unnecessary, nothing will be done.  The refresh
    /// function receives a "snapshot" of the display, and should draw that to
    /// whatever user-facing display buffer is currently being used.
    pub fn refresh<F, E>(&mut self, f: F) -> Result<(), E>
    where
        F: FnOnce(&Self) -> Result<(), E>,
        E: Fail,
    {
        if self.needs_refresh {
            f(self)?;
            self.needs_refresh = false;
        }
        Ok(())
    }

    /// Flips the on/off state of the given pixel, returning whether it was
    /// flipped off from the on state.
    ///
    /// Out-of-range coordinates wrap around the screen edges.
    fn toggle(&mut self, x: usize, y: usize) -> bool {
        let x = x % WIDTH;
        let y = y % HEIGHT;
        let old = self.data[y][x];
        self.data[y][x] = !old;
        self.needs_refresh = true;

        old
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}
