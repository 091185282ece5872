/*
 * Copyright 2018 Ian Johnson
 *
 * This is free software, distributed under the MIT license.  A copy of the
 * license can be found in the LICENSE file in the project root, or at
 * https://opensource.org/licenses/MIT.
 */

//! A basic wall-clock timer.
//!
//! The machine itself never consults the clock; a host runs one `Timer` per
//! cadence it cares about (CPU clock, 60 Hz delay/sound decrement) and calls
//! the corresponding machine operation once per elapsed tick.

use std::num::Wrapping;

use time;

/// A basic timer.
#[derive(Debug)]
pub struct Timer {
    /// The frequency at which to run the timer.
    frequency: u32,
    /// An internal number of ticks.
    ticks: Wrapping<u32>,
}

impl Timer {
    /// Returns a new timer running at the given frequency.
    pub fn new(frequency: u32) -> Self {
        let mut timer = Timer {
            frequency,
            ticks: Wrapping(0),
        };
        timer.update();
        timer
    }

    /// Returns the number of ticks which have elapsed since the last call to
    /// this method (or the creation of the timer).
    pub fn lap(&mut self) -> u32 {
        let old = self.ticks;
        self.update();
        (self.ticks - old).0
    }

    /// Updates the internal tick count from the system clock.
    fn update(&mut self) {
        self.ticks =
            Wrapping((time::precise_time_ns() as f64 * self.frequency as f64 / 1e9) as u32);
    }
}
