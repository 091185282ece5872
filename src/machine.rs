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

//! The Chip-8 machine.
//!
//! The main focus of this module is the `Machine` struct, which owns the
//! entire state of a Chip-8 virtual machine (memory, registers, timers,
//! stack, keypad and display buffer) and provides the interface to be driven
//! by a front-end: `load_program`, `step`, `set_key`, `tick_timers` and
//! read-only accessors.
//!
//! `step` executes exactly one instruction and never consults a clock;
//! `tick_timers` decrements the delay and sound timers by one and is meant to
//! be called at 60 Hz.  Keeping the two entry points separate leaves the
//! instruction rate and the timer rate independently schedulable by the host
//! (see the `timer` module), instead of tying timer speed to CPU speed.

use std::default::Default;
use std::io::Read;
use std::num::Wrapping;
use std::u8;

use failure::{Error, ResultExt};
use rand::{self, Rng, SeedableRng, XorShiftRng};

use MEM_SIZE;
use PROG_START;
use PROG_SIZE;
use Register;
use display::{self, FONT_HEIGHT, FONT_SPRITES};
use input::{self, Key};
use instruction::{Address, AddressOutOfBoundsError, Instruction, Opcode};

/// The location at which to put the font sprites.
const FONT_START: usize = 0x0;
/// The maximum number of nested subroutine calls.
const STACK_DEPTH: usize = 16;

/// An error resulting from a bad `RET` instruction.
#[derive(Debug, Fail)]
#[fail(display = "no subroutine to return from")]
pub struct NotInSubroutineError;

/// An error resulting from a `CALL` nested deeper than the stack allows.
#[derive(Debug, Fail)]
#[fail(display = "call stack overflow: more than 16 nested subroutines")]
pub struct StackOverflowError;

/// An error resulting from an input program being too large.
#[derive(Debug, Fail)]
#[fail(display = "input program is too large")]
pub struct ProgramTooLargeError;

/// A Chip-8 machine.
///
/// This struct contains the entire state of a Chip-8 virtual machine and
/// provides all the expected methods for interacting with it, such as
/// stepping through execution and inspecting the internal state.
pub struct Machine {
    /// The internal memory.
    mem: [u8; MEM_SIZE],
    /// The display buffer.
    display: display::Buffer,
    /// The input state.
    input: input::State,
    /// The general-purpose registers `V0`-`VF`.
    regs: [Wrapping<u8>; 16],
    /// The special register `I`.
    ///
    /// `I` is a full 16-bit register; memory-referencing instructions check
    /// it against the addressable range at the point of use.
    reg_i: u16,
    /// The delay timer.
    reg_dt: u8,
    /// The sound timer.
    reg_st: u8,
    /// The program counter.
    pc: Address,
    /// The call stack (for returning from subroutines).
    call_stack: Vec<Address>,
    /// The random source for the `RND` instruction.
    rng: XorShiftRng,
    /// How many unimplemented opcodes have been skipped.
    unimplemented_count: u64,
}

impl Machine {
    /// Returns a new machine in the startup state: zeroed memory with the
    /// font sprites installed, cleared registers and PC at the program start.
    pub fn new() -> Self {
        let mut machine = Machine {
            mem: [0; MEM_SIZE],
            display: display::Buffer::new(),
            input: input::State::new(),
            regs: [Wrapping(0); 16],
            reg_i: 0,
            reg_dt: 0,
            reg_st: 0,
            pc: Address::from_usize(PROG_START).unwrap(),
            call_stack: Vec::with_capacity(STACK_DEPTH),
            rng: rand::weak_rng(),
            unimplemented_count: 0,
        };

        // Copy the font sprites into memory.
        for (i, sprite) in FONT_SPRITES.iter().enumerate() {
            let start = FONT_START + i * FONT_HEIGHT;
            let end = start + sprite.len();
            machine.mem[start..end].copy_from_slice(sprite);
        }

        machine
    }

    /// Reinitializes all state to the startup state.
    pub fn reset(&mut self) {
        *self = Machine::new();
    }

    /// Loads program data from the specified source.
    ///
    /// The program is buffered and checked against the available program
    /// space before anything is copied, so a failed load leaves the machine's
    /// memory untouched.
    pub fn load_program<R: Read>(&mut self, input: &mut R) -> Result<(), Error> {
        let mut prog = Vec::new();
        input
            .read_to_end(&mut prog)
            .context("could not read program")?;
        if prog.len() > PROG_SIZE {
            return Err(ProgramTooLargeError.into());
        }
        self.mem[PROG_START..PROG_START + prog.len()].copy_from_slice(&prog);
        Ok(())
    }

    /// Returns a reference to the display buffer.
    pub fn display(&self) -> &display::Buffer {
        &self.display
    }

    /// Returns a mutable reference to the display buffer.
    pub fn display_mut(&mut self) -> &mut display::Buffer {
        &mut self.display
    }

    /// Returns a reference to the input state.
    pub fn input(&self) -> &input::State {
        &self.input
    }

    /// Returns a mutable reference to the input state.
    pub fn input_mut(&mut self) -> &mut input::State {
        &mut self.input
    }

    /// Applies a host key transition to the keypad.
    pub fn set_key(&mut self, key: Key, pressed: bool) {
        if pressed {
            self.input.press(key);
        } else {
            self.input.release(key);
        }
    }

    /// Returns a reference to the internal memory.
    pub fn mem(&self) -> &[u8; MEM_SIZE] {
        &self.mem
    }

    /// Returns a mutable reference to the internal memory.
    pub fn mem_mut(&mut self) -> &mut [u8; MEM_SIZE] {
        &mut self.mem
    }

    /// Returns the value of register `I`.
    pub fn i(&self) -> u16 {
        self.reg_i
    }

    /// Sets the value of register `I`.
    pub fn set_i(&mut self, val: u16) {
        self.reg_i = val;
    }

    /// Returns the value of the delay timer.
    pub fn dt(&self) -> u8 {
        self.reg_dt
    }

    /// Sets the value of the delay timer.
    pub fn set_dt(&mut self, val: u8) {
        self.reg_dt = val;
    }

    /// Returns the value of the sound timer.
    pub fn st(&self) -> u8 {
        self.reg_st
    }

    /// Sets the value of the sound timer.
    pub fn set_st(&mut self, val: u8) {
        self.reg_st = val;
    }

    /// Returns the value in the given register.
    pub fn register(&self, reg: Register) -> u8 {
        self.regs[reg as usize].0
    }

    /// Sets the given register to the given value.
    pub fn set_register(&mut self, reg: Register, val: u8) {
        self.regs[reg as usize].0 = val
    }

    /// Returns the value of the program counter.
    pub fn pc(&self) -> Address {
        self.pc
    }

    /// Returns how many unimplemented opcodes have been skipped so far.
    pub fn unimplemented_count(&self) -> u64 {
        self.unimplemented_count
    }

    /// Reseeds the random source used by the `RND` instruction, making runs
    /// reproducible.
    pub fn seed_rng(&mut self, seed: [u32; 4]) {
        self.rng = XorShiftRng::from_seed(seed);
    }

    /// Decrements the delay and sound timers by one tick, stopping at 0.
    ///
    /// Hosts wanting faithful Chip-8 timing should call this at 60 Hz, on a
    /// cadence independent of `step`.
    pub fn tick_timers(&mut self) {
        if self.reg_dt > 0 {
            self.reg_dt -= 1;
        }
        if self.reg_st > 0 {
            self.reg_st -= 1;
        }
    }

    /// Returns the opcode at the program counter.
    pub fn current_opcode(&self) -> Result<Opcode, Error> {
        let high = self.mem[self.pc.addr()];
        let low = self.mem[(self.pc + 1).context("program counter overflowed")?.addr()];
        Ok(Opcode::from_bytes(high, low))
    }

    /// Performs a single execution step (one fetch-decode-execute cycle).
    ///
    /// An opcode with no matching instruction pattern is not fatal: it is
    /// logged, counted (see `unimplemented_count`) and skipped.  Stack
    /// overflow, stack underflow and out-of-bounds memory accesses fail the
    /// step with a descriptive error and leave the machine state untouched
    /// beyond what the offending instruction had already done.
    pub fn step(&mut self) -> Result<(), Error> {
        let opcode = self.current_opcode()?;
        match Instruction::from_opcode(opcode) {
            Ok(ins) => self.execute(ins),
            Err(e) => {
                warn!("skipping {}", e);
                self.unimplemented_count += 1;
                self.pc = (self.pc + 2).context("program counter overflowed")?;
                Ok(())
            }
        }
    }

    /// Executes the given instruction in the current machine context.
    ///
    /// The machine will behave as if the given instruction were executed at
    /// the current program location in memory.
    pub fn execute(&mut self, ins: Instruction) -> Result<(), Error> {
        use self::Instruction::*;

        match ins {
            Cls => self.display.clear(),
            Ret => {
                self.pc = self.call_stack
                    .pop()
                    .ok_or(NotInSubroutineError)
                    .with_context(|_| format!("error executing {}", ins))?;
            }
            Jp(addr) => {
                self.pc = addr;
                return Ok(());
            }
            Call(addr) => {
                if self.call_stack.len() == STACK_DEPTH {
                    return Err(StackOverflowError.into());
                }
                self.call_stack.push(self.pc);
                self.pc = addr;
                return Ok(());
            }
            SeByte(reg, b) => if self.register(reg) == b {
                self.pc = (self.pc + 4).context("program counter overflowed")?;
                return Ok(());
            },
            SneByte(reg, b) => if self.register(reg) != b {
                self.pc = (self.pc + 4).context("program counter overflowed")?;
                return Ok(());
            },
            SeReg(reg1, reg2) => if self.register(reg1) == self.register(reg2) {
                self.pc = (self.pc + 4).context("program counter overflowed")?;
                return Ok(());
            },
            LdByte(reg, b) => self.set_register(reg, b),
            AddByte(reg, b) => self.add(reg, b),
            LdReg(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.set_register(reg1, r2);
            }
            Or(reg1, reg2) => {
                let r1 = self.register(reg1);
                let r2 = self.register(reg2);
                self.set_register(reg1, r1 | r2);
            }
            And(reg1, reg2) => {
                let r1 = self.register(reg1);
                let r2 = self.register(reg2);
                self.set_register(reg1, r1 & r2);
            }
            Xor(reg1, reg2) => {
                let r1 = self.register(reg1);
                let r2 = self.register(reg2);
                self.set_register(reg1, r1 ^ r2);
            }
            AddReg(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.add(reg1, r2);
            }
            Sub(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.sub(reg1, r2);
            }
            Shr(reg) => self.shr(reg),
            Subn(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.subn(reg1, r2);
            }
            Shl(reg) => self.shl(reg),
            SneReg(reg1, reg2) => if self.register(reg1) != self.register(reg2) {
                self.pc = (self.pc + 4)?;
                return Ok(());
            },
            LdI(addr) => self.reg_i = addr.addr() as u16,
            JpV0(addr) => {
                self.pc = (addr + self.register(Register::V0) as usize)
                    .context("attempted to jump to out of bounds address")?;
                return Ok(());
            }
            Rnd(reg, b) => {
                let r: u8 = self.rng.gen();
                self.set_register(reg, r & b);
            }
            Drw(reg1, reg2, n) => self.drw(reg1, reg2, n)
                .with_context(|_| format!("error executing {}", ins))?,
            Skp(reg) => {
                let key = Key::from_byte(self.register(reg));
                if self.input.check_pressed(key) {
                    self.pc = (self.pc + 4).context("program counter overflowed")?;
                    return Ok(());
                }
            }
            Sknp(reg) => {
                let key = Key::from_byte(self.register(reg));
                if !self.input.check_pressed(key) {
                    self.pc = (self.pc + 4).context("program counter overflowed")?;
                    return Ok(());
                }
            }
            LdRegDt(reg) => {
                let dt = self.dt();
                self.set_register(reg, dt);
            }
            LdKey(reg) => match self.input.first_pressed() {
                Some(key) => self.set_register(reg, key as u8),
                // No key yet; leave the PC in place so the instruction is
                // retried on the next step.
                None => return Ok(()),
            },
            LdDtReg(reg) => {
                let r = self.register(reg);
                self.set_dt(r);
            }
            LdSt(reg) => {
                let r = self.register(reg);
                self.set_st(r);
            }
            AddI(reg) => {
                let (sum, carry) = self.reg_i
                    .overflowing_add(u16::from(self.register(reg)));
                self.reg_i = sum;
                self.set_register(Register::VF, carry as u8);
            }
            LdF(reg) => {
                let r = self.register(reg) as usize;
                self.reg_i = (FONT_START + FONT_HEIGHT * r) as u16;
            }
            LdB(reg) => self.ld_b(reg)
                .with_context(|_| format!("error executing {}", ins))?,
            LdDerefIReg(reg) => self.ld_deref_i_reg(reg)
                .with_context(|_| format!("error executing {}", ins))?,
            LdRegDerefI(reg) => self.ld_reg_deref_i(reg)
                .with_context(|_| format!("error executing {}", ins))?,
        }

        self.pc = (self.pc + 2).context("program counter overflowed")?;
        Ok(())
    }

    /// Adds the given byte to the given register, setting `VF` to 1 on carry
    /// or 0 otherwise.
    fn add(&mut self, reg: Register, val: u8) {
        let carry = val > u8::MAX - self.register(reg);
        self.regs[reg as usize] += Wrapping(val);
        self.set_register(Register::VF, carry as u8);
    }

    /// Subtracts the given byte from the given register, setting `VF` to 0 on
    /// borrow or 1 otherwise.
    fn sub(&mut self, reg: Register, val: u8) {
        let borrow = val > self.register(reg);
        self.regs[reg as usize] -= Wrapping(val);
        self.set_register(Register::VF, !borrow as u8);
    }

    /// Sets `reg` to `val - reg`, setting `VF` to 0 on borrow or 1 otherwise.
    fn subn(&mut self, reg: Register, val: u8) {
        let borrow = self.register(reg) > val;
        self.regs[reg as usize] = Wrapping(val) - self.regs[reg as usize];
        self.set_register(Register::VF, !borrow as u8);
    }

    /// Sets `reg` to `reg >> 1`, setting `VF` to the old lowest bit.
    fn shr(&mut self, reg: Register) {
        let old = self.register(reg) & 1;
        let r = self.register(reg);
        self.set_register(reg, r >> 1);
        self.set_register(Register::VF, old);
    }

    /// Sets `reg` to `reg << 1` (truncated to 8 bits), setting `VF` to the
    /// old highest bit.
    fn shl(&mut self, reg: Register) {
        let old = self.register(reg) >> 7;
        let r = self.register(reg);
        self.set_register(reg, r << 1);
        self.set_register(Register::VF, old);
    }

    /// Implements the `DRW` operation.
    ///
    /// `VF` is cleared, then set to 1 if any pixel was flipped from on to
    /// off.  Sprite coordinates wrap around the screen edges.
    fn drw(&mut self, reg1: Register, reg2: Register, n: u8) -> Result<(), AddressOutOfBoundsError> {
        let start = self.reg_i as usize;
        let end = start + n as usize;
        if end > MEM_SIZE {
            return Err(AddressOutOfBoundsError(end - 1));
        }
        let x = self.register(reg1) as usize;
        let y = self.register(reg2) as usize;

        self.set_register(Register::VF, 0);
        if self.display.draw_sprite(&self.mem[start..end], x, y) {
            self.set_register(Register::VF, 1);
        }
        Ok(())
    }

    /// Implements the `LD B, Vx` operation.
    fn ld_b(&mut self, reg: Register) -> Result<(), AddressOutOfBoundsError> {
        let val = self.register(reg);
        let hundreds = val / 100;
        let tens = val % 100 / 10;
        let ones = val % 10;
        let addr = self.reg_i as usize;

        if addr + 2 >= MEM_SIZE {
            Err(AddressOutOfBoundsError(addr + 2))
        } else {
            self.mem[addr] = hundreds;
            self.mem[addr + 1] = tens;
            self.mem[addr + 2] = ones;
            Ok(())
        }
    }

    /// Implements the `LD [I], Vx` operation.
    ///
    /// The dump is inclusive of `Vx`: registers `V0` through `Vx` are copied
    /// to memory starting at `I`.
    fn ld_deref_i_reg(&mut self, reg: Register) -> Result<(), AddressOutOfBoundsError> {
        let count = reg as usize + 1;
        let start = self.reg_i as usize;

        if start + count > MEM_SIZE {
            Err(AddressOutOfBoundsError(start + count - 1))
        } else {
            for (dest, src) in self.mem[start..start + count]
                .iter_mut()
                .zip(self.regs[..count].iter())
            {
                *dest = src.0;
            }
            Ok(())
        }
    }

    /// Implements the `LD Vx, [I]` operation.
    ///
    /// The load is inclusive of `Vx`: registers `V0` through `Vx` are filled
    /// from memory starting at `I`.
    fn ld_reg_deref_i(&mut self, reg: Register) -> Result<(), AddressOutOfBoundsError> {
        let count = reg as usize + 1;
        let start = self.reg_i as usize;

        if start + count > MEM_SIZE {
            Err(AddressOutOfBoundsError(start + count - 1))
        } else {
            for (dest, src) in self.regs[..count]
                .iter_mut()
                .zip(self.mem[start..start + count].iter())
            {
                *dest = Wrapping(*src);
            }
            Ok(())
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::u8;

    use num::FromPrimitive;

    use display;
    use input::Key;
    use instruction::{Address, Instruction};
    use machine::{Machine, STACK_DEPTH};
    use PROG_SIZE;
    use PROG_START;
    use Register;

    /// Tests the `ADD` operation (both `ADD Vx, byte` and `ADD Vx, Vy`).
    #[test]
    fn instruction_add() {
        use Register::*;

        // Test cases, in the format (Vx, Vy, b1, b2).
        let cases = [
            (V0, V1, 24u8, 67u8),
            (V5, VD, 54u8, 102u8),
            (V7, VE, 255u8, 255u8),
            (V2, V4, 1u8, 255u8),
            (V5, V6, 0u8, 78u8),
        ];
        let mut machine = Machine::new();

        for &(vx, vy, b1, b2) in cases.iter() {
            let case = (vx, vy, b1, b2);
            let sum = b1.wrapping_add(b2);
            let carry = b1 as u32 + b2 as u32 > u8::MAX as u32;

            // Test `ADD Vx, byte`.
            machine.set_register(vx, b1);
            machine.execute(Instruction::AddByte(vx, b2)).unwrap();
            assert_eq!(machine.register(vx), sum, "case {:?}", case);
            assert_eq!(machine.register(VF), carry as u8, "case {:?}", case);

            // Test `ADD Vx, Vy`.
            machine.set_register(vx, b1);
            machine.set_register(vy, b2);
            machine.execute(Instruction::AddReg(vx, vy)).unwrap();
            assert_eq!(machine.register(vx), sum, "case {:?}", case);
            assert_eq!(machine.register(VF), carry as u8, "case {:?}", case);
        }
    }

    /// Tests the `AND`, `OR` and `XOR` operations.
    #[test]
    fn instruction_bitwise() {
        use Register::*;

        // Test cases, in the format (Vx, Vy, b1, b2).
        let cases = [
            (V7, V2, 0x75, 0xF2),
            (V3, V8, 0x01, 0xFF),
            (VA, VE, 0x6A, 0x32),
            (V9, VC, 0x78, 0xFD),
            (V0, V1, 0xF0, 0x0F),
        ];
        let mut machine = Machine::new();

        for &(vx, vy, b1, b2) in cases.iter() {
            let case = (vx, vy, b1, b2);
            let or = b1 | b2;
            let and = b1 & b2;
            let xor = b1 ^ b2;

            // Test `OR`.
            machine.set_register(vx, b1);
            machine.set_register(vy, b2);
            machine.execute(Instruction::Or(vx, vy)).unwrap();
            assert_eq!(machine.register(vx), or, "case {:?}", case);

            // Test `AND`.
            machine.set_register(vx, b1);
            machine.set_register(vy, b2);
            machine.execute(Instruction::And(vx, vy)).unwrap();
            assert_eq!(machine.register(vx), and, "case {:?}", case);

            // Test `XOR`.
            machine.set_register(vx, b1);
            machine.set_register(vy, b2);
            machine.execute(Instruction::Xor(vx, vy)).unwrap();
            assert_eq!(machine.register(vx), xor, "case {:?}", case);
        }
    }

    /// Tests the `SUB` and `SUBN` operations.
    #[test]
    fn instruction_sub() {
        use Register::*;

        // Test cases, in the format (Vx, Vy, b1, b2).
        let cases = [
            (V9, V8, 70u8, 35u8),
            (V6, V2, 56u8, 2u8),
            (V0, V1, 0u8, 0u8),
            (VE, VA, 255u8, 255u8),
            (V3, V7, 1u8, 255u8),
        ];
        let mut machine = Machine::new();

        for &(vx, vy, b1, b2) in cases.iter() {
            let case = (vx, vy, b1, b2);
            let sub = b1.wrapping_sub(b2);
            let subn = b2.wrapping_sub(b1);
            let borrow = b2 > b1;
            let borrown = b1 > b2;

            // Test `SUB Vx, Vy`.
            machine.set_register(vx, b1);
            machine.set_register(vy, b2);
            machine.execute(Instruction::Sub(vx, vy)).unwrap();
            assert_eq!(machine.register(vx), sub, "case {:?}", case);
            assert_eq!(machine.register(VF), !borrow as u8, "case {:?}", case);

            // Test `SUBN Vx, Vy`.
            machine.set_register(vx, b1);
            machine.set_register(vy, b2);
            machine.execute(Instruction::Subn(vx, vy)).unwrap();
            assert_eq!(machine.register(vx), subn, "case {:?}", case);
            assert_eq!(machine.register(VF), !borrown as u8, "case {:?}", case);
        }
    }

    /// Tests the `SHR` and `SHL` operations.
    #[test]
    fn instruction_shift() {
        use Register::*;

        let cases = [0x01u8, 0x02, 0x80, 0x81, 0xFF, 0x00, 0x7E];
        let mut machine = Machine::new();

        for &b in cases.iter() {
            machine.set_register(V3, b);
            machine.execute(Instruction::Shr(V3)).unwrap();
            assert_eq!(machine.register(V3), b >> 1, "case {:#04X}", b);
            assert_eq!(machine.register(VF), b & 1, "case {:#04X}", b);

            machine.set_register(V3, b);
            machine.execute(Instruction::Shl(V3)).unwrap();
            assert_eq!(machine.register(V3), b << 1, "case {:#04X}", b);
            assert_eq!(machine.register(VF), b >> 7, "case {:#04X}", b);
        }
    }

    /// Tests the `LD B, Vx` operation.
    #[test]
    fn instruction_ld_b() {
        use Register::*;

        // Test cases, in the format (Vx, n1, n2, n3), where the three digits
        // to be stored are n1, n2 and n3 (in that order).
        let cases = [
            (V5, 1, 5, 7),
            (VD, 0, 0, 1),
            (VE, 1, 0, 0),
            (V2, 2, 5, 5),
            (V6, 0, 0, 0),
            (V8, 0, 6, 4),
        ];
        let mut machine = Machine::new();
        machine.set_i(0x300);

        for &(vx, n1, n2, n3) in cases.iter() {
            let case = (vx, n1, n2, n3);
            let n = 100 * n1 + 10 * n2 + n3;

            machine.set_register(vx, n);
            machine.execute(Instruction::LdB(vx)).unwrap();
            let i = machine.i() as usize;
            assert_eq!(machine.mem()[i], n1, "case {:?}", case);
            assert_eq!(machine.mem()[i + 1], n2, "case {:?}", case);
            assert_eq!(machine.mem()[i + 2], n3, "case {:?}", case);
        }
    }

    /// Tests that `LD [I], Vx` followed by `LD Vx, [I]` round-trips the
    /// registers, inclusive of `Vx`.
    #[test]
    fn instruction_store_load() {
        use Register::*;

        let values = [12u8, 34, 56, 78, 90, 255, 0, 17];
        let mut machine = Machine::new();
        machine.set_i(0x320);
        for (i, &val) in values.iter().enumerate() {
            machine.set_register(Register::from_usize(i).unwrap(), val);
        }

        machine.execute(Instruction::LdDerefIReg(V7)).unwrap();
        // The dump touches exactly X + 1 bytes.
        assert_eq!(machine.mem()[0x320 + 7], values[7]);
        assert_eq!(machine.mem()[0x320 + 8], 0);

        for i in 0..8 {
            machine.set_register(Register::from_usize(i).unwrap(), 0xEE);
        }
        machine.execute(Instruction::LdRegDerefI(V7)).unwrap();
        for (i, &val) in values.iter().enumerate() {
            assert_eq!(machine.register(Register::from_usize(i).unwrap()), val);
        }
    }

    /// Tests the `DRW` operation: drawing the same sprite twice at the same
    /// location erases it and reports a collision.
    #[test]
    fn instruction_drw() {
        use Register::*;

        let mut machine = Machine::new();
        // The font sprite for "0" lives at address 0.
        machine.set_i(0);
        machine.execute(Instruction::Drw(V0, V1, 5)).unwrap();
        assert_eq!(machine.register(VF), 0);
        assert!(machine.display().data()[0][0]);

        machine.execute(Instruction::Drw(V0, V1, 5)).unwrap();
        assert_eq!(machine.register(VF), 1);
        for row in machine.display().data().iter() {
            for &pixel in row.iter() {
                assert!(!pixel);
            }
        }
    }

    /// Tests the `CALL` and `RET` operations: the return address is computed
    /// at return time, from the saved location of the call itself.
    #[test]
    fn instruction_call_ret() {
        let mut machine = Machine::new();
        machine
            .execute(Instruction::Jp(Address::from_u16(0x202).unwrap()))
            .unwrap();
        machine
            .execute(Instruction::Call(Address::from_u16(0x300).unwrap()))
            .unwrap();
        assert_eq!(machine.pc().addr(), 0x300);

        machine.execute(Instruction::Ret).unwrap();
        assert_eq!(machine.pc().addr(), 0x204);
    }

    /// Tests that the call stack is bounded and that underflow is an error.
    #[test]
    fn call_stack_depth_checked() {
        let target = Address::from_u16(0x300).unwrap();
        let mut machine = Machine::new();
        for _ in 0..STACK_DEPTH {
            machine.execute(Instruction::Call(target)).unwrap();
        }
        let err = machine.execute(Instruction::Call(target)).unwrap_err();
        assert!(err.downcast_ref::<super::StackOverflowError>().is_some());

        let mut machine = Machine::new();
        assert!(machine.execute(Instruction::Ret).is_err());
    }

    /// Tests the skip instructions.
    #[test]
    fn instruction_skip() {
        use Register::*;

        let mut machine = Machine::new();
        machine.set_register(V4, 5);
        machine.execute(Instruction::SeByte(V4, 5)).unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 4);

        let mut machine = Machine::new();
        machine.set_register(V4, 5);
        machine.execute(Instruction::SeByte(V4, 6)).unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 2);

        let mut machine = Machine::new();
        machine.set_register(V1, 7);
        machine.set_register(V2, 7);
        machine.execute(Instruction::SeReg(V1, V2)).unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 4);
        machine.execute(Instruction::SneReg(V1, V2)).unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 6);
    }

    /// Tests that the key skip instructions consume the tested key.
    #[test]
    fn instruction_key_skip_consumes() {
        use Register::*;

        let mut machine = Machine::new();
        machine.set_register(V0, 7);
        machine.set_key(Key::K7, true);

        machine.execute(Instruction::Skp(V0)).unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 4);
        // The press was consumed: the same skip no longer fires...
        machine.execute(Instruction::Skp(V0)).unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 6);
        // ...and the "not pressed" skip does.
        machine.execute(Instruction::Sknp(V0)).unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 10);

        // A key press is observed at most once, even by a non-skipping test.
        let mut machine = Machine::new();
        machine.set_register(V0, 3);
        machine.set_key(Key::K3, true);
        machine.execute(Instruction::Sknp(V0)).unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 2);
        assert!(!machine.input().is_pressed(Key::K3));
    }

    /// Tests that `LD Vx, K` holds the PC until a key arrives.
    #[test]
    fn instruction_wait_for_key() {
        use Register::*;

        let mut machine = Machine::new();
        machine.mem_mut()[PROG_START] = 0xF1;
        machine.mem_mut()[PROG_START + 1] = 0x0A;

        machine.step().unwrap();
        assert_eq!(machine.pc().addr(), PROG_START);

        machine.set_key(Key::K9, true);
        machine.step().unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 2);
        assert_eq!(machine.register(V1), 9);
    }

    /// Tests that `RND` is reproducible under a fixed seed and respects its
    /// mask.
    #[test]
    fn instruction_rnd() {
        use Register::*;

        let seed = [0x193a_6754, 0xa8a7_d469, 0x9783_0e05, 0x1137_98f1];
        let mut machine1 = Machine::new();
        let mut machine2 = Machine::new();
        machine1.seed_rng(seed);
        machine2.seed_rng(seed);

        for _ in 0..10 {
            machine1.execute(Instruction::Rnd(V6, 0xFF)).unwrap();
            machine2.execute(Instruction::Rnd(V6, 0xFF)).unwrap();
            assert_eq!(machine1.register(V6), machine2.register(V6));

            machine1.execute(Instruction::Rnd(V7, 0x0F)).unwrap();
            assert!(machine1.register(V7) <= 0x0F);
        }
    }

    /// Tests the `ADD I, Vx` carry behavior.
    #[test]
    fn instruction_add_i() {
        use Register::*;

        let mut machine = Machine::new();
        machine.set_i(0x0FFE);
        machine.set_register(V0, 3);
        machine.execute(Instruction::AddI(V0)).unwrap();
        assert_eq!(machine.i(), 0x1001);
        assert_eq!(machine.register(VF), 0);

        machine.set_i(0xFFFF);
        machine.set_register(V0, 1);
        machine.execute(Instruction::AddI(V0)).unwrap();
        assert_eq!(machine.i(), 0);
        assert_eq!(machine.register(VF), 1);
    }

    /// Tests the `LD F, Vx` font addressing.
    #[test]
    fn instruction_ld_f() {
        use Register::*;

        let mut machine = Machine::new();
        for digit in 0..16u8 {
            machine.set_register(VA, digit);
            machine.execute(Instruction::LdF(VA)).unwrap();
            assert_eq!(machine.i(), u16::from(digit) * 5);
            let start = machine.i() as usize;
            assert_eq!(
                &machine.mem()[start..start + 5],
                &display::FONT_SPRITES[digit as usize]
            );
        }
    }

    /// Tests program loading bounds: a maximal program fills memory exactly,
    /// and an oversized one is rejected without touching memory.
    #[test]
    fn load_program_bounds() {
        let mut machine = Machine::new();
        let mut prog = vec![0xAB; PROG_SIZE];
        machine.load_program(&mut Cursor::new(&prog)).unwrap();
        assert_eq!(machine.mem()[0xFFF], 0xAB);

        let mut machine = Machine::new();
        prog.push(0xCD);
        let err = machine.load_program(&mut Cursor::new(&prog)).unwrap_err();
        assert!(err.downcast_ref::<super::ProgramTooLargeError>().is_some());
        for &b in machine.mem()[PROG_START..].iter() {
            assert_eq!(b, 0);
        }
    }

    /// Tests that an unimplemented opcode is skipped, counted and otherwise
    /// has no effect.
    #[test]
    fn step_skips_unimplemented() {
        let mut machine = Machine::new();
        machine.mem_mut()[PROG_START] = 0x50;
        machine.mem_mut()[PROG_START + 1] = 0x01;

        machine.step().unwrap();
        assert_eq!(machine.pc().addr(), PROG_START + 2);
        assert_eq!(machine.unimplemented_count(), 1);
        for i in 0..16 {
            assert_eq!(machine.register(Register::from_usize(i).unwrap()), 0);
        }
        for row in machine.display().data().iter() {
            for &pixel in row.iter() {
                assert!(!pixel);
            }
        }
    }

    /// Tests that the timers count down to 0 and stop there.
    #[test]
    fn timers_count_down() {
        let mut machine = Machine::new();
        machine.set_dt(2);
        machine.set_st(1);

        machine.tick_timers();
        assert_eq!((machine.dt(), machine.st()), (1, 0));
        machine.tick_timers();
        assert_eq!((machine.dt(), machine.st()), (0, 0));
        machine.tick_timers();
        assert_eq!((machine.dt(), machine.st()), (0, 0));
    }

    /// Tests that `reset` restores the startup state.
    #[test]
    fn reset_restores_startup_state() {
        use Register::*;

        let mut machine = Machine::new();
        machine
            .load_program(&mut Cursor::new(&[0x60u8, 0x42]))
            .unwrap();
        machine.step().unwrap();
        assert_eq!(machine.register(V0), 0x42);

        machine.reset();
        assert_eq!(machine.pc().addr(), PROG_START);
        assert_eq!(machine.register(V0), 0);
        assert_eq!(machine.mem()[PROG_START], 0);
        // The font survives a reset.
        assert_eq!(machine.mem()[0], 0xF0);
    }
}
