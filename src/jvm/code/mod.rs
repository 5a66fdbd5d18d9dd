//! Method bytecode, as a mutable sequence of instructions
//!
//! ### Structure
//!
//! Despite being just another method attribute, the `Code` attribute is the part of the class
//! file that makes patching hard: branch offsets, exception ranges, line and local variable
//! tables, and stack map frames all refer to instructions by byte offset (_bci_), so inserting a
//! single instruction shifts everything after it. We avoid chasing offsets around by decoding
//! [the bytecode][0] into a [`CodeBody`] in which:
//!
//!   - every [`Instruction`] gets a stable [`InsnId`] handle, and instructions are kept in an
//!     explicit layout order
//!   - every reference to code (jumps, switch tables, exception handlers, side tables, frames) is
//!     resolved to a handle when the method is read
//!
//! Offsets are then derived rather than stored: [`CodeBody::sync`] assigns bcis and recomputes
//! jump offsets and frame deltas, and [`CodeBody::relax`] additionally rewrites jumps that no
//! longer fit (see [`jump_encoding`]).
//!
//! ### Code injection
//!
//! [`InstructionInserter`] splices instructions in at some position, creating the constants
//! they need along the way.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5

mod code;
mod decode;
mod inserter;
mod instructions;
pub mod jump_encoding;
mod opcodes;
mod stack_map;
mod tables;

pub use code::*;
pub use decode::decode;
use decode::BciIndex;
pub use inserter::*;
pub use instructions::*;
pub use opcodes::*;
pub use stack_map::*;
pub use tables::*;
