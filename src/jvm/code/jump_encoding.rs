//! Fix oversized jumps by rewriting them into wider forms
//!
//! This module is responsible for fixing jumps that require bigger relative offsets than the jump
//! instruction supports. `goto`, `jsr` and the `if*` family all have signed 16-bit offsets, while
//! `goto_w` and `jsr_w` have signed 32-bit offsets.
//!
//! ### Fixed point
//!
//! Rewrites make the code longer, so they can push other jumps out of range. [`CodeBody::relax`]
//! alternates [`CodeBody::sync`] and [`CodeBody::fix_offsets`] until nothing changes. We know the
//! process will finish because the number of rewritable 16-bit jump instructions only ever
//! decreases:
//!
//!   - once a `goto` or `jsr` is widened, it can be discarded from consideration (32 bits is
//!     definitely enough)
//!
//!   - the inverted `if*` of a trampoline jumps a small _fixed_ distance, so it never needs to be
//!     rewritten again
//!
//! ### Rewriting
//!
//! Unconditional jumps are widened in place:
//!
//! ```text,ignore,no_run
//!     goto L2               goto_w L2
//! L1: ...         =>    L1: ...
//!     ...                   ...
//! L2: ...               L2: ...
//! ```
//!
//! Conditional jumps have no wide form, so the condition gets inverted to hop over a `goto_w`:
//!
//! ```text,ignore,no_run
//!     if* L2                ifnot* L1
//! L1: ...         =>        goto_w L2
//!     ...               L1: ...
//! L2: ...                   ...
//!                       L2: ...
//! ```
//!
//! ### Stack map frames
//!
//! The trampoline above makes `L1` a jump target, and the instruction after a `goto_w` needs a
//! stack map frame. When the method has stack map frames and `L1` doesn't already have one, we
//! would have to infer the frame at `L1`, which requires data-flow analysis. Instead, the branch is
//! kept as is and pointed at an _island_: a `goto_w L2` placed in otherwise unreachable code right
//! after some nearby unconditional control transfer.
//!
//! ```text,ignore,no_run
//!     if* L2                if* L3
//!     ...                   ...
//!     return                return
//! L1: ...         =>    L3: goto_w L2
//!     ...               L1: ...
//! L2: ...                   ...
//!                       L2: ...
//! ```
//!
//! The frame at the island is the frame at `L2` (the island only forwards the jump), written out as
//! a full frame. Since the frame after the island (here, at `L1`) might have been encoded relative
//! to its old predecessor, it is also rewritten as a full frame.

use super::{CodeBody, InsnId, Instruction, Jump, Opcode, StackMapFrame};
use crate::jvm::class_file::ConstantPool;
use crate::jvm::Error;
use crate::util::Width;
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<i64> =
    RangeInclusive::new(i16::MIN as i64, i16::MAX as i64);

/// Largest code array a method may have
pub const MAX_CODE_LENGTH: usize = 65535;

/// Islands are only placed this far inside of the 16-bit jump range, since later rewrites may
/// push them further from their branch
const ISLAND_MARGIN: i64 = 1024;

impl CodeBody {
    /// Rewrite every 16-bit jump whose offset (as of the last `sync`) does not fit
    ///
    /// Returns whether anything was rewritten, in which case offsets are stale and `sync` must run
    /// again. See [`CodeBody::relax`] for the full fixed-point loop.
    pub fn fix_offsets(&mut self, constants: &mut ConstantPool) -> Result<bool, Error> {
        let oversized: Vec<(InsnId, Opcode, Jump)> = self
            .instructions()
            .filter_map(|(id, insn)| match insn {
                Instruction::Branch(opcode, jump)
                    if !SIGNED_16BIT_JUMP_RANGE.contains(&(jump.offset as i64)) =>
                {
                    Some((id, *opcode, *jump))
                }
                _ => None,
            })
            .collect();
        if oversized.is_empty() {
            return Ok(false);
        }

        for (branch, opcode, Jump { target, offset }) in oversized {
            log::debug!(
                "{} at bci {} is oversized (offset {})",
                opcode.mnemonic(),
                self.bci(branch),
                offset
            );
            if let Some(wide_opcode) = opcode.widened() {
                *self.get_mut(branch) = Instruction::WideBranch(wide_opcode, Jump::to(target));
            } else if self.needs_island(branch) {
                self.branch_to_island(branch, opcode, target, constants)?;
            } else {
                self.branch_over_trampoline(branch, opcode, target)?;
            }
        }
        Ok(true)
    }

    /// Alternate `sync` and `fix_offsets` until all jumps fit
    ///
    /// This must be called after mutating the code and before serializing it.
    pub fn relax(&mut self, constants: &mut ConstantPool) -> Result<(), Error> {
        let mut rounds = 0;
        loop {
            self.sync()?;
            if !self.fix_offsets(constants)? {
                break;
            }
            rounds += 1;
        }
        if rounds > 0 {
            log::debug!(
                "relaxed jumps in {} round(s), code is now {} bytes",
                rounds,
                self.code_length()
            );
        }

        let code_length = self.code_length() as usize;
        if code_length > MAX_CODE_LENGTH {
            return Err(Error::MethodCodeOverflow(code_length));
        }
        Ok(())
    }

    /// Would an inline trampoline for this branch need a stack map frame we can't produce?
    fn needs_island(&self, branch: InsnId) -> bool {
        match (self.stack_map_table(), self.next(branch)) {
            (Some(table), Some(next)) => table.frame_at(next).is_none(),
            _ => false,
        }
    }

    /// `if* L2` becomes `ifnot* L1; goto_w L2; L1: ...`
    fn branch_over_trampoline(
        &mut self,
        branch: InsnId,
        opcode: Opcode,
        target: InsnId,
    ) -> Result<(), Error> {
        let inverted = opcode
            .inverted()
            .ok_or(Error::UnrelaxableBranch(branch))?;
        let next = self.next(branch).ok_or(Error::UnrelaxableBranch(branch))?;

        self.insert_after(branch, Instruction::WideBranch(Opcode::GotoW, Jump::to(target)));
        *self.get_mut(branch) = Instruction::Branch(inverted, Jump::to(next));
        log::debug!(
            "rewrote {} into {} over a goto_w trampoline",
            opcode.mnemonic(),
            inverted.mnemonic()
        );
        Ok(())
    }

    /// Point the branch at a new `goto_w` island, along with the frames that requires
    fn branch_to_island(
        &mut self,
        branch: InsnId,
        opcode: Opcode,
        target: InsnId,
        constants: &mut ConstantPool,
    ) -> Result<(), Error> {
        let entry = match &self.method {
            Some(method) => method.entry_frame(constants)?,
            None => return Err(Error::UnrelaxableBranch(branch)),
        };
        let site = self
            .island_site(branch)
            .ok_or(Error::UnrelaxableBranch(branch))?;
        let states = match self.stack_map_table() {
            Some(table) => table.expand(&entry),
            None => return Err(Error::UnrelaxableBranch(branch)),
        };

        let island = self.insert_after(site, Instruction::WideBranch(Opcode::GotoW, Jump::to(target)));
        *self.get_mut(branch) = Instruction::Branch(opcode, Jump::to(island));

        let positions: HashMap<InsnId, usize> = self
            .ids()
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        let island_position = positions[&island];
        let table = match self.stack_map_table_mut() {
            Some(table) => table,
            None => return Err(Error::UnrelaxableBranch(branch)),
        };
        let target_state = table
            .frames
            .iter()
            .position(|frame| frame.target == target)
            .map(|idx| states[idx].clone())
            .ok_or(Error::UnrelaxableBranch(branch))?;
        let insert_at = table
            .frames
            .iter()
            .position(|frame| {
                positions
                    .get(&frame.target)
                    .map_or(false, |position| *position > island_position)
            })
            .unwrap_or(table.frames.len());

        table
            .frames
            .insert(insert_at, StackMapFrame::new(island, target_state.full_frame()));
        if let Some(following) = table.frames.get_mut(insert_at + 1) {
            following.kind = states[insert_at].full_frame();
        }

        log::debug!(
            "pointed {} at a goto_w island placed after {:?}",
            opcode.mnemonic(),
            site
        );
        Ok(())
    }

    /// Unconditional control transfer closest to the branch, after which an island is in range
    ///
    /// Sites inside of exception handler ranges are skipped, since the island would then need a
    /// frame compatible with the handler.
    fn island_site(&self, branch: InsnId) -> Option<InsnId> {
        let branch_bci = self.bci(branch) as i64;
        let reach = RangeInclusive::new(
            *SIGNED_16BIT_JUMP_RANGE.start() + ISLAND_MARGIN,
            *SIGNED_16BIT_JUMP_RANGE.end() - ISLAND_MARGIN,
        );

        self.instructions()
            .filter(|(_, insn)| insn.is_unconditional_transfer())
            .filter_map(|(id, insn)| {
                let site_bci = self.bci(id) as i64;
                let island_bci = site_bci + insn.width() as i64;
                let distance = island_bci - branch_bci;
                // The island lands right before the instruction following the site, so a range
                // covering the site (even one ending on that instruction) would cover it too
                let covered = self.exception_table.iter().any(|handler| {
                    self.bci(handler.start) as i64 <= site_bci
                        && self.end_bci(handler.end) as i64 > site_bci
                });
                if reach.contains(&distance) && !covered {
                    Some((distance.abs(), id))
                } else {
                    None
                }
            })
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, id)| id)
    }
}
