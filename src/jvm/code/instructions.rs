use super::{Opcode, OperandFormat};
use crate::jvm::class_file::{ConstantIndex, ConstantPool, Serialize};
use crate::jvm::{Error, MethodDescriptor, ParseDescriptor};
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::io::{ErrorKind, Result};

/// Stable handle to an instruction in a [`CodeBody`](super::CodeBody)
///
/// Handles stay valid across insertions and across `sync`. They are never reused, so a handle to
/// a removed instruction can't silently alias a newer one.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct InsnId(pub(super) usize);

/// Resolved jump target
///
/// The `offset` is transient: it is derived from the target (see `CodeBody::sync`) and is only
/// meaningful between a `sync` and the next mutation.
#[derive(Copy, Clone, Debug)]
pub struct Jump {
    pub target: InsnId,
    pub offset: i32,
}

impl Jump {
    /// Jump to an instruction (the offset gets filled in on the next `sync`)
    pub fn to(target: InsnId) -> Jump {
        Jump { target, offset: 0 }
    }
}

/// Jumps are equal when they go to the same place, whether or not their offsets are up to date
impl PartialEq for Jump {
    fn eq(&self, other: &Jump) -> bool {
        self.target == other.target
    }
}

impl Eq for Jump {}

/// Anything that can be encoded as a relative jump offset
pub trait JumpOffset {
    fn jump_offset(&self) -> i32;
}

impl JumpOffset for i32 {
    fn jump_offset(&self) -> i32 {
        *self
    }
}

impl JumpOffset for Jump {
    fn jump_offset(&self) -> i32 {
        self.offset
    }
}

/// JVM instruction
///
/// Instructions are grouped by the shape of their operands, with the [`Opcode`] picking out the
/// exact instruction within a group. The encoding chosen in the class file is preserved: `iload_1`,
/// `iload 1`, and `wide iload 1` are three different instructions here, so that decoding and
/// re-encoding an untouched method reproduces it byte for byte.
///
/// The jump label type `L` is the relative offset (`i32`) right after decoding, and a resolved
/// [`Jump`] once the instruction is part of a code body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction<L = Jump> {
    /// Opcodes with no operands (`nop`, `iadd`, `aload_0`, `areturn`, ...)
    Simple(Opcode),

    /// Local variable load/store and `ret` with a one byte index
    Local(Opcode, u8),

    /// `wide` form of a load/store or `ret`
    WideLocal(Opcode, u16),

    IInc {
        index: u8,
        delta: i8,
    },

    /// `wide` form of `iinc`
    WideIInc {
        index: u16,
        delta: i16,
    },

    BiPush(i8),
    SiPush(i16),

    /// `newarray` with its primitive array type code
    NewArray(u8),

    /// `ldc` with its one byte constant index
    Ldc(u8),

    /// Opcodes taking a two byte constant index: `ldc_w`, `ldc2_w`, field accesses,
    /// `invokevirtual`, `invokespecial`, `invokestatic`, `new`, `anewarray`, `checkcast`, and
    /// `instanceof`
    Constant(Opcode, ConstantIndex),

    InvokeInterface {
        method: ConstantIndex,
        count: u8,
    },
    InvokeDynamic(ConstantIndex),
    MultiANewArray {
        class: ConstantIndex,
        dimensions: u8,
    },

    /// Branch with a 16-bit offset (`if*`, `goto`, `jsr`)
    Branch(Opcode, L),

    /// Branch with a 32-bit offset (`goto_w`, `jsr_w`)
    WideBranch(Opcode, L),

    TableSwitch {
        /// Between the opcode and the first 4-byte aligned offset (relative to the start of the
        /// code), there must be a 0-3 inclusive byte padding
        padding: u8,
        default: L,
        low: i32,
        targets: Vec<L>,
    },

    LookupSwitch {
        /// Same as the `tableswitch` padding
        padding: u8,
        default: L,
        pairs: Vec<(i32, L)>,
    },
}

/// Padding needed after a switch opcode at `bci` so that its operands are 4-byte aligned
pub fn switch_padding(bci: u32) -> u8 {
    (3 - bci % 4) as u8
}

impl<L> Instruction<L> {
    /// Opcode of the instruction (for `wide` forms, the opcode being widened)
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Simple(opcode)
            | Instruction::Local(opcode, _)
            | Instruction::WideLocal(opcode, _)
            | Instruction::Constant(opcode, _)
            | Instruction::Branch(opcode, _)
            | Instruction::WideBranch(opcode, _) => *opcode,
            Instruction::IInc { .. } | Instruction::WideIInc { .. } => Opcode::IInc,
            Instruction::BiPush(_) => Opcode::BiPush,
            Instruction::SiPush(_) => Opcode::SiPush,
            Instruction::NewArray(_) => Opcode::NewArray,
            Instruction::Ldc(_) => Opcode::Ldc,
            Instruction::InvokeInterface { .. } => Opcode::InvokeInterface,
            Instruction::InvokeDynamic(_) => Opcode::InvokeDynamic,
            Instruction::MultiANewArray { .. } => Opcode::MultiANewArray,
            Instruction::TableSwitch { .. } => Opcode::TableSwitch,
            Instruction::LookupSwitch { .. } => Opcode::LookupSwitch,
        }
    }

    /// Mnemonic, for diagnostics
    pub fn mnemonic(&self) -> &'static str {
        self.opcode().mnemonic()
    }

    /// Check that the opcode belongs in this variant (eg. no `Simple(Opcode::Goto)`)
    pub fn is_well_formed(&self) -> bool {
        let format = self.opcode().format();
        match self {
            Instruction::Simple(_) => format == OperandFormat::NoOperands,
            Instruction::Local(..) | Instruction::WideLocal(..) => {
                format == OperandFormat::LocalIndex
            }
            Instruction::Constant(..) => format == OperandFormat::ConstantIndex,
            Instruction::Branch(..) => format == OperandFormat::Branch,
            Instruction::WideBranch(..) => format == OperandFormat::WideBranch,
            Instruction::TableSwitch { low, targets, .. } => {
                switch_high(*low, targets.len()).is_some()
            }
            _ => true,
        }
    }

    /// Whether control can never fall through to the next instruction
    pub fn is_unconditional_transfer(&self) -> bool {
        self.opcode().is_unconditional_transfer()
    }

    /// All jump labels of the instruction (empty for non-branching instructions)
    pub fn labels(&self) -> Vec<&L> {
        match self {
            Instruction::Branch(_, label) | Instruction::WideBranch(_, label) => vec![label],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(default).chain(targets.iter()).collect(),
            Instruction::LookupSwitch { default, pairs, .. } => std::iter::once(default)
                .chain(pairs.iter().map(|(_, label)| label))
                .collect(),
            _ => vec![],
        }
    }

    /// Mutable access to all jump labels of the instruction
    pub fn labels_mut(&mut self) -> Vec<&mut L> {
        match self {
            Instruction::Branch(_, label) | Instruction::WideBranch(_, label) => vec![label],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(default).chain(targets.iter_mut()).collect(),
            Instruction::LookupSwitch { default, pairs, .. } => std::iter::once(default)
                .chain(pairs.iter_mut().map(|(_, label)| label))
                .collect(),
            _ => vec![],
        }
    }

    /// Map over the jump labels (eg. to resolve offsets into instructions)
    pub fn map_labels<L2, E>(
        &self,
        mut map_label: impl FnMut(&L) -> std::result::Result<L2, E>,
    ) -> std::result::Result<Instruction<L2>, E> {
        use Instruction::*;

        Ok(match self {
            Simple(opcode) => Simple(*opcode),
            Local(opcode, index) => Local(*opcode, *index),
            WideLocal(opcode, index) => WideLocal(*opcode, *index),
            IInc { index, delta } => IInc {
                index: *index,
                delta: *delta,
            },
            WideIInc { index, delta } => WideIInc {
                index: *index,
                delta: *delta,
            },
            BiPush(value) => BiPush(*value),
            SiPush(value) => SiPush(*value),
            NewArray(array_type) => NewArray(*array_type),
            Ldc(index) => Ldc(*index),
            Constant(opcode, index) => Constant(*opcode, *index),
            InvokeInterface { method, count } => InvokeInterface {
                method: *method,
                count: *count,
            },
            InvokeDynamic(index) => InvokeDynamic(*index),
            MultiANewArray { class, dimensions } => MultiANewArray {
                class: *class,
                dimensions: *dimensions,
            },
            Branch(opcode, label) => Branch(*opcode, map_label(label)?),
            WideBranch(opcode, label) => WideBranch(*opcode, map_label(label)?),
            TableSwitch {
                padding,
                default,
                low,
                targets,
            } => TableSwitch {
                padding: *padding,
                default: map_label(default)?,
                low: *low,
                targets: targets
                    .iter()
                    .map(&mut map_label)
                    .collect::<std::result::Result<_, _>>()?,
            },
            LookupSwitch {
                padding,
                default,
                pairs,
            } => LookupSwitch {
                padding: *padding,
                default: map_label(default)?,
                pairs: pairs
                    .iter()
                    .map(|(key, label)| Ok((*key, map_label(label)?)))
                    .collect::<std::result::Result<_, _>>()?,
            },
        })
    }

    /// Change in the height of the operand stack (counted in values)
    ///
    /// For invokes, this is derived from the method descriptor in the constant pool.
    pub fn stack_delta(&self, constants: &ConstantPool) -> std::result::Result<i32, Error> {
        let invoke = |index: ConstantIndex, has_receiver: bool| -> std::result::Result<i32, Error> {
            let descriptor = constants.member_descriptor(index)?;
            let descriptor = MethodDescriptor::parse(&descriptor)?;
            Ok(descriptor.stack_delta(has_receiver))
        };

        match self {
            Instruction::Constant(Opcode::InvokeStatic, method) => invoke(*method, false),
            Instruction::Constant(Opcode::InvokeVirtual | Opcode::InvokeSpecial, method) => {
                invoke(*method, true)
            }
            Instruction::InvokeInterface { method, .. } => invoke(*method, true),
            Instruction::InvokeDynamic(call_site) => invoke(*call_site, false),
            Instruction::MultiANewArray { dimensions, .. } => Ok(1 - *dimensions as i32),
            other => Ok(other.opcode().stack_delta().unwrap_or(0)),
        }
    }
}

/// Size of the instruction when encoded, in bytes
impl<L> Width for Instruction<L> {
    fn width(&self) -> usize {
        match self {
            Instruction::Simple(_) => 1,
            Instruction::Local(..)
            | Instruction::BiPush(_)
            | Instruction::NewArray(_)
            | Instruction::Ldc(_) => 2,
            Instruction::IInc { .. }
            | Instruction::SiPush(_)
            | Instruction::Constant(..)
            | Instruction::Branch(..) => 3,
            Instruction::WideLocal(..) | Instruction::MultiANewArray { .. } => 4,
            Instruction::InvokeInterface { .. }
            | Instruction::InvokeDynamic(_)
            | Instruction::WideBranch(..) => 5,
            Instruction::WideIInc { .. } => 6,
            Instruction::TableSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 4 * (3 + targets.len()),
            Instruction::LookupSwitch { padding, pairs, .. } => {
                1 + *padding as usize + 8 * (1 + pairs.len())
            }
        }
    }
}

impl<L: JumpOffset> Serialize for Instruction<L> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        if let Instruction::WideLocal(..) | Instruction::WideIInc { .. } = self {
            Opcode::Wide.byte().serialize(writer)?;
        }
        self.opcode().byte().serialize(writer)?;
        match self {
            Instruction::Simple(_) => (),
            Instruction::Local(_, index) => index.serialize(writer)?,
            Instruction::WideLocal(_, index) => index.serialize(writer)?,
            Instruction::IInc { index, delta } => {
                index.serialize(writer)?;
                delta.serialize(writer)?;
            }
            Instruction::WideIInc { index, delta } => {
                index.serialize(writer)?;
                delta.serialize(writer)?;
            }
            Instruction::BiPush(value) => value.serialize(writer)?,
            Instruction::SiPush(value) => value.serialize(writer)?,
            Instruction::NewArray(array_type) => array_type.serialize(writer)?,
            Instruction::Ldc(index) => index.serialize(writer)?,
            Instruction::Constant(_, index) => index.serialize(writer)?,
            Instruction::InvokeInterface { method, count } => {
                method.serialize(writer)?;
                count.serialize(writer)?;
                0u8.serialize(writer)?;
            }
            Instruction::InvokeDynamic(call_site) => {
                call_site.serialize(writer)?;
                0u16.serialize(writer)?;
            }
            Instruction::MultiANewArray { class, dimensions } => {
                class.serialize(writer)?;
                dimensions.serialize(writer)?;
            }
            Instruction::Branch(opcode, label) => {
                let offset = i16::try_from(label.jump_offset()).map_err(|_| {
                    let msg = format!(
                        "{} offset {} does not fit in 16 bits",
                        opcode.mnemonic(),
                        label.jump_offset()
                    );
                    std::io::Error::new(ErrorKind::InvalidData, msg)
                })?;
                offset.serialize(writer)?;
            }
            Instruction::WideBranch(_, label) => label.jump_offset().serialize(writer)?,
            Instruction::TableSwitch {
                padding,
                default,
                low,
                targets,
            } => {
                for _ in 0..*padding {
                    0u8.serialize(writer)?;
                }
                default.jump_offset().serialize(writer)?;
                low.serialize(writer)?;
                let high = switch_high(*low, targets.len()).ok_or_else(|| {
                    let msg = format!(
                        "tableswitch from {} with {} targets has no valid high bound",
                        low,
                        targets.len()
                    );
                    std::io::Error::new(ErrorKind::InvalidData, msg)
                })?;
                high.serialize(writer)?;
                for target in targets {
                    target.jump_offset().serialize(writer)?;
                }
            }
            Instruction::LookupSwitch {
                padding,
                default,
                pairs,
            } => {
                for _ in 0..*padding {
                    0u8.serialize(writer)?;
                }
                default.jump_offset().serialize(writer)?;
                (pairs.len() as i32).serialize(writer)?;
                for (key, target) in pairs {
                    key.serialize(writer)?;
                    target.jump_offset().serialize(writer)?;
                }
            }
        }
        Ok(())
    }
}

/// Last key of a `tableswitch` covering `count` keys from `low` (there must be at least one)
fn switch_high(low: i32, count: usize) -> Option<i32> {
    let last = i32::try_from(count.checked_sub(1)?).ok()?;
    low.checked_add(last)
}
