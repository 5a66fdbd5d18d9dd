use super::class_file::ConstantPoolOverflow;
use super::code::InsnId;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Class file does not start with `0xCAFEBABE`
    BadMagic(u32),

    ConstantPoolOverflow(ConstantPoolOverflow),
    UnknownConstantTag {
        tag: u8,
        index: u16,
    },
    UnknownHandleKind(u8),

    /// Index `0`, past the end of the pool, or the unusable slot after a `Long`/`Double`
    ConstantIndexOutOfRange(u16),
    UnexpectedConstant {
        index: u16,
        expected: &'static str,
    },

    UnknownAccessFlags(u16),
    UnknownAttribute(String),
    AttributeLengthMismatch {
        name: String,
        declared: u32,
        actual: u32,
    },
    BadDescriptor(String),

    UnknownOpcode {
        opcode: u8,
        bci: u32,
    },
    UnknownWideOpcode {
        opcode: u8,
        bci: u32,
    },

    /// `tableswitch` whose `high` is below its `low`
    MalformedSwitch {
        bci: u32,
    },

    /// A branch, table entry, or frame points in the middle of (or past) the code
    NoInstructionAtBci(i64),
    UnknownVerificationType(u8),
    UnknownStackMapFrameType(u8),

    /// Two stack map frames would end up describing the same instruction
    ConflictingFrames(InsnId),

    /// Removing an instruction would leave a reference with nothing to point to
    DanglingReference(InsnId),

    /// An oversized conditional branch has no place for a trampoline
    UnrelaxableBranch(InsnId),

    /// Method code ends up longer than the 65535 bytes allowed
    MethodCodeOverflow(usize),

    /// Instruction was expected to be an `invoke*`
    NotAnInvoke(InsnId),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic(magic) => write!(f, "bad class file magic 0x{:08X}", magic),
            Error::ConstantPoolOverflow(ConstantPoolOverflow::Full { offset, .. }) => write!(
                f,
                "constant pool is full (next index would be {})",
                offset
            ),
            Error::ConstantPoolOverflow(ConstantPoolOverflow::Utf8TooLong(len)) => {
                write!(f, "utf8 constant of {} bytes does not fit in a class file", len)
            }
            Error::UnknownConstantTag { tag, index } => {
                write!(f, "unknown constant tag {} at index {}", tag, index)
            }
            Error::UnknownHandleKind(kind) => write!(f, "unknown method handle kind {}", kind),
            Error::ConstantIndexOutOfRange(index) => {
                write!(f, "constant index {} is out of range", index)
            }
            Error::UnexpectedConstant { index, expected } => {
                write!(f, "constant {} is not a {}", index, expected)
            }
            Error::UnknownAccessFlags(bits) => write!(f, "unknown access flags 0x{:04X}", bits),
            Error::UnknownAttribute(name) => write!(f, "unknown attribute '{}'", name),
            Error::AttributeLengthMismatch {
                name,
                declared,
                actual,
            } => write!(
                f,
                "attribute '{}' declares {} bytes but contains {}",
                name, declared, actual
            ),
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::UnknownOpcode { opcode, bci } => {
                write!(f, "unknown opcode 0x{:02X} at bci {}", opcode, bci)
            }
            Error::UnknownWideOpcode { opcode, bci } => {
                write!(f, "opcode 0x{:02X} cannot follow `wide` at bci {}", opcode, bci)
            }
            Error::MalformedSwitch { bci } => write!(f, "malformed tableswitch at bci {}", bci),
            Error::NoInstructionAtBci(bci) => write!(f, "no instruction starts at bci {}", bci),
            Error::UnknownVerificationType(tag) => {
                write!(f, "unknown verification type tag {}", tag)
            }
            Error::UnknownStackMapFrameType(tag) => {
                write!(f, "unknown stack map frame type {}", tag)
            }
            Error::ConflictingFrames(insn) => {
                write!(f, "two stack map frames would describe {:?}", insn)
            }
            Error::DanglingReference(insn) => {
                write!(f, "{:?} is still referenced and has no successor", insn)
            }
            Error::UnrelaxableBranch(insn) => {
                write!(f, "no room for a trampoline for the branch at {:?}", insn)
            }
            Error::MethodCodeOverflow(len) => {
                write!(f, "method code is {} bytes long (limit is 65535)", len)
            }
            Error::NotAnInvoke(insn) => write!(f, "{:?} is not a method invocation", insn),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow(overflow)
    }
}
