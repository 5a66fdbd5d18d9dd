use super::{switch_padding, InsnId, Instruction, Opcode, OperandFormat};
use crate::jvm::class_file::{read_bytes, ConstantIndex, Deserialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetResult, OffsetVec};
use std::io::Cursor;

/// Decode raw method code into instructions, keyed by their bci
///
/// Jumps are left as relative offsets: they can only be resolved once every instruction has been
/// decoded (switches in particular tend to jump forward).
pub fn decode(code: &[u8]) -> Result<OffsetVec<Instruction<i32>>, Error> {
    let mut instructions = OffsetVec::new();
    let mut reader = Cursor::new(code);
    while (reader.position() as usize) < code.len() {
        let bci = reader.position() as u32;
        let instruction = decode_instruction(&mut reader, bci)?;
        let offset = instructions.push(instruction);
        debug_assert_eq!(offset.0, bci as usize);
    }
    Ok(instructions)
}

fn decode_instruction(reader: &mut Cursor<&[u8]>, bci: u32) -> Result<Instruction<i32>, Error> {
    let byte = u8::deserialize(reader)?;
    let opcode = Opcode::from_byte(byte).ok_or(Error::UnknownOpcode { opcode: byte, bci })?;

    let instruction = match opcode.format() {
        OperandFormat::NoOperands => Instruction::Simple(opcode),
        OperandFormat::LocalIndex => Instruction::Local(opcode, u8::deserialize(reader)?),
        OperandFormat::IInc => Instruction::IInc {
            index: u8::deserialize(reader)?,
            delta: i8::deserialize(reader)?,
        },
        OperandFormat::SignedByte => Instruction::BiPush(i8::deserialize(reader)?),
        OperandFormat::SignedShort => Instruction::SiPush(i16::deserialize(reader)?),
        OperandFormat::ArrayType => Instruction::NewArray(u8::deserialize(reader)?),
        OperandFormat::Ldc => Instruction::Ldc(u8::deserialize(reader)?),
        OperandFormat::ConstantIndex => {
            Instruction::Constant(opcode, ConstantIndex::deserialize(reader)?)
        }
        OperandFormat::InvokeInterface => {
            let method = ConstantIndex::deserialize(reader)?;
            let count = u8::deserialize(reader)?;
            let _zero = u8::deserialize(reader)?;
            Instruction::InvokeInterface { method, count }
        }
        OperandFormat::InvokeDynamic => {
            let call_site = ConstantIndex::deserialize(reader)?;
            let _zero = u16::deserialize(reader)?;
            Instruction::InvokeDynamic(call_site)
        }
        OperandFormat::MultiANewArray => Instruction::MultiANewArray {
            class: ConstantIndex::deserialize(reader)?,
            dimensions: u8::deserialize(reader)?,
        },
        OperandFormat::Branch => Instruction::Branch(opcode, i16::deserialize(reader)? as i32),
        OperandFormat::WideBranch => Instruction::WideBranch(opcode, i32::deserialize(reader)?),
        OperandFormat::TableSwitch => {
            let padding = switch_padding(bci);
            read_bytes(reader, padding as usize)?;
            let default = i32::deserialize(reader)?;
            let low = i32::deserialize(reader)?;
            let high = i32::deserialize(reader)?;
            if high < low {
                return Err(Error::MalformedSwitch { bci });
            }
            let mut targets = vec![];
            for _ in low..=high {
                targets.push(i32::deserialize(reader)?);
            }
            Instruction::TableSwitch {
                padding,
                default,
                low,
                targets,
            }
        }
        OperandFormat::LookupSwitch => {
            let padding = switch_padding(bci);
            read_bytes(reader, padding as usize)?;
            let default = i32::deserialize(reader)?;
            let npairs = i32::deserialize(reader)?;
            if npairs < 0 {
                return Err(Error::MalformedSwitch { bci });
            }
            let mut pairs = vec![];
            for _ in 0..npairs {
                let key = i32::deserialize(reader)?;
                pairs.push((key, i32::deserialize(reader)?));
            }
            Instruction::LookupSwitch {
                padding,
                default,
                pairs,
            }
        }
        OperandFormat::Wide => {
            let byte = u8::deserialize(reader)?;
            match Opcode::from_byte(byte) {
                Some(widened) if widened.format() == OperandFormat::LocalIndex => {
                    Instruction::WideLocal(widened, u16::deserialize(reader)?)
                }
                Some(widened) if widened.format() == OperandFormat::IInc => {
                    Instruction::WideIInc {
                        index: u16::deserialize(reader)?,
                        delta: i16::deserialize(reader)?,
                    }
                }
                _ => return Err(Error::UnknownWideOpcode { opcode: byte, bci }),
            }
        }
    };
    Ok(instruction)
}

/// Lookup from bci to the instruction starting there, for resolving decoded offsets
///
/// Instruction handles are assigned in decoding order, so the `n`-th decoded instruction is
/// `InsnId(n)`.
pub(super) struct BciIndex<'a> {
    instructions: &'a OffsetVec<Instruction<i32>>,
}

impl<'a> BciIndex<'a> {
    pub fn new(instructions: &'a OffsetVec<Instruction<i32>>) -> BciIndex<'a> {
        BciIndex { instructions }
    }

    /// Instruction starting exactly at `bci`
    pub fn at(&self, bci: i64) -> Result<InsnId, Error> {
        if bci < 0 {
            return Err(Error::NoInstructionAtBci(bci));
        }
        match self.instructions.get_offset(Offset(bci as usize)) {
            OffsetResult::Ok(idx, _) => Ok(InsnId(idx)),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => {
                Err(Error::NoInstructionAtBci(bci))
            }
        }
    }

    /// Like `at`, but the end of the code maps to `None` (used for exclusive range ends)
    pub fn at_or_end(&self, bci: i64) -> Result<Option<InsnId>, Error> {
        if bci == self.instructions.offset_len().0 as i64 {
            Ok(None)
        } else {
            self.at(bci).map(Some)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decoded(code: &[u8]) -> Vec<(usize, Instruction<i32>)> {
        decode(code)
            .unwrap()
            .into_iter()
            .map(|(offset, _, insn)| (offset.0, insn))
            .collect()
    }

    #[test]
    fn assigns_bcis_before_the_opcode() {
        let code = [0x03, 0x3c, 0x84, 0x01, 0x01, 0x1b, 0x10, 0x0a, 0xa1, 0xff, 0xf9, 0xb1];
        assert_eq!(
            decoded(&code),
            vec![
                (0, Instruction::Simple(Opcode::IConst0)),
                (1, Instruction::Simple(Opcode::IStore1)),
                (2, Instruction::IInc { index: 1, delta: 1 }),
                (5, Instruction::Simple(Opcode::ILoad1)),
                (6, Instruction::BiPush(10)),
                (8, Instruction::Branch(Opcode::IfICmpLt, -7)),
                (11, Instruction::Simple(Opcode::Return)),
            ]
        );
    }

    #[test]
    fn wide_prefix() {
        let code = [0xc4, 0x19, 0x01, 0x00, 0xc4, 0x84, 0x01, 0x00, 0xff, 0x9c, 0xb1];
        assert_eq!(
            decoded(&code),
            vec![
                (0, Instruction::WideLocal(Opcode::ALoad, 256)),
                (
                    4,
                    Instruction::WideIInc {
                        index: 256,
                        delta: -100
                    }
                ),
                (10, Instruction::Simple(Opcode::Return)),
            ]
        );

        assert!(matches!(
            decode(&[0xc4, 0x60, 0x00, 0x01]),
            Err(Error::UnknownWideOpcode {
                opcode: 0x60,
                bci: 0
            })
        ));
    }

    #[test]
    fn switch_padding_is_skipped() {
        #[rustfmt::skip]
        let code = [
            0x1a,                   // iload_0
            0xaa, 0x00, 0x00,       // tableswitch + 2 bytes of padding
            0, 0, 0, 24,            // default
            0, 0, 0, 1,             // low
            0, 0, 0, 2,             // high
            0, 0, 0, 23, 0, 0, 0, 23,
            0xb1,                   // return
            0xb1,                   // return
        ];
        let insns = decoded(&code);
        assert_eq!(
            insns[1],
            (
                1,
                Instruction::TableSwitch {
                    padding: 2,
                    default: 24,
                    low: 1,
                    targets: vec![23, 23],
                }
            )
        );
        assert_eq!(insns[2].0, 24);
        assert_eq!(insns[3].0, 25);
    }

    #[test]
    fn malformed_code() {
        assert!(matches!(
            decode(&[0x00, 0xca]),
            Err(Error::UnknownOpcode {
                opcode: 0xca,
                bci: 1
            })
        ));
        assert!(matches!(decode(&[0x11, 0x00]), Err(Error::IoError(_))));
    }

    #[test]
    fn bci_index() {
        let instructions = decode(&[0x00, 0x11, 0x00, 0x01, 0xb1]).unwrap();
        let index = BciIndex::new(&instructions);
        assert_eq!(index.at(1).unwrap(), InsnId(1));
        assert_eq!(index.at(4).unwrap(), InsnId(2));
        assert!(matches!(index.at(2), Err(Error::NoInstructionAtBci(2))));
        assert!(matches!(index.at(5), Err(Error::NoInstructionAtBci(5))));
        assert!(matches!(index.at(-1), Err(Error::NoInstructionAtBci(-1))));
        assert_eq!(index.at_or_end(5).unwrap(), None);
        assert_eq!(index.at_or_end(0).unwrap(), Some(InsnId(0)));
    }
}
