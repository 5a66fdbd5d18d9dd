use super::{CodeBody, InsnId, Instruction, Jump, Opcode};
use crate::jvm::class_file::{ConstantIndex, ConstantPool};
use crate::jvm::Error;

/// Cursor for splicing new instructions into a code body
///
/// Each insertion goes right after the previous one, so a sequence of calls lays the instructions
/// out in call order. Helpers that need constants get or create them in the pool, which means
/// running the same injection twice does not grow the pool.
///
/// Nothing here touches `max_stack`, frames, or offsets: callers are expected to adjust
/// `max_stack` themselves and to `relax` the code before writing it out.
pub struct InstructionInserter<'a> {
    code: &'a mut CodeBody,
    constants: &'a mut ConstantPool,

    /// Position in the layout order where the next instruction goes
    position: usize,
}

impl<'a> InstructionInserter<'a> {
    /// Insert at the very start of the method
    ///
    /// Jumps to the old first instruction (eg. a loop header) are not redirected, so the inserted
    /// code runs exactly once per call.
    pub fn at_start(
        code: &'a mut CodeBody,
        constants: &'a mut ConstantPool,
    ) -> InstructionInserter<'a> {
        InstructionInserter {
            code,
            constants,
            position: 0,
        }
    }

    /// Insert after the last instruction
    pub fn at_end(
        code: &'a mut CodeBody,
        constants: &'a mut ConstantPool,
    ) -> InstructionInserter<'a> {
        let position = code.len();
        InstructionInserter {
            code,
            constants,
            position,
        }
    }

    /// Insert right before `anchor` (references to `anchor` still point at `anchor`)
    pub fn before(
        code: &'a mut CodeBody,
        constants: &'a mut ConstantPool,
        anchor: InsnId,
    ) -> InstructionInserter<'a> {
        let position = Self::position_of(code, anchor);
        InstructionInserter {
            code,
            constants,
            position,
        }
    }

    /// Insert right after `anchor`
    pub fn after(
        code: &'a mut CodeBody,
        constants: &'a mut ConstantPool,
        anchor: InsnId,
    ) -> InstructionInserter<'a> {
        let position = Self::position_of(code, anchor) + 1;
        InstructionInserter {
            code,
            constants,
            position,
        }
    }

    fn position_of(code: &CodeBody, anchor: InsnId) -> usize {
        match code.position(anchor) {
            Some(position) => position,
            None => panic!("stale instruction handle {:?}", anchor),
        }
    }

    /// Insert any instruction
    pub fn push(&mut self, instruction: Instruction) -> InsnId {
        let id = self.code.insert(self.position, instruction);
        self.position += 1;
        id
    }

    /// Load a reference from a local, using the shortest encoding
    pub fn aload(&mut self, index: u16) -> InsnId {
        let instruction = match index {
            0 => Instruction::Simple(Opcode::ALoad0),
            1 => Instruction::Simple(Opcode::ALoad1),
            2 => Instruction::Simple(Opcode::ALoad2),
            3 => Instruction::Simple(Opcode::ALoad3),
            _ => match u8::try_from(index) {
                Ok(index) => Instruction::Local(Opcode::ALoad, index),
                Err(_) => Instruction::WideLocal(Opcode::ALoad, index),
            },
        };
        self.push(instruction)
    }

    /// Push an integer constant, using the shortest encoding
    pub fn iconst(&mut self, value: i32) -> Result<InsnId, Error> {
        let instruction = match value {
            -1 => Instruction::Simple(Opcode::IConstM1),
            0 => Instruction::Simple(Opcode::IConst0),
            1 => Instruction::Simple(Opcode::IConst1),
            2 => Instruction::Simple(Opcode::IConst2),
            3 => Instruction::Simple(Opcode::IConst3),
            4 => Instruction::Simple(Opcode::IConst4),
            5 => Instruction::Simple(Opcode::IConst5),
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    Instruction::BiPush(byte)
                } else if let Ok(short) = i16::try_from(value) {
                    Instruction::SiPush(short)
                } else {
                    let index = self.constants.get_or_create_integer(value)?;
                    return Ok(self.ldc(index));
                }
            }
        };
        Ok(self.push(instruction))
    }

    pub fn sipush(&mut self, value: i16) -> InsnId {
        self.push(Instruction::SiPush(value))
    }

    pub fn dup(&mut self) -> InsnId {
        self.push(Instruction::Simple(Opcode::Dup))
    }

    pub fn pop(&mut self) -> InsnId {
        self.push(Instruction::Simple(Opcode::Pop))
    }

    pub fn nop(&mut self) -> InsnId {
        self.push(Instruction::Simple(Opcode::Nop))
    }

    /// `return` from a `void` method
    pub fn return_void(&mut self) -> InsnId {
        self.push(Instruction::Simple(Opcode::Return))
    }

    /// Cast the reference on top of the stack to a class (by internal name, eg. `java/lang/String`)
    pub fn checkcast(&mut self, class: &str) -> Result<InsnId, Error> {
        let class = self.constants.get_or_create_class_named(class)?;
        Ok(self.push(Instruction::Constant(Opcode::CheckCast, class.0)))
    }

    pub fn getstatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<InsnId, Error> {
        let field = self
            .constants
            .get_or_create_fieldref_named(class, name, descriptor)?;
        Ok(self.push(Instruction::Constant(Opcode::GetStatic, field.0)))
    }

    pub fn putstatic(&mut self, class: &str, name: &str, descriptor: &str) -> Result<InsnId, Error> {
        let field = self
            .constants
            .get_or_create_fieldref_named(class, name, descriptor)?;
        Ok(self.push(Instruction::Constant(Opcode::PutStatic, field.0)))
    }

    pub fn invokestatic(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<InsnId, Error> {
        let method = self
            .constants
            .get_or_create_methodref_named(class, name, descriptor)?;
        Ok(self.push(Instruction::Constant(Opcode::InvokeStatic, method.0)))
    }

    pub fn invokevirtual(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<InsnId, Error> {
        let method = self
            .constants
            .get_or_create_methodref_named(class, name, descriptor)?;
        Ok(self.push(Instruction::Constant(Opcode::InvokeVirtual, method.0)))
    }

    /// Load a constant, using `ldc` when the index fits in a byte and `ldc_w` otherwise
    pub fn ldc(&mut self, index: ConstantIndex) -> InsnId {
        let instruction = match u8::try_from(index.0) {
            Ok(narrow) => Instruction::Ldc(narrow),
            Err(_) => Instruction::Constant(Opcode::LdcW, index),
        };
        self.push(instruction)
    }

    /// Load a string literal
    pub fn ldc_string(&mut self, string: &str) -> Result<InsnId, Error> {
        let string = self.constants.get_or_create_string_literal(string)?;
        Ok(self.ldc(string.0))
    }

    pub fn goto_w(&mut self, target: InsnId) -> InsnId {
        self.push(Instruction::WideBranch(Opcode::GotoW, Jump::to(target)))
    }

    pub fn ifeq(&mut self, target: InsnId) -> InsnId {
        self.push(Instruction::Branch(Opcode::IfEq, Jump::to(target)))
    }

    /// Load the name then the descriptor of the method called by `invoke`, as two strings
    pub fn method_name_and_descriptor_ldc(&mut self, invoke: InsnId) -> Result<(), Error> {
        let member = self.invoked_member(invoke)?;
        let (_, name_and_type) = self.constants.member_ref(member)?;
        let (name, descriptor) = self.constants.name_and_type(name_and_type)?;
        let name = self.constants.get_or_create_string(name)?;
        let descriptor = self.constants.get_or_create_string(descriptor)?;
        self.ldc(name.0);
        self.ldc(descriptor.0);
        Ok(())
    }

    /// Cast the reference on top of the stack to the class declaring the method `invoke` calls
    pub fn original_type_checkcast(&mut self, invoke: InsnId) -> Result<InsnId, Error> {
        let member = self.invoked_member(invoke)?;
        let (class, _) = self.constants.member_ref(member)?;
        Ok(self.push(Instruction::Constant(Opcode::CheckCast, class.0)))
    }

    fn invoked_member(&self, invoke: InsnId) -> Result<ConstantIndex, Error> {
        match self.code.get(invoke) {
            Instruction::Constant(
                Opcode::InvokeVirtual | Opcode::InvokeSpecial | Opcode::InvokeStatic,
                member,
            )
            | Instruction::InvokeInterface { method: member, .. } => Ok(*member),
            _ => Err(Error::NotAnInvoke(invoke)),
        }
    }
}
