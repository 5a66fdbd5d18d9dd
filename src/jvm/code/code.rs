use super::{
    decode, switch_padding, BciIndex, ExceptionHandler, InsnId, Instruction, Jump,
    LineNumberTable, LocalVariableTable, MethodContext, StackMapTable, VerificationType,
};
use crate::jvm::class_file::{
    check_attribute_length, read_bytes, ConstantPool, Deserialize, Serialize, Utf8ConstantIndex,
};
use crate::jvm::Error;
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

#[derive(Debug, Clone)]
struct Slot {
    instruction: Instruction,

    /// Offset from the start of the code, as of the last `sync`
    bci: u32,
}

/// Semantic representation of a method body (the `Code` attribute)
///
/// Instructions live in an arena and are addressed by [`InsnId`]. The order in which they are
/// laid out is kept separately, so inserting an instruction never invalidates a handle. Every
/// reference to code (jumps, exception ranges, line numbers, local variable ranges, stack map
/// frames, uninitialized types) is a handle, and the byte offsets stored alongside some of them
/// are recomputed by [`CodeBody::sync`].
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone)]
pub struct CodeBody {
    /// Index of the `Code` name in the constant pool
    pub name_index: Utf8ConstantIndex,

    /// Maximum size of stack through the method
    pub max_stack: u16,

    /// Maximum size of locals through the method
    pub max_locals: u16,

    /// Arena of instructions (removed instructions leave a `None` behind)
    slots: Vec<Option<Slot>>,

    /// Layout order of the instructions in `slots`
    order: Vec<InsnId>,

    /// Length of the code, as of the last `sync`
    code_length: u32,

    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeAttribute>,

    /// Method owning this code, needed to expand stack map frames
    pub method: Option<MethodContext>,
}

impl CodeBody {
    /// Empty code body
    pub fn new(name_index: Utf8ConstantIndex, max_stack: u16, max_locals: u16) -> CodeBody {
        CodeBody {
            name_index,
            max_stack,
            max_locals,
            slots: vec![],
            order: vec![],
            code_length: 0,
            exception_table: vec![],
            attributes: vec![],
            method: None,
        }
    }

    /// Read the contents of a `Code` attribute (everything after the attribute length)
    ///
    /// Decoding happens in two passes: first all instructions are decoded with their relative
    /// offsets, then those offsets (and the bcis in the exception table and code attributes) are
    /// resolved into instruction handles.
    pub fn read<R: ReadBytesExt>(
        reader: &mut R,
        name_index: Utf8ConstantIndex,
        constants: &ConstantPool,
        method: Option<MethodContext>,
    ) -> Result<CodeBody, Error> {
        let max_stack = u16::deserialize(reader)?;
        let max_locals = u16::deserialize(reader)?;
        let code_length = u32::deserialize(reader)?;
        let code = read_bytes(reader, code_length as usize)?;

        let decoded = decode(&code)?;
        let index = BciIndex::new(&decoded);
        let mut slots = Vec::with_capacity(decoded.len());
        for (offset, _, instruction) in &decoded {
            let bci = offset.0 as i64;
            let instruction = instruction.map_labels(|relative: &i32| -> Result<Jump, Error> {
                let target = index.at(bci + *relative as i64)?;
                Ok(Jump {
                    target,
                    offset: *relative,
                })
            })?;
            slots.push(Some(Slot {
                instruction,
                bci: offset.0 as u32,
            }));
        }
        let order = (0..slots.len()).map(InsnId).collect();

        let exception_table_len = u16::deserialize(reader)?;
        let mut exception_table = Vec::with_capacity(exception_table_len as usize);
        for _ in 0..exception_table_len {
            exception_table.push(ExceptionHandler::read(reader, &index)?);
        }

        let attributes_len = u16::deserialize(reader)?;
        let mut attributes = Vec::with_capacity(attributes_len as usize);
        for _ in 0..attributes_len {
            attributes.push(CodeAttribute::read(reader, constants, &index)?);
        }

        log::trace!(
            "decoded {} instructions ({} bytes, {} exception handlers)",
            slots.len(),
            code_length,
            exception_table.len()
        );

        Ok(CodeBody {
            name_index,
            max_stack,
            max_locals,
            slots,
            order,
            code_length,
            exception_table,
            attributes,
            method,
        })
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Instructions, in layout order
    pub fn instructions(&self) -> impl Iterator<Item = (InsnId, &Instruction)> + '_ {
        self.order.iter().map(move |id| (*id, &self.slot(*id).instruction))
    }

    /// Handles of all instructions, in layout order
    pub fn ids(&self) -> &[InsnId] {
        &self.order
    }

    /// Is the handle one of the instructions currently in the body?
    pub fn contains(&self, id: InsnId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    fn slot(&self, id: InsnId) -> &Slot {
        match self.slots.get(id.0) {
            Some(Some(slot)) => slot,
            _ => panic!("stale instruction handle {:?}", id),
        }
    }

    fn slot_mut(&mut self, id: InsnId) -> &mut Slot {
        match self.slots.get_mut(id.0) {
            Some(Some(slot)) => slot,
            _ => panic!("stale instruction handle {:?}", id),
        }
    }

    /// Look up an instruction
    ///
    /// Panics if the instruction has been removed.
    pub fn get(&self, id: InsnId) -> &Instruction {
        &self.slot(id).instruction
    }

    /// Look up an instruction for modification
    ///
    /// Replacing an instruction in place keeps every reference to it valid. Panics if the
    /// instruction has been removed.
    pub fn get_mut(&mut self, id: InsnId) -> &mut Instruction {
        &mut self.slot_mut(id).instruction
    }

    /// Bci of the instruction, as of the last `sync`
    pub fn bci(&self, id: InsnId) -> u32 {
        self.slot(id).bci
    }

    /// Bci of an exclusive range end (`None` is the end of the code)
    pub fn end_bci(&self, end: Option<InsnId>) -> u32 {
        match end {
            None => self.code_length,
            Some(id) => self.bci(id),
        }
    }

    /// Length of the code in bytes, as of the last `sync`
    pub fn code_length(&self) -> u32 {
        self.code_length
    }

    /// Position of an instruction in the layout order
    pub fn position(&self, id: InsnId) -> Option<usize> {
        self.order.iter().position(|other| *other == id)
    }

    fn expect_position(&self, id: InsnId) -> usize {
        match self.position(id) {
            Some(position) => position,
            None => panic!("stale instruction handle {:?}", id),
        }
    }

    /// Instruction laid out right after this one
    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        self.order.get(self.expect_position(id) + 1).copied()
    }

    pub fn first(&self) -> Option<InsnId> {
        self.order.first().copied()
    }

    /// Splice an instruction in at a position of the layout order
    ///
    /// Nothing gets renumbered until the next `sync`: until then, the new instruction reports the
    /// bci of whatever it got inserted in front of. Panics if `position > len`.
    pub fn insert(&mut self, position: usize, instruction: Instruction) -> InsnId {
        let id = InsnId(self.slots.len());
        let bci = match self.order.get(position) {
            Some(displaced) => self.bci(*displaced),
            None => self.code_length,
        };
        self.slots.push(Some(Slot { instruction, bci }));
        self.order.insert(position, id);
        id
    }

    /// Add an instruction at the end of the code
    pub fn push(&mut self, instruction: Instruction) -> InsnId {
        self.insert(self.order.len(), instruction)
    }

    /// Insert an instruction right before another one
    ///
    /// References to `anchor` are left alone, so jumps to `anchor` skip the new instruction.
    pub fn insert_before(&mut self, anchor: InsnId, instruction: Instruction) -> InsnId {
        let position = self.expect_position(anchor);
        self.insert(position, instruction)
    }

    /// Insert an instruction right after another one
    pub fn insert_after(&mut self, anchor: InsnId, instruction: Instruction) -> InsnId {
        let position = self.expect_position(anchor);
        self.insert(position + 1, instruction)
    }

    /// Redirect every reference to `old` so that it points to `new` instead
    ///
    /// This covers jump and switch targets, exception ranges and handlers, line numbers, local
    /// variable ranges, stack map frames, and uninitialized types in stack map frames.
    pub fn replace_targets(&mut self, old: InsnId, new: InsnId) {
        let redirect = |id: &mut InsnId| {
            if *id == old {
                *id = new;
            }
        };
        let redirect_end = |end: &mut Option<InsnId>| {
            if *end == Some(old) {
                *end = Some(new);
            }
        };

        for slot in self.slots.iter_mut().flatten() {
            for label in slot.instruction.labels_mut() {
                redirect(&mut label.target);
            }
        }
        for handler in &mut self.exception_table {
            redirect(&mut handler.start);
            redirect_end(&mut handler.end);
            redirect(&mut handler.handler);
        }
        for attribute in &mut self.attributes {
            match attribute {
                CodeAttribute::LineNumberTable(_, table) => {
                    for entry in &mut table.0 {
                        redirect(&mut entry.start);
                    }
                }
                CodeAttribute::LocalVariableTable(_, table)
                | CodeAttribute::LocalVariableTypeTable(_, table) => {
                    for entry in &mut table.0 {
                        redirect(&mut entry.start);
                        redirect_end(&mut entry.end);
                    }
                }
                CodeAttribute::StackMapTable(_, table) => {
                    for frame in &mut table.frames {
                        redirect(&mut frame.target);
                        for typ in frame.kind.verification_types_mut() {
                            if let VerificationType::Uninitialized(new_insn) = typ {
                                redirect(new_insn);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Is the instruction referenced as anything other than an exclusive range end?
    fn has_non_end_references(&self, id: InsnId) -> bool {
        let in_code = self
            .slots
            .iter()
            .flatten()
            .any(|slot| slot.instruction.labels().iter().any(|jump| jump.target == id));
        let in_handlers = self
            .exception_table
            .iter()
            .any(|handler| handler.start == id || handler.handler == id);
        let in_attributes = self.attributes.iter().any(|attribute| match attribute {
            CodeAttribute::LineNumberTable(_, table) => {
                table.0.iter().any(|entry| entry.start == id)
            }
            CodeAttribute::LocalVariableTable(_, table)
            | CodeAttribute::LocalVariableTypeTable(_, table) => {
                table.0.iter().any(|entry| entry.start == id)
            }
            CodeAttribute::StackMapTable(_, table) => table.frames.iter().any(|frame| {
                frame.target == id
                    || frame
                        .kind
                        .verification_types()
                        .iter()
                        .any(|typ| **typ == VerificationType::Uninitialized(id))
            }),
        });
        in_code || in_handlers || in_attributes
    }

    /// Remove an instruction, redirecting references to it onto the instruction after it
    ///
    /// When the last instruction is removed, range ends pointing at it become the end of the code,
    /// and any other reference to it is an `Error::DanglingReference`. If both the instruction and
    /// its successor are described by stack map frames, the removal is an
    /// `Error::ConflictingFrames`. Exception ranges left empty are dropped.
    pub fn remove(&mut self, id: InsnId) -> Result<Instruction, Error> {
        let position = self.expect_position(id);
        let successor = self.order.get(position + 1).copied();

        match successor {
            Some(next) => {
                if let Some(table) = self.stack_map_table() {
                    if table.frame_at(id).is_some() && table.frame_at(next).is_some() {
                        return Err(Error::ConflictingFrames(next));
                    }
                }
                self.replace_targets(id, next);
            }
            None => {
                let ends_before_self = |end: &Option<InsnId>| *end == Some(id);
                if self.has_non_end_references(id) {
                    return Err(Error::DanglingReference(id));
                }
                for handler in &mut self.exception_table {
                    if ends_before_self(&handler.end) {
                        handler.end = None;
                    }
                }
                for attribute in &mut self.attributes {
                    if let CodeAttribute::LocalVariableTable(_, table)
                    | CodeAttribute::LocalVariableTypeTable(_, table) = attribute
                    {
                        for entry in &mut table.0 {
                            if ends_before_self(&entry.end) {
                                entry.end = None;
                            }
                        }
                    }
                }
            }
        }

        self.exception_table.retain(|handler| {
            let empty = handler.end == Some(handler.start);
            if empty {
                log::debug!(
                    "dropping exception handler range emptied by removing {:?}",
                    id
                );
            }
            !empty
        });

        self.order.remove(position);
        match self.slots[id.0].take() {
            Some(slot) => Ok(slot.instruction),
            None => panic!("stale instruction handle {:?}", id),
        }
    }

    /// Recompute bcis, jump offsets, switch padding, and stack map frame deltas
    ///
    /// This must run after any mutation and before serializing or reading offsets. It never
    /// changes the size of an instruction other than through switch padding, so a jump whose
    /// offset no longer fits its encoding is left for [`CodeBody::fix_offsets`].
    pub fn sync(&mut self) -> Result<(), Error> {
        // Assign bcis (and padding, which depends on the bci)
        let mut bci: u32 = 0;
        for id in &self.order {
            let slot = match self.slots.get_mut(id.0) {
                Some(Some(slot)) => slot,
                _ => panic!("stale instruction handle {:?}", id),
            };
            slot.bci = bci;
            if let Instruction::TableSwitch { padding, .. }
            | Instruction::LookupSwitch { padding, .. } = &mut slot.instruction
            {
                *padding = switch_padding(bci);
            }
            bci += slot.instruction.width() as u32;
        }
        self.code_length = bci;

        // Recompute jump offsets relative to the start of the jumping instruction
        let bcis: Vec<Option<u32>> = self
            .slots
            .iter()
            .map(|slot| slot.as_ref().map(|slot| slot.bci))
            .collect();
        let bci_of = |id: InsnId| -> u32 {
            match bcis.get(id.0) {
                Some(Some(bci)) => *bci,
                _ => panic!("reference to removed instruction {:?}", id),
            }
        };
        for slot in self.slots.iter_mut().flatten() {
            let from = slot.bci as i64;
            for jump in slot.instruction.labels_mut() {
                jump.offset = (bci_of(jump.target) as i64 - from) as i32;
            }
        }

        if let Some(table) = self.stack_map_table_mut() {
            table.sync_offsets(bci_of)?;
        }
        Ok(())
    }

    /// Stack map table attribute, if there is one
    pub fn stack_map_table(&self) -> Option<&StackMapTable> {
        self.attributes.iter().find_map(|attribute| match attribute {
            CodeAttribute::StackMapTable(_, table) => Some(table),
            _ => None,
        })
    }

    pub fn stack_map_table_mut(&mut self) -> Option<&mut StackMapTable> {
        self.attributes.iter_mut().find_map(|attribute| match attribute {
            CodeAttribute::StackMapTable(_, table) => Some(table),
            _ => None,
        })
    }

    /// Number of bytes `serialize` will emit (including the 6 byte attribute header)
    pub fn byte_size(&self) -> usize {
        6 + 8
            + self.encoded_code_length()
            + 2
            + ExceptionHandler::BYTE_SIZE * self.exception_table.len()
            + 2
            + self
                .attributes
                .iter()
                .map(CodeAttribute::byte_size)
                .sum::<usize>()
    }

    fn encoded_code_length(&self) -> usize {
        self.instructions().map(|(_, insn)| insn.width()).sum()
    }
}

impl Serialize for CodeBody {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        ((self.byte_size() - 6) as u32).serialize(writer)?;
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.encoded_code_length() as u32).serialize(writer)?;
        for (_, instruction) in self.instructions() {
            instruction.serialize(writer)?;
        }
        (self.exception_table.len() as u16).serialize(writer)?;
        for handler in &self.exception_table {
            handler.write(writer, self)?;
        }
        (self.attributes.len() as u16).serialize(writer)?;
        for attribute in &self.attributes {
            attribute.write(writer, self)?;
        }
        Ok(())
    }
}

/// Attributes of a `Code` attribute
///
/// All of these refer to bcis, so they are parsed into structures that refer to instructions by
/// handle instead. Any other attribute in a `Code` attribute is rejected, since it could contain
/// bcis that would silently go stale.
#[derive(Debug, Clone)]
pub enum CodeAttribute {
    StackMapTable(Utf8ConstantIndex, StackMapTable),
    LineNumberTable(Utf8ConstantIndex, LineNumberTable),
    LocalVariableTable(Utf8ConstantIndex, LocalVariableTable),
    LocalVariableTypeTable(Utf8ConstantIndex, LocalVariableTable),
}

impl CodeAttribute {
    fn read<R: ReadBytesExt>(
        reader: &mut R,
        constants: &ConstantPool,
        index: &BciIndex,
    ) -> Result<CodeAttribute, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let name = constants.utf8_string(name_index)?;
        let length = u32::deserialize(reader)?;
        let payload = read_bytes(reader, length as usize)?;
        let mut payload_reader = Cursor::new(payload.as_slice());

        let attribute = match name.as_str() {
            "StackMapTable" => CodeAttribute::StackMapTable(
                name_index,
                StackMapTable::read(&mut payload_reader, index)?,
            ),
            "LineNumberTable" => CodeAttribute::LineNumberTable(
                name_index,
                LineNumberTable::read(&mut payload_reader, index)?,
            ),
            "LocalVariableTable" => CodeAttribute::LocalVariableTable(
                name_index,
                LocalVariableTable::read(&mut payload_reader, index)?,
            ),
            "LocalVariableTypeTable" => CodeAttribute::LocalVariableTypeTable(
                name_index,
                LocalVariableTable::read(&mut payload_reader, index)?,
            ),
            _ => return Err(Error::UnknownAttribute(name)),
        };
        check_attribute_length(&name, length, payload_reader.position())?;
        Ok(attribute)
    }

    pub fn name_index(&self) -> Utf8ConstantIndex {
        match self {
            CodeAttribute::StackMapTable(name_index, _)
            | CodeAttribute::LineNumberTable(name_index, _)
            | CodeAttribute::LocalVariableTable(name_index, _)
            | CodeAttribute::LocalVariableTypeTable(name_index, _) => *name_index,
        }
    }

    fn payload_size(&self) -> usize {
        match self {
            CodeAttribute::StackMapTable(_, table) => table.byte_size(),
            CodeAttribute::LineNumberTable(_, table) => table.byte_size(),
            CodeAttribute::LocalVariableTable(_, table)
            | CodeAttribute::LocalVariableTypeTable(_, table) => table.byte_size(),
        }
    }

    /// Number of bytes `write` will emit (including the 6 byte attribute header)
    pub fn byte_size(&self) -> usize {
        6 + self.payload_size()
    }

    fn write<W: WriteBytesExt>(&self, writer: &mut W, code: &CodeBody) -> std::io::Result<()> {
        self.name_index().serialize(writer)?;
        (self.payload_size() as u32).serialize(writer)?;
        match self {
            CodeAttribute::StackMapTable(_, table) => table.write(writer, code),
            CodeAttribute::LineNumberTable(_, table) => table.write(writer, code),
            CodeAttribute::LocalVariableTable(_, table)
            | CodeAttribute::LocalVariableTypeTable(_, table) => table.write(writer, code),
        }
    }
}
