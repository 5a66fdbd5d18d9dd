use super::{BciIndex, CodeBody, InsnId};
use crate::jvm::class_file::{ClassConstantIndex, ConstantIndex, Deserialize, Serialize, Utf8ConstantIndex};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Entry in the exception table of a method
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.3
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start: InsnId,

    /// End of exception handler range (exclusive), `None` if the range runs to the end of the code
    pub end: Option<InsnId>,

    /// Start of the exception handler
    pub handler: InsnId,

    /// Class of exceptions caught (`None` catches everything, as for `finally`)
    pub catch_type: Option<ClassConstantIndex>,
}

impl ExceptionHandler {
    pub(super) fn read<R: ReadBytesExt>(reader: &mut R, index: &BciIndex) -> Result<Self, Error> {
        let start_pc = u16::deserialize(reader)?;
        let end_pc = u16::deserialize(reader)?;
        let handler_pc = u16::deserialize(reader)?;
        let catch_type = u16::deserialize(reader)?;
        Ok(ExceptionHandler {
            start: index.at(start_pc as i64)?,
            end: index.at_or_end(end_pc as i64)?,
            handler: index.at(handler_pc as i64)?,
            catch_type: match catch_type {
                0 => None,
                idx => Some(ClassConstantIndex(ConstantIndex(idx))),
            },
        })
    }

    pub(super) fn write<W: WriteBytesExt>(
        &self,
        writer: &mut W,
        code: &CodeBody,
    ) -> std::io::Result<()> {
        (code.bci(self.start) as u16).serialize(writer)?;
        (code.end_bci(self.end) as u16).serialize(writer)?;
        (code.bci(self.handler) as u16).serialize(writer)?;
        match self.catch_type {
            None => 0u16.serialize(writer)?,
            Some(class) => class.serialize(writer)?,
        }
        Ok(())
    }

    pub const BYTE_SIZE: usize = 8;
}

/// Mapping from the start of a range of code to a line in the source file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineNumber {
    pub start: InsnId,
    pub line: u16,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.12
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineNumberTable(pub Vec<LineNumber>);

impl LineNumberTable {
    pub(super) fn read<R: ReadBytesExt>(reader: &mut R, index: &BciIndex) -> Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut entries = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let start_pc = u16::deserialize(reader)?;
            let line = u16::deserialize(reader)?;
            entries.push(LineNumber {
                start: index.at(start_pc as i64)?,
                line,
            });
        }
        Ok(LineNumberTable(entries))
    }

    pub(super) fn write<W: WriteBytesExt>(
        &self,
        writer: &mut W,
        code: &CodeBody,
    ) -> std::io::Result<()> {
        (self.0.len() as u16).serialize(writer)?;
        for entry in &self.0 {
            (code.bci(entry.start) as u16).serialize(writer)?;
            entry.line.serialize(writer)?;
        }
        Ok(())
    }

    pub fn byte_size(&self) -> usize {
        2 + 4 * self.0.len()
    }
}

/// Range of code in which a local variable slot holds a named variable
///
/// The same layout is shared by `LocalVariableTable` (where `descriptor` is a field descriptor)
/// and `LocalVariableTypeTable` (where it is a generic signature).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start: InsnId,

    /// End of the range (exclusive), `None` if the variable lives until the end of the code
    pub end: Option<InsnId>,
    pub name: Utf8ConstantIndex,
    pub descriptor: Utf8ConstantIndex,
    pub index: u16,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.13
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

impl LocalVariableTable {
    pub(super) fn read<R: ReadBytesExt>(reader: &mut R, index: &BciIndex) -> Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut entries = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let start_pc = u16::deserialize(reader)? as i64;
            let length = u16::deserialize(reader)? as i64;
            entries.push(LocalVariable {
                start: index.at(start_pc)?,
                end: index.at_or_end(start_pc + length)?,
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
                index: u16::deserialize(reader)?,
            });
        }
        Ok(LocalVariableTable(entries))
    }

    pub(super) fn write<W: WriteBytesExt>(
        &self,
        writer: &mut W,
        code: &CodeBody,
    ) -> std::io::Result<()> {
        (self.0.len() as u16).serialize(writer)?;
        for entry in &self.0 {
            let start = code.bci(entry.start);
            let end = code.end_bci(entry.end);
            (start as u16).serialize(writer)?;
            (end.saturating_sub(start) as u16).serialize(writer)?;
            entry.name.serialize(writer)?;
            entry.descriptor.serialize(writer)?;
            entry.index.serialize(writer)?;
        }
        Ok(())
    }

    pub fn byte_size(&self) -> usize {
        2 + 10 * self.0.len()
    }
}
