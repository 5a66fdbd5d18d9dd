use crate::jvm::class_file::{
    check_attribute_length, read_bytes, Attribute, ClassConstantIndex, ConstantPool, Deserialize,
    Serialize, Utf8ConstantIndex,
};
use crate::jvm::code::{CodeBody, MethodContext};
use crate::jvm::{Error, MethodAccessFlags};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<MethodAttribute>,
}

/// Attribute on a method
///
/// Only `Code` is parsed, every other attribute is passed through as is.
#[derive(Debug, Clone)]
pub enum MethodAttribute {
    Code(CodeBody),
    Other(Attribute),
}

impl Method {
    /// Read a method declared in `class`
    pub fn read<R: ReadBytesExt>(
        reader: &mut R,
        constants: &ConstantPool,
        class: ClassConstantIndex,
    ) -> Result<Self, Error> {
        let access_flags = MethodAccessFlags::deserialize(reader)?;
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let descriptor_index = Utf8ConstantIndex::deserialize(reader)?;
        let context = MethodContext {
            class,
            descriptor: constants.utf8_string(descriptor_index)?,
            is_static: access_flags.contains(MethodAccessFlags::STATIC),
            is_constructor: constants.utf8_string(name_index)? == "<init>",
        };

        let attributes_len = u16::deserialize(reader)?;
        let mut attributes = Vec::with_capacity(attributes_len as usize);
        for _ in 0..attributes_len {
            let attribute_name_index = Utf8ConstantIndex::deserialize(reader)?;
            let attribute_name = constants.utf8_string(attribute_name_index)?;
            let attribute = if attribute_name == "Code" {
                let length = u32::deserialize(reader)?;
                let payload = read_bytes(reader, length as usize)?;
                let mut payload_reader = Cursor::new(payload.as_slice());
                let code = CodeBody::read(
                    &mut payload_reader,
                    attribute_name_index,
                    constants,
                    Some(context.clone()),
                )?;
                check_attribute_length(&attribute_name, length, payload_reader.position())?;
                MethodAttribute::Code(code)
            } else {
                MethodAttribute::Other(Attribute::read_info(
                    reader,
                    attribute_name_index,
                    attribute_name,
                )?)
            };
            attributes.push(attribute);
        }

        Ok(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    /// Method body, if the method is neither `abstract` nor `native`
    pub fn code(&self) -> Option<&CodeBody> {
        self.attributes.iter().find_map(|attribute| match attribute {
            MethodAttribute::Code(code) => Some(code),
            MethodAttribute::Other(_) => None,
        })
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeBody> {
        self.attributes.iter_mut().find_map(|attribute| match attribute {
            MethodAttribute::Code(code) => Some(code),
            MethodAttribute::Other(_) => None,
        })
    }

    pub fn name(&self, constants: &ConstantPool) -> Result<String, Error> {
        constants.utf8_string(self.name_index)
    }

    pub fn descriptor(&self, constants: &ConstantPool) -> Result<String, Error> {
        constants.utf8_string(self.descriptor_index)
    }

    pub fn byte_size(&self) -> usize {
        8 + self
            .attributes
            .iter()
            .map(|attribute| match attribute {
                MethodAttribute::Code(code) => code.byte_size(),
                MethodAttribute::Other(other) => other.byte_size(),
            })
            .sum::<usize>()
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        (self.attributes.len() as u16).serialize(writer)?;
        for attribute in &self.attributes {
            match attribute {
                MethodAttribute::Code(code) => code.serialize(writer)?,
                MethodAttribute::Other(other) => other.serialize(writer)?,
            }
        }
        Ok(())
    }
}
