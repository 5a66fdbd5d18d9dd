use crate::jvm::class_file::{Attribute, ConstantPool, Deserialize, Serialize, Utf8ConstantIndex};
use crate::jvm::{Error, FieldAccessFlags};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Field {
    pub fn read<R: ReadBytesExt>(reader: &mut R, constants: &ConstantPool) -> Result<Self, Error> {
        let access_flags = FieldAccessFlags::deserialize(reader)?;
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let descriptor_index = Utf8ConstantIndex::deserialize(reader)?;
        let attributes_len = u16::deserialize(reader)?;
        let mut attributes = Vec::with_capacity(attributes_len as usize);
        for _ in 0..attributes_len {
            attributes.push(Attribute::read(reader, constants)?);
        }
        Ok(Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    pub fn byte_size(&self) -> usize {
        8 + self.attributes.iter().map(Attribute::byte_size).sum::<usize>()
    }
}

impl Serialize for Field {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
