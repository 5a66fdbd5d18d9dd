use crate::jvm::class_file::{read_bytes, ConstantPool, Deserialize, Serialize, Utf8ConstantIndex};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Attribute on a class, field, or method, kept as raw bytes
///
/// Attributes outside of `Code` never refer to bcis, so their contents survive code patching
/// untouched. The one attribute that does get parsed is `Code` itself (see
/// [`MethodAttribute`](super::MethodAttribute)).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

/// Names of the attributes defined by the JVM specification
pub const KNOWN_ATTRIBUTES: &[&str] = &[
    "ConstantValue",
    "Code",
    "StackMapTable",
    "Exceptions",
    "InnerClasses",
    "EnclosingMethod",
    "Synthetic",
    "Signature",
    "SourceFile",
    "SourceDebugExtension",
    "LineNumberTable",
    "LocalVariableTable",
    "LocalVariableTypeTable",
    "Deprecated",
    "RuntimeVisibleAnnotations",
    "RuntimeInvisibleAnnotations",
    "RuntimeVisibleParameterAnnotations",
    "RuntimeInvisibleParameterAnnotations",
    "RuntimeVisibleTypeAnnotations",
    "RuntimeInvisibleTypeAnnotations",
    "AnnotationDefault",
    "BootstrapMethods",
    "MethodParameters",
    "Module",
    "ModulePackages",
    "ModuleMainClass",
    "NestHost",
    "NestMembers",
    "Record",
    "PermittedSubclasses",
];

impl Attribute {
    /// Read a whole attribute (name, length, and contents)
    pub fn read<R: ReadBytesExt>(reader: &mut R, constants: &ConstantPool) -> Result<Self, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let name = constants.utf8_string(name_index)?;
        Attribute::read_info(reader, name_index, name)
    }

    /// Read the length and contents of an attribute whose name has already been read
    pub fn read_info<R: ReadBytesExt>(
        reader: &mut R,
        name_index: Utf8ConstantIndex,
        name: String,
    ) -> Result<Self, Error> {
        if !KNOWN_ATTRIBUTES.contains(&name.as_str()) {
            return Err(Error::UnknownAttribute(name));
        }
        let length = u32::deserialize(reader)?;
        let info = read_bytes(reader, length as usize)?;
        Ok(Attribute { name_index, info })
    }

    pub fn byte_size(&self) -> usize {
        6 + self.info.len()
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

/// Check that a parsed attribute used up exactly the length it declared
pub fn check_attribute_length(name: &str, declared: u32, consumed: u64) -> Result<(), Error> {
    if consumed == declared as u64 {
        Ok(())
    } else {
        Err(Error::AttributeLengthMismatch {
            name: name.to_owned(),
            declared,
            actual: consumed as u32,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn raw_attributes() {
        let mut constants = ConstantPool::new();
        let source_file = constants.get_or_create_utf8("SourceFile").unwrap();
        let file_name = constants.get_or_create_utf8("Test.java").unwrap();

        let attribute = Attribute {
            name_index: source_file,
            info: vec![0, file_name.0 .0 as u8],
        };
        let mut bytes = vec![];
        attribute.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 1, 0, 0, 0, 2, 0, 2]);
        assert_eq!(bytes.len(), attribute.byte_size());

        let read = Attribute::read(&mut Cursor::new(&bytes), &constants).unwrap();
        assert_eq!(read, attribute);
    }

    #[test]
    fn unknown_attributes() {
        let mut constants = ConstantPool::new();
        constants.get_or_create_utf8("ScalaSig").unwrap();
        let bytes = [0, 1, 0, 0, 0, 0];
        assert!(matches!(
            Attribute::read(&mut Cursor::new(&bytes), &constants),
            Err(Error::UnknownAttribute(name)) if name == "ScalaSig"
        ));
    }

    #[test]
    fn length_mismatch() {
        assert!(check_attribute_length("LineNumberTable", 6, 6).is_ok());
        assert!(matches!(
            check_attribute_length("LineNumberTable", 10, 6),
            Err(Error::AttributeLengthMismatch {
                declared: 10,
                actual: 6,
                ..
            })
        ));
    }
}
