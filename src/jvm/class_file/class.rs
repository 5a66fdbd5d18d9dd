use crate::jvm::class_file::{
    Attribute, ClassConstantIndex, ConstantIndex, ConstantPool, Deserialize, Field, Method,
    Serialize, Version,
};
use crate::jvm::{ClassAccessFlags, Error};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// Method bodies are decoded (see [`crate::jvm::code::CodeBody`]), everything else is kept as it
/// was in the file. After patching code, call [`CodeBody::relax`](crate::jvm::code::CodeBody::relax)
/// on every modified body before serializing.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Superclass (`None` only for `java/lang/Object`)
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: u32 = 0xCAFE_BABE;

    /// Read a whole class file
    pub fn read<R: ReadBytesExt>(mut reader: R) -> Result<ClassFile, Error> {
        let reader = &mut reader;
        let magic = u32::deserialize(reader)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::deserialize(reader)?;
        let constants = ConstantPool::read(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = match ConstantIndex::deserialize(reader)? {
            ConstantIndex(0) => None,
            index => Some(ClassConstantIndex(index)),
        };
        let interfaces = Vec::<ClassConstantIndex>::deserialize(reader)?;

        let fields_len = u16::deserialize(reader)?;
        let mut fields = Vec::with_capacity(fields_len as usize);
        for _ in 0..fields_len {
            fields.push(Field::read(reader, &constants)?);
        }

        let methods_len = u16::deserialize(reader)?;
        let mut methods = Vec::with_capacity(methods_len as usize);
        for _ in 0..methods_len {
            methods.push(Method::read(reader, &constants, this_class)?);
        }

        let attributes_len = u16::deserialize(reader)?;
        let mut attributes = Vec::with_capacity(attributes_len as usize);
        for _ in 0..attributes_len {
            attributes.push(Attribute::read(reader, &constants)?);
        }

        log::trace!(
            "read class file version {}.{} ({} constants, {} fields, {} methods)",
            version.major_version,
            version.minor_version,
            constants.len(),
            fields.len(),
            methods.len()
        );

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Read a class file from disk
    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<ClassFile, Error> {
        let bytes = fs::read(path)?;
        ClassFile::read(bytes.as_slice())
    }

    /// Internal name of the class (eg. `java/lang/String`)
    pub fn class_name(&self) -> Result<String, Error> {
        self.constants.class_name(self.this_class)
    }

    /// Save the class file to disk
    ///
    /// The class is serialized in full before the file is opened, so a class that cannot be
    /// written leaves any existing file untouched.
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut bytes = Vec::with_capacity(self.byte_size());
        self.serialize(&mut bytes)?;
        fs::write(path, bytes)
    }

    /// Number of bytes `serialize` will emit
    pub fn byte_size(&self) -> usize {
        4 + 4
            + self.constants.byte_size()
            + 6
            + 2
            + 2 * self.interfaces.len()
            + 2
            + self.fields.iter().map(Field::byte_size).sum::<usize>()
            + 2
            + self.methods.iter().map(Method::byte_size).sum::<usize>()
            + 2
            + self.attributes.iter().map(Attribute::byte_size).sum::<usize>()
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        ClassFile::MAGIC.serialize(writer)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            None => 0u16.serialize(writer)?,
            Some(super_class) => super_class.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::MethodAttribute;
    use crate::jvm::code::{CodeBody, Instruction, Jump, Opcode};
    use crate::jvm::{FieldAccessFlags, MethodAccessFlags};

    /// `class Empty { static int count; static void run() { return; } }`
    fn empty_class() -> ClassFile {
        let mut constants = ConstantPool::new();
        let this_class = constants.get_or_create_class_named("Empty").unwrap();
        let super_class = constants.get_or_create_class_named("java/lang/Object").unwrap();
        let source_file = constants.get_or_create_utf8("SourceFile").unwrap();
        let source_name = constants.get_or_create_utf8("Empty.java").unwrap();

        let field = Field {
            access_flags: FieldAccessFlags::STATIC,
            name_index: constants.get_or_create_utf8("count").unwrap(),
            descriptor_index: constants.get_or_create_utf8("I").unwrap(),
            attributes: vec![],
        };

        let mut code = CodeBody::new(constants.get_or_create_utf8("Code").unwrap(), 0, 0);
        code.push(Instruction::Simple(Opcode::Return));
        code.sync().unwrap();
        let method = Method {
            access_flags: MethodAccessFlags::STATIC,
            name_index: constants.get_or_create_utf8("run").unwrap(),
            descriptor_index: constants.get_or_create_utf8("()V").unwrap(),
            attributes: vec![MethodAttribute::Code(code)],
        };

        ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::SUPER,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields: vec![field],
            methods: vec![method],
            attributes: vec![Attribute {
                name_index: source_file,
                info: source_name.0 .0.to_be_bytes().to_vec(),
            }],
        }
    }

    fn serialized(class: &ClassFile) -> Vec<u8> {
        let mut bytes = vec![];
        class.serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), class.byte_size());
        bytes
    }

    #[test]
    fn round_trip() {
        let class = empty_class();
        let bytes = serialized(&class);
        assert_eq!(&bytes[0..8], &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52]);

        let read = ClassFile::read(bytes.as_slice()).unwrap();
        assert_eq!(read.class_name().unwrap(), "Empty");
        assert_eq!(read.version, Version::JAVA8);
        assert_eq!(read.fields, class.fields);
        assert_eq!(read.attributes, class.attributes);
        let method = &read.methods[0];
        assert_eq!(method.name(&read.constants).unwrap(), "run");
        let code = method.code().unwrap();
        assert_eq!(code.len(), 1);
        let context = code.method.as_ref().unwrap();
        assert!(context.is_static);
        assert!(!context.is_constructor);
        assert_eq!(context.descriptor, "()V");

        assert_eq!(serialized(&read), bytes);
    }

    #[test]
    fn bad_magic() {
        let mut bytes = serialized(&empty_class());
        bytes[3] = 0xBB;
        assert!(matches!(
            ClassFile::read(bytes.as_slice()),
            Err(Error::BadMagic(0xCAFEBABB))
        ));
    }

    #[test]
    fn truncated() {
        let bytes = serialized(&empty_class());
        assert!(matches!(
            ClassFile::read(&bytes[..bytes.len() - 1]),
            Err(Error::IoError(_))
        ));
    }

    #[test]
    fn save_and_read_from_disk() {
        let class = empty_class();
        let path = std::env::temp_dir()
            .join(format!("classpatch-{}", std::process::id()))
            .join("nested")
            .join("Empty.class");
        class.save_to_path(&path, true).unwrap();
        let read = ClassFile::read_from_path(&path).unwrap();
        assert_eq!(serialized(&read), serialized(&class));
        let _ = fs::remove_dir_all(path.parent().unwrap().parent().unwrap());
    }

    #[test]
    fn failed_save_keeps_existing_file() {
        let class = empty_class();
        let dir = std::env::temp_dir().join(format!("classpatch-keep-{}", std::process::id()));
        let path = dir.join("Empty.class");
        class.save_to_path(&path, true).unwrap();
        let before = fs::read(&path).unwrap();

        // A `goto` whose offset no longer fits in 16 bits can't be written out
        let mut broken = class.clone();
        let code = broken.methods[0].code_mut().unwrap();
        let ret = code.ids()[0];
        code.insert(
            0,
            Instruction::Branch(
                Opcode::Goto,
                Jump {
                    target: ret,
                    offset: 40000,
                },
            ),
        );
        assert!(broken.save_to_path(&path, false).is_err());
        assert_eq!(fs::read(&path).unwrap(), before);

        let _ = fs::remove_dir_all(&dir);
    }
}
