use crate::jvm::class_file::{read_bytes, Deserialize, Serialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetResult, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::result::Result;

/// Class file constants pool
///
/// The pool is append only: entries read from the class file keep their indices, and the
/// `get_or_create_*` family only ever pushes new entries at the end. Before pushing, the pool is
/// checked for an entry with exactly the same content, and if one exists its index is returned
/// (the first such entry, if the class file itself contains duplicates). This is what lets an
/// instrumentation pass run repeatedly without growing the pool every time.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    constants: OffsetVec<Constant>,

    /// First index at which each distinct constant appears
    existing: HashMap<Constant, ConstantIndex>,
}

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            existing: HashMap::new(),
        }
    }

    /// Read the constants pool from a class file (starting at `constant_pool_count`)
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<ConstantPool, Error> {
        let count = u16::deserialize(reader)? as usize;
        let mut pool = ConstantPool::new();
        while pool.constants.offset_len().0 < count {
            let constant = Constant::read(reader, pool.constants.offset_len().0 as u16)?;
            pool.push_constant(constant)?;
        }

        // A trailing `Long` or `Double` can't claim a slot that is past the declared count
        if pool.constants.offset_len().0 != count.max(1) {
            return Err(Error::ConstantIndexOutOfRange(count as u16));
        }
        Ok(pool)
    }

    /// Number of slots used in the pool (8-byte constants count twice)
    pub fn len(&self) -> usize {
        self.constants.offset_len().0 - 1
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterate over constants along with their indices
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65534, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        // Compute the offset at which this constant will be inserted
        let offset: u16 = self.constants.offset_len().0 as u16;

        // Detect if the next constant would overflow the pool
        if offset.checked_add(constant.width() as u16).is_none() {
            return Err(ConstantPoolOverflow::Full { constant, offset });
        }

        // The length of a `Utf8` payload is written as a `u16`
        if let Constant::Utf8(bytes) = &constant {
            if bytes.len() > u16::MAX as usize {
                return Err(ConstantPoolOverflow::Utf8TooLong(bytes.len()));
            }
        }

        let idx = ConstantIndex(offset);
        self.existing.entry(constant.clone()).or_insert(idx);
        self.constants.push(constant);
        Ok(idx)
    }

    /// Get or insert a constant
    pub fn get_or_create(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        match self.existing.get(&constant) {
            Some(idx) => Ok(*idx),
            None => self.push_constant(constant),
        }
    }

    /// Look up a constant by index
    ///
    /// Index `0`, indices past the end, and the unusable slot after a `Long` or `Double` are all
    /// out of range.
    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        if index.0 == 0 {
            return Err(Error::ConstantIndexOutOfRange(index.0));
        }
        match self.constants.get_offset(Offset(index.0 as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => {
                Err(Error::ConstantIndexOutOfRange(index.0))
            }
        }
    }

    /// Raw (modified UTF-8) bytes of a `Utf8` constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&[u8], Error> {
        match self.get(index.0)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(Error::UnexpectedConstant {
                index: index.0 .0,
                expected: "Utf8",
            }),
        }
    }

    /// Decoded text of a `Utf8` constant
    pub fn utf8_string(&self, index: Utf8ConstantIndex) -> Result<String, Error> {
        self.utf8(index).map(decode_modified_utf8)
    }

    /// Binary name of a `Class` constant (eg. `java/lang/Object`, or a descriptor for arrays)
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<String, Error> {
        match self.get(index.0)? {
            Constant::Class(name) => self.utf8_string(*name),
            _ => Err(Error::UnexpectedConstant {
                index: index.0 .0,
                expected: "Class",
            }),
        }
    }

    /// Contents of a `String` constant
    pub fn string(&self, index: StringConstantIndex) -> Result<String, Error> {
        match self.get(index.0)? {
            Constant::String(utf8) => self.utf8_string(*utf8),
            _ => Err(Error::UnexpectedConstant {
                index: index.0 .0,
                expected: "String",
            }),
        }
    }

    /// Name and descriptor of a `NameAndType` constant
    pub fn name_and_type(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(Utf8ConstantIndex, Utf8ConstantIndex), Error> {
        match self.get(index.0)? {
            Constant::NameAndType { name, descriptor } => Ok((*name, *descriptor)),
            _ => Err(Error::UnexpectedConstant {
                index: index.0 .0,
                expected: "NameAndType",
            }),
        }
    }

    /// Class and name & type of a `Fieldref`, `Methodref`, or `InterfaceMethodref` constant
    pub fn member_ref(
        &self,
        index: ConstantIndex,
    ) -> Result<(ClassConstantIndex, NameAndTypeConstantIndex), Error> {
        match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => Ok((*class, *name_and_type)),
            _ => Err(Error::UnexpectedConstant {
                index: index.0,
                expected: "Fieldref or Methodref",
            }),
        }
    }

    /// Type descriptor of the member or call site referenced by an instruction operand
    ///
    /// This follows `Fieldref`, `Methodref`, `InterfaceMethodref`, `InvokeDynamic` and `Dynamic`
    /// constants through to their `NameAndType`.
    pub fn member_descriptor(&self, index: ConstantIndex) -> Result<String, Error> {
        let name_and_type = match self.get(index)? {
            Constant::FieldRef { name_and_type, .. }
            | Constant::MethodRef { name_and_type, .. }
            | Constant::Dynamic { name_and_type, .. }
            | Constant::InvokeDynamic { name_and_type, .. } => *name_and_type,
            _ => {
                return Err(Error::UnexpectedConstant {
                    index: index.0,
                    expected: "member reference or call site",
                })
            }
        };
        let (_, descriptor) = self.name_and_type(name_and_type)?;
        self.utf8_string(descriptor)
    }

    /// Get or insert a utf8 constant
    pub fn get_or_create_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        let constant = Constant::Utf8(encode_modified_utf8(utf8));
        self.get_or_create(constant).map(Utf8ConstantIndex)
    }

    /// Get or insert a class constant
    pub fn get_or_create_class(
        &mut self,
        name: Utf8ConstantIndex,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        self.get_or_create(Constant::Class(name)).map(ClassConstantIndex)
    }

    /// Get or insert a class constant (and its name)
    pub fn get_or_create_class_named(
        &mut self,
        name: &str,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = self.get_or_create_utf8(name)?;
        self.get_or_create_class(name)
    }

    /// Get or insert a string constant
    pub fn get_or_create_string(
        &mut self,
        utf8: Utf8ConstantIndex,
    ) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        self.get_or_create(Constant::String(utf8)).map(StringConstantIndex)
    }

    /// Get or insert a string constant (and its contents)
    pub fn get_or_create_string_literal(
        &mut self,
        string: &str,
    ) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        let utf8 = self.get_or_create_utf8(string)?;
        self.get_or_create_string(utf8)
    }

    /// Get or insert an integer constant
    pub fn get_or_create_integer(&mut self, integer: i32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        self.get_or_create(Constant::Integer(integer))
    }

    /// Get or insert a name & type constant
    pub fn get_or_create_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let constant = Constant::NameAndType { name, descriptor };
        self.get_or_create(constant).map(NameAndTypeConstantIndex)
    }

    /// Get or insert a field reference
    pub fn get_or_create_fieldref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let constant = Constant::FieldRef {
            class,
            name_and_type,
        };
        self.get_or_create(constant).map(FieldRefConstantIndex)
    }

    /// Get or insert a field reference, creating the class, name, and descriptor as needed
    pub fn get_or_create_fieldref_named(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_or_create_class_named(class)?;
        let name_and_type = self.get_or_create_named_and_typed(name, descriptor)?;
        self.get_or_create_fieldref(class, name_and_type)
    }

    /// Get or insert a (non-interface) method reference
    pub fn get_or_create_methodref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let constant = Constant::MethodRef {
            class,
            name_and_type,
            is_interface: false,
        };
        self.get_or_create(constant).map(MethodRefConstantIndex)
    }

    /// Get or insert a method reference, creating the class, name, and descriptor as needed
    pub fn get_or_create_methodref_named(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_or_create_class_named(class)?;
        let name_and_type = self.get_or_create_named_and_typed(name, descriptor)?;
        self.get_or_create_methodref(class, name_and_type)
    }

    /// Get or insert an interface method reference
    pub fn get_or_create_interface_methodref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let constant = Constant::MethodRef {
            class,
            name_and_type,
            is_interface: true,
        };
        self.get_or_create(constant).map(MethodRefConstantIndex)
    }

    fn get_or_create_named_and_typed(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name = self.get_or_create_utf8(name)?;
        let descriptor = self.get_or_create_utf8(descriptor)?;
        self.get_or_create_name_and_type(name, descriptor)
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.constants.offset_len().0 as u16).serialize(writer)?;
        for (_, _, constant) in &self.constants {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl ConstantPool {
    /// Number of bytes `serialize` will emit
    pub fn byte_size(&self) -> usize {
        2 + self
            .constants
            .iter()
            .map(|(_, _, constant)| constant.byte_size())
            .sum::<usize>()
    }
}

#[derive(Debug)]
pub enum ConstantPoolOverflow {
    /// Every index of the pool is taken
    Full { constant: Constant, offset: u16 },

    /// Encoded `Utf8` contents longer than 65535 bytes
    Utf8TooLong(usize),
}

/// Constants as in the constant pool
///
/// Floating point constants are kept as their raw bits so that constants can be hashed and
/// compared exactly (`NaN` payloads included).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Constant {
    /// Constant modified UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the null character
    /// `\u{0000}` and the encoding of supplementary characters is different). The bytes are kept
    /// as they appear in the class file.
    Utf8(Vec<u8>),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(u32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(u64),

    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Field
    FieldRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Module (only in `module-info` classes)
    Module(Utf8ConstantIndex),

    /// Package exported or opened by a module
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Read one constant, dispatching on its tag byte
    ///
    /// `index` is only used to report unknown tags.
    pub fn read<R: ReadBytesExt>(reader: &mut R, index: u16) -> Result<Constant, Error> {
        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)?;
                Constant::Utf8(read_bytes(reader, len as usize)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(u32::deserialize(reader)?),
            5 => Constant::Long(u64::deserialize(reader)? as i64),
            6 => Constant::Double(u64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::try_from(u8::deserialize(reader)?)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            _ => return Err(Error::UnknownConstantTag { tag, index }),
        };
        Ok(constant)
    }

    /// Number of bytes `serialize` will emit
    pub fn byte_size(&self) -> usize {
        match self {
            Constant::Utf8(bytes) => 3 + bytes.len(),
            Constant::Integer(_)
            | Constant::Float(_)
            | Constant::FieldRef { .. }
            | Constant::MethodRef { .. }
            | Constant::NameAndType { .. }
            | Constant::Dynamic { .. }
            | Constant::InvokeDynamic { .. } => 5,
            Constant::Long(_) | Constant::Double(_) => 9,
            Constant::Class(_)
            | Constant::String(_)
            | Constant::MethodType { .. }
            | Constant::Module(_)
            | Constant::Package(_) => 3,
            Constant::MethodHandle { .. } => 4,
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(bytes) => {
                1u8.serialize(writer)?;
                (bytes.len() as u16).serialize(writer)?;
                writer.write_all(bytes)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(bits) => {
                4u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                (*long as u64).serialize(writer)?;
            }
            Constant::Double(bits) => {
                6u8.serialize(writer)?;
                bits.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                (*handle_kind as u8).serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        if c == '\u{0000}' {
            buffer.extend_from_slice(&[0b1100_0000, 0b1000_0000]);
            continue;
        }

        // Supplementary characters get split into surrogates, each encoded on its own
        for unit in c.encode_utf16(&mut units).iter() {
            let code = *unit as u32;
            if code < 0x80 {
                buffer.push(code as u8);
            } else if code < 0x800 {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Malformed sequences and unpaired surrogates decode to `U+FFFD`.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let byte = bytes[i] as u16;
        let continuation = |offset: usize| -> Option<u16> {
            bytes
                .get(i + offset)
                .filter(|b| *b & 0b1100_0000 == 0b1000_0000)
                .map(|b| (*b & 0x3F) as u16)
        };
        if byte & 0b1000_0000 == 0 {
            units.push(byte);
            i += 1;
        } else if byte & 0b1110_0000 == 0b1100_0000 {
            match continuation(1) {
                Some(low) => {
                    units.push((byte & 0x1F) << 6 | low);
                    i += 2;
                }
                None => {
                    units.push(0xFFFD);
                    i += 1;
                }
            }
        } else if byte & 0b1111_0000 == 0b1110_0000 {
            match (continuation(1), continuation(2)) {
                (Some(mid), Some(low)) => {
                    units.push((byte & 0x0F) << 12 | mid << 6 | low);
                    i += 3;
                }
                _ => {
                    units.push(0xFFFD);
                    i += 1;
                }
            }
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

macro_rules! typed_constant_index {
    ($($(#[$attr:meta])* $name:ident;)*) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $name {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($name(ConstantIndex::deserialize(reader)?))
                }
            }
        )*
    };
}

typed_constant_index! {
    /// Index of a `Utf8` constant
    Utf8ConstantIndex;
    /// Index of a `String` constant
    StringConstantIndex;
    /// Index of a `NameAndType` constant
    NameAndTypeConstantIndex;
    /// Index of a `Class` constant
    ClassConstantIndex;
    /// Index of a `Fieldref` constant
    FieldRefConstantIndex;
    /// Index of a `Methodref` or `InterfaceMethodref` constant
    MethodRefConstantIndex;
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
#[repr(u8)]
pub enum HandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl TryFrom<u8> for HandleKind {
    type Error = Error;

    fn try_from(byte: u8) -> Result<HandleKind, Error> {
        let kind = match byte {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return Err(Error::UnknownHandleKind(byte)),
        };
        Ok(kind)
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let mut pool = ConstantPool::new();
        let foo = pool.get_or_create_utf8("Foo").unwrap();
        let len = pool.len();
        assert_eq!(pool.get_or_create_utf8("Foo").unwrap(), foo);
        assert_eq!(pool.len(), len);

        let first = pool
            .get_or_create_methodref_named("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
            .unwrap();
        let len = pool.len();
        let second = pool
            .get_or_create_methodref_named("java/io/PrintStream", "println", "(Ljava/lang/String;)V")
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.len(), len);
    }

    #[test]
    fn interface_and_class_methodrefs_are_distinct() {
        let mut pool = ConstantPool::new();
        let class = pool.get_or_create_class_named("java/util/List").unwrap();
        let name = pool.get_or_create_utf8("size").unwrap();
        let desc = pool.get_or_create_utf8("()I").unwrap();
        let nat = pool.get_or_create_name_and_type(name, desc).unwrap();
        let plain = pool.get_or_create_methodref(class, nat).unwrap();
        let interface = pool.get_or_create_interface_methodref(class, nat).unwrap();
        assert_ne!(plain, interface);
        assert_eq!(pool.member_descriptor(interface.0).unwrap(), "()I");
    }

    #[test]
    fn wide_constants_reserve_a_slot() {
        let mut pool = ConstantPool::new();
        let long = pool.get_or_create(Constant::Long(1 << 40)).unwrap();
        let after = pool.get_or_create_utf8("after").unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(after, Utf8ConstantIndex(ConstantIndex(3)));
        assert_eq!(pool.len(), 3);

        assert!(matches!(pool.get(ConstantIndex(1)), Ok(Constant::Long(_))));
        assert!(matches!(
            pool.get(ConstantIndex(2)),
            Err(Error::ConstantIndexOutOfRange(2))
        ));
        assert!(matches!(
            pool.get(ConstantIndex(0)),
            Err(Error::ConstantIndexOutOfRange(0))
        ));
        assert!(matches!(
            pool.get(ConstantIndex(4)),
            Err(Error::ConstantIndexOutOfRange(4))
        ));
    }

    #[test]
    fn read_keeps_duplicates_and_dedups_to_the_first() {
        let mut bytes = vec![];
        4u16.serialize(&mut bytes).unwrap();
        for _ in 0..2 {
            Constant::Utf8(b"dup".to_vec()).serialize(&mut bytes).unwrap();
        }
        Constant::Integer(-7).serialize(&mut bytes).unwrap();

        let mut pool = ConstantPool::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(
            pool.get_or_create_utf8("dup").unwrap(),
            Utf8ConstantIndex(ConstantIndex(1))
        );
        assert_eq!(pool.get_or_create_integer(-7).unwrap(), ConstantIndex(3));

        let mut written = vec![];
        pool.serialize(&mut written).unwrap();
        assert_eq!(written, bytes);
        assert_eq!(pool.byte_size(), bytes.len());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let bytes = [0u8, 2, 2, 0, 0];
        assert!(matches!(
            ConstantPool::read(&mut &bytes[..]),
            Err(Error::UnknownConstantTag { tag: 2, index: 1 })
        ));
    }

    #[test]
    fn oversized_utf8_is_rejected() {
        let mut pool = ConstantPool::new();
        let len = pool.len();
        assert!(matches!(
            pool.get_or_create_utf8(&"a".repeat(70_000)),
            Err(ConstantPoolOverflow::Utf8TooLong(70_000))
        ));
        assert!(matches!(
            pool.get_or_create_string_literal(&"\u{0}".repeat(40_000)),
            Err(ConstantPoolOverflow::Utf8TooLong(80_000))
        ));
        assert_eq!(pool.len(), len);

        // Exactly 65535 bytes still fits
        let longest = pool.get_or_create_utf8(&"a".repeat(65_535)).unwrap();
        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        let pool = ConstantPool::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(pool.utf8(longest).unwrap().len(), 65_535);
    }
}
