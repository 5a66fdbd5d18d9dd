use super::{BciIndex, CodeBody, InsnId};
use crate::jvm::class_file::{ClassConstantIndex, ConstantPool, Deserialize, Serialize};
use crate::jvm::{Error, FieldType, MethodDescriptor, ParseDescriptor, RenderDescriptor};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(ClassConstantIndex),

    /// State of an object after `new` has been called but `<init>` has not, pointing at the `new`
    /// instruction
    Uninitialized(InsnId),
}

impl VerificationType {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Type of a method parameter when it is first put in its local
    pub fn from_field_type(
        field_type: &FieldType,
        constants: &mut ConstantPool,
    ) -> Result<VerificationType, Error> {
        use crate::jvm::BaseType;

        let typ = match field_type {
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Base(_) => VerificationType::Integer,
            FieldType::Object(name) => {
                VerificationType::Object(constants.get_or_create_class_named(name)?)
            }
            FieldType::Array(_) => {
                let name = field_type.render();
                VerificationType::Object(constants.get_or_create_class_named(&name)?)
            }
        };
        Ok(typ)
    }

    fn read<R: ReadBytesExt>(reader: &mut R, index: &BciIndex) -> Result<Self, Error> {
        let typ = match u8::deserialize(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex::deserialize(reader)?),
            8 => {
                let new_bci = u16::deserialize(reader)?;
                VerificationType::Uninitialized(index.at(new_bci as i64)?)
            }
            tag => return Err(Error::UnknownVerificationType(tag)),
        };
        Ok(typ)
    }

    fn write<W: WriteBytesExt>(&self, writer: &mut W, code: &CodeBody) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(new) => {
                8u8.serialize(writer)?;
                (code.bci(*new) as u16).serialize(writer)?;
            }
        };
        Ok(())
    }

    fn byte_size(&self) -> usize {
        match self {
            VerificationType::Object(_) | VerificationType::Uninitialized(_) => 3,
            _ => 1,
        }
    }
}

fn read_types<R: ReadBytesExt>(
    reader: &mut R,
    index: &BciIndex,
    count: usize,
) -> Result<Vec<VerificationType>, Error> {
    let mut types = Vec::with_capacity(count);
    for _ in 0..count {
        types.push(VerificationType::read(reader, index)?);
    }
    Ok(types)
}

fn write_types<W: WriteBytesExt>(
    types: &[VerificationType],
    writer: &mut W,
    code: &CodeBody,
) -> std::io::Result<()> {
    for typ in types {
        typ.write(writer, code)?;
    }
    Ok(())
}

fn types_byte_size(types: &[VerificationType]) -> usize {
    types.iter().map(VerificationType::byte_size).sum()
}

/// Encoding of a stack map frame, relative to the frame before it
///
/// The compact and extended forms of `Same` and `SameLocals1StackItem` are kept apart, so that
/// frames come back out with the encoding they were read with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Same locals as the previous frame and an empty stack
    /// Tags: 0-63
    Same,

    /// Same locals as the previous frame and exactly one stack item
    /// Tags: 64-127
    SameLocals1StackItem(VerificationType),

    /// Tag: 247
    SameLocals1StackItemExtended(VerificationType),

    /// Like the previous frame, but without the last `k` locals and with an empty stack
    ///
    /// Note: `k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    Chop(u8),

    /// Tag: 251
    SameExtended,

    /// Like the previous frame, but with 1 to 3 extra locals and an empty stack
    /// Tags: 252-254
    Append(Vec<VerificationType>),

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

impl FrameKind {
    /// Can this encoding represent the offset delta?
    pub fn fits(&self, offset_delta: u16) -> bool {
        match self {
            FrameKind::Same | FrameKind::SameLocals1StackItem(_) => offset_delta <= 63,
            _ => true,
        }
    }

    /// Extended encoding of a compact frame (`None` if the frame already has a 2 byte delta)
    pub fn extended(&self) -> Option<FrameKind> {
        match self {
            FrameKind::Same => Some(FrameKind::SameExtended),
            FrameKind::SameLocals1StackItem(stack) => {
                Some(FrameKind::SameLocals1StackItemExtended(*stack))
            }
            _ => None,
        }
    }

    /// Verification types mentioned in the frame
    pub fn verification_types(&self) -> Vec<&VerificationType> {
        match self {
            FrameKind::Same | FrameKind::Chop(_) | FrameKind::SameExtended => vec![],
            FrameKind::SameLocals1StackItem(stack)
            | FrameKind::SameLocals1StackItemExtended(stack) => vec![stack],
            FrameKind::Append(locals) => locals.iter().collect(),
            FrameKind::Full { locals, stack } => locals.iter().chain(stack.iter()).collect(),
        }
    }

    pub(super) fn verification_types_mut(&mut self) -> Vec<&mut VerificationType> {
        match self {
            FrameKind::Same | FrameKind::Chop(_) | FrameKind::SameExtended => vec![],
            FrameKind::SameLocals1StackItem(stack)
            | FrameKind::SameLocals1StackItemExtended(stack) => vec![stack],
            FrameKind::Append(locals) => locals.iter_mut().collect(),
            FrameKind::Full { locals, stack } => {
                locals.iter_mut().chain(stack.iter_mut()).collect()
            }
        }
    }

    pub(super) fn name(&self) -> &'static str {
        match self {
            FrameKind::Same => "same_frame",
            FrameKind::SameLocals1StackItem(_) => "same_locals_1_stack_item_frame",
            FrameKind::SameLocals1StackItemExtended(_) => {
                "same_locals_1_stack_item_frame_extended"
            }
            FrameKind::Chop(_) => "chop_frame",
            FrameKind::SameExtended => "same_frame_extended",
            FrameKind::Append(_) => "append_frame",
            FrameKind::Full { .. } => "full_frame",
        }
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapFrame {
    /// Instruction described by the frame
    pub target: InsnId,

    /// Encoded distance from the previous frame (derived from `target` by `CodeBody::sync`)
    pub offset_delta: u16,

    pub kind: FrameKind,
}

impl StackMapFrame {
    /// New frame (the offset delta gets filled in on the next `sync`)
    pub fn new(target: InsnId, kind: FrameKind) -> StackMapFrame {
        StackMapFrame {
            target,
            offset_delta: 0,
            kind,
        }
    }

    /// Read a frame, along with the bci it describes
    fn read<R: ReadBytesExt>(
        reader: &mut R,
        index: &BciIndex,
        previous_bci: Option<i64>,
    ) -> Result<(i64, StackMapFrame), Error> {
        let frame_type = u8::deserialize(reader)?;
        let (offset_delta, kind) = match frame_type {
            0..=63 => (frame_type as u16, FrameKind::Same),
            64..=127 => {
                let stack = VerificationType::read(reader, index)?;
                (frame_type as u16 - 64, FrameKind::SameLocals1StackItem(stack))
            }
            247 => {
                let offset_delta = u16::deserialize(reader)?;
                let stack = VerificationType::read(reader, index)?;
                (offset_delta, FrameKind::SameLocals1StackItemExtended(stack))
            }
            248..=250 => (u16::deserialize(reader)?, FrameKind::Chop(251 - frame_type)),
            251 => (u16::deserialize(reader)?, FrameKind::SameExtended),
            252..=254 => {
                let offset_delta = u16::deserialize(reader)?;
                let locals = read_types(reader, index, (frame_type - 251) as usize)?;
                (offset_delta, FrameKind::Append(locals))
            }
            255 => {
                let offset_delta = u16::deserialize(reader)?;
                let locals_len = u16::deserialize(reader)?;
                let locals = read_types(reader, index, locals_len as usize)?;
                let stack_len = u16::deserialize(reader)?;
                let stack = read_types(reader, index, stack_len as usize)?;
                (offset_delta, FrameKind::Full { locals, stack })
            }
            _ => return Err(Error::UnknownStackMapFrameType(frame_type)),
        };

        let bci = match previous_bci {
            None => offset_delta as i64,
            Some(previous) => previous + offset_delta as i64 + 1,
        };
        let frame = StackMapFrame {
            target: index.at(bci)?,
            offset_delta,
            kind,
        };
        Ok((bci, frame))
    }

    fn write<W: WriteBytesExt>(&self, writer: &mut W, code: &CodeBody) -> std::io::Result<()> {
        let offset_delta = self.offset_delta;
        match &self.kind {
            FrameKind::Same | FrameKind::SameLocals1StackItem(_) if offset_delta > 63 => {
                let msg = format!(
                    "{} cannot encode offset delta {}",
                    self.kind.name(),
                    offset_delta
                );
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, msg));
            }
            FrameKind::Same => (offset_delta as u8).serialize(writer)?,
            FrameKind::SameLocals1StackItem(stack) => {
                (offset_delta as u8 + 64).serialize(writer)?;
                stack.write(writer, code)?;
            }
            FrameKind::SameLocals1StackItemExtended(stack) => {
                247u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                stack.write(writer, code)?;
            }
            FrameKind::Chop(k) => {
                assert!(0 < *k && *k < 4, "chop_frame chops 1-3 locals");
                (251 - k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }
            FrameKind::SameExtended => {
                251u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
            }
            FrameKind::Append(locals) => {
                let added_k = locals.len();
                assert!(0 < added_k && added_k < 4, "append_frame adds 1-3 locals");
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                write_types(locals, writer, code)?;
            }
            FrameKind::Full { locals, stack } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                (locals.len() as u16).serialize(writer)?;
                write_types(locals, writer, code)?;
                (stack.len() as u16).serialize(writer)?;
                write_types(stack, writer, code)?;
            }
        };
        Ok(())
    }

    pub fn byte_size(&self) -> usize {
        match &self.kind {
            FrameKind::Same => 1,
            FrameKind::SameLocals1StackItem(stack) => 1 + stack.byte_size(),
            FrameKind::SameLocals1StackItemExtended(stack) => 3 + stack.byte_size(),
            FrameKind::Chop(_) | FrameKind::SameExtended => 3,
            FrameKind::Append(locals) => 3 + types_byte_size(locals),
            FrameKind::Full { locals, stack } => {
                7 + types_byte_size(locals) + types_byte_size(stack)
            }
        }
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackMapTable {
    /// Frames, ordered by the bci of the instruction they describe
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    pub(super) fn read<R: ReadBytesExt>(reader: &mut R, index: &BciIndex) -> Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut frames = Vec::with_capacity(len as usize);
        let mut previous_bci = None;
        for _ in 0..len {
            let (bci, frame) = StackMapFrame::read(reader, index, previous_bci)?;
            previous_bci = Some(bci);
            frames.push(frame);
        }
        Ok(StackMapTable { frames })
    }

    pub(super) fn write<W: WriteBytesExt>(
        &self,
        writer: &mut W,
        code: &CodeBody,
    ) -> std::io::Result<()> {
        (self.frames.len() as u16).serialize(writer)?;
        for frame in &self.frames {
            frame.write(writer, code)?;
        }
        Ok(())
    }

    pub fn byte_size(&self) -> usize {
        2 + self.frames.iter().map(StackMapFrame::byte_size).sum::<usize>()
    }

    /// Frame describing an instruction, if there is one
    pub fn frame_at(&self, target: InsnId) -> Option<&StackMapFrame> {
        self.frames.iter().find(|frame| frame.target == target)
    }

    /// Recompute offset deltas from the current bcis of the frame targets
    ///
    /// Frames are first put back in bci order. A compact frame whose delta no longer fits is
    /// promoted to its extended encoding (2 bytes larger). Promotion is never undone.
    pub(super) fn sync_offsets(&mut self, bci: impl Fn(InsnId) -> u32) -> Result<(), Error> {
        self.frames.sort_by_key(|frame| bci(frame.target));

        let mut previous_bci: Option<u32> = None;
        for frame in &mut self.frames {
            let frame_bci = bci(frame.target);
            let delta = match previous_bci {
                None => frame_bci,
                Some(previous) if previous == frame_bci => {
                    return Err(Error::ConflictingFrames(frame.target))
                }
                Some(previous) => frame_bci - previous - 1,
            };
            let delta = u16::try_from(delta).unwrap_or(u16::MAX);
            if !frame.kind.fits(delta) {
                if let Some(extended) = frame.kind.extended() {
                    log::debug!(
                        "promoting {} at bci {} to {} (offset delta {})",
                        frame.kind.name(),
                        frame_bci,
                        extended.name(),
                        delta
                    );
                    frame.kind = extended;
                }
            }
            frame.offset_delta = delta;
            previous_bci = Some(frame_bci);
        }
        Ok(())
    }

    /// Absolute state described by each frame, starting from the state on method entry
    pub fn expand(&self, initial: &FrameState) -> Vec<FrameState> {
        let mut states: Vec<FrameState> = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            let previous = states.last().unwrap_or(initial);
            let state = previous.apply(&frame.kind);
            states.push(state);
        }
        states
    }
}

/// Types of the locals and the operand stack at some instruction
///
/// Locals are listed the way stack map frames list them: a `long` or `double` is a single entry
/// even though it takes up two local slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameState {
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl FrameState {
    /// State described by a frame whose predecessor described `self`
    pub fn apply(&self, kind: &FrameKind) -> FrameState {
        match kind {
            FrameKind::Same | FrameKind::SameExtended => FrameState {
                locals: self.locals.clone(),
                stack: vec![],
            },
            FrameKind::SameLocals1StackItem(stack)
            | FrameKind::SameLocals1StackItemExtended(stack) => FrameState {
                locals: self.locals.clone(),
                stack: vec![*stack],
            },
            FrameKind::Chop(k) => {
                let kept = self.locals.len().saturating_sub(*k as usize);
                FrameState {
                    locals: self.locals[..kept].to_vec(),
                    stack: vec![],
                }
            }
            FrameKind::Append(extra) => FrameState {
                locals: self.locals.iter().chain(extra.iter()).copied().collect(),
                stack: vec![],
            },
            FrameKind::Full { locals, stack } => FrameState {
                locals: locals.clone(),
                stack: stack.clone(),
            },
        }
    }

    /// Encoding of this state that does not depend on the previous frame
    pub fn full_frame(&self) -> FrameKind {
        FrameKind::Full {
            locals: self.locals.clone(),
            stack: self.stack.clone(),
        }
    }
}

/// What a code body needs to know about the method that owns it
///
/// This is enough to reconstruct the implicit frame on method entry, which compressed stack map
/// frames are ultimately relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodContext {
    /// Class declaring the method
    pub class: ClassConstantIndex,

    /// Method descriptor (eg. `(ILjava/lang/String;)V`)
    pub descriptor: String,

    pub is_static: bool,

    /// Is the method an instance initializer (`<init>`)?
    pub is_constructor: bool,
}

impl MethodContext {
    /// Frame on entry to the method: `this` (if any) then the parameters, with an empty stack
    ///
    /// Class constants for parameter types are created if they are not already in the pool.
    pub fn entry_frame(&self, constants: &mut ConstantPool) -> Result<FrameState, Error> {
        let descriptor = MethodDescriptor::parse(&self.descriptor)?;
        let mut locals = vec![];
        if !self.is_static {
            locals.push(if self.is_constructor {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(self.class)
            });
        }
        for parameter in &descriptor.parameters {
            locals.push(VerificationType::from_field_type(parameter, constants)?);
        }
        Ok(FrameState {
            locals,
            stack: vec![],
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;

    fn frame(target: usize, kind: FrameKind) -> StackMapFrame {
        StackMapFrame::new(InsnId(target), kind)
    }

    #[test]
    fn deltas_are_relative_to_the_previous_frame() {
        let mut table = StackMapTable {
            frames: vec![
                frame(1, FrameKind::Same),
                frame(0, FrameKind::Same),
                frame(2, FrameKind::SameExtended),
            ],
        };
        let bcis = [3, 10, 70];
        table.sync_offsets(|id| bcis[id.0]).unwrap();

        let targets: Vec<_> = table.frames.iter().map(|f| f.target).collect();
        assert_eq!(targets, vec![InsnId(0), InsnId(1), InsnId(2)]);
        let deltas: Vec<_> = table.frames.iter().map(|f| f.offset_delta).collect();
        assert_eq!(deltas, vec![3, 6, 59]);

        // An extended frame with a small delta keeps its encoding
        assert_eq!(table.frames[2].kind, FrameKind::SameExtended);
    }

    #[test]
    fn promotion_adds_two_bytes() {
        let int = VerificationType::Integer;
        let mut table = StackMapTable {
            frames: vec![
                frame(0, FrameKind::Same),
                frame(1, FrameKind::SameLocals1StackItem(int)),
            ],
        };
        table.sync_offsets(|id| [10, 20][id.0]).unwrap();
        let before = table.byte_size();

        table.sync_offsets(|id| [100, 200][id.0]).unwrap();
        assert_eq!(table.frames[0].kind, FrameKind::SameExtended);
        assert_eq!(
            table.frames[1].kind,
            FrameKind::SameLocals1StackItemExtended(int)
        );
        assert_eq!(table.byte_size(), before + 4);

        // Shrinking the code again does not demote frames
        table.sync_offsets(|id| [1, 2][id.0]).unwrap();
        assert_eq!(table.frames[0].kind, FrameKind::SameExtended);
        assert_eq!(table.byte_size(), before + 4);
    }

    #[test]
    fn duplicate_frames_conflict() {
        let mut table = StackMapTable {
            frames: vec![frame(0, FrameKind::Same), frame(1, FrameKind::Same)],
        };
        assert!(matches!(
            table.sync_offsets(|_| 5),
            Err(Error::ConflictingFrames(_))
        ));
    }

    #[test]
    fn expand_frames() {
        let string = VerificationType::Object(ClassConstantIndex(ConstantIndex(4)));
        let table = StackMapTable {
            frames: vec![
                frame(0, FrameKind::Append(vec![VerificationType::Integer, VerificationType::Long])),
                frame(1, FrameKind::SameLocals1StackItem(string)),
                frame(2, FrameKind::Chop(2)),
                frame(
                    3,
                    FrameKind::Full {
                        locals: vec![VerificationType::Top],
                        stack: vec![VerificationType::Null],
                    },
                ),
                frame(4, FrameKind::SameExtended),
            ],
        };
        let initial = FrameState {
            locals: vec![string],
            stack: vec![],
        };
        let states = table.expand(&initial);
        assert_eq!(
            states[0].locals,
            vec![string, VerificationType::Integer, VerificationType::Long]
        );
        assert_eq!(states[1].locals, states[0].locals);
        assert_eq!(states[1].stack, vec![string]);
        assert_eq!(states[2].locals, vec![string]);
        assert!(states[2].stack.is_empty());
        assert_eq!(states[3].stack, vec![VerificationType::Null]);
        assert_eq!(states[4].locals, vec![VerificationType::Top]);
        assert!(states[4].stack.is_empty());
    }

    #[test]
    fn entry_frames() {
        let mut constants = ConstantPool::new();
        let this_class = constants.get_or_create_class_named("me/Foo").unwrap();

        let constructor = MethodContext {
            class: this_class,
            descriptor: String::from("(J[ILjava/lang/String;)V"),
            is_static: false,
            is_constructor: true,
        };
        let entry = constructor.entry_frame(&mut constants).unwrap();
        let int_array = constants.get_or_create_class_named("[I").unwrap();
        let string = constants.get_or_create_class_named("java/lang/String").unwrap();
        assert_eq!(
            entry.locals,
            vec![
                VerificationType::UninitializedThis,
                VerificationType::Long,
                VerificationType::Object(int_array),
                VerificationType::Object(string),
            ]
        );

        let instance = MethodContext {
            is_constructor: false,
            descriptor: String::from("(Z)I"),
            ..constructor.clone()
        };
        let entry = instance.entry_frame(&mut constants).unwrap();
        assert_eq!(
            entry.locals,
            vec![VerificationType::Object(this_class), VerificationType::Integer]
        );

        let static_method = MethodContext {
            is_static: true,
            descriptor: String::from("()V"),
            ..instance
        };
        assert!(static_method
            .entry_frame(&mut constants)
            .unwrap()
            .locals
            .is_empty());
    }
}
