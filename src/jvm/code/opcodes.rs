//! Metadata for every opcode in the JVM instruction set
//!
//! Instead of a type per instruction, each opcode gets one row in the table below: its byte, its
//! mnemonic (only ever used for diagnostics), the layout of its operands, and its effect on the
//! height of the operand stack. Stack effects count values, not slots, so `long` and `double`
//! values count as one. The `pop2`/`dup2` family is counted as operating on a single value.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5

/// Layout of the operands following an opcode byte
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OperandFormat {
    NoOperands,
    /// Unsigned byte local variable index (can be widened with `wide`)
    LocalIndex,
    /// Local variable index and signed increment (can be widened with `wide`)
    IInc,
    SignedByte,
    SignedShort,
    /// Primitive array type code
    ArrayType,
    /// Unsigned byte constant pool index
    Ldc,
    /// Unsigned short constant pool index
    ConstantIndex,
    InvokeInterface,
    InvokeDynamic,
    MultiANewArray,
    /// Signed 16-bit relative jump
    Branch,
    /// Signed 32-bit relative jump
    WideBranch,
    TableSwitch,
    LookupSwitch,
    Wide,
}

macro_rules! opcodes {
    ($($variant:ident = $byte:literal, $mnemonic:literal, $format:ident, $delta:expr;)*) => {
        /// Opcode byte of an instruction
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $byte,)*
        }

        impl Opcode {
            /// Decode an opcode byte (reserved and unassigned bytes are `None`)
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $($byte => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            pub fn format(self) -> OperandFormat {
                match self {
                    $(Opcode::$variant => OperandFormat::$format,)*
                }
            }

            /// Fixed change in operand stack height, or `None` when it depends on the operands
            /// (invokes and `multianewarray`)
            pub fn stack_delta(self) -> Option<i32> {
                match self {
                    $(Opcode::$variant => $delta,)*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", NoOperands, Some(0);
    AConstNull = 0x01, "aconst_null", NoOperands, Some(1);
    IConstM1 = 0x02, "iconst_m1", NoOperands, Some(1);
    IConst0 = 0x03, "iconst_0", NoOperands, Some(1);
    IConst1 = 0x04, "iconst_1", NoOperands, Some(1);
    IConst2 = 0x05, "iconst_2", NoOperands, Some(1);
    IConst3 = 0x06, "iconst_3", NoOperands, Some(1);
    IConst4 = 0x07, "iconst_4", NoOperands, Some(1);
    IConst5 = 0x08, "iconst_5", NoOperands, Some(1);
    LConst0 = 0x09, "lconst_0", NoOperands, Some(1);
    LConst1 = 0x0a, "lconst_1", NoOperands, Some(1);
    FConst0 = 0x0b, "fconst_0", NoOperands, Some(1);
    FConst1 = 0x0c, "fconst_1", NoOperands, Some(1);
    FConst2 = 0x0d, "fconst_2", NoOperands, Some(1);
    DConst0 = 0x0e, "dconst_0", NoOperands, Some(1);
    DConst1 = 0x0f, "dconst_1", NoOperands, Some(1);
    BiPush = 0x10, "bipush", SignedByte, Some(1);
    SiPush = 0x11, "sipush", SignedShort, Some(1);
    Ldc = 0x12, "ldc", Ldc, Some(1);
    LdcW = 0x13, "ldc_w", ConstantIndex, Some(1);
    Ldc2W = 0x14, "ldc2_w", ConstantIndex, Some(1);
    ILoad = 0x15, "iload", LocalIndex, Some(1);
    LLoad = 0x16, "lload", LocalIndex, Some(1);
    FLoad = 0x17, "fload", LocalIndex, Some(1);
    DLoad = 0x18, "dload", LocalIndex, Some(1);
    ALoad = 0x19, "aload", LocalIndex, Some(1);
    ILoad0 = 0x1a, "iload_0", NoOperands, Some(1);
    ILoad1 = 0x1b, "iload_1", NoOperands, Some(1);
    ILoad2 = 0x1c, "iload_2", NoOperands, Some(1);
    ILoad3 = 0x1d, "iload_3", NoOperands, Some(1);
    LLoad0 = 0x1e, "lload_0", NoOperands, Some(1);
    LLoad1 = 0x1f, "lload_1", NoOperands, Some(1);
    LLoad2 = 0x20, "lload_2", NoOperands, Some(1);
    LLoad3 = 0x21, "lload_3", NoOperands, Some(1);
    FLoad0 = 0x22, "fload_0", NoOperands, Some(1);
    FLoad1 = 0x23, "fload_1", NoOperands, Some(1);
    FLoad2 = 0x24, "fload_2", NoOperands, Some(1);
    FLoad3 = 0x25, "fload_3", NoOperands, Some(1);
    DLoad0 = 0x26, "dload_0", NoOperands, Some(1);
    DLoad1 = 0x27, "dload_1", NoOperands, Some(1);
    DLoad2 = 0x28, "dload_2", NoOperands, Some(1);
    DLoad3 = 0x29, "dload_3", NoOperands, Some(1);
    ALoad0 = 0x2a, "aload_0", NoOperands, Some(1);
    ALoad1 = 0x2b, "aload_1", NoOperands, Some(1);
    ALoad2 = 0x2c, "aload_2", NoOperands, Some(1);
    ALoad3 = 0x2d, "aload_3", NoOperands, Some(1);
    IALoad = 0x2e, "iaload", NoOperands, Some(-1);
    LALoad = 0x2f, "laload", NoOperands, Some(-1);
    FALoad = 0x30, "faload", NoOperands, Some(-1);
    DALoad = 0x31, "daload", NoOperands, Some(-1);
    AALoad = 0x32, "aaload", NoOperands, Some(-1);
    BALoad = 0x33, "baload", NoOperands, Some(-1);
    CALoad = 0x34, "caload", NoOperands, Some(-1);
    SALoad = 0x35, "saload", NoOperands, Some(-1);
    IStore = 0x36, "istore", LocalIndex, Some(-1);
    LStore = 0x37, "lstore", LocalIndex, Some(-1);
    FStore = 0x38, "fstore", LocalIndex, Some(-1);
    DStore = 0x39, "dstore", LocalIndex, Some(-1);
    AStore = 0x3a, "astore", LocalIndex, Some(-1);
    IStore0 = 0x3b, "istore_0", NoOperands, Some(-1);
    IStore1 = 0x3c, "istore_1", NoOperands, Some(-1);
    IStore2 = 0x3d, "istore_2", NoOperands, Some(-1);
    IStore3 = 0x3e, "istore_3", NoOperands, Some(-1);
    LStore0 = 0x3f, "lstore_0", NoOperands, Some(-1);
    LStore1 = 0x40, "lstore_1", NoOperands, Some(-1);
    LStore2 = 0x41, "lstore_2", NoOperands, Some(-1);
    LStore3 = 0x42, "lstore_3", NoOperands, Some(-1);
    FStore0 = 0x43, "fstore_0", NoOperands, Some(-1);
    FStore1 = 0x44, "fstore_1", NoOperands, Some(-1);
    FStore2 = 0x45, "fstore_2", NoOperands, Some(-1);
    FStore3 = 0x46, "fstore_3", NoOperands, Some(-1);
    DStore0 = 0x47, "dstore_0", NoOperands, Some(-1);
    DStore1 = 0x48, "dstore_1", NoOperands, Some(-1);
    DStore2 = 0x49, "dstore_2", NoOperands, Some(-1);
    DStore3 = 0x4a, "dstore_3", NoOperands, Some(-1);
    AStore0 = 0x4b, "astore_0", NoOperands, Some(-1);
    AStore1 = 0x4c, "astore_1", NoOperands, Some(-1);
    AStore2 = 0x4d, "astore_2", NoOperands, Some(-1);
    AStore3 = 0x4e, "astore_3", NoOperands, Some(-1);
    IAStore = 0x4f, "iastore", NoOperands, Some(-3);
    LAStore = 0x50, "lastore", NoOperands, Some(-3);
    FAStore = 0x51, "fastore", NoOperands, Some(-3);
    DAStore = 0x52, "dastore", NoOperands, Some(-3);
    AAStore = 0x53, "aastore", NoOperands, Some(-3);
    BAStore = 0x54, "bastore", NoOperands, Some(-3);
    CAStore = 0x55, "castore", NoOperands, Some(-3);
    SAStore = 0x56, "sastore", NoOperands, Some(-3);
    Pop = 0x57, "pop", NoOperands, Some(-1);
    Pop2 = 0x58, "pop2", NoOperands, Some(-1);
    Dup = 0x59, "dup", NoOperands, Some(1);
    DupX1 = 0x5a, "dup_x1", NoOperands, Some(1);
    DupX2 = 0x5b, "dup_x2", NoOperands, Some(1);
    Dup2 = 0x5c, "dup2", NoOperands, Some(1);
    Dup2X1 = 0x5d, "dup2_x1", NoOperands, Some(1);
    Dup2X2 = 0x5e, "dup2_x2", NoOperands, Some(1);
    Swap = 0x5f, "swap", NoOperands, Some(0);
    IAdd = 0x60, "iadd", NoOperands, Some(-1);
    LAdd = 0x61, "ladd", NoOperands, Some(-1);
    FAdd = 0x62, "fadd", NoOperands, Some(-1);
    DAdd = 0x63, "dadd", NoOperands, Some(-1);
    ISub = 0x64, "isub", NoOperands, Some(-1);
    LSub = 0x65, "lsub", NoOperands, Some(-1);
    FSub = 0x66, "fsub", NoOperands, Some(-1);
    DSub = 0x67, "dsub", NoOperands, Some(-1);
    IMul = 0x68, "imul", NoOperands, Some(-1);
    LMul = 0x69, "lmul", NoOperands, Some(-1);
    FMul = 0x6a, "fmul", NoOperands, Some(-1);
    DMul = 0x6b, "dmul", NoOperands, Some(-1);
    IDiv = 0x6c, "idiv", NoOperands, Some(-1);
    LDiv = 0x6d, "ldiv", NoOperands, Some(-1);
    FDiv = 0x6e, "fdiv", NoOperands, Some(-1);
    DDiv = 0x6f, "ddiv", NoOperands, Some(-1);
    IRem = 0x70, "irem", NoOperands, Some(-1);
    LRem = 0x71, "lrem", NoOperands, Some(-1);
    FRem = 0x72, "frem", NoOperands, Some(-1);
    DRem = 0x73, "drem", NoOperands, Some(-1);
    INeg = 0x74, "ineg", NoOperands, Some(0);
    LNeg = 0x75, "lneg", NoOperands, Some(0);
    FNeg = 0x76, "fneg", NoOperands, Some(0);
    DNeg = 0x77, "dneg", NoOperands, Some(0);
    IShl = 0x78, "ishl", NoOperands, Some(-1);
    LShl = 0x79, "lshl", NoOperands, Some(-1);
    IShr = 0x7a, "ishr", NoOperands, Some(-1);
    LShr = 0x7b, "lshr", NoOperands, Some(-1);
    IUShr = 0x7c, "iushr", NoOperands, Some(-1);
    LUShr = 0x7d, "lushr", NoOperands, Some(-1);
    IAnd = 0x7e, "iand", NoOperands, Some(-1);
    LAnd = 0x7f, "land", NoOperands, Some(-1);
    IOr = 0x80, "ior", NoOperands, Some(-1);
    LOr = 0x81, "lor", NoOperands, Some(-1);
    IXor = 0x82, "ixor", NoOperands, Some(-1);
    LXor = 0x83, "lxor", NoOperands, Some(-1);
    IInc = 0x84, "iinc", IInc, Some(0);
    I2L = 0x85, "i2l", NoOperands, Some(0);
    I2F = 0x86, "i2f", NoOperands, Some(0);
    I2D = 0x87, "i2d", NoOperands, Some(0);
    L2I = 0x88, "l2i", NoOperands, Some(0);
    L2F = 0x89, "l2f", NoOperands, Some(0);
    L2D = 0x8a, "l2d", NoOperands, Some(0);
    F2I = 0x8b, "f2i", NoOperands, Some(0);
    F2L = 0x8c, "f2l", NoOperands, Some(0);
    F2D = 0x8d, "f2d", NoOperands, Some(0);
    D2I = 0x8e, "d2i", NoOperands, Some(0);
    D2L = 0x8f, "d2l", NoOperands, Some(0);
    D2F = 0x90, "d2f", NoOperands, Some(0);
    I2B = 0x91, "i2b", NoOperands, Some(0);
    I2C = 0x92, "i2c", NoOperands, Some(0);
    I2S = 0x93, "i2s", NoOperands, Some(0);
    LCmp = 0x94, "lcmp", NoOperands, Some(-1);
    FCmpL = 0x95, "fcmpl", NoOperands, Some(-1);
    FCmpG = 0x96, "fcmpg", NoOperands, Some(-1);
    DCmpL = 0x97, "dcmpl", NoOperands, Some(-1);
    DCmpG = 0x98, "dcmpg", NoOperands, Some(-1);
    IfEq = 0x99, "ifeq", Branch, Some(-1);
    IfNe = 0x9a, "ifne", Branch, Some(-1);
    IfLt = 0x9b, "iflt", Branch, Some(-1);
    IfGe = 0x9c, "ifge", Branch, Some(-1);
    IfGt = 0x9d, "ifgt", Branch, Some(-1);
    IfLe = 0x9e, "ifle", Branch, Some(-1);
    IfICmpEq = 0x9f, "if_icmpeq", Branch, Some(-2);
    IfICmpNe = 0xa0, "if_icmpne", Branch, Some(-2);
    IfICmpLt = 0xa1, "if_icmplt", Branch, Some(-2);
    IfICmpGe = 0xa2, "if_icmpge", Branch, Some(-2);
    IfICmpGt = 0xa3, "if_icmpgt", Branch, Some(-2);
    IfICmpLe = 0xa4, "if_icmple", Branch, Some(-2);
    IfACmpEq = 0xa5, "if_acmpeq", Branch, Some(-2);
    IfACmpNe = 0xa6, "if_acmpne", Branch, Some(-2);
    Goto = 0xa7, "goto", Branch, Some(0);
    Jsr = 0xa8, "jsr", Branch, Some(1);
    Ret = 0xa9, "ret", LocalIndex, Some(0);
    TableSwitch = 0xaa, "tableswitch", TableSwitch, Some(-1);
    LookupSwitch = 0xab, "lookupswitch", LookupSwitch, Some(-1);
    IReturn = 0xac, "ireturn", NoOperands, Some(-1);
    LReturn = 0xad, "lreturn", NoOperands, Some(-1);
    FReturn = 0xae, "freturn", NoOperands, Some(-1);
    DReturn = 0xaf, "dreturn", NoOperands, Some(-1);
    AReturn = 0xb0, "areturn", NoOperands, Some(-1);
    Return = 0xb1, "return", NoOperands, Some(0);
    GetStatic = 0xb2, "getstatic", ConstantIndex, Some(1);
    PutStatic = 0xb3, "putstatic", ConstantIndex, Some(-1);
    GetField = 0xb4, "getfield", ConstantIndex, Some(0);
    PutField = 0xb5, "putfield", ConstantIndex, Some(-2);
    InvokeVirtual = 0xb6, "invokevirtual", ConstantIndex, None;
    InvokeSpecial = 0xb7, "invokespecial", ConstantIndex, None;
    InvokeStatic = 0xb8, "invokestatic", ConstantIndex, None;
    InvokeInterface = 0xb9, "invokeinterface", InvokeInterface, None;
    InvokeDynamic = 0xba, "invokedynamic", InvokeDynamic, None;
    New = 0xbb, "new", ConstantIndex, Some(1);
    NewArray = 0xbc, "newarray", ArrayType, Some(0);
    ANewArray = 0xbd, "anewarray", ConstantIndex, Some(0);
    ArrayLength = 0xbe, "arraylength", NoOperands, Some(0);
    AThrow = 0xbf, "athrow", NoOperands, Some(-1);
    CheckCast = 0xc0, "checkcast", ConstantIndex, Some(0);
    InstanceOf = 0xc1, "instanceof", ConstantIndex, Some(0);
    MonitorEnter = 0xc2, "monitorenter", NoOperands, Some(-1);
    MonitorExit = 0xc3, "monitorexit", NoOperands, Some(-1);
    Wide = 0xc4, "wide", Wide, None;
    MultiANewArray = 0xc5, "multianewarray", MultiANewArray, None;
    IfNull = 0xc6, "ifnull", Branch, Some(-1);
    IfNonNull = 0xc7, "ifnonnull", Branch, Some(-1);
    GotoW = 0xc8, "goto_w", WideBranch, Some(0);
    JsrW = 0xc9, "jsr_w", WideBranch, Some(1);
}

impl Opcode {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Whether control never falls through to the next instruction
    pub fn is_unconditional_transfer(self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::GotoW
                | Opcode::Ret
                | Opcode::TableSwitch
                | Opcode::LookupSwitch
                | Opcode::IReturn
                | Opcode::LReturn
                | Opcode::FReturn
                | Opcode::DReturn
                | Opcode::AReturn
                | Opcode::Return
                | Opcode::AThrow
        )
    }

    /// Branch with the opposite condition, for conditional 16-bit branches
    pub fn inverted(self) -> Option<Opcode> {
        let inverse = match self {
            Opcode::IfEq => Opcode::IfNe,
            Opcode::IfNe => Opcode::IfEq,
            Opcode::IfLt => Opcode::IfGe,
            Opcode::IfGe => Opcode::IfLt,
            Opcode::IfGt => Opcode::IfLe,
            Opcode::IfLe => Opcode::IfGt,
            Opcode::IfICmpEq => Opcode::IfICmpNe,
            Opcode::IfICmpNe => Opcode::IfICmpEq,
            Opcode::IfICmpLt => Opcode::IfICmpGe,
            Opcode::IfICmpGe => Opcode::IfICmpLt,
            Opcode::IfICmpGt => Opcode::IfICmpLe,
            Opcode::IfICmpLe => Opcode::IfICmpGt,
            Opcode::IfACmpEq => Opcode::IfACmpNe,
            Opcode::IfACmpNe => Opcode::IfACmpEq,
            Opcode::IfNull => Opcode::IfNonNull,
            Opcode::IfNonNull => Opcode::IfNull,
            _ => return None,
        };
        Some(inverse)
    }

    /// 32-bit form of an unconditional 16-bit branch
    pub fn widened(self) -> Option<Opcode> {
        match self {
            Opcode::Goto => Some(Opcode::GotoW),
            Opcode::Jsr => Some(Opcode::JsrW),
            _ => None,
        }
    }
}
