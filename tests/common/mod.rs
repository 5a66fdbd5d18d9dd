//! Hand-assembled class files
//!
//! The sample class is laid out the way `javac` would lay it out, but every byte is written here
//! directly rather than through the crate's writer, so that round-trips are checked against an
//! independent encoding.

#![allow(dead_code)]

use byteorder::{BigEndian, WriteBytesExt};
use classpatch::jvm::class_file::{ConstantPool, Serialize};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;

/// Positions of the sample methods in the class
pub const CHOOSE: usize = 0;
pub const LOOP: usize = 1;
pub const GUARDED: usize = 2;
pub const SKIP: usize = 3;
pub const RUN: usize = 4;

pub fn attribute(name: u16, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![];
    bytes.write_u16::<BigEndian>(name).unwrap();
    bytes.write_u32::<BigEndian>(payload.len() as u32).unwrap();
    bytes.extend_from_slice(payload);
    bytes
}

/// Payload of a `Code` attribute (wrap it with `attribute`)
pub fn code_payload(
    max_stack: u16,
    max_locals: u16,
    code: &[u8],
    exception_table: &[[u16; 4]],
    attributes: &[Vec<u8>],
) -> Vec<u8> {
    let mut bytes = vec![];
    bytes.write_u16::<BigEndian>(max_stack).unwrap();
    bytes.write_u16::<BigEndian>(max_locals).unwrap();
    bytes.write_u32::<BigEndian>(code.len() as u32).unwrap();
    bytes.extend_from_slice(code);
    bytes
        .write_u16::<BigEndian>(exception_table.len() as u16)
        .unwrap();
    for entry in exception_table {
        for field in entry {
            bytes.write_u16::<BigEndian>(*field).unwrap();
        }
    }
    bytes.write_u16::<BigEndian>(attributes.len() as u16).unwrap();
    for attribute in attributes {
        bytes.extend_from_slice(attribute);
    }
    bytes
}

pub fn method(access_flags: u16, name: u16, descriptor: u16, attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = vec![];
    bytes.write_u16::<BigEndian>(access_flags).unwrap();
    bytes.write_u16::<BigEndian>(name).unwrap();
    bytes.write_u16::<BigEndian>(descriptor).unwrap();
    bytes.write_u16::<BigEndian>(attributes.len() as u16).unwrap();
    for attribute in attributes {
        bytes.extend_from_slice(attribute);
    }
    bytes
}

pub fn class_file(
    constants: &ConstantPool,
    this_class: u16,
    super_class: u16,
    methods: &[Vec<u8>],
) -> Vec<u8> {
    let mut bytes = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
    constants.serialize(&mut bytes).unwrap();
    bytes
        .write_u16::<BigEndian>(ACC_PUBLIC | ACC_SUPER)
        .unwrap();
    bytes.write_u16::<BigEndian>(this_class).unwrap();
    bytes.write_u16::<BigEndian>(super_class).unwrap();
    bytes.write_u16::<BigEndian>(0).unwrap(); // interfaces
    bytes.write_u16::<BigEndian>(0).unwrap(); // fields
    bytes.write_u16::<BigEndian>(methods.len() as u16).unwrap();
    for method in methods {
        bytes.extend_from_slice(method);
    }
    bytes.write_u16::<BigEndian>(0).unwrap(); // attributes
    bytes
}

pub fn utf8(constants: &mut ConstantPool, text: &str) -> u16 {
    constants.get_or_create_utf8(text).unwrap().0 .0
}

pub fn class(constants: &mut ConstantPool, name: &str) -> u16 {
    constants.get_or_create_class_named(name).unwrap().0 .0
}

/// Pool and the indices the sample methods refer to
pub struct SamplePool {
    pub constants: ConstantPool,
    pub this_class: u16,
    pub super_class: u16,
    pub throwable: u16,
    pub run: u16,
    pub code: u16,
    pub stack_map_table: u16,
    pub line_number_table: u16,
}

pub fn sample_pool() -> SamplePool {
    let mut constants = ConstantPool::new();
    let this_class = class(&mut constants, "me/Sample");
    let super_class = class(&mut constants, "java/lang/Object");
    let throwable = class(&mut constants, "java/lang/Throwable");
    let run = constants
        .get_or_create_methodref_named("me/Sample", "run", "()V")
        .unwrap();
    let run = run.0 .0;
    let code = utf8(&mut constants, "Code");
    let stack_map_table = utf8(&mut constants, "StackMapTable");
    let line_number_table = utf8(&mut constants, "LineNumberTable");
    SamplePool {
        constants,
        this_class,
        super_class,
        throwable,
        run,
        code,
        stack_map_table,
        line_number_table,
    }
}

/// ```java
/// class Sample {
///     static int choose(int x) {
///         switch (x) { case 0: return 1; case 1: return 2; case 2: return 3; default: return -1; }
///     }
///     static void loop(int n) { for (int i = 0; i < n; i++); }
///     static void guarded() { try { run(); } catch (Throwable t) { throw t; } }
///     static void skip(int x) { if (x != 0) x++; }
///     static void run() { }
/// }
/// ```
pub fn sample_class() -> Vec<u8> {
    let SamplePool {
        mut constants,
        this_class,
        super_class,
        throwable,
        run,
        code,
        stack_map_table,
        line_number_table,
    } = sample_pool();

    #[rustfmt::skip]
    let choose_code = [
        0x1a,                   // 0: iload_0
        0xaa, 0x00, 0x00,       // 1: tableswitch (2 bytes padding)
        0, 0, 0, 33,            //    default -> 34
        0, 0, 0, 0,             //    low
        0, 0, 0, 2,             //    high
        0, 0, 0, 27,            //    0 -> 28
        0, 0, 0, 29,            //    1 -> 30
        0, 0, 0, 31,            //    2 -> 32
        0x04, 0xac,             // 28: iconst_1, ireturn
        0x05, 0xac,             // 30: iconst_2, ireturn
        0x06, 0xac,             // 32: iconst_3, ireturn
        0x02, 0xac,             // 34: iconst_m1, ireturn
    ];
    let choose_frames = attribute(stack_map_table, &[0, 4, 28, 1, 1, 1]);
    #[rustfmt::skip]
    let choose_lines = attribute(line_number_table, &[
        0, 3,
        0, 0, 0, 3,
        0, 28, 0, 4,
        0, 34, 0, 6,
    ]);
    let choose = method(
        ACC_STATIC,
        utf8(&mut constants, "choose"),
        utf8(&mut constants, "(I)I"),
        &[attribute(
            code,
            &code_payload(1, 1, &choose_code, &[], &[choose_frames, choose_lines]),
        )],
    );

    #[rustfmt::skip]
    let loop_code = [
        0x03,                   // 0: iconst_0
        0x3c,                   // 1: istore_1
        0xa7, 0x00, 0x06,       // 2: goto 8
        0x84, 0x01, 0x01,       // 5: iinc 1 1
        0x1b,                   // 8: iload_1
        0x1a,                   // 9: iload_0
        0xa1, 0xff, 0xfb,       // 10: if_icmplt 5
        0xb1,                   // 13: return
    ];
    let loop_frames = attribute(stack_map_table, &[0, 2, 252, 0, 5, 1, 2]);
    let loop_method = method(
        ACC_STATIC,
        utf8(&mut constants, "loop"),
        utf8(&mut constants, "(I)V"),
        &[attribute(
            code,
            &code_payload(2, 2, &loop_code, &[], &[loop_frames]),
        )],
    );

    let [run_hi, run_lo] = run.to_be_bytes();
    #[rustfmt::skip]
    let guarded_code = [
        0xb8, run_hi, run_lo,   // 0: invokestatic run
        0xa7, 0x00, 0x06,       // 3: goto 9
        0x4b,                   // 6: astore_0
        0x2a,                   // 7: aload_0
        0xbf,                   // 8: athrow
        0xb1,                   // 9: return
    ];
    let [throwable_hi, throwable_lo] = throwable.to_be_bytes();
    let guarded_frames = attribute(
        stack_map_table,
        &[0, 2, 64 + 6, 7, throwable_hi, throwable_lo, 2],
    );
    let void_descriptor = utf8(&mut constants, "()V");
    let guarded = method(
        ACC_STATIC,
        utf8(&mut constants, "guarded"),
        void_descriptor,
        &[attribute(
            code,
            &code_payload(1, 1, &guarded_code, &[[0, 3, 6, 0]], &[guarded_frames]),
        )],
    );

    #[rustfmt::skip]
    let skip_code = [
        0x1a,                   // 0: iload_0
        0x99, 0x00, 0x06,       // 1: ifeq 7
        0x84, 0x00, 0x01,       // 4: iinc 0 1
        0xb1,                   // 7: return
    ];
    let skip_frames = attribute(stack_map_table, &[0, 1, 7]);
    let skip = method(
        ACC_STATIC,
        utf8(&mut constants, "skip"),
        utf8(&mut constants, "(I)V"),
        &[attribute(
            code,
            &code_payload(1, 1, &skip_code, &[], &[skip_frames]),
        )],
    );

    let run_method = method(
        ACC_STATIC,
        utf8(&mut constants, "run"),
        void_descriptor,
        &[attribute(code, &code_payload(0, 0, &[0xb1], &[], &[]))],
    );

    class_file(
        &constants,
        this_class,
        super_class,
        &[choose, loop_method, guarded, skip, run_method],
    )
}
