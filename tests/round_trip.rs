mod common;

use classpatch::instrument::relax_all;
use classpatch::jvm::class_file::{ClassFile, ConstantPool, Serialize};
use classpatch::jvm::code::{
    CodeAttribute, CodeBody, FrameKind, Instruction, LineNumber, Opcode, VerificationType,
};
use classpatch::jvm::Error;
use classpatch::util::Width;
use common::*;

fn serialized(class: &ClassFile) -> Vec<u8> {
    let mut bytes = vec![];
    class.serialize(&mut bytes).unwrap();
    assert_eq!(bytes.len(), class.byte_size());
    bytes
}

/// Layout positions of the targets of every instruction
fn target_positions(code: &CodeBody) -> Vec<Vec<usize>> {
    code.instructions()
        .map(|(_, insn)| {
            insn.labels()
                .iter()
                .map(|jump| code.position(jump.target).unwrap())
                .collect()
        })
        .collect()
}

#[test]
fn untouched_class_is_byte_exact() {
    let bytes = sample_class();
    let mut class = ClassFile::read(bytes.as_slice()).unwrap();
    assert_eq!(class.byte_size(), bytes.len());
    assert_eq!(serialized(&class), bytes);

    // Relaxing code that already fits changes nothing
    relax_all(&mut class).unwrap();
    assert_eq!(serialized(&class), bytes);
}

#[test]
fn bcis_increase_from_zero() {
    let bytes = sample_class();
    let mut class = ClassFile::read(bytes.as_slice()).unwrap();
    relax_all(&mut class).unwrap();

    for method in &class.methods {
        let code = method.code().unwrap();
        let mut expected_bci = 0;
        for (id, insn) in code.instructions() {
            assert_eq!(code.bci(id), expected_bci);
            expected_bci += insn.width() as u32;
        }
        assert_eq!(code.code_length(), expected_bci);
    }
}

#[test]
fn references_are_resolved() {
    let bytes = sample_class();
    let class = ClassFile::read(bytes.as_slice()).unwrap();

    // Switch: default first, then the cases
    let choose = class.methods[CHOOSE].code().unwrap();
    assert_eq!(target_positions(choose)[1], vec![8, 2, 4, 6]);
    let frames: Vec<usize> = choose
        .stack_map_table()
        .unwrap()
        .frames
        .iter()
        .map(|frame| choose.position(frame.target).unwrap())
        .collect();
    assert_eq!(frames, vec![2, 4, 6, 8]);
    let lines = choose
        .attributes
        .iter()
        .find_map(|attribute| match attribute {
            CodeAttribute::LineNumberTable(_, table) => Some(table.0.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        lines,
        vec![
            LineNumber {
                start: choose.ids()[0],
                line: 3
            },
            LineNumber {
                start: choose.ids()[2],
                line: 4
            },
            LineNumber {
                start: choose.ids()[8],
                line: 6
            },
        ]
    );

    // Backwards branch
    let loop_code = class.methods[LOOP].code().unwrap();
    assert_eq!(target_positions(loop_code)[2], vec![4]);
    assert_eq!(target_positions(loop_code)[6], vec![3]);
    assert_eq!(
        loop_code.stack_map_table().unwrap().frames[0].kind,
        FrameKind::Append(vec![VerificationType::Integer])
    );

    // Exception range ending on the `goto`
    let guarded = class.methods[GUARDED].code().unwrap();
    let handler = &guarded.exception_table[0];
    assert_eq!(handler.start, guarded.ids()[0]);
    assert_eq!(handler.end, Some(guarded.ids()[1]));
    assert_eq!(handler.handler, guarded.ids()[2]);
    assert_eq!(handler.catch_type, None);
    match &guarded.stack_map_table().unwrap().frames[0].kind {
        FrameKind::SameLocals1StackItem(VerificationType::Object(caught)) => {
            assert_eq!(
                class.constants.class_name(*caught).unwrap(),
                "java/lang/Throwable"
            )
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn method_context() {
    let bytes = sample_class();
    let class = ClassFile::read(bytes.as_slice()).unwrap();
    let context = class.methods[LOOP].code().unwrap().method.as_ref().unwrap();
    assert_eq!(context.descriptor, "(I)V");
    assert!(context.is_static);
    assert_eq!(class.constants.class_name(context.class).unwrap(), "me/Sample");
}

/// Class with a single `static void f()` method, whose `Code` attribute gets built by `code`
fn single_method_class(code: impl FnOnce(&mut ConstantPool, u16) -> Vec<u8>) -> Vec<u8> {
    let SamplePool {
        mut constants,
        this_class,
        super_class,
        code: code_name,
        ..
    } = sample_pool();
    let name = utf8(&mut constants, "f");
    let descriptor = utf8(&mut constants, "()V");
    let code_attribute = code(&mut constants, code_name);
    let f = method(ACC_STATIC, name, descriptor, &[code_attribute]);
    class_file(&constants, this_class, super_class, &[f])
}

#[test]
fn unknown_code_attribute() {
    let bytes = single_method_class(|constants, code| {
        let custom = utf8(constants, "CustomOffsets");
        let custom = attribute(custom, &[0, 0]);
        attribute(code, &code_payload(0, 0, &[0xb1], &[], &[custom]))
    });
    assert!(matches!(
        ClassFile::read(bytes.as_slice()),
        Err(Error::UnknownAttribute(name)) if name == "CustomOffsets"
    ));
}

#[test]
fn code_length_mismatch() {
    let bytes = single_method_class(|_, code| {
        let mut payload = code_payload(0, 0, &[0xb1], &[], &[]);
        payload.push(0);
        attribute(code, &payload)
    });
    assert!(matches!(
        ClassFile::read(bytes.as_slice()),
        Err(Error::AttributeLengthMismatch {
            declared: 14,
            actual: 13,
            ..
        })
    ));
}

#[test]
fn line_number_table_length_mismatch() {
    let bytes = single_method_class(|constants, code| {
        let lines = utf8(constants, "LineNumberTable");
        let lines = attribute(lines, &[0, 1, 0, 0, 0, 7, 0xff]);
        attribute(code, &code_payload(0, 0, &[0xb1], &[], &[lines]))
    });
    assert!(matches!(
        ClassFile::read(bytes.as_slice()),
        Err(Error::AttributeLengthMismatch { name, declared: 7, actual: 6 }) if name == "LineNumberTable"
    ));
}

#[test]
fn malformed_code() {
    let unknown_opcode =
        single_method_class(|_, code| attribute(code, &code_payload(0, 0, &[0x00, 0xcb], &[], &[])));
    assert!(matches!(
        ClassFile::read(unknown_opcode.as_slice()),
        Err(Error::UnknownOpcode {
            opcode: 0xcb,
            bci: 1
        })
    ));

    // `goto` into the middle of itself
    let bad_target = single_method_class(|_, code| {
        attribute(code, &code_payload(0, 0, &[0xa7, 0x00, 0x01, 0xb1], &[], &[]))
    });
    assert!(matches!(
        ClassFile::read(bad_target.as_slice()),
        Err(Error::NoInstructionAtBci(1))
    ));

    // Exception range past the end of the code
    let bad_range = single_method_class(|_, code| {
        attribute(code, &code_payload(0, 0, &[0x00, 0xb1], &[[0, 5, 1, 0]], &[]))
    });
    assert!(matches!(
        ClassFile::read(bad_range.as_slice()),
        Err(Error::NoInstructionAtBci(5))
    ));
}

#[test]
fn exception_range_to_end_of_code() {
    let bytes = single_method_class(|_, code| {
        attribute(code, &code_payload(1, 0, &[0x00, 0xb1], &[[0, 2, 1, 0]], &[]))
    });
    let class = ClassFile::read(bytes.as_slice()).unwrap();
    let code = class.methods[0].code().unwrap();
    assert_eq!(code.exception_table[0].end, None);
    assert_eq!(serialized(&class), bytes);
}

#[test]
fn wide_instructions_round_trip() {
    #[rustfmt::skip]
    let code_bytes = [
        0xc4, 0x15, 0x01, 0x00,             // 0: wide iload 256
        0xc4, 0x84, 0x01, 0x00, 0x00, 0x10, // 4: wide iinc 256 16
        0x57,                               // 10: pop
        0xc8, 0x00, 0x00, 0x00, 0x05,       // 11: goto_w 16
        0xb1,                               // 16: return
    ];
    let bytes = single_method_class(|_, code| {
        attribute(code, &code_payload(1, 257, &code_bytes, &[], &[]))
    });
    let mut class = ClassFile::read(bytes.as_slice()).unwrap();
    let code = class.methods[0].code().unwrap();
    assert_eq!(
        code.get(code.ids()[0]),
        &Instruction::WideLocal(Opcode::ILoad, 256)
    );
    assert!(matches!(
        code.get(code.ids()[3]),
        Instruction::WideBranch(Opcode::GotoW, jump) if jump.target == code.ids()[4]
    ));
    relax_all(&mut class).unwrap();
    assert_eq!(serialized(&class), bytes);
}
