mod common;

use classpatch::jvm::class_file::{ClassFile, Serialize};
use classpatch::jvm::code::{
    CodeBody, FrameKind, InsnId, Instruction, Jump, Opcode, VerificationType,
};
use classpatch::jvm::Error;
use common::*;

fn serialized(class: &ClassFile) -> Vec<u8> {
    let mut bytes = vec![];
    class.serialize(&mut bytes).unwrap();
    assert_eq!(bytes.len(), class.byte_size());
    bytes
}

fn sample() -> ClassFile {
    ClassFile::read(sample_class().as_slice()).unwrap()
}

/// Write the class out and read it back in
fn reread(class: &ClassFile) -> ClassFile {
    ClassFile::read(serialized(class).as_slice()).unwrap()
}

/// Insert `nop`s right before `anchor`
fn nops(code: &mut CodeBody, anchor: InsnId, count: usize) {
    let position = code.position(anchor).unwrap();
    for _ in 0..count {
        code.insert(position, Instruction::Simple(Opcode::Nop));
    }
}

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

fn frame_deltas(code: &CodeBody) -> Vec<u16> {
    code.stack_map_table()
        .unwrap()
        .frames
        .iter()
        .map(|frame| frame.offset_delta)
        .collect()
}

#[test]
fn switch_padding_absorbs_shift() {
    let mut class = sample();
    let code = class.methods[CHOOSE].code_mut().unwrap();
    code.insert(0, Instruction::Simple(Opcode::Nop));
    code.relax(&mut class.constants).unwrap();

    let code = class.methods[CHOOSE].code().unwrap();
    let switch = code.ids()[2];
    assert_eq!(code.bci(switch), 2);
    assert!(matches!(
        code.get(switch),
        Instruction::TableSwitch { padding: 1, .. }
    ));
    assert_eq!(code.bci(code.ids()[3]), 28);
    assert_eq!(code.code_length(), 36);
    assert_eq!(frame_deltas(code), vec![28, 1, 1, 1]);

    let again = reread(&class);
    let code = again.methods[CHOOSE].code().unwrap();
    assert_eq!(target_positions(code)[2], vec![9, 3, 5, 7]);
    assert_eq!(code.len(), 11);
}

#[test]
fn compact_frame_is_promoted() {
    let original = sample_class();
    let mut class = sample();
    let code = class.methods[CHOOSE].code_mut().unwrap();

    // Between `iconst_1` and its `ireturn`
    let ireturn = code.ids()[3];
    nops(code, ireturn, 70);
    code.relax(&mut class.constants).unwrap();

    let code = class.methods[CHOOSE].code().unwrap();
    assert_eq!(code.code_length(), 36 + 70);
    assert_eq!(frame_deltas(code), vec![28, 71, 1, 1]);
    let frames = &code.stack_map_table().unwrap().frames;
    assert_eq!(frames[0].kind, FrameKind::Same);
    assert_eq!(frames[1].kind, FrameKind::SameExtended);
    assert_eq!(frames[2].kind, FrameKind::Same);

    // 70 bytes of code plus 2 bytes of frame
    assert_eq!(serialized(&class).len(), original.len() + 72);

    let again = reread(&class);
    let code = again.methods[CHOOSE].code().unwrap();
    assert_eq!(target_positions(code)[1], vec![78, 2, 74, 76]);
    match code.get(code.ids()[1]) {
        Instruction::TableSwitch { targets, .. } => assert_eq!(targets[1].offset, 99),
        other => panic!("unexpected instruction {:?}", other),
    }

    // Shrinking the code back keeps the extended encoding
    let mut class = again;
    let code = class.methods[CHOOSE].code_mut().unwrap();
    for _ in 0..70 {
        let nop = code.ids()[3];
        code.remove(nop).unwrap();
    }
    code.relax(&mut class.constants).unwrap();
    let code = class.methods[CHOOSE].code().unwrap();
    assert_eq!(frame_deltas(code), vec![28, 1, 1, 1]);
    assert_eq!(
        code.stack_map_table().unwrap().frames[1].kind,
        FrameKind::SameExtended
    );
    assert_eq!(serialized(&class).len(), original.len() + 2);
}

#[test]
fn insert_then_remove_is_a_no_op() {
    let original = sample_class();
    let mut class = sample();
    let code = class.methods[LOOP].code_mut().unwrap();
    let targets_before = target_positions(code);

    // Take over every reference to `iload_1`, then give them back
    let iload = code.ids()[4];
    let nop = code.insert_before(iload, Instruction::Simple(Opcode::Nop));
    code.replace_targets(iload, nop);
    code.relax(&mut class.constants).unwrap();
    {
        let code = class.methods[LOOP].code().unwrap();
        assert_eq!(code.get(code.ids()[2]), &Instruction::Branch(Opcode::Goto, Jump::to(nop)));
        assert_eq!(code.stack_map_table().unwrap().frames[1].target, nop);
    }

    let code = class.methods[LOOP].code_mut().unwrap();
    code.remove(nop).unwrap();
    code.relax(&mut class.constants).unwrap();

    let code = class.methods[LOOP].code().unwrap();
    assert_eq!(target_positions(code), targets_before);
    assert_eq!(code.stack_map_table().unwrap().frames[1].target, iload);
    assert_eq!(serialized(&class), original);
}

#[test]
fn backward_branch_through_island() {
    let mut class = sample();
    let code = class.methods[LOOP].code_mut().unwrap();
    let iinc = code.ids()[3];
    let iload = code.ids()[4];
    let branch = code.ids()[6];
    nops(code, iload, 33000);
    code.relax(&mut class.constants).unwrap();

    let code = class.methods[LOOP].code().unwrap();
    let island = *code.ids().last().unwrap();
    assert_eq!(code.len(), 8 + 33000 + 1);
    assert_eq!(code.code_length(), 33021);

    // The `goto` could simply be widened
    assert!(matches!(
        code.get(code.ids()[2]),
        Instruction::WideBranch(Opcode::GotoW, jump) if jump.target == iload
    ));

    // The conditional branch keeps its opcode and jumps forward to the island after `return`
    assert_eq!(
        code.get(branch),
        &Instruction::Branch(Opcode::IfICmpLt, Jump::to(island))
    );
    assert_eq!(code.bci(island), 33016);
    assert!(matches!(
        code.get(island),
        Instruction::WideBranch(Opcode::GotoW, jump) if jump.target == iinc && jump.offset == 7 - 33016
    ));

    let frames = &code.stack_map_table().unwrap().frames;
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1].kind, FrameKind::SameExtended);
    assert_eq!(frames[2].target, island);
    assert_eq!(
        frames[2].kind,
        FrameKind::Full {
            locals: vec![VerificationType::Integer, VerificationType::Integer],
            stack: vec![],
        }
    );
    assert_eq!(frame_deltas(code), vec![7, 33002, 5]);

    let again = reread(&class);
    let code = again.methods[LOOP].code().unwrap();
    assert_eq!(target_positions(code)[8 + 33000 - 2], vec![8 + 33000]);
    assert_eq!(target_positions(code)[8 + 33000], vec![3]);
}

#[test]
fn trampoline_without_frames() {
    let mut class = sample();
    let code = class.methods[SKIP].code_mut().unwrap();
    code.attributes.clear();
    let branch = code.ids()[1];
    let iinc = code.ids()[2];
    let ret = code.ids()[3];
    nops(code, ret, 40000);
    code.relax(&mut class.constants).unwrap();

    let code = class.methods[SKIP].code().unwrap();
    assert_eq!(
        code.get(branch),
        &Instruction::Branch(Opcode::IfNe, Jump::to(iinc))
    );
    let trampoline = code.ids()[2];
    assert!(matches!(
        code.get(trampoline),
        Instruction::WideBranch(Opcode::GotoW, jump) if jump.target == ret && jump.offset == 40008
    ));
    assert_eq!(code.bci(iinc), 9);
    assert_eq!(code.code_length(), 40013);

    let again = reread(&class);
    let code = again.methods[SKIP].code().unwrap();
    assert_eq!(target_positions(code)[1], vec![3]);
    assert_eq!(target_positions(code)[2], vec![40004]);
}

#[test]
fn no_room_for_island() {
    let mut class = sample();
    let code = class.methods[SKIP].code_mut().unwrap();
    let branch = code.ids()[1];
    let ret = code.ids()[3];
    nops(code, ret, 40000);
    assert!(matches!(
        code.relax(&mut class.constants),
        Err(Error::UnrelaxableBranch(id)) if id == branch
    ));
}

#[test]
fn method_code_overflow() {
    let mut class = sample();
    let code = class.methods[RUN].code_mut().unwrap();
    let ret = code.ids()[0];
    nops(code, ret, 65535);
    assert!(matches!(
        code.relax(&mut class.constants),
        Err(Error::MethodCodeOverflow(65536))
    ));
}
