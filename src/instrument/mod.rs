//! Whole-class instrumentation passes
//!
//! These are built entirely on [`InstructionInserter`] and [`CodeBody::relax`]: they splice code
//! in, bump `max_stack` to account for it, then relax every method body so the class is ready to
//! be written out.

mod settings;

pub use settings::*;

use crate::jvm::class_file::{ClassFile, ConstantPool};
use crate::jvm::code::{CodeBody, InstructionInserter};
use crate::jvm::Error;

/// Stack slots used by the tracing prologue (`PrintStream` and message)
const TRACE_STACK: u16 = 2;

/// Print `Class.method(descriptor)` on entry to each selected method
///
/// Returns the number of methods instrumented. Every method body is relaxed afterwards, whether or
/// not it was instrumented.
pub fn trace_method_entries(class: &mut ClassFile, settings: &Settings) -> Result<usize, Error> {
    let class_name = class.class_name()?;
    let ClassFile {
        constants, methods, ..
    } = class;

    let mut traced = 0;
    for method in methods.iter_mut() {
        let name = method.name(constants)?;
        if !settings.selects(&name) {
            continue;
        }
        let descriptor = method.descriptor(constants)?;
        let code = match method.code_mut() {
            Some(code) => code,
            None => {
                if !settings.methods.is_empty() {
                    log::warn!("{}.{}{} has no code, skipping", class_name, name, descriptor);
                }
                continue;
            }
        };

        let message = format!("{}.{}{}", class_name, name, descriptor);
        let mut inserter = InstructionInserter::at_start(code, constants);
        inserter.getstatic(
            &settings.trace_class,
            &settings.trace_field,
            Settings::TRACE_FIELD_DESCRIPTOR,
        )?;
        inserter.ldc_string(&message)?;
        inserter.invokevirtual("java/io/PrintStream", "println", "(Ljava/lang/String;)V")?;
        code.max_stack = code.max_stack.max(TRACE_STACK);

        log::debug!("traced entry to {}", message);
        traced += 1;
    }

    if traced == 0 && !settings.methods.is_empty() {
        log::warn!("no method of {} matched {:?}", class_name, settings.methods);
    }
    relax_all(class)?;
    Ok(traced)
}

/// Relax every method body of the class
pub fn relax_all(class: &mut ClassFile) -> Result<(), Error> {
    let ClassFile {
        constants, methods, ..
    } = class;
    for code in methods.iter_mut().filter_map(|method| method.code_mut()) {
        relax(code, constants)?;
    }
    Ok(())
}

fn relax(code: &mut CodeBody, constants: &mut ConstantPool) -> Result<(), Error> {
    let before = code.code_length();
    code.relax(constants)?;
    if code.code_length() != before {
        log::trace!("code length {} -> {}", before, code.code_length());
    }
    Ok(())
}
