//! Read, patch, and write JVM class files
//!
//! ### Structure
//!
//! A [`class_file::ClassFile`] is read in one go, keeping the constant pool indices and every
//! attribute exactly as they were. The interesting part is the `Code` attribute of methods: it
//! gets decoded into a [`code::CodeBody`], where the instructions live in an arena and every
//! branch, exception table entry, side table entry, and stack map frame refers to instructions by
//! handle instead of by byte offset. That is what makes it possible to splice in new
//! instructions without having to manually patch offsets all over the place.
//!
//! ### Patching a method
//!
//! ```
//! use classpatch::jvm::class_file::{ClassFile, Serialize};
//! use classpatch::jvm::code::InstructionInserter;
//! use classpatch::jvm::Error;
//!
//! # fn patch(bytes: &[u8]) -> Result<Vec<u8>, Error> {
//! let mut class = ClassFile::read(bytes)?;
//! let ClassFile { constants, methods, .. } = &mut class;
//! for method in methods.iter_mut() {
//!     if let Some(code) = method.code_mut() {
//!         let mut inserter = InstructionInserter::at_start(code, constants);
//!         inserter.nop();
//!         code.relax(constants)?;
//!     }
//! }
//!
//! let mut class_bytes: Vec<u8> = vec![];
//! class.serialize(&mut class_bytes)?;
//! # Ok(class_bytes)
//! # }
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
