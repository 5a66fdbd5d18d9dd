pub mod instrument;
pub mod jvm;
pub mod util;
