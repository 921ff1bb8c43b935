// ============================================================================
// Interpreter Settings File
// ============================================================================
//
// The flat key/value file read by the interpreter (php.ini). The engine only
// talks to it through `SettingsStore`; `IniFile` is the line-preserving
// implementation used against real files.
//
// ============================================================================

pub mod file;
pub mod setting;

pub use file::IniFile;
pub use setting::{Extension, Setting, SettingsStore};
