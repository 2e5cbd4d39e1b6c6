pub mod diagnostics;
pub mod formatter;
pub mod language;
pub mod logging;
pub mod pipeline;
