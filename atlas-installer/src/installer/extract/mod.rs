//! Archive extractor.
//!
//! Unpacks the downloaded archive with an external tool (7-Zip or tar),
//! supervised so that it can be timed out or cancelled.

mod extractor;
mod layout;
mod process;
mod tools;

pub use extractor::{ExtractionReport, ToolExtractor};
pub use process::{run_supervised, ProcessExit, Stream};
pub use tools::{ArchiveTool, ToolKind, ToolLocator};
