pub mod command;
pub mod scan;
pub mod sector;

pub use command::{Command, CommandKind};
pub use scan::{ScanFrame, ScanPoint};
pub use sector::{SectorMap, SectorReading, SectorRole, NO_RETURN};
