// Logfile module - Rotating log file behind a stable symlink

mod naming;
mod rotating;

pub use naming::{absolute_clean, physical_name, time_suffix, TIME_SUFFIX_FORMAT};
pub use rotating::RotatingLogFile;
