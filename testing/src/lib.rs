mod framework;
mod test_directory;

pub use framework::{CityRecord, Framework, FrameworkError};
pub use test_directory::prepare_test_dir;
