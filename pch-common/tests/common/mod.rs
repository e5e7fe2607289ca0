pub mod fixtures;
pub mod logging;

pub use fixtures::FakePhilo;
pub use logging::init_test_logging;
