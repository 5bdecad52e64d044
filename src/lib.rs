pub mod logging;
pub mod tutor;
