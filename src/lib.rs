pub mod commands;
pub mod doctor;
pub mod error;
pub mod fs_utils;
pub mod index;
pub mod paths;
pub mod state;
pub mod ui;

pub use error::IndexError;
pub use index::{Index, ProfileRecord};

#[cfg(test)]
pub mod test_utils;
