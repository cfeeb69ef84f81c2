pub mod choice;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod gql;
pub mod mirror;
pub mod model;
pub mod notification;
pub mod reveal;
pub mod session;
pub mod sync;
pub mod watermark;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{
    Error,
    Result,
};
