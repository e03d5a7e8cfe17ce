//! API request handlers

mod health;
mod keys;
mod listings;
mod sessions;
mod transfers;

pub use health::*;
pub use keys::*;
pub use listings::*;
pub use sessions::*;
pub use transfers::*;
