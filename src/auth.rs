//! Session material exchanged with the identity layer.

pub mod secret;
pub mod session;

pub use secret::*;
pub use session::*;
