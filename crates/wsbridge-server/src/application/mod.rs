//! Application layer for wsbridge-server.
//!
//! What the HTTP surface says, independent of how it is served:
//!
//! - the date-time echo protocol spoken on `/ws/datetime`
//! - the HTML index page listing the enabled demos

pub mod datetime;
pub mod index_page;

pub use datetime::{answer, EchoError};
pub use index_page::render_index;
