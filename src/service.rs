//! Services around the file model
//!
//! - `dbus`: the session bus file-operations service
//! - `places`: the user's home and special directories
//! - `thumbnail`: lookup of existing freedesktop thumbnails
//! - `trash`: the freedesktop trash and its monitor

pub mod dbus;
pub mod places;
pub mod thumbnail;
pub mod trash;
