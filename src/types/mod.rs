//! Core types for Parley.

pub mod event;
pub mod image;
pub mod message;
pub mod request;
pub mod tool;

pub use event::*;
pub use image::*;
pub use message::*;
pub use request::*;
pub use tool::*;
