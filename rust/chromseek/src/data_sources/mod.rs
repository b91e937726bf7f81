//! Reference library readers.

pub mod msp;
pub mod text_library;

pub use msp::{
    MspReader,
    read_msp_library,
};
pub use text_library::read_text_library;
