//! Site adapters, one per hospital directory.

pub mod cuf;
pub mod hdl;

pub use cuf::CufScraper;
pub use hdl::HdlScraper;
