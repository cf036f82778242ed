#[macro_use]
extern crate lazy_static;

pub use crate::black_box::BlackBox;

mod black_box;
