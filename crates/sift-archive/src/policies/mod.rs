//! Reference save policies.

pub mod count;
pub mod drop_all;
pub mod save_all;
pub mod time;
