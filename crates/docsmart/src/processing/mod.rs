//! Background processing: worker fleet and retention sweeper

mod sweeper;
mod worker;

pub use sweeper::RetentionSweeper;
pub use worker::Worker;
