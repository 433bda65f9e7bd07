pub mod candle;
pub mod error;
pub mod indicator;
pub mod render;
pub mod report;
pub mod signal;
