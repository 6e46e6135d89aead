pub mod listener;
pub mod parser;

pub use listener::SwapListener;
pub use parser::{decode_swap_log, decode_swap_logs, DecodeError};
