pub mod input_buffer;
pub mod output_buffer;

pub use input_buffer::{InputBuffer, ReadResult, TriggerMode};
pub use output_buffer::{OutputBuffer, WriteOutcome};
