pub mod wheel;

pub use wheel::{TimerHandle, TimerWheel};
