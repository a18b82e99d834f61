pub mod main_reactor;
pub mod sub_reactor;

pub use main_reactor::MainReactor;
pub use sub_reactor::{ServerContext, SubReactor, SubReactorHandle};
