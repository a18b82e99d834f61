pub mod pool;
pub mod users;

pub use pool::{Pool, PooledConnection};
pub use users::{User, UserError, UserRepository};
