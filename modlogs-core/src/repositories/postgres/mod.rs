pub mod hooks;
pub mod users;

pub use hooks::PostgresHookRepository;
pub use users::PostgresUserRepository;
