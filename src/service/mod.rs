pub mod session_actor;

pub use session_actor::{Link, SessionHandle, SessionMessage};
