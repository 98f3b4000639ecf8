pub mod local_store;
pub mod remote_store;
pub mod store;
