pub mod api_key;
pub mod lock;
pub mod status;
pub mod task;
pub mod worker;
