pub mod locks;
pub mod tasks;
pub mod workers;
