pub mod batch;
pub mod logo;
pub mod task;
