pub mod batch;
pub mod health;
pub mod queue;
pub mod tokens;
