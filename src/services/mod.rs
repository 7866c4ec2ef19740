pub mod inference;
pub mod speech;
