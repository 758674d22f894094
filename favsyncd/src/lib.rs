pub mod daemon;
pub mod favorites;
pub mod sync;
