pub mod child;
pub mod presence;
pub mod role;
