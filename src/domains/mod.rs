pub mod identity;
pub mod rewards;
pub mod survey;
