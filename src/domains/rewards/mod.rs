pub mod allocator;
pub mod code_generator;
pub mod display;
pub mod fetcher;
pub mod models;

pub use allocator::{anchor_reward, RewardAllocator};
pub use code_generator::RedemptionCodeGenerator;
pub use display::{display_for, project};
pub use fetcher::{HttpFileFetcher, NoopFileFetcher, RewardFileFetcher};
pub use models::*;
