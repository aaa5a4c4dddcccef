//! Survey execution engine with single-entry reward allocation.
//!
//! A [`FlowController`](domains::survey::FlowController) walks one participant
//! through a campaign's question schema, submits exactly one response per
//! identity and issues at most one reward redemption covering every reward the
//! campaign offers. [`SurveyEngine`] wires the stores and caches together.

pub mod cache;
pub mod cache_key;
pub mod db;
pub mod domains;
pub mod observability;
pub mod state;

pub use domains::identity::{Identity, IdentityResolver};
pub use domains::rewards::{ClaimOutcome, ClaimRequest, ContactForm, RewardAllocator};
pub use domains::survey::{Campaign, FlowController, FlowError, FlowState, SessionProfile};
pub use state::SurveyEngine;
