//! Projection of the single redemption row onto every reward card.
//!
//! Only one row is ever persisted per participant; the lucky number is shown
//! on all `draw` rewards and the redemption code on all `pdf` rewards.

use super::models::{RewardDisplay, RewardDisplayItem, RewardKind, Reward, RewardRedemption};

pub fn display_for(reward: &Reward, redemption: Option<&RewardRedemption>) -> RewardDisplay {
    let Some(redemption) = redemption else {
        return RewardDisplay::Pending;
    };

    match reward.kind {
        RewardKind::Draw => redemption
            .formatted_lucky_number()
            .map(RewardDisplay::LuckyNumber)
            .unwrap_or(RewardDisplay::Pending),
        RewardKind::Pdf => redemption
            .redemption_code
            .clone()
            .map(RewardDisplay::RedemptionCode)
            .unwrap_or(RewardDisplay::Pending),
    }
}

pub fn project(rewards: &[Reward], redemption: Option<&RewardRedemption>) -> Vec<RewardDisplayItem> {
    rewards
        .iter()
        .map(|reward| RewardDisplayItem {
            reward_id: reward.id,
            title: reward.title.clone(),
            kind: reward.kind,
            display: display_for(reward, redemption),
        })
        .collect()
}
