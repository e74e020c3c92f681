//! Churnkit recommenders
//!
//! Two independent heuristics over model output: a discount grid search
//! that maximizes expected revenue per user, and a cosine-similarity
//! ranking of catalog plans.

pub mod discount;
pub mod plans;

pub use discount::{
    best_discount, recommend_discounts, recommendations_table, DiscountConfig,
    DiscountRecommendation, RecommendError, DISCOUNT_GRID,
};
pub use plans::PlanRecommender;
