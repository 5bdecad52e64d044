pub mod candidates;
pub mod linucb;

pub use candidates::{CandidateProvider, FEATURE_NAMES, LOAD_FEATURE, STRESS_FEATURE};
pub use linucb::{expected_score_reward, BanditContext, LinUcbModel, PressureAwareSelector, Selection};
