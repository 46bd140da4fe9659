//! Trust rating flow: parsing 1-10 scores and the localized strings used to
//! ask for them.

pub mod catalog;
pub mod rating;

pub use catalog::{trust_prompt, TrustPromptKey};
pub use rating::{parse_rating, should_trigger_check_in};
