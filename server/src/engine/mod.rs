pub mod errors;
pub mod group_engine;
pub mod ledger;
pub mod moderation;
pub mod permissions;
pub mod records;
pub mod store;
pub mod validation;
