pub mod admin_config;
pub mod manufacturing_identity;
pub mod mo_cache;
pub mod pic;
