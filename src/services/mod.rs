// Workflow
pub mod mo_completion;
pub mod notifier;

// ERP mirror
pub mod mo_cache;

// Capture support
pub mod exceptions;
pub mod pic;

// Reporting
pub mod external_data;
pub mod reports;

// Inbound from the dashboard
pub mod receiver;

// Runtime settings
pub mod admin_settings;

// Service factory for dependency injection
pub mod factory;
