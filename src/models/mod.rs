pub mod authenticity;
pub mod exception_entry;
pub mod production_input;
pub mod production_line;

pub use authenticity::{
    compute_yield, compute_yield_checked, net_production, normalize_ranges, validate_range,
    validate_ranges, AuthenticityRange, RangeError, RangeIssue, YieldReport,
};
pub use exception_entry::{normalize_numbers, ExceptionEntry, NewExceptionEntry, UpdateExceptionEntry};
pub use production_input::{
    group_by_session, InputStatus, NewProductionInput, ProductionInput, SessionGroup,
    UpdateProductionInput,
};
pub use production_line::{ExceptionKind, ProductionLine};
