use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("Invalid bucket budget: {0} (must be greater than zero)")]
    InvalidBudget(u64),

    #[error("No snapshot files match the {scope} scope of {changed} changed paths")]
    NoMatchingFiles { scope: &'static str, changed: usize },
}
