use mapper_planner::PlanError;
use mapper_scanner::{ChangeError, ScanError};
use std::process::ExitCode;

use crate::config::ConfigError;

/// Process exit statuses. Values are part of the command-line contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    /// I/O failure or internal error.
    Fatal = 1,
    /// Invalid options, missing backends or inputs. Nothing was done.
    Config = 2,
    /// The command completed but some files could not be measured.
    PartialData = 3,
    /// No usable version control at the root.
    VcsUnavailable = 4,
}

impl ExitStatus {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Map a command failure onto its exit status by the typed error it carries.
    pub fn classify(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.is::<ConfigError>() {
                return ExitStatus::Config;
            }
            if let Some(scan) = cause.downcast_ref::<ScanError>() {
                return match scan {
                    ScanError::VcsUnavailable(_) => ExitStatus::VcsUnavailable,
                    other if other.is_configuration() => ExitStatus::Config,
                    _ => ExitStatus::Fatal,
                };
            }
            if let Some(change) = cause.downcast_ref::<ChangeError>() {
                return match change {
                    ChangeError::Unavailable(_) => ExitStatus::VcsUnavailable,
                    ChangeError::CommandFailed(_) => ExitStatus::Config,
                    _ => ExitStatus::Fatal,
                };
            }
            if cause.is::<PlanError>() {
                return ExitStatus::Config;
            }
        }
        ExitStatus::Fatal
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}
