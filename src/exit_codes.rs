//! Process exit codes for the `switchyard` binary.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Every task succeeded |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid arguments, task input or configuration |
//! | 3 | `TASK_FAILED` | At least one batch task failed |
//! | 4 | `NO_PROVIDER` | No usable provider |
//! | 10 | `TASK_TIMEOUT` | Task exceeded its timeout |
//! | 70 | `PROVIDER_FAILURE` | Provider invocation failed |
//! | 130 | `INTERRUPTED` | Cancelled by shutdown or Ctrl-C |

use switchyard_dispatch::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const INTERNAL: ExitCode = ExitCode(1);
    pub const CLI_ARGS: ExitCode = ExitCode(2);
    pub const TASK_FAILED: ExitCode = ExitCode(3);
    pub const NO_PROVIDER: ExitCode = ExitCode(4);
    pub const TASK_TIMEOUT: ExitCode = ExitCode(10);
    pub const PROVIDER_FAILURE: ExitCode = ExitCode(70);
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    /// Numeric value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl From<&DispatchError> for ExitCode {
    fn from(err: &DispatchError) -> Self {
        match err {
            DispatchError::Validation { .. } => ExitCode::CLI_ARGS,
            DispatchError::NotInitialized => ExitCode::INTERNAL,
            DispatchError::NoHealthyProvider { .. } | DispatchError::EmptyPool { .. } => {
                ExitCode::NO_PROVIDER
            }
            DispatchError::TaskTimeout { .. } => ExitCode::TASK_TIMEOUT,
            DispatchError::ProviderExecution { .. } => ExitCode::PROVIDER_FAILURE,
            DispatchError::Shutdown => ExitCode::INTERRUPTED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_providers::FailureKind;

    #[test]
    fn test_dispatch_error_mapping() {
        let cases = [
            (
                DispatchError::Validation {
                    reason: "zero timeout".into(),
                },
                2,
            ),
            (DispatchError::NotInitialized, 1),
            (DispatchError::EmptyPool { rejected: vec![] }, 4),
            (DispatchError::NoHealthyProvider { requested: None }, 4),
            (
                DispatchError::TaskTimeout {
                    provider: "claude".into(),
                    timeout_ms: 100,
                },
                10,
            ),
            (
                DispatchError::ProviderExecution {
                    provider: "claude".into(),
                    failure: FailureKind::Quota,
                    message: "rate limited".into(),
                    exit_code: Some(1),
                },
                70,
            ),
            (DispatchError::Shutdown, 130),
        ];
        for (err, code) in cases {
            assert_eq!(ExitCode::from(&err).as_i32(), code, "{err:?}");
        }
    }

    #[test]
    fn test_roundtrip_i32() {
        assert_eq!(i32::from(ExitCode::from_i32(3)), 3);
        assert_eq!(ExitCode::from_i32(0), ExitCode::SUCCESS);
    }
}
