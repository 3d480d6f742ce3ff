use crate::exit_codes::ExitCode;

/// A run that ended before a verdict, tagged with the exit code it maps to.
#[derive(Debug)]
pub struct RunError {
    code: ExitCode,
    error: anyhow::Error,
}

impl RunError {
    pub fn invalid_input(error: anyhow::Error) -> Self {
        Self {
            code: ExitCode::InvalidInput,
            error,
        }
    }

    pub fn runtime(error: anyhow::Error) -> Self {
        Self {
            code: ExitCode::RuntimeError,
            error,
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        self.code
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.code {
            ExitCode::InvalidInput => "invalid input",
            _ => "run failed",
        };
        write!(f, "{label}: {:#}", self.error)
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}
