use std::path::PathBuf;

/// Failure taxonomy of the pricing core.
///
/// These are returned as values so a batch can keep going after one account or
/// shipment fails. `AppError` is only built at the binary edge.
#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no carrier account returned a valid quote")]
    NoQuoteAvailable,
    #[error("neither a margin price nor a historical price could be computed")]
    NoValidPriceSource,
    #[error("a 100% margin has no finite price")]
    DivisionByZero,
    #[error("invalid base cost {0} (must be finite and > 0)")]
    InvalidBaseCost(f64),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid margin {0} (must be in [0, 100))")]
    InvalidMargin(f64),
    #[error("failed to persist '{}': {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PricingError {
    /// Process exit code used when this error ends a command.
    pub fn exit_code(&self) -> u8 {
        match self {
            PricingError::InvalidInput(_)
            | PricingError::InvalidMargin(_)
            | PricingError::InvalidBaseCost(_)
            | PricingError::NotFound(_) => 2,
            PricingError::NoQuoteAvailable | PricingError::NoValidPriceSource => 3,
            PricingError::DivisionByZero | PricingError::Persist { .. } => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_errors_map_to_exit_codes() {
        let err: AppError = PricingError::InvalidMargin(120.0).into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("120"));

        let err: AppError = PricingError::NoValidPriceSource.into();
        assert_eq!(err.exit_code(), 3);
    }
}
