use crate::error::MeasurementError;
use crate::types::Measurement;

/// Decides whether an attested image is one the caller expects.
pub trait MeasurementPolicy: Send + Sync {
    fn check(&self, measurement: &Measurement) -> Result<(), MeasurementError>;
}

/// Placeholder policy. Matching against reference values is not implemented,
/// so every measurement is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnimplementedPolicy;

impl MeasurementPolicy for UnimplementedPolicy {
    fn check(&self, _measurement: &Measurement) -> Result<(), MeasurementError> {
        Err(MeasurementError::NotImplemented)
    }
}
