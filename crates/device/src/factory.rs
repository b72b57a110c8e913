//! Backend selection from configuration.

use std::sync::Arc;

use contracts::{BackendKind, CaptureConfig, ContractError, DeviceBackend};
use tracing::info;

use crate::mock::MockBackend;

/// Whether `kind` was compiled into this build
pub fn backend_available(kind: BackendKind) -> bool {
    match kind {
        BackendKind::Mock => true,
        BackendKind::Freenect => cfg!(feature = "libfreenect"),
    }
}

/// Build the backend named by `config.device.backend`
pub fn backend_for(config: &CaptureConfig) -> Result<Arc<dyn DeviceBackend>, ContractError> {
    let backend: Arc<dyn DeviceBackend> = match config.device.backend {
        BackendKind::Mock => Arc::new(MockBackend::from_config(&config.mock)),
        #[cfg(feature = "libfreenect")]
        BackendKind::Freenect => Arc::new(crate::freenect::FreenectBackend::new()),
        #[cfg(not(feature = "libfreenect"))]
        BackendKind::Freenect => {
            return Err(ContractError::Other(
                "freenect backend not compiled in (enable the `libfreenect` feature)".into(),
            ))
        }
    };

    info!(backend = backend.name(), "device backend selected");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_always_available() {
        assert!(backend_available(BackendKind::Mock));
        let backend = backend_for(&CaptureConfig::default()).unwrap();
        assert_eq!(backend.name(), "mock");
    }

    #[cfg(not(feature = "libfreenect"))]
    #[test]
    fn test_freenect_missing_is_reported() {
        let mut config = CaptureConfig::default();
        config.device.backend = BackendKind::Freenect;
        assert!(!backend_available(BackendKind::Freenect));
        assert!(matches!(backend_for(&config), Err(ContractError::Other(_))));
    }
}
