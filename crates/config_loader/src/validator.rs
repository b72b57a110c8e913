//! 配置校验模块
//!
//! 校验规则：
//! - pump.poll_timeout_ms > 0
//! - pull.timeout_ms > 0 (如果设置)
//! - mock.frame_interval_ms <= 10_000

use contracts::{CaptureConfig, ContractError};

/// Upper bound on the mock frame interval
const MAX_FRAME_INTERVAL_MS: u64 = 10_000;

/// 校验 CaptureConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &CaptureConfig) -> Result<(), ContractError> {
    validate_pump(config)?;
    validate_pull(config)?;
    validate_mock(config)?;
    Ok(())
}

/// 校验事件泵轮询超时
fn validate_pump(config: &CaptureConfig) -> Result<(), ContractError> {
    if config.pump.poll_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "pump.poll_timeout_ms",
            "poll_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验拉取超时
fn validate_pull(config: &CaptureConfig) -> Result<(), ContractError> {
    if config.pull.timeout_ms == Some(0) {
        return Err(ContractError::config_validation(
            "pull.timeout_ms",
            "timeout_ms must be > 0 (omit it to wait forever)",
        ));
    }
    Ok(())
}

/// 校验 mock 后端参数
fn validate_mock(config: &CaptureConfig) -> Result<(), ContractError> {
    let interval = config.mock.frame_interval_ms;
    if interval > MAX_FRAME_INTERVAL_MS {
        return Err(ContractError::config_validation(
            "mock.frame_interval_ms",
            format!("frame_interval_ms must be <= {MAX_FRAME_INTERVAL_MS}, got {interval}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&CaptureConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_poll_timeout() {
        let mut config = CaptureConfig::default();
        config.pump.poll_timeout_ms = 0;
        assert_eq!(field_of(validate(&config).unwrap_err()), "pump.poll_timeout_ms");
    }

    #[test]
    fn test_zero_pull_timeout() {
        let mut config = CaptureConfig::default();
        config.pull.timeout_ms = Some(0);
        assert_eq!(field_of(validate(&config).unwrap_err()), "pull.timeout_ms");

        config.pull.timeout_ms = Some(1);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_frame_interval_bound() {
        let mut config = CaptureConfig::default();
        config.mock.frame_interval_ms = MAX_FRAME_INTERVAL_MS;
        assert!(validate(&config).is_ok());

        config.mock.frame_interval_ms = MAX_FRAME_INTERVAL_MS + 1;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "mock.frame_interval_ms"
        );
    }
}
