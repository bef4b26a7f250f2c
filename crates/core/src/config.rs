//! 설정 관리 — ironwall.toml 파싱 및 런타임 설정
//!
//! [`IronwallConfig`]는 로깅 설정과 평가 엔진 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`IRONWALL_ENGINE_TRACE_ENABLED=true` 형식)
//! 3. 설정 파일 (`ironwall.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ironwall_core::error::IronwallError> {
//! use ironwall_core::config::IronwallConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = IronwallConfig::load("ironwall.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = IronwallConfig::parse("[engine]\ntrace_enabled = true")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, IronwallError};

/// Ironwall 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IronwallConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 평가 엔진 설정
    #[serde(default)]
    pub engine: EngineSettings,
}

impl IronwallConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, IronwallError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IronwallError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IronwallError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                IronwallError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, IronwallError> {
        toml::from_str(toml_str).map_err(|e| {
            IronwallError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `IRONWALL_{SECTION}_{FIELD}`
    /// 예: `IRONWALL_ENGINE_MAX_STEPS=4096`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "IRONWALL_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "IRONWALL_GENERAL_LOG_FORMAT");

        // Engine
        override_bool(
            &mut self.engine.trace_enabled,
            "IRONWALL_ENGINE_TRACE_ENABLED",
        );
        override_usize(&mut self.engine.max_steps, "IRONWALL_ENGINE_MAX_STEPS");
        override_usize(
            &mut self.engine.stats_shards,
            "IRONWALL_ENGINE_STATS_SHARDS",
        );
        override_usize(
            &mut self.engine.trace_buffer,
            "IRONWALL_ENGINE_TRACE_BUFFER",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IronwallError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.engine.max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.max_steps".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        if self.engine.stats_shards > MAX_STATS_SHARDS {
            return Err(ConfigError::InvalidValue {
                field: "engine.stats_shards".to_owned(),
                reason: format!("must be at most {MAX_STATS_SHARDS} (0 = auto)"),
            }
            .into());
        }

        if self.engine.trace_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.trace_buffer".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 통계 샤드 수 상한
pub const MAX_STATS_SHARDS: usize = 1024;

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 평가 엔진 설정
///
/// 전역 상태 대신 각 `Evaluator` 인스턴스에 전달되므로,
/// 한 프로세스 안에서 서로 다른 설정의 엔진을 함께 둘 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 룰 추적 이벤트 활성화 (전역 토글)
    pub trace_enabled: bool,
    /// 한 번의 순회에서 방문할 수 있는 최대 룰 수
    pub max_steps: usize,
    /// 코어별 통계 샤드 수 (0이면 가용 병렬성)
    pub stats_shards: usize,
    /// 채널 기반 추적 싱크의 버퍼 크기
    pub trace_buffer: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            trace_enabled: false,
            max_steps: 65_536,
            stats_shards: 0,
            trace_buffer: 1024,
        }
    }
}

impl EngineSettings {
    /// 실제로 사용할 통계 샤드 수를 계산합니다.
    pub fn effective_shards(&self) -> usize {
        if self.stats_shards > 0 {
            return self.stats_shards;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}
