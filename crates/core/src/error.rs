//! 에러 타입 — 도메인별 에러 정의

/// Ironwall 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IronwallError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 룰셋 구성/검증 에러
    #[error("ruleset error: {0}")]
    Ruleset(#[from] RulesetError),

    /// 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 룰셋 에러
///
/// 컨트롤 플레인이 룰셋을 구성하거나 커밋할 때 발생합니다.
/// 패킷 평가 경로에서는 절대 생성되지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum RulesetError {
    /// 룰셋 구성 실패
    #[error("build failed: {0}")]
    Build(String),

    /// 커밋 전 검증 실패
    #[error("validation failed: {0}")]
    Validation(String),

    /// 룰셋 파일 로딩 실패
    #[error("load failed: {path}: {reason}")]
    Load { path: String, reason: String },
}

/// 파싱 에러
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// 지원하지 않는 형식
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// 파싱 실패
    #[error("parse failed at offset {offset}: {reason}")]
    Failed { offset: usize, reason: String },

    /// 입력 데이터 초과
    #[error("input too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}
