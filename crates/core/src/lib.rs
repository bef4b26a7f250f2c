//! Ironwall 공통 크레이트
//!
//! 룰 체인 평가 엔진(`ironwall-engine`)과 CLI가 공유하는 타입을 정의합니다.
//!
//! # 모듈 구성
//! - [`config`]: `ironwall.toml` 파싱, 환경변수 오버라이드, 검증
//! - [`error`]: 도메인별 에러 계층
//! - [`metrics`]: Prometheus 메트릭 이름 상수
//! - [`types`]: 패킷 처리 결과(`Disposition`), 기본 정책, 네임스페이스 ID

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, IronwallError, ParseError, RulesetError};

// 설정
pub use config::{EngineSettings, GeneralConfig, IronwallConfig};

// 도메인 타입
pub use types::{Disposition, NamespaceId, Policy};
