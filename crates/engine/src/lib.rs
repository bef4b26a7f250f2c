#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`register`]: 순회별 레지스터 파일과 판정 코드
//! - [`expr`]: 표현식 (페이로드 로드, 비교, 즉시값)
//! - [`rule`]: 표현식 시퀀스와 세대 마스크
//! - [`chain`]: 룰 목록, 베이스 체인 속성
//! - [`table`]: 체인 맵과 트랜잭션
//! - [`generation`]: 세대 커서와 순회 격리
//! - [`jumpstack`]: 고정 용량 복귀 지점 스택
//! - [`eval`]: 패킷 순회 상태 기계
//! - [`trace`]: 룰 추적 이벤트
//! - [`stats`]: 코어별 체인 카운터
//! - [`ruleset`]: TOML 룰셋 파일
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Ruleset(TOML) ──▶ Transaction ──commit──▶ Table ◀──읽기── Evaluator ◀── Packet
//!                    (검증/세대 전환)         │                  │
//!                                          Chain ── Rule ── Expr ── Registers
//! ```

pub mod chain;
pub mod error;
pub mod eval;
pub mod expr;
pub mod generation;
pub mod jumpstack;
pub mod packet;
pub mod register;
pub mod rule;
pub mod ruleset;
pub mod stats;
pub mod table;
pub mod trace;

// --- 주요 타입 re-export ---

// 평가기
pub use eval::{Evaluation, Evaluator};

// 패킷, 레지스터
pub use packet::Packet;
pub use register::{Registers, Verdict};

// 룰셋 구조
pub use chain::{Chain, ChainId};
pub use rule::{Rule, RuleHandle};
pub use table::{Table, Transaction};

// 룰셋 파일
pub use ruleset::Ruleset;

// 추적
pub use trace::{ChannelSink, LogSink, TraceEvent, TraceKind, TraceSink};

// 통계
pub use stats::ChainCounters;

// 에러
pub use error::{EngineError, EvalError};
