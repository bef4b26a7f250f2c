//! 엔진 에러 타입
//!
//! [`EngineError`]는 룰셋 구성/커밋/로딩 중 발생하는 에러이고,
//! [`EvalError`]는 패킷 순회 도중의 불변식 위반입니다.
//! `EvalError`는 호출자에게 전파되지 않고 평가기가 로그를 남긴 뒤
//! 패킷을 폐기(fail closed)하는 데 사용됩니다.

use ironwall_core::error::{IronwallError, RulesetError};

use crate::chain::ChainId;
use crate::rule::RuleHandle;

/// 룰셋 구성 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 이름으로 찾을 수 없는 체인
    #[error("chain not found: {0}")]
    UnknownChain(String),

    /// ID로 찾을 수 없는 체인
    #[error("chain id not found: {0}")]
    UnknownChainId(ChainId),

    /// 같은 이름의 체인이 이미 존재
    #[error("chain already exists: {0}")]
    DuplicateChain(String),

    /// 삭제하려는 체인에 룰이 남아 있음
    #[error("chain '{0}' still has rules")]
    ChainNotEmpty(String),

    /// 점프/이동 그래프에 순환이 있음
    #[error("chain loop detected through '{chain}'")]
    ChainLoop { chain: String },

    /// 베이스 체인으로의 점프/이동
    #[error("rule {rule} in chain '{from}' targets base chain '{target}'")]
    JumpToBaseChain {
        from: String,
        rule: RuleHandle,
        target: String,
    },

    /// 존재하지 않거나 삭제 예정인 체인으로의 점프/이동
    #[error("rule {rule} in chain '{from}' targets missing chain {target}")]
    DanglingJump {
        from: String,
        rule: RuleHandle,
        target: ChainId,
    },

    /// 점프 중첩 깊이 초과
    #[error("jump depth {depth} from base chain '{chain}' exceeds maximum {max}")]
    JumpDepthExceeded {
        chain: String,
        depth: usize,
        max: usize,
    },

    /// 잘못된 표현식 파라미터
    #[error("invalid {kind} expression: {reason}")]
    InvalidExpression { kind: &'static str, reason: String },

    /// 핸들로 찾을 수 없는 룰
    #[error("rule {handle} not found in chain '{chain}'")]
    RuleNotFound { chain: String, handle: RuleHandle },

    /// 룰셋 파일 로딩/파싱 실패
    #[error("failed to load ruleset '{path}': {reason}")]
    RulesetLoad { path: String, reason: String },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for IronwallError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::RulesetLoad { path, reason } => {
                IronwallError::Ruleset(RulesetError::Load { path, reason })
            }
            EngineError::Io(e) => IronwallError::Io(e),
            validation @ (EngineError::ChainLoop { .. }
            | EngineError::JumpToBaseChain { .. }
            | EngineError::DanglingJump { .. }
            | EngineError::JumpDepthExceeded { .. }) => {
                IronwallError::Ruleset(RulesetError::Validation(validation.to_string()))
            }
            other => IronwallError::Ruleset(RulesetError::Build(other.to_string())),
        }
    }
}

/// 패킷 순회 중 불변식 위반
///
/// 정상적인 커밋 검증을 통과한 룰셋에서는 발생하지 않아야 합니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// 점프 스택 용량 초과
    #[error("jump stack overflow at chain '{chain}' rule {rule} (depth {depth})")]
    StackOverflow {
        chain: String,
        rule: RuleHandle,
        depth: usize,
    },

    /// 점프/이동 대상 체인이 없음
    #[error("rule {rule} in chain '{chain}' targets missing chain {target}")]
    UnknownChain {
        chain: String,
        rule: RuleHandle,
        target: ChainId,
    },

    /// 순회당 룰 평가 상한 초과
    #[error("step budget of {budget} rules exhausted in chain '{chain}'")]
    StepBudgetExhausted { chain: String, budget: usize },

    /// 진입 체인이 베이스 체인이 아니거나 존재하지 않음
    #[error("chain {0} is not a base chain")]
    NotBaseChain(ChainId),
}

impl EvalError {
    /// 메트릭 레이블용 중단 사유
    pub fn reason(&self) -> &'static str {
        match self {
            Self::StackOverflow { .. } => "stack_overflow",
            Self::UnknownChain { .. } => "unknown_chain",
            Self::StepBudgetExhausted { .. } => "step_budget",
            Self::NotBaseChain(_) => "not_base_chain",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display() {
        let err = EngineError::DuplicateChain("input".to_owned());
        assert_eq!(err.to_string(), "chain already exists: input");

        let err = EngineError::JumpDepthExceeded {
            chain: "input".to_owned(),
            depth: 17,
            max: 16,
        };
        assert!(err.to_string().contains("exceeds maximum 16"));
    }

    #[test]
    fn validation_errors_convert_to_ruleset_validation() {
        let err: IronwallError = EngineError::ChainLoop {
            chain: "a".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            IronwallError::Ruleset(RulesetError::Validation(_))
        ));
    }

    #[test]
    fn load_error_converts_to_ruleset_load() {
        let err: IronwallError = EngineError::RulesetLoad {
            path: "/tmp/r.toml".to_owned(),
            reason: "bad".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            IronwallError::Ruleset(RulesetError::Load { .. })
        ));
    }

    #[test]
    fn build_errors_convert_to_ruleset_build() {
        let err: IronwallError = EngineError::UnknownChain("x".to_owned()).into();
        assert!(matches!(err, IronwallError::Ruleset(RulesetError::Build(_))));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: IronwallError = EngineError::from(io).into();
        assert!(matches!(err, IronwallError::Io(_)));
    }

    #[test]
    fn eval_error_reasons() {
        let overflow = EvalError::StackOverflow {
            chain: "c".to_owned(),
            rule: 1,
            depth: 16,
        };
        assert_eq!(overflow.reason(), "stack_overflow");
        assert_eq!(EvalError::NotBaseChain(ChainId(3)).reason(), "not_base_chain");
        assert!(overflow.to_string().contains("jump stack overflow"));
    }
}
