//! 도메인 타입 — 엔진과 CLI가 공유하는 공통 타입
//!
//! 패킷 평가의 외부 결과([`Disposition`]), 베이스 체인의 기본 정책([`Policy`]),
//! 패킷과 체인이 소속된 네트워크 네임스페이스 식별자([`NamespaceId`])를 정의합니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 패킷 평가의 최종 처분
///
/// 패킷 전달을 담당하는 호출자는 이 값에 따라 패킷을
/// 전달(accept), 폐기(drop), 사용자 공간 큐로 전달(queue),
/// 또는 이미 소비된 것으로 취급(stolen)해야 합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// 패킷 통과
    Accept,
    /// 패킷 폐기
    Drop,
    /// 지정한 번호의 사용자 공간 큐로 전달
    Queue(u16),
    /// 평가 도중 패킷이 소비됨
    Stolen,
}

impl Disposition {
    /// 문자열 표현 (로그/메트릭 레이블용)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Drop => "drop",
            Self::Queue(_) => "queue",
            Self::Stolen => "stolen",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue(num) => write!(f, "queue {num}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// 베이스 체인의 기본 정책
///
/// 최상위 체인의 룰을 모두 통과한 패킷에 적용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// 통과
    #[default]
    Accept,
    /// 폐기
    Drop,
}

impl From<Policy> for Disposition {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Accept => Disposition::Accept,
            Policy::Drop => Disposition::Drop,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => f.write_str("accept"),
            Self::Drop => f.write_str("drop"),
        }
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown policy '{other}', expected 'accept' or 'drop'")),
        }
    }
}

/// 네트워크 네임스페이스 식별자
///
/// 다른 네임스페이스에 속한 체인은 해당 패킷에 대해 비활성입니다.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NamespaceId(pub u32);

impl NamespaceId {
    /// 초기(호스트) 네임스페이스
    pub const INIT: NamespaceId = NamespaceId(0);
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_converts_to_disposition() {
        assert_eq!(Disposition::from(Policy::Accept), Disposition::Accept);
        assert_eq!(Disposition::from(Policy::Drop), Disposition::Drop);
    }

    #[test]
    fn policy_defaults_to_accept() {
        assert_eq!(Policy::default(), Policy::Accept);
    }

    #[test]
    fn policy_from_str_is_case_insensitive() {
        assert_eq!("DROP".parse::<Policy>(), Ok(Policy::Drop));
        assert_eq!("accept".parse::<Policy>(), Ok(Policy::Accept));
        assert!("reject".parse::<Policy>().is_err());
    }

    #[test]
    fn disposition_display() {
        assert_eq!(Disposition::Accept.to_string(), "accept");
        assert_eq!(Disposition::Queue(3).to_string(), "queue 3");
        assert_eq!(Disposition::Stolen.as_str(), "stolen");
    }

    #[test]
    fn namespace_display() {
        assert_eq!(NamespaceId::INIT.to_string(), "ns0");
        assert_eq!(NamespaceId(42).to_string(), "ns42");
    }
}
