//! 표현식 — 룰을 구성하는 평가 단위
//!
//! [`Expr`]는 닫힌 열거형이며, 자주 쓰이는 두 가지 모양(레지스터 하나의 동등
//! 비교, 1/2/4바이트 페이로드 로드)에는 전용 고속 변형이 있습니다.
//! 고속 변형은 생성 시점에 자동으로 선택되므로 호출자가 직접 고르지 않습니다.
//!
//! # 사용 예시
//!
//! ```
//! use ironwall_engine::expr::{CmpOp, Expr, PayloadBase};
//! use ironwall_engine::register::Verdict;
//!
//! let exprs = vec![
//!     Expr::payload(PayloadBase::Network, 9, 1, 0).unwrap(),
//!     Expr::cmp(0, CmpOp::Eq, &[0x06]).unwrap(),
//!     Expr::verdict(Verdict::Drop),
//! ];
//! assert_eq!(exprs[0].name(), "payload_fast");
//! assert_eq!(exprs[1].name(), "cmp_fast");
//! ```

mod cmp;
mod immediate;
mod payload;

pub use cmp::{Cmp, CmpOp, FastCmp, MAX_CMP_LEN};
pub use immediate::{Immediate, ImmediateData, MAX_IMMEDIATE_LEN};
pub use payload::{FastPayload, MAX_PAYLOAD_LEN, Payload, PayloadBase};

use crate::chain::ChainId;
use crate::error::EngineError;
use crate::packet::Packet;
use crate::register::{REG_SIZE, Registers, Verdict};

/// 점프 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// 복귀 지점을 저장하는 호출
    Jump,
    /// 복귀 지점 없는 이동
    Goto,
}

/// 룰 표현식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// 레지스터 하나의 마스크 동등 비교
    FastCmp(FastCmp),
    /// 1/2/4바이트 페이로드 로드
    FastPayload(FastPayload),
    /// 일반 비교
    Cmp(Cmp),
    /// 일반 페이로드 로드
    Payload(Payload),
    /// 판정/상수 적재
    Immediate(Immediate),
}

impl Expr {
    /// 비교 표현식을 생성합니다.
    ///
    /// 동등 비교이고 상수가 4바이트 이하면 고속 비교가 선택됩니다.
    pub fn cmp(sreg: u8, op: CmpOp, data: &[u8]) -> Result<Self, EngineError> {
        if op == CmpOp::Eq && !data.is_empty() && data.len() <= REG_SIZE {
            return FastCmp::new(sreg, data).map(Self::FastCmp);
        }
        Cmp::new(sreg, op, data).map(Self::Cmp)
    }

    /// 바이트 단위 마스크를 적용한 동등 비교 (항상 고속 비교)
    pub fn cmp_masked(sreg: u8, mask: &[u8], data: &[u8]) -> Result<Self, EngineError> {
        FastCmp::masked(sreg, mask, data).map(Self::FastCmp)
    }

    /// 페이로드 로드 표현식을 생성합니다.
    ///
    /// 길이가 1, 2, 4바이트면 고속 로드가 선택됩니다.
    pub fn payload(base: PayloadBase, offset: u32, len: u8, dreg: u8) -> Result<Self, EngineError> {
        let payload = Payload::new(base, offset, len, dreg)?;
        Ok(match FastPayload::new(payload) {
            Some(fast) => Self::FastPayload(fast),
            None => Self::Payload(payload),
        })
    }

    /// 판정 즉시값
    pub fn verdict(verdict: Verdict) -> Self {
        Self::Immediate(Immediate::verdict(verdict))
    }

    /// 상수 데이터 즉시값
    pub fn immediate(dreg: u8, data: &[u8]) -> Result<Self, EngineError> {
        Immediate::data(dreg, data).map(Self::Immediate)
    }

    /// 표현식을 평가합니다.
    ///
    /// 고속 변형을 먼저 검사하고, 나머지는 일반 디스패치로 넘깁니다.
    /// 고속 로드가 패킷 범위를 벗어나면 일반 로드로 넘겨 `Break`를 받습니다.
    #[inline]
    pub fn eval(&self, regs: &mut Registers, pkt: &Packet) {
        match self {
            Self::FastCmp(cmp) => cmp.eval(regs),
            Self::FastPayload(payload) => payload.eval(regs, pkt),
            other => other.eval_generic(regs, pkt),
        }
    }

    #[inline(never)]
    fn eval_generic(&self, regs: &mut Registers, pkt: &Packet) {
        match self {
            Self::Cmp(cmp) => cmp.eval(regs),
            Self::Payload(payload) => payload.eval(regs, pkt),
            Self::Immediate(imm) => imm.eval(regs),
            Self::FastCmp(cmp) => cmp.eval(regs),
            Self::FastPayload(payload) => payload.eval(regs, pkt),
        }
    }

    /// 표현식 종류 이름 (로그/검사 출력용)
    pub fn name(&self) -> &'static str {
        match self {
            Self::FastCmp(_) => "cmp_fast",
            Self::FastPayload(_) => "payload_fast",
            Self::Cmp(_) => "cmp",
            Self::Payload(_) => "payload",
            Self::Immediate(_) => "immediate",
        }
    }

    /// 점프/이동 판정을 내는 표현식이면 대상 체인과 종류를 반환합니다.
    pub fn chain_target(&self) -> Option<(ChainId, JumpKind)> {
        match self {
            Self::Immediate(Immediate::Verdict(Verdict::Jump(id))) => Some((*id, JumpKind::Jump)),
            Self::Immediate(Immediate::Verdict(Verdict::Goto(id))) => Some((*id, JumpKind::Goto)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_packet() -> Packet {
        let mut raw = vec![0u8; 40];
        raw[0] = 0x45;
        raw[9] = 6;
        Packet::ipv4(raw)
    }

    #[test]
    fn cmp_selects_fast_variant() {
        assert!(matches!(Expr::cmp(0, CmpOp::Eq, &[6]).unwrap(), Expr::FastCmp(_)));
        assert!(matches!(
            Expr::cmp(0, CmpOp::Eq, &[1, 2, 3, 4]).unwrap(),
            Expr::FastCmp(_)
        ));
        assert!(matches!(
            Expr::cmp(0, CmpOp::Eq, &[0u8; 16]).unwrap(),
            Expr::Cmp(_)
        ));
        assert!(matches!(Expr::cmp(0, CmpOp::Lt, &[6]).unwrap(), Expr::Cmp(_)));
    }

    #[test]
    fn payload_selects_fast_variant() {
        let fast = Expr::payload(PayloadBase::Network, 9, 1, 0).unwrap();
        assert_eq!(fast.name(), "payload_fast");
        let slow = Expr::payload(PayloadBase::Network, 12, 8, 0).unwrap();
        assert_eq!(slow.name(), "payload");
        let odd = Expr::payload(PayloadBase::Network, 12, 3, 0).unwrap();
        assert_eq!(odd.name(), "payload");
    }

    #[test]
    fn fast_payload_out_of_bounds_falls_back_to_break() {
        let expr = Expr::payload(PayloadBase::Network, 100, 4, 0).unwrap();
        let mut regs = Registers::new();
        expr.eval(&mut regs, &tcp_packet());
        assert_eq!(regs.verdict(), Verdict::Break);
    }

    #[test]
    fn payload_then_cmp_matches_protocol() {
        let mut regs = Registers::new();
        let pkt = tcp_packet();
        Expr::payload(PayloadBase::Network, 9, 1, 0)
            .unwrap()
            .eval(&mut regs, &pkt);
        Expr::cmp(0, CmpOp::Eq, &[6]).unwrap().eval(&mut regs, &pkt);
        assert_eq!(regs.verdict(), Verdict::Continue);
        Expr::cmp(0, CmpOp::Eq, &[17]).unwrap().eval(&mut regs, &pkt);
        assert_eq!(regs.verdict(), Verdict::Break);
    }

    #[test]
    fn chain_target_detection() {
        let jump = Expr::verdict(Verdict::Jump(ChainId(2)));
        assert_eq!(jump.chain_target(), Some((ChainId(2), JumpKind::Jump)));
        let goto = Expr::verdict(Verdict::Goto(ChainId(3)));
        assert_eq!(goto.chain_target(), Some((ChainId(3), JumpKind::Goto)));
        assert_eq!(Expr::verdict(Verdict::Accept).chain_target(), None);
        assert_eq!(Expr::cmp(0, CmpOp::Eq, &[1]).unwrap().chain_target(), None);
    }

    #[test]
    fn immediate_data_then_cmp() {
        let pkt = tcp_packet();
        let mut regs = Registers::new();
        Expr::immediate(5, &[0xaa, 0xbb, 0xcc, 0xdd, 0xee])
            .unwrap()
            .eval(&mut regs, &pkt);
        Expr::cmp(5, CmpOp::Eq, &[0xaa, 0xbb, 0xcc, 0xdd, 0xee])
            .unwrap()
            .eval(&mut regs, &pkt);
        assert_eq!(regs.verdict(), Verdict::Continue);
    }
}
