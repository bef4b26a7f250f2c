//! 즉시값 표현식 — 판정 또는 상수 데이터를 레지스터에 씁니다.

use crate::chain::ChainId;
use crate::error::EngineError;
use crate::register::{Registers, Verdict, check_register};

/// 즉시값 데이터의 최대 길이
pub const MAX_IMMEDIATE_LEN: usize = 16;

/// 즉시값 표현식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Immediate {
    /// 판정 레지스터에 판정을 씁니다.
    Verdict(Verdict),
    /// 데이터 레지스터에 상수를 씁니다.
    Data(ImmediateData),
}

/// 레지스터에 적재할 상수. [`Immediate::data`]로만 만들 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmediateData {
    dreg: u8,
    data: Box<[u8]>,
}

impl ImmediateData {
    pub fn dreg(&self) -> u8 {
        self.dreg
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Immediate {
    pub fn verdict(verdict: Verdict) -> Self {
        Self::Verdict(verdict)
    }

    pub fn data(dreg: u8, data: &[u8]) -> Result<Self, EngineError> {
        if data.len() > MAX_IMMEDIATE_LEN {
            return Err(EngineError::InvalidExpression {
                kind: "immediate",
                reason: format!("data length {} exceeds {MAX_IMMEDIATE_LEN}", data.len()),
            });
        }
        check_register(dreg, data.len()).map_err(|reason| EngineError::InvalidExpression {
            kind: "immediate",
            reason,
        })?;
        Ok(Self::Data(ImmediateData {
            dreg,
            data: data.into(),
        }))
    }

    /// 점프/이동 대상 체인
    pub fn chain_target(&self) -> Option<ChainId> {
        match self {
            Self::Verdict(Verdict::Jump(id) | Verdict::Goto(id)) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn eval(&self, regs: &mut Registers) {
        match self {
            Self::Verdict(v) => regs.set_verdict(*v),
            Self::Data(imm) => regs.store(imm.dreg, &imm.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_immediate_sets_verdict() {
        let mut regs = Registers::new();
        Immediate::verdict(Verdict::Drop).eval(&mut regs);
        assert_eq!(regs.verdict(), Verdict::Drop);
    }

    #[test]
    fn data_immediate_loads_register() {
        let mut regs = Registers::new();
        Immediate::data(3, &[0xab, 0xcd]).unwrap().eval(&mut regs);
        assert_eq!(regs.bytes(3, 4), &[0xab, 0xcd, 0, 0]);
        assert_eq!(regs.verdict(), Verdict::Continue);
    }

    #[test]
    fn chain_target_for_jump_and_goto() {
        assert_eq!(
            Immediate::verdict(Verdict::Jump(ChainId(4))).chain_target(),
            Some(ChainId(4))
        );
        assert_eq!(
            Immediate::verdict(Verdict::Goto(ChainId(5))).chain_target(),
            Some(ChainId(5))
        );
        assert_eq!(Immediate::verdict(Verdict::Accept).chain_target(), None);
    }

    #[test]
    fn data_immediate_rejects_invalid() {
        assert!(Immediate::data(0, &[]).is_err());
        assert!(Immediate::data(0, &[0u8; 17]).is_err());
        assert!(Immediate::data(15, &[0u8; 5]).is_err());
    }

    #[test]
    fn data_immediate_fills_last_registers() {
        let imm = Immediate::data(12, &[0x11; MAX_IMMEDIATE_LEN]).unwrap();
        let Immediate::Data(data) = &imm else {
            panic!("expected data immediate");
        };
        assert_eq!(data.dreg(), 12);
        assert_eq!(data.data().len(), MAX_IMMEDIATE_LEN);

        let mut regs = Registers::new();
        imm.eval(&mut regs);
        assert_eq!(regs.word(15), u32::from_ne_bytes([0x11; 4]));
        assert!(Immediate::data(13, &[0x11; MAX_IMMEDIATE_LEN]).is_err());
    }
}
