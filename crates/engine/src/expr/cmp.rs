//! 비교 표현식
//!
//! 일반 비교([`Cmp`])는 레지스터 바이트열과 상수를 사전식으로 비교하고,
//! 고속 비교([`FastCmp`])는 32비트 레지스터 하나를 마스크 후 상수와 비교합니다.
//! 어느 쪽이든 조건이 거짓이면 판정 레지스터에 `Break`를 씁니다.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::register::{REG_SIZE, Registers, Verdict, check_register};

/// 일반 비교의 최대 상수 길이
pub const MAX_CMP_LEN: usize = 16;

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpOp {
    #[default]
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    #[inline]
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Neq => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Lte => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Gte => ord != Ordering::Less,
        }
    }
}

/// 일반 비교 표현식
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmp {
    sreg: u8,
    op: CmpOp,
    data: Box<[u8]>,
}

impl Cmp {
    /// 레지스터 `sreg`부터 `data.len()`바이트를 `data`와 비교하는 표현식을 생성합니다.
    pub fn new(sreg: u8, op: CmpOp, data: &[u8]) -> Result<Self, EngineError> {
        if data.len() > MAX_CMP_LEN {
            return Err(invalid(format!(
                "data length {} exceeds {MAX_CMP_LEN} bytes",
                data.len()
            )));
        }
        check_register(sreg, data.len()).map_err(invalid)?;
        Ok(Self {
            sreg,
            op,
            data: data.into(),
        })
    }

    pub fn sreg(&self) -> u8 {
        self.sreg
    }

    pub fn op(&self) -> CmpOp {
        self.op
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn eval(&self, regs: &mut Registers) {
        let ord = regs.bytes(self.sreg, self.data.len()).cmp(&*self.data);
        if !self.op.holds(ord) {
            regs.set_verdict(Verdict::Break);
        }
    }
}

/// 고속 비교 표현식
///
/// `(reg & mask) != data`이면 `Break`. 레지스터 하나(4바이트 이하)의
/// 동등 비교에만 쓰입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastCmp {
    sreg: u8,
    mask: u32,
    data: u32,
}

impl FastCmp {
    /// `data`(1~4바이트)와 동등 비교하는 표현식을 생성합니다.
    ///
    /// 마스크는 `data` 길이만큼의 바이트만 남깁니다.
    pub fn new(sreg: u8, data: &[u8]) -> Result<Self, EngineError> {
        let mask = vec![0xff; data.len()];
        Self::masked(sreg, &mask, data)
    }

    /// 바이트 단위 마스크를 적용한 동등 비교 표현식을 생성합니다.
    pub fn masked(sreg: u8, mask: &[u8], data: &[u8]) -> Result<Self, EngineError> {
        if data.is_empty() || data.len() > REG_SIZE {
            return Err(invalid(format!(
                "fast compare needs 1..={REG_SIZE} bytes, got {}",
                data.len()
            )));
        }
        if mask.len() != data.len() {
            return Err(invalid(format!(
                "mask length {} does not match data length {}",
                mask.len(),
                data.len()
            )));
        }
        let mask = pad_word(mask);
        let data = pad_word(data) & mask;
        Self::from_words(sreg, mask, data)
    }

    /// 32비트 마스크/상수로 직접 생성합니다. 값은 메모리 바이트 순서 그대로입니다.
    pub fn from_words(sreg: u8, mask: u32, data: u32) -> Result<Self, EngineError> {
        check_register(sreg, REG_SIZE).map_err(invalid)?;
        Ok(Self { sreg, mask, data })
    }

    pub fn sreg(&self) -> u8 {
        self.sreg
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn data(&self) -> u32 {
        self.data
    }

    #[inline]
    pub fn eval(&self, regs: &mut Registers) {
        if regs.word(self.sreg) & self.mask != self.data {
            regs.set_verdict(Verdict::Break);
        }
    }
}

fn pad_word(bytes: &[u8]) -> u32 {
    let mut word = [0u8; REG_SIZE];
    word[..bytes.len()].copy_from_slice(bytes);
    u32::from_ne_bytes(word)
}

fn invalid(reason: String) -> EngineError {
    EngineError::InvalidExpression {
        kind: "cmp",
        reason,
    }
}
