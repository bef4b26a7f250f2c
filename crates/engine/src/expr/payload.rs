//! 페이로드 로드 표현식
//!
//! 패킷의 네트워크/전송 계층 헤더 기준 오프셋에서 바이트를 읽어
//! 데이터 레지스터에 적재합니다.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::packet::Packet;
use crate::register::{REG_SIZE, Registers, Verdict, check_register};

/// 페이로드 로드의 최대 길이
pub const MAX_PAYLOAD_LEN: usize = 16;

/// 페이로드 오프셋 기준점
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadBase {
    /// 네트워크 헤더 시작
    Network,
    /// 전송 계층 헤더 시작
    Transport,
}

/// 페이로드 로드 표현식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    base: PayloadBase,
    offset: u32,
    len: u8,
    dreg: u8,
}

impl Payload {
    pub fn new(base: PayloadBase, offset: u32, len: u8, dreg: u8) -> Result<Self, EngineError> {
        if usize::from(len) > MAX_PAYLOAD_LEN {
            return Err(EngineError::InvalidExpression {
                kind: "payload",
                reason: format!("length {len} exceeds {MAX_PAYLOAD_LEN} bytes"),
            });
        }
        check_register(dreg, usize::from(len)).map_err(|reason| EngineError::InvalidExpression {
            kind: "payload",
            reason,
        })?;
        Ok(Self {
            base,
            offset,
            len,
            dreg,
        })
    }

    pub fn base(&self) -> PayloadBase {
        self.base
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn length(&self) -> u8 {
        self.len
    }

    pub fn dreg(&self) -> u8 {
        self.dreg
    }

    /// 고속 경로로 처리할 수 있는 길이(1, 2, 4바이트)인지 여부
    #[inline]
    pub fn is_fast_eligible(&self) -> bool {
        matches!(self.len, 1 | 2 | 4)
    }

    /// 읽을 바이트 구간. 헤더가 없거나 패킷 끝을 넘으면 `None`
    #[inline]
    fn source<'p>(&self, pkt: &'p Packet) -> Option<&'p [u8]> {
        let start = pkt
            .header_offset(self.base)?
            .checked_add(usize::try_from(self.offset).ok()?)?;
        let end = start.checked_add(usize::from(self.len))?;
        pkt.data().get(start..end)
    }

    /// 고속 로드: 레지스터 하나에 직접 적재합니다.
    ///
    /// 구간이 패킷 밖이거나 레지스터 하나보다 길면 아무것도 쓰지 않고 `false`를
    /// 반환합니다. 호출자는 이 경우 [`Payload::eval`]로 넘겨야 합니다.
    #[inline]
    pub(crate) fn eval_fast(&self, regs: &mut Registers, pkt: &Packet) -> bool {
        let Some(src) = self.source(pkt).filter(|src| src.len() <= REG_SIZE) else {
            return false;
        };
        let mut word = [0u8; REG_SIZE];
        word[..src.len()].copy_from_slice(src);
        regs.set_word(self.dreg, u32::from_ne_bytes(word));
        true
    }

    /// 일반 로드. 구간이 패킷 밖이면 `Break`로 룰 매칭을 중단합니다.
    pub fn eval(&self, regs: &mut Registers, pkt: &Packet) {
        match self.source(pkt) {
            Some(src) => regs.store(self.dreg, src),
            None => regs.set_verdict(Verdict::Break),
        }
    }
}

/// 1/2/4바이트 페이로드 로드
///
/// [`FastPayload::new`]는 고속 경로에 맞는 길이만 받습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastPayload(Payload);

impl FastPayload {
    /// 고속 경로로 처리할 수 없는 길이면 `None`
    pub fn new(payload: Payload) -> Option<Self> {
        payload.is_fast_eligible().then_some(Self(payload))
    }

    pub fn payload(&self) -> &Payload {
        &self.0
    }

    /// 고속 로드가 실패하면 일반 로드로 넘겨 `Break`를 받습니다.
    #[inline]
    pub fn eval(&self, regs: &mut Registers, pkt: &Packet) {
        if !self.0.eval_fast(regs, pkt) {
            self.0.eval(regs, pkt);
        }
    }
}
