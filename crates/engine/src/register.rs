//! 레지스터 파일 — 한 패킷 순회 동안만 유효한 판정/데이터 레지스터
//!
//! [`Registers`]는 판정 레지스터 1개와 32비트 데이터 레지스터 [`REG_COUNT`]개로
//! 구성됩니다. 데이터 레지스터는 바이트 단위로 주소 지정할 수 있어서 4바이트보다
//! 긴 값(예: IPv6 주소)은 연속된 레지스터에 걸쳐 저장됩니다.
//!
//! 레지스터 파일은 순회마다 새로 만들어지며 패킷이나 코어 사이에 공유되지 않습니다.
//! 앞선 표현식이 쓰기 전에 데이터 레지스터를 읽으면 안 됩니다 (룰 작성 규약이며
//! 런타임에 검사하지 않습니다).

use serde::Serialize;

use ironwall_core::types::Disposition;

use crate::chain::ChainId;

/// 32비트 데이터 레지스터 수
pub const REG_COUNT: usize = 16;

/// 데이터 레지스터 하나의 크기 (바이트)
pub const REG_SIZE: usize = 4;

/// 데이터 레지스터 영역 전체 크기 (바이트)
pub const REG_BYTES: usize = REG_COUNT * REG_SIZE;

/// 판정 코드
///
/// `Accept`/`Drop`/`Queue`/`Stolen`만 순회를 끝내는 최종 처분이고,
/// 나머지는 평가기가 소비하는 내부 제어 흐름 신호입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "code", content = "arg", rename_all = "lowercase")]
pub enum Verdict {
    /// 다음 표현식/룰로 계속
    Continue,
    /// 현재 룰 매칭 실패, 다음 룰로
    Break,
    /// 대상 체인 호출 (복귀 지점을 점프 스택에 저장)
    Jump(ChainId),
    /// 대상 체인으로 이동 (복귀 지점 없음)
    Goto(ChainId),
    /// 호출한 체인으로 복귀
    Return,
    /// 패킷 통과
    Accept,
    /// 패킷 폐기
    Drop,
    /// 사용자 공간 큐로 전달
    Queue(u16),
    /// 패킷이 소비됨
    Stolen,
}

impl Verdict {
    /// 최종 처분이면 해당 [`Disposition`]을 반환합니다.
    #[inline]
    pub fn disposition(self) -> Option<Disposition> {
        match self {
            Self::Accept => Some(Disposition::Accept),
            Self::Drop => Some(Disposition::Drop),
            Self::Queue(num) => Some(Disposition::Queue(num)),
            Self::Stolen => Some(Disposition::Stolen),
            Self::Continue | Self::Break | Self::Jump(_) | Self::Goto(_) | Self::Return => None,
        }
    }

    /// 순회를 끝내는 판정인지 여부
    #[inline]
    pub fn is_terminal(self) -> bool {
        self.disposition().is_some()
    }
}

impl From<Disposition> for Verdict {
    fn from(d: Disposition) -> Self {
        match d {
            Disposition::Accept => Self::Accept,
            Disposition::Drop => Self::Drop,
            Disposition::Queue(num) => Self::Queue(num),
            Disposition::Stolen => Self::Stolen,
        }
    }
}

/// 레지스터 파일
///
/// 데이터 레지스터 인덱스와 길이는 표현식 생성 시점에
/// [`check_register`]로 검증되므로 평가 경로에서는 다시 검사하지 않습니다.
#[derive(Debug, Clone)]
pub struct Registers {
    verdict: Verdict,
    data: [u8; REG_BYTES],
}

impl Registers {
    /// 판정 `Continue`, 데이터 0으로 초기화된 레지스터 파일을 생성합니다.
    pub fn new() -> Self {
        Self {
            verdict: Verdict::Continue,
            data: [0; REG_BYTES],
        }
    }

    /// 판정 레지스터를 `Continue`로 되돌립니다.
    ///
    /// 데이터 레지스터는 건드리지 않습니다.
    #[inline]
    pub fn reset(&mut self) {
        self.verdict = Verdict::Continue;
    }

    /// 현재 판정
    #[inline]
    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    /// 판정 레지스터를 설정합니다.
    #[inline]
    pub fn set_verdict(&mut self, verdict: Verdict) {
        self.verdict = verdict;
    }

    /// 데이터 레지스터 하나를 32비트 값(메모리 바이트 순서 그대로)으로 읽습니다.
    #[inline]
    pub fn word(&self, reg: u8) -> u32 {
        let off = usize::from(reg) * REG_SIZE;
        let mut word = [0u8; REG_SIZE];
        word.copy_from_slice(&self.data[off..off + REG_SIZE]);
        u32::from_ne_bytes(word)
    }

    /// 데이터 레지스터 하나에 32비트 값을 씁니다.
    #[inline]
    pub fn set_word(&mut self, reg: u8, value: u32) {
        let off = usize::from(reg) * REG_SIZE;
        self.data[off..off + REG_SIZE].copy_from_slice(&value.to_ne_bytes());
    }

    /// `reg`부터 `len`바이트를 읽습니다.
    #[inline]
    pub fn bytes(&self, reg: u8, len: usize) -> &[u8] {
        let off = usize::from(reg) * REG_SIZE;
        &self.data[off..off + len]
    }

    /// `reg`부터 `len`바이트를 씁니다.
    ///
    /// 마지막 레지스터의 남는 바이트는 0으로 채워서 이전 값이 남지 않게 합니다.
    #[inline]
    pub fn store(&mut self, reg: u8, src: &[u8]) {
        let off = usize::from(reg) * REG_SIZE;
        let padded = src.len().div_ceil(REG_SIZE) * REG_SIZE;
        let dst = &mut self.data[off..off + padded];
        dst.fill(0);
        dst[..src.len()].copy_from_slice(src);
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// 레지스터 범위를 검증합니다.
///
/// `reg`부터 `len`바이트(레지스터 경계로 올림)가 데이터 영역 안에 있어야 합니다.
pub fn check_register(reg: u8, len: usize) -> Result<(), String> {
    if len == 0 {
        return Err("length must be greater than 0".to_owned());
    }
    if usize::from(reg) >= REG_COUNT {
        return Err(format!("register {reg} out of range (max {})", REG_COUNT - 1));
    }
    let end = usize::from(reg) * REG_SIZE + len.div_ceil(REG_SIZE) * REG_SIZE;
    if end > REG_BYTES {
        return Err(format!(
            "{len} bytes starting at register {reg} exceed the register file"
        ));
    }
    Ok(())
}
