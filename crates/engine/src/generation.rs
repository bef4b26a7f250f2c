//! 세대 관리 — 룰셋 갱신과 패킷 순회의 격리
//!
//! 룰셋은 두 개의 세대(0, 1)를 번갈아 사용합니다. 각 룰의 세대 마스크는
//! 어느 세대에서 보이는지를 비트로 나타내고, [`GenerationGate`]의 커서는
//! 현재 세대를 가리킵니다.
//!
//! 순회는 시작 시 [`GenerationGate::enter`]로 커서를 한 번 읽고 끝날 때까지
//! 그 세대만 봅니다. 제어 평면은 다음 세대 비트만 수정한 뒤 커서를 뒤집고,
//! [`GenerationGate::synchronize`]로 이전 세대 순회가 모두 끝나기를 기다린 후
//! 이전 세대 비트를 정리합니다.
//!
//! ```text
//! 제어 평면:  next 비트 수정 ──flip──▶ synchronize(old) ──▶ old 비트 정리
//! 순회:       enter() ── 세대 g 고정 ── 룰 평가 ── guard drop
//! ```

use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// 세대 마스크에서 두 세대 모두를 나타내는 값
pub const GENMASK_ALL: u8 = 0b11;

/// 룰셋 세대 (0 또는 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Generation(u8);

impl Generation {
    /// 세대 마스크에서 이 세대를 나타내는 비트
    #[inline]
    pub const fn bit(self) -> u8 {
        1 << self.0
    }

    /// 다음 세대
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 ^ 1)
    }

    #[inline]
    const fn index(self) -> usize {
        self.0 as usize
    }
}

/// 세대 커서와 세대별 활성 순회 수
#[derive(Debug)]
pub struct GenerationGate {
    cursor: AtomicU8,
    readers: [AtomicUsize; 2],
    sequence: AtomicU64,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self {
            cursor: AtomicU8::new(0),
            readers: [AtomicUsize::new(0), AtomicUsize::new(0)],
            sequence: AtomicU64::new(0),
        }
    }

    /// 현재 세대
    #[inline]
    pub fn current(&self) -> Generation {
        Generation(self.cursor.load(Ordering::SeqCst))
    }

    /// 지금까지 커밋된 세대 수
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// 세대 `generation`에서 진행 중인 순회 수
    pub fn readers(&self, generation: Generation) -> usize {
        self.readers[generation.index()].load(Ordering::SeqCst)
    }

    /// 순회를 시작하고 현재 세대를 고정합니다.
    ///
    /// 카운터를 올린 사이에 커서가 뒤집혔으면 되돌리고 다시 시도합니다.
    /// 커밋이 진행 중이어도 블록되지 않습니다.
    #[inline]
    pub fn enter(&self) -> ReadGuard<'_> {
        loop {
            let generation = self.current();
            self.readers[generation.index()].fetch_add(1, Ordering::SeqCst);
            if self.cursor.load(Ordering::SeqCst) == generation.0 {
                return ReadGuard {
                    gate: self,
                    generation,
                };
            }
            self.readers[generation.index()].fetch_sub(1, Ordering::SeqCst);
            std::hint::spin_loop();
        }
    }

    /// 커서를 다음 세대로 뒤집고 이전 세대를 반환합니다.
    ///
    /// 제어 평면 잠금을 쥔 상태에서만 호출해야 합니다.
    pub(crate) fn flip(&self) -> Generation {
        let old = self.current();
        self.cursor.store(old.next().0, Ordering::SeqCst);
        self.sequence.fetch_add(1, Ordering::SeqCst);
        old
    }

    /// 세대 `old`의 순회가 모두 끝날 때까지 기다립니다.
    pub(crate) fn synchronize(&self, old: Generation) {
        let mut spins = 0u32;
        while self.readers[old.index()].load(Ordering::SeqCst) != 0 {
            if spins < 64 {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
    }
}

impl Default for GenerationGate {
    fn default() -> Self {
        Self::new()
    }
}

/// 순회 동안 세대를 고정하는 가드
#[derive(Debug)]
pub struct ReadGuard<'g> {
    gate: &'g GenerationGate,
    generation: Generation,
}

impl ReadGuard<'_> {
    /// 고정된 세대
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.gate.readers[self.generation.index()].fetch_sub(1, Ordering::SeqCst);
    }
}
