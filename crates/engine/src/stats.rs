//! 통계 수집 — 코어별 샤드 기반 체인 카운터
//!
//! [`ChainStats`]는 베이스 체인 정책에 도달한 패킷 수와 바이트 수를
//! 샤드(코어) 단위로 누적합니다. 평가 경로에서는 현재 스레드에 배정된
//! 샤드 하나만 갱신하므로 코어 간 캐시 라인 경합이 없습니다.
//!
//! # 데이터 흐름
//! ```text
//! evaluate() ──record──▶ Shard[n] (스레드별)
//!                              │
//!          snapshot() ◀──합산──┘──▶ ChainCounters ──publish──▶ metrics
//! ```

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

use ironwall_core::metrics as m;

/// 캐시 라인 하나를 차지하는 카운터 샤드
#[derive(Debug, Default)]
#[repr(align(64))]
struct Shard {
    packets: AtomicU64,
    bytes: AtomicU64,
}

/// 샤드 합산 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainCounters {
    /// 정책 판정을 받은 패킷 수 (누적)
    pub packets: u64,
    /// 정책 판정을 받은 바이트 수 (누적)
    pub bytes: u64,
}

impl ChainCounters {
    /// 누적값을 Prometheus 카운터로 발행합니다.
    pub fn publish(&self, table: &str, chain: &str) {
        metrics::counter!(
            m::ENGINE_CHAIN_PACKETS_TOTAL,
            m::LABEL_TABLE => table.to_owned(),
            m::LABEL_CHAIN => chain.to_owned()
        )
        .absolute(self.packets);
        metrics::counter!(
            m::ENGINE_CHAIN_BYTES_TOTAL,
            m::LABEL_TABLE => table.to_owned(),
            m::LABEL_CHAIN => chain.to_owned()
        )
        .absolute(self.bytes);
    }
}

/// 베이스 체인 카운터
#[derive(Debug)]
pub struct ChainStats {
    shards: Box<[Shard]>,
}

impl ChainStats {
    /// `shards`개(최소 1개)의 샤드로 카운터를 생성합니다.
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| Shard::default()).collect();
        Self { shards }
    }

    /// 샤드 수
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// 패킷 하나를 현재 스레드의 샤드에 기록합니다.
    #[inline]
    pub fn record(&self, bytes: usize) {
        let shard = &self.shards[current_shard() % self.shards.len()];
        shard.packets.fetch_add(1, Ordering::Relaxed);
        shard.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// 모든 샤드를 합산합니다.
    ///
    /// 동시에 기록 중인 값은 일부만 반영될 수 있지만 각 카운터는 단조 증가합니다.
    pub fn snapshot(&self) -> ChainCounters {
        self.shards
            .iter()
            .fold(ChainCounters::default(), |acc, shard| ChainCounters {
                packets: acc.packets + shard.packets.load(Ordering::Relaxed),
                bytes: acc.bytes + shard.bytes.load(Ordering::Relaxed),
            })
    }

    /// 샤드별 값을 반환합니다.
    pub fn per_shard(&self) -> Vec<ChainCounters> {
        self.shards
            .iter()
            .map(|shard| ChainCounters {
                packets: shard.packets.load(Ordering::Relaxed),
                bytes: shard.bytes.load(Ordering::Relaxed),
            })
            .collect()
    }
}

/// 다음에 배정할 샤드 번호
static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD_INDEX: Cell<Option<usize>> = const { Cell::new(None) };
}

/// 현재 스레드의 샤드 번호. 스레드가 처음 기록할 때 라운드로빈으로 배정됩니다.
#[inline]
fn current_shard() -> usize {
    SHARD_INDEX.with(|slot| match slot.get() {
        Some(idx) => idx,
        None => {
            let idx = NEXT_SHARD.fetch_add(1, Ordering::Relaxed);
            slot.set(Some(idx));
            idx
        }
    })
}
