//! 체인 — 순서가 있는 룰 목록
//!
//! 룰 목록은 [`ArcSwap`]에 담긴 불변 벡터입니다. 제어 평면은 목록을 복사해
//! 수정한 뒤 통째로 교체하고(copy-on-write), 순회는 잠금 없이 현재 목록의
//! 스냅샷을 읽습니다. 베이스 체인은 추가로 정책, 네임스페이스, 통계를 가집니다.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use ironwall_core::types::{NamespaceId, Policy};

use crate::generation::Generation;
use crate::rule::Rule;
use crate::stats::{ChainCounters, ChainStats};

/// 테이블 안에서 유일한 체인 식별자
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChainId(pub u32);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 체인의 룰 목록
pub type RuleList = Vec<Arc<Rule>>;

/// 베이스 체인 속성
#[derive(Debug)]
pub struct BaseChain {
    policy: Policy,
    namespace: NamespaceId,
    stats: ChainStats,
}

impl BaseChain {
    pub fn new(policy: Policy, namespace: NamespaceId, stats_shards: usize) -> Self {
        Self {
            policy,
            namespace,
            stats: ChainStats::new(stats_shards),
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    pub fn stats(&self) -> &ChainStats {
        &self.stats
    }
}

/// 체인
#[derive(Debug)]
pub struct Chain {
    id: ChainId,
    name: Arc<str>,
    table: Arc<str>,
    rules: ArcSwap<RuleList>,
    base: Option<BaseChain>,
}

impl Chain {
    pub(crate) fn new(id: ChainId, name: &str, table: Arc<str>, base: Option<BaseChain>) -> Self {
        Self {
            id,
            name: Arc::from(name),
            table,
            rules: ArcSwap::from_pointee(Vec::new()),
            base,
        }
    }

    #[inline]
    pub fn id(&self) -> ChainId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 소속 테이블 이름
    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn is_base(&self) -> bool {
        self.base.is_some()
    }

    #[inline]
    pub fn base(&self) -> Option<&BaseChain> {
        self.base.as_ref()
    }

    /// 현재 룰 목록 스냅샷 (모든 세대의 룰 포함)
    #[inline]
    pub fn rules(&self) -> Arc<RuleList> {
        self.rules.load_full()
    }

    /// 세대 `generation`에서 보이는 룰
    pub fn visible_rules(&self, generation: Generation) -> Vec<Arc<Rule>> {
        self.rules
            .load()
            .iter()
            .filter(|rule| rule.is_active(generation))
            .cloned()
            .collect()
    }

    /// 베이스 체인 카운터 합산값. 일반 체인이면 `None`
    pub fn stats(&self) -> Option<ChainCounters> {
        self.base.as_ref().map(|base| base.stats.snapshot())
    }

    /// 룰 목록을 복사해 수정한 뒤 교체합니다.
    ///
    /// 제어 평면 잠금을 쥔 상태에서만 호출해야 합니다.
    pub(crate) fn update_rules(&self, f: impl FnOnce(&mut RuleList)) {
        let mut next = RuleList::clone(&self.rules.load());
        f(&mut next);
        self.rules.store(Arc::new(next));
    }
}
