//! 테이블 — 체인 집합과 트랜잭션 기반 룰셋 갱신
//!
//! [`Table`]은 체인 맵, 세대 게이트, 제어 평면 잠금을 가집니다.
//! 모든 룰셋 변경은 [`Transaction`]을 통해서만 이루어지며,
//! 트랜잭션은 다음 세대 비트만 수정하다가 커밋 시점에 한 번에 공개됩니다.
//!
//! # 커밋 순서
//! ```text
//! validate(next) ──▶ flip ──▶ synchronize(old) ──▶ finalize
//!  (순환/깊이/대상)   (공개)    (이전 순회 대기)      (old 비트 정리, 물리 삭제)
//! ```
//!
//! 패킷 순회는 제어 평면 잠금을 잡지 않습니다.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::{ArcSwap, Guard};
use tracing::{debug, info, warn};

use ironwall_core::metrics as m;
use ironwall_core::types::{NamespaceId, Policy};

use crate::chain::{BaseChain, Chain, ChainId};
use crate::error::EngineError;
use crate::expr::{Expr, JumpKind};
use crate::generation::{Generation, GenerationGate};
use crate::jumpstack::JUMP_STACK_SIZE;
use crate::rule::{Rule, RuleHandle};

/// ID와 이름으로 찾을 수 있는 체인 집합
#[derive(Debug, Clone, Default)]
pub struct ChainMap {
    slots: Vec<Option<Arc<Chain>>>,
    names: HashMap<Arc<str>, ChainId>,
}

impl ChainMap {
    #[inline]
    pub fn get(&self, id: ChainId) -> Option<&Arc<Chain>> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<Chain>> {
        self.names.get(name).and_then(|id| self.get(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Chain>> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn insert(&mut self, chain: Arc<Chain>) {
        let idx = chain.id().0 as usize;
        if self.slots.len() <= idx {
            self.slots.resize(idx + 1, None);
        }
        self.names.insert(Arc::from(chain.name()), chain.id());
        self.slots[idx] = Some(chain);
    }

    fn remove(&mut self, id: ChainId) -> Option<Arc<Chain>> {
        let chain = self.slots.get_mut(id.0 as usize)?.take()?;
        self.names.remove(chain.name());
        Some(chain)
    }
}

/// 제어 평면 상태 (잠금으로 보호)
#[derive(Debug, Default)]
struct ControlState {
    next_handle: RuleHandle,
    next_chain: u32,
}

/// 테이블
#[derive(Debug)]
pub struct Table {
    name: Arc<str>,
    namespace: NamespaceId,
    stats_shards: usize,
    gate: GenerationGate,
    chains: ArcSwap<ChainMap>,
    control: Mutex<ControlState>,
}

impl Table {
    /// 빈 테이블을 생성합니다. 통계 샤드 수는 가용 병렬성을 따릅니다.
    pub fn new(name: &str, namespace: NamespaceId) -> Self {
        let shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            name: Arc::from(name),
            namespace,
            stats_shards: shards,
            gate: GenerationGate::new(),
            chains: ArcSwap::from_pointee(ChainMap::default()),
            control: Mutex::new(ControlState {
                next_handle: 1,
                next_chain: 0,
            }),
        }
    }

    /// 이후 생성되는 베이스 체인의 통계 샤드 수를 지정합니다.
    pub fn with_stats_shards(mut self, shards: usize) -> Self {
        self.stats_shards = shards.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    pub fn gate(&self) -> &GenerationGate {
        &self.gate
    }

    /// 현재 세대
    pub fn generation(&self) -> Generation {
        self.gate.current()
    }

    /// 체인 맵 스냅샷
    #[inline]
    pub fn chains(&self) -> Guard<Arc<ChainMap>> {
        self.chains.load()
    }

    /// 이름으로 체인을 찾습니다.
    pub fn chain(&self, name: &str) -> Option<Arc<Chain>> {
        self.chains.load().lookup(name).cloned()
    }

    /// 이름으로 체인 ID를 찾습니다.
    pub fn chain_id(&self, name: &str) -> Option<ChainId> {
        self.chain(name).map(|c| c.id())
    }

    /// 현재 세대에서 보이는 룰 수
    pub fn active_rules(&self) -> usize {
        let generation = self.gate.current();
        self.chains
            .load()
            .iter()
            .map(|chain| chain.visible_rules(generation).len())
            .sum()
    }

    /// 모든 베이스 체인의 카운터를 메트릭으로 발행합니다.
    pub fn publish_stats(&self) {
        for chain in self.chains.load().iter() {
            if let Some(counters) = chain.stats() {
                counters.publish(&self.name, chain.name());
            }
        }
    }

    /// 트랜잭션을 시작합니다. 다른 트랜잭션이 끝날 때까지 기다립니다.
    pub fn begin(&self) -> Transaction<'_> {
        let state = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        let next = self.gate.current().next();
        Transaction {
            table: self,
            state,
            next,
            ops: Vec::new(),
            deleted: HashSet::new(),
            done: false,
        }
    }

    fn update_chains(&self, f: impl FnOnce(&mut ChainMap)) {
        let mut next = ChainMap::clone(&self.chains.load());
        f(&mut next);
        self.chains.store(Arc::new(next));
    }
}

/// 트랜잭션 내 변경 기록 (롤백/확정용)
#[derive(Debug)]
enum Op {
    AddChain(ChainId),
    DeleteChain(ChainId),
    AddRule { chain: Arc<Chain>, rule: Arc<Rule> },
    DeleteRule { chain: Arc<Chain>, rule: Arc<Rule> },
}

/// 룰셋 변경 트랜잭션
///
/// [`commit`](Self::commit)하지 않고 드롭하면 모든 변경이 취소됩니다.
#[derive(Debug)]
pub struct Transaction<'t> {
    table: &'t Table,
    state: MutexGuard<'t, ControlState>,
    next: Generation,
    ops: Vec<Op>,
    deleted: HashSet<ChainId>,
    done: bool,
}

impl Transaction<'_> {
    /// 체인을 추가합니다. `policy`가 있으면 베이스 체인이 됩니다.
    ///
    /// 새 체인은 바로 맵에 들어가지만 다음 세대 룰만 가지므로
    /// 커밋 전까지 기존 순회에는 영향이 없습니다.
    ///
    /// 같은 트랜잭션에서 삭제한 체인의 이름은 커밋 전까지 다시 쓸 수 없습니다
    /// (`DuplicateChain`). 삭제한 체인은 커밋이 이전 세대 순회를 기다린 뒤에야
    /// 맵에서 빠지기 때문입니다.
    pub fn add_chain(&mut self, name: &str, policy: Option<Policy>) -> Result<ChainId, EngineError> {
        if self.table.chains.load().lookup(name).is_some() {
            return Err(EngineError::DuplicateChain(name.to_owned()));
        }
        let id = ChainId(self.state.next_chain);
        self.state.next_chain += 1;

        let base = policy.map(|p| BaseChain::new(p, self.table.namespace, self.table.stats_shards));
        let chain = Arc::new(Chain::new(id, name, Arc::clone(&self.table.name), base));
        self.table.update_chains(|map| map.insert(chain));
        self.ops.push(Op::AddChain(id));
        debug!(table = %self.table.name, chain = name, %id, "chain added");
        Ok(id)
    }

    /// 체인을 삭제합니다. 다음 세대에 룰이 남아 있으면 실패합니다.
    pub fn delete_chain(&mut self, id: ChainId) -> Result<(), EngineError> {
        let chain = self.live_chain(id)?;
        if chain.rules().iter().any(|r| r.is_active(self.next)) {
            return Err(EngineError::ChainNotEmpty(chain.name().to_owned()));
        }
        self.deleted.insert(id);
        self.ops.push(Op::DeleteChain(id));
        Ok(())
    }

    /// 체인 끝에 룰을 추가하고 핸들을 반환합니다.
    pub fn add_rule(&mut self, chain: ChainId, exprs: Vec<Expr>) -> Result<RuleHandle, EngineError> {
        self.place_rule(chain, exprs, false)
    }

    /// 체인 맨 앞에 룰을 삽입하고 핸들을 반환합니다.
    pub fn insert_rule(
        &mut self,
        chain: ChainId,
        exprs: Vec<Expr>,
    ) -> Result<RuleHandle, EngineError> {
        self.place_rule(chain, exprs, true)
    }

    /// 핸들로 룰을 삭제합니다.
    pub fn delete_rule(&mut self, chain: ChainId, handle: RuleHandle) -> Result<(), EngineError> {
        let chain = self.live_chain(chain)?;
        let rule = chain
            .rules()
            .iter()
            .find(|r| r.handle() == handle && r.is_active(self.next))
            .cloned()
            .ok_or_else(|| EngineError::RuleNotFound {
                chain: chain.name().to_owned(),
                handle,
            })?;
        rule.deactivate(self.next);
        self.ops.push(Op::DeleteRule { chain, rule });
        Ok(())
    }

    /// 체인의 모든 룰을 삭제하고 삭제한 룰 수를 반환합니다.
    pub fn flush_chain(&mut self, chain: ChainId) -> Result<usize, EngineError> {
        let chain = self.live_chain(chain)?;
        let rules: Vec<_> = chain
            .rules()
            .iter()
            .filter(|r| r.is_active(self.next))
            .cloned()
            .collect();
        let count = rules.len();
        for rule in rules {
            rule.deactivate(self.next);
            self.ops.push(Op::DeleteRule {
                chain: Arc::clone(&chain),
                rule,
            });
        }
        Ok(count)
    }

    /// 트랜잭션 안에서 보이는 체인 ID를 이름으로 찾습니다.
    pub fn chain_id(&self, name: &str) -> Option<ChainId> {
        self.table
            .chains
            .load()
            .lookup(name)
            .map(|c| c.id())
            .filter(|id| !self.deleted.contains(id))
    }

    /// 변경을 검증하고 새 세대로 공개합니다.
    ///
    /// 검증에 실패하면 모든 변경을 취소하고 에러를 반환합니다.
    /// 성공하면 이전 세대의 순회가 모두 끝난 뒤 반환하며, 커밋된 세대 번호를 돌려줍니다.
    pub fn commit(mut self) -> Result<u64, EngineError> {
        if let Err(e) = self.validate() {
            warn!(table = %self.table.name, error = %e, "ruleset commit rejected");
            self.rollback();
            return Err(e);
        }
        Ok(self.publish())
    }

    /// 검증 없이 공개합니다. 평가기의 중단 경로를 시험하는 데만 씁니다.
    #[cfg(test)]
    pub(crate) fn commit_unchecked(self) -> u64 {
        self.publish()
    }

    fn publish(mut self) -> u64 {
        let gate = &self.table.gate;
        let old = gate.flip();
        gate.synchronize(old);

        let ops = std::mem::take(&mut self.ops);
        let op_count = ops.len();
        let mut touched: HashMap<ChainId, Arc<Chain>> = HashMap::new();
        for op in ops {
            match op {
                Op::AddRule { rule, .. } => rule.activate(old),
                Op::DeleteRule { chain, rule } => {
                    rule.deactivate(old);
                    touched.insert(chain.id(), chain);
                }
                Op::DeleteChain(id) => {
                    self.table.update_chains(|map| {
                        map.remove(id);
                    });
                }
                Op::AddChain(_) => {}
            }
        }
        for chain in touched.values() {
            chain.update_rules(|rules| rules.retain(|r| r.genmask() != 0));
        }
        self.deleted.clear();
        self.done = true;

        let sequence = gate.sequence();
        let active = self.table.active_rules();
        metrics::counter!(m::ENGINE_GENERATIONS_COMMITTED_TOTAL, m::LABEL_TABLE => self.table.name.to_string())
            .increment(1);
        metrics::gauge!(m::ENGINE_ACTIVE_RULES, m::LABEL_TABLE => self.table.name.to_string())
            .set(active as f64);
        info!(
            table = %self.table.name,
            generation = sequence,
            changes = op_count,
            active_rules = active,
            "ruleset committed"
        );
        sequence
    }

    /// 모든 변경을 취소합니다.
    pub fn abort(mut self) {
        self.rollback();
    }

    fn place_rule(
        &mut self,
        chain: ChainId,
        exprs: Vec<Expr>,
        front: bool,
    ) -> Result<RuleHandle, EngineError> {
        let chain = self.live_chain(chain)?;
        let handle = self.state.next_handle;
        self.state.next_handle += 1;

        let rule = Arc::new(Rule::new(handle, exprs, self.next.bit()));
        chain.update_rules(|rules| {
            if front {
                rules.insert(0, Arc::clone(&rule));
            } else {
                rules.push(Arc::clone(&rule));
            }
        });
        self.ops.push(Op::AddRule { chain, rule });
        Ok(handle)
    }

    fn live_chain(&self, id: ChainId) -> Result<Arc<Chain>, EngineError> {
        if self.deleted.contains(&id) {
            return Err(EngineError::UnknownChainId(id));
        }
        self.table
            .chains
            .load()
            .get(id)
            .cloned()
            .ok_or(EngineError::UnknownChainId(id))
    }

    fn rollback(&mut self) {
        if self.done {
            return;
        }
        let ops = std::mem::take(&mut self.ops);
        let count = ops.len();
        for op in ops.into_iter().rev() {
            match op {
                Op::AddRule { chain, rule } => {
                    chain.update_rules(|rules| rules.retain(|r| !Arc::ptr_eq(r, &rule)));
                }
                Op::DeleteRule { rule, .. } => rule.activate(self.next),
                Op::AddChain(id) => {
                    self.table.update_chains(|map| {
                        map.remove(id);
                    });
                }
                Op::DeleteChain(_) => {}
            }
        }
        self.deleted.clear();
        self.done = true;
        if count > 0 {
            debug!(table = %self.table.name, changes = count, "transaction aborted");
        }
    }

    /// 다음 세대의 체인 그래프를 검증합니다.
    ///
    /// - 점프/이동 대상이 존재하고 삭제 예정이 아니어야 함
    /// - 베이스 체인은 대상이 될 수 없음
    /// - 순환이 없어야 함
    /// - 베이스 체인에서의 점프 중첩 깊이가 점프 스택 용량 이하
    fn validate(&self) -> Result<(), EngineError> {
        let map = self.table.chains.load();
        let live: Vec<&Arc<Chain>> = map
            .iter()
            .filter(|c| !self.deleted.contains(&c.id()))
            .collect();

        let mut edges: HashMap<ChainId, Vec<(ChainId, JumpKind)>> = HashMap::new();
        for chain in &live {
            let mut out = Vec::new();
            for rule in chain.rules().iter().filter(|r| r.is_active(self.next)) {
                for (target, kind) in rule.chain_targets() {
                    let Some(dest) = map.get(target).filter(|t| !self.deleted.contains(&t.id()))
                    else {
                        return Err(EngineError::DanglingJump {
                            from: chain.name().to_owned(),
                            rule: rule.handle(),
                            target,
                        });
                    };
                    if dest.is_base() {
                        return Err(EngineError::JumpToBaseChain {
                            from: chain.name().to_owned(),
                            rule: rule.handle(),
                            target: dest.name().to_owned(),
                        });
                    }
                    out.push((target, kind));
                }
            }
            edges.insert(chain.id(), out);
        }

        let mut marks = HashMap::new();
        for chain in &live {
            let depth = jump_depth(chain.id(), &edges, &mut marks, &map)?;
            if chain.is_base() && depth > JUMP_STACK_SIZE {
                return Err(EngineError::JumpDepthExceeded {
                    chain: chain.name().to_owned(),
                    depth,
                    max: JUMP_STACK_SIZE,
                });
            }
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

#[derive(Debug, Clone, Copy)]
enum Mark {
    Visiting,
    Done(usize),
}

/// `id`에서 시작하는 가장 깊은 점프 중첩 수. 이동(goto)은 깊이를 늘리지 않습니다.
fn jump_depth(
    id: ChainId,
    edges: &HashMap<ChainId, Vec<(ChainId, JumpKind)>>,
    marks: &mut HashMap<ChainId, Mark>,
    map: &ChainMap,
) -> Result<usize, EngineError> {
    match marks.get(&id) {
        Some(Mark::Done(depth)) => return Ok(*depth),
        Some(Mark::Visiting) => {
            return Err(EngineError::ChainLoop {
                chain: map.get(id).map(|c| c.name().to_owned()).unwrap_or_default(),
            });
        }
        None => {}
    }
    marks.insert(id, Mark::Visiting);
    let mut deepest = 0;
    for (target, kind) in edges.get(&id).map(Vec::as_slice).unwrap_or_default() {
        let below = jump_depth(*target, edges, marks, map)?;
        let depth = below + usize::from(*kind == JumpKind::Jump);
        deepest = deepest.max(depth);
    }
    marks.insert(id, Mark::Done(deepest));
    Ok(deepest)
}
