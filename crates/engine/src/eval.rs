//! 평가기 — 베이스 체인에서 시작하는 패킷 순회
//!
//! [`Evaluator`]는 패킷 하나를 베이스 체인의 룰에 차례로 적용하여 최종
//! [`Disposition`]을 결정합니다. 순회는 명시적 상태 기계로 구현됩니다.
//!
//! ```text
//!             ┌──── Jump(push) / Goto ───┐
//!             ▼                          │
//! start ──▶ Running(cursor) ── 룰 평가 ──┤── 최종 판정 ──▶ Terminated
//!             ▲                          │
//!             └──── 체인 끝/Return(pop) ─┤── 스택 비어 있음 ──▶ Policy ──▶ Terminated
//! ```
//!
//! 순회는 시작 시 세대를 한 번 고정하고 잠금 없이 진행합니다. 힙 할당은
//! 추적이 켜진 패킷의 이벤트 생성에서만 일어납니다.
//! 불변식 위반(점프 스택 초과, 대상 체인 없음, 평가 상한 초과)은 호출자에게
//! 패닉으로 전파되지 않고 로그를 남긴 뒤 패킷을 폐기합니다.

use std::sync::Arc;

use tracing::error;

use ironwall_core::config::EngineSettings;
use ironwall_core::metrics as m;
use ironwall_core::types::Disposition;

use crate::chain::{Chain, ChainId, RuleList};
use crate::error::EvalError;
use crate::generation::Generation;
use crate::jumpstack::JumpStack;
use crate::packet::Packet;
use crate::register::{Registers, Verdict};
use crate::rule::RuleHandle;
use crate::table::{ChainMap, Table};
use crate::trace::{TraceEvent, TraceKind, TraceSink, Tracer};

/// 순회당 기본 룰 평가 상한
pub const DEFAULT_MAX_STEPS: usize = 65_536;

/// 순회 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// 최종 처분
    pub disposition: Disposition,
    /// 평가한 룰 수
    pub rules_evaluated: usize,
}

/// 패킷 평가기
#[derive(Debug)]
pub struct Evaluator {
    table: Arc<Table>,
    tracer: Tracer,
    max_steps: usize,
}

impl Evaluator {
    /// 기본 설정(추적 꺼짐, 로그 싱크)으로 평가기를 생성합니다.
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            tracer: Tracer::log(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// 엔진 설정과 추적 싱크로 평가기를 생성합니다.
    pub fn with_settings(
        table: Arc<Table>,
        settings: &EngineSettings,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        let tracer = Tracer::new(sink);
        tracer.set_enabled(settings.trace_enabled);
        Self {
            table,
            tracer,
            max_steps: settings.max_steps.max(1),
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// 패킷을 평가하여 최종 처분을 반환합니다.
    ///
    /// 순회가 불변식 위반으로 중단되면 `Drop`을 반환합니다.
    pub fn evaluate(&self, pkt: &Packet, base: ChainId) -> Disposition {
        match self.try_evaluate(pkt, base) {
            Ok(eval) => eval.disposition,
            Err(err) => {
                error!(
                    table = %self.table.name(),
                    base = %base,
                    reason = err.reason(),
                    error = %err,
                    "traversal aborted, dropping packet"
                );
                metrics::counter!(m::ENGINE_EVALUATION_ABORTS_TOTAL, m::LABEL_REASON => err.reason())
                    .increment(1);
                Disposition::Drop
            }
        }
    }

    /// 패킷을 평가하고, 중단 시 원인을 반환합니다.
    ///
    /// 베이스 체인이 패킷과 다른 네임스페이스에 속하면 아무 룰도 평가하지 않고
    /// `Accept`를 반환합니다.
    pub fn try_evaluate(&self, pkt: &Packet, base: ChainId) -> Result<Evaluation, EvalError> {
        // 세대를 먼저 고정해야 체인 맵이 그 세대보다 오래되지 않습니다.
        let guard = self.table.gate().enter();
        let chains = self.table.chains();
        let chain = chains.get(base).ok_or(EvalError::NotBaseChain(base))?;
        let Some(info) = chain.base() else {
            return Err(EvalError::NotBaseChain(base));
        };
        if info.namespace() != pkt.namespace() {
            return Ok(Evaluation {
                disposition: Disposition::Accept,
                rules_evaluated: 0,
            });
        }

        let mut traversal = Traversal {
            pkt,
            chains: &chains,
            generation: guard.generation(),
            trace: self.tracer.for_packet(pkt),
            regs: Registers::new(),
            stack: JumpStack::new(),
            steps: 0,
            max_steps: self.max_steps,
        };

        let mut state = State::Running(Cursor::start(chain));
        loop {
            state = match state {
                State::Running(cursor) => traversal.run(cursor)?,
                State::Policy => {
                    let policy = info.policy();
                    traversal.trace(
                        chain,
                        None,
                        None,
                        TraceKind::Policy,
                        Verdict::from(Disposition::from(policy)),
                    );
                    info.stats().record(pkt.len());
                    State::Terminated(policy.into())
                }
                State::Terminated(disposition) => {
                    return Ok(Evaluation {
                        disposition,
                        rules_evaluated: traversal.steps,
                    });
                }
            };
        }
    }
}

/// 체인 안의 현재 위치. 점프 시 복귀 지점으로 저장됩니다.
struct Cursor<'a> {
    chain: &'a Chain,
    rules: Arc<RuleList>,
    /// 다음에 볼 룰 인덱스
    next: usize,
    /// 현재 세대에서 보이는 룰 기준 번호 (1부터)
    rulenum: u32,
}

impl<'a> Cursor<'a> {
    #[inline]
    fn start(chain: &'a Chain) -> Self {
        Self {
            chain,
            rules: chain.rules(),
            next: 0,
            rulenum: 0,
        }
    }
}

enum State<'a> {
    Running(Cursor<'a>),
    Policy,
    Terminated(Disposition),
}

/// 순회 하나의 상태
struct Traversal<'a> {
    pkt: &'a Packet,
    chains: &'a ChainMap,
    generation: Generation,
    trace: Option<&'a dyn TraceSink>,
    regs: Registers,
    stack: JumpStack<Cursor<'a>>,
    steps: usize,
    max_steps: usize,
}

impl<'a> Traversal<'a> {
    /// 커서 위치부터 체인을 평가하고 다음 상태를 반환합니다.
    fn run(&mut self, mut cursor: Cursor<'a>) -> Result<State<'a>, EvalError> {
        self.regs.reset();
        let mut last: Option<RuleHandle> = None;

        while let Some(rule) = cursor.rules.get(cursor.next) {
            cursor.next += 1;
            if !rule.is_active(self.generation) {
                continue;
            }
            cursor.rulenum += 1;
            self.steps += 1;
            if self.steps > self.max_steps {
                return Err(EvalError::StepBudgetExhausted {
                    chain: cursor.chain.name().to_owned(),
                    budget: self.max_steps,
                });
            }

            for expr in rule.exprs() {
                expr.eval(&mut self.regs, self.pkt);
                if self.regs.verdict() != Verdict::Continue {
                    break;
                }
            }

            match self.regs.verdict() {
                Verdict::Break => self.regs.set_verdict(Verdict::Continue),
                Verdict::Continue => self.trace(
                    cursor.chain,
                    Some(rule.handle()),
                    Some(cursor.rulenum),
                    TraceKind::Rule,
                    Verdict::Continue,
                ),
                _ => {
                    last = Some(rule.handle());
                    break;
                }
            }
        }

        let verdict = self.regs.verdict();
        if let Some(disposition) = verdict.disposition() {
            self.trace(cursor.chain, last, Some(cursor.rulenum), TraceKind::Rule, verdict);
            return Ok(State::Terminated(disposition));
        }

        match verdict {
            Verdict::Jump(target) | Verdict::Goto(target) => {
                let chain = cursor.chain;
                let rule = last.unwrap_or_default();
                let dest = self.resolve(chain, rule, target)?;
                self.trace(chain, last, Some(cursor.rulenum), TraceKind::Rule, verdict);
                if matches!(verdict, Verdict::Jump(_)) {
                    let depth = self.stack.len();
                    self.stack
                        .push(cursor)
                        .map_err(|_| EvalError::StackOverflow {
                            chain: chain.name().to_owned(),
                            rule,
                            depth,
                        })?;
                }
                return Ok(State::Running(Cursor::start(dest)));
            }
            Verdict::Return => {
                self.trace(cursor.chain, last, Some(cursor.rulenum), TraceKind::Return, verdict);
            }
            _ => {
                // 체인 끝
                cursor.rulenum += 1;
                self.trace(
                    cursor.chain,
                    None,
                    Some(cursor.rulenum),
                    TraceKind::Return,
                    Verdict::Continue,
                );
            }
        }

        match self.stack.pop() {
            Some(parent) => Ok(State::Running(parent)),
            None => Ok(State::Policy),
        }
    }

    #[inline]
    fn resolve(
        &self,
        chain: &Chain,
        rule: RuleHandle,
        target: ChainId,
    ) -> Result<&'a Chain, EvalError> {
        self.chains
            .get(target)
            .map(|c| &**c)
            .ok_or_else(|| EvalError::UnknownChain {
                chain: chain.name().to_owned(),
                rule,
                target,
            })
    }

    #[inline]
    fn trace(
        &self,
        chain: &Chain,
        rule: Option<RuleHandle>,
        rulenum: Option<u32>,
        kind: TraceKind,
        verdict: Verdict,
    ) {
        if let Some(sink) = self.trace {
            sink.emit(TraceEvent {
                table: chain.table_name().to_owned(),
                chain: chain.name().to_owned(),
                chain_id: chain.id(),
                rule,
                rulenum,
                kind,
                verdict,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ironwall_core::types::{NamespaceId, Policy};

    use super::*;
    use crate::expr::{CmpOp, Expr, PayloadBase};

    /// 이벤트를 모으는 테스트용 싱크
    #[derive(Default)]
    struct Collect(Mutex<Vec<TraceEvent>>);

    impl TraceSink for Collect {
        fn emit(&self, event: TraceEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn tcp_packet() -> Packet {
        let mut raw = vec![0u8; 40];
        raw[0] = 0x45;
        raw[9] = 6;
        Packet::ipv4(raw)
    }

    fn udp_packet() -> Packet {
        let mut raw = vec![0u8; 40];
        raw[0] = 0x45;
        raw[9] = 17;
        Packet::ipv4(raw)
    }

    fn match_tcp() -> Vec<Expr> {
        vec![
            Expr::payload(PayloadBase::Network, 9, 1, 0).unwrap(),
            Expr::cmp(0, CmpOp::Eq, &[6]).unwrap(),
        ]
    }

    fn with(mut exprs: Vec<Expr>, verdict: Verdict) -> Vec<Expr> {
        exprs.push(Expr::verdict(verdict));
        exprs
    }

    fn table() -> Arc<Table> {
        Arc::new(Table::new("filter", NamespaceId::INIT).with_stats_shards(1))
    }

    #[test]
    fn matching_rule_drops() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Accept)).unwrap();
        tx.add_rule(input, with(match_tcp(), Verdict::Drop)).unwrap();
        tx.commit().unwrap();

        let eval = Evaluator::new(Arc::clone(&table));
        assert_eq!(eval.evaluate(&tcp_packet(), input), Disposition::Drop);
        assert_eq!(eval.evaluate(&udp_packet(), input), Disposition::Accept);
    }

    #[test]
    fn policy_applies_and_counts_stats() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Drop)).unwrap();
        tx.add_rule(input, with(match_tcp(), Verdict::Accept)).unwrap();
        tx.commit().unwrap();

        let eval = Evaluator::new(Arc::clone(&table));
        let pkt = udp_packet();
        assert_eq!(eval.evaluate(&pkt, input), Disposition::Drop);
        // 룰 판정으로 끝난 패킷은 카운트하지 않음
        assert_eq!(eval.evaluate(&tcp_packet(), input), Disposition::Accept);

        let stats = table.chain("input").unwrap().stats().unwrap();
        assert_eq!(stats.packets, 1);
        assert_eq!(stats.bytes, pkt.len() as u64);
    }

    #[test]
    fn jump_then_return_resumes_caller() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Drop)).unwrap();
        let sub = tx.add_chain("sub", None).unwrap();
        tx.add_rule(input, vec![Expr::verdict(Verdict::Jump(sub))])
            .unwrap();
        tx.add_rule(input, vec![Expr::verdict(Verdict::Accept)])
            .unwrap();
        tx.add_rule(sub, vec![Expr::verdict(Verdict::Return)]).unwrap();
        tx.commit().unwrap();

        let eval = Evaluator::new(Arc::clone(&table));
        let result = eval.try_evaluate(&udp_packet(), input).unwrap();
        assert_eq!(result.disposition, Disposition::Accept);
        assert_eq!(result.rules_evaluated, 3);
    }

    #[test]
    fn goto_does_not_return() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Drop)).unwrap();
        let sub = tx.add_chain("sub", None).unwrap();
        tx.add_rule(input, vec![Expr::verdict(Verdict::Goto(sub))])
            .unwrap();
        tx.add_rule(input, vec![Expr::verdict(Verdict::Accept)])
            .unwrap();
        tx.commit().unwrap();

        let eval = Evaluator::new(Arc::clone(&table));
        // sub는 비어 있으므로 끝에 도달하고, 복귀 지점이 없어 정책 적용
        assert_eq!(eval.evaluate(&udp_packet(), input), Disposition::Drop);
    }

    #[test]
    fn queue_and_stolen_are_terminal() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Accept)).unwrap();
        tx.add_rule(input, with(match_tcp(), Verdict::Queue(3))).unwrap();
        tx.add_rule(input, vec![Expr::verdict(Verdict::Stolen)]).unwrap();
        tx.commit().unwrap();

        let eval = Evaluator::new(Arc::clone(&table));
        assert_eq!(eval.evaluate(&tcp_packet(), input), Disposition::Queue(3));
        assert_eq!(eval.evaluate(&udp_packet(), input), Disposition::Stolen);
    }

    #[test]
    fn foreign_namespace_is_accepted_untouched() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Drop)).unwrap();
        tx.add_rule(input, vec![Expr::verdict(Verdict::Drop)]).unwrap();
        tx.commit().unwrap();

        let eval = Evaluator::new(Arc::clone(&table));
        let pkt = tcp_packet().with_namespace(NamespaceId(9));
        let result = eval.try_evaluate(&pkt, input).unwrap();
        assert_eq!(result.disposition, Disposition::Accept);
        assert_eq!(result.rules_evaluated, 0);
        assert_eq!(table.chain("input").unwrap().stats().unwrap().packets, 0);
    }

    #[test]
    fn non_base_entry_fails_closed() {
        let table = table();
        let mut tx = table.begin();
        let sub = tx.add_chain("sub", None).unwrap();
        tx.commit().unwrap();

        let eval = Evaluator::new(Arc::clone(&table));
        assert_eq!(
            eval.try_evaluate(&tcp_packet(), sub),
            Err(EvalError::NotBaseChain(sub))
        );
        assert_eq!(eval.evaluate(&tcp_packet(), sub), Disposition::Drop);
        assert_eq!(
            eval.evaluate(&tcp_packet(), ChainId(1234)),
            Disposition::Drop
        );
    }

    #[test]
    fn step_budget_aborts_traversal() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Accept)).unwrap();
        for _ in 0..10 {
            tx.add_rule(input, match_tcp()).unwrap();
        }
        tx.commit().unwrap();

        let settings = EngineSettings {
            max_steps: 5,
            ..EngineSettings::default()
        };
        let eval = Evaluator::with_settings(Arc::clone(&table), &settings, Arc::new(Collect::default()));
        let err = eval.try_evaluate(&tcp_packet(), input).unwrap_err();
        assert!(matches!(err, EvalError::StepBudgetExhausted { budget: 5, .. }));
        assert_eq!(eval.evaluate(&tcp_packet(), input), Disposition::Drop);
    }

    #[test]
    fn trace_records_rule_return_and_policy() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Drop)).unwrap();
        let sub = tx.add_chain("sub", None).unwrap();
        tx.add_rule(input, vec![Expr::verdict(Verdict::Jump(sub))])
            .unwrap();
        tx.add_rule(sub, match_tcp()).unwrap();
        tx.commit().unwrap();

        let sink = Arc::new(Collect::default());
        let settings = EngineSettings {
            trace_enabled: true,
            ..EngineSettings::default()
        };
        let eval = Evaluator::with_settings(Arc::clone(&table), &settings, sink.clone());
        let pkt = udp_packet().with_trace(true);
        assert_eq!(eval.evaluate(&pkt, input), Disposition::Drop);

        let events = sink.0.lock().unwrap();
        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.chain.as_str(), e.kind, e.rulenum))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("input", TraceKind::Rule, Some(1)),
                ("sub", TraceKind::Return, Some(2)),
                ("input", TraceKind::Return, Some(2)),
                ("input", TraceKind::Policy, None),
            ]
        );
        assert!(events[3].rule.is_none());
        assert_eq!(events[3].verdict, Verdict::Drop);
    }

    #[test]
    fn jump_stack_overflow_drops_packet() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Accept)).unwrap();
        let mut prev = input;
        for depth in 0..17 {
            let next = tx.add_chain(&format!("level{depth}"), None).unwrap();
            tx.add_rule(prev, vec![Expr::verdict(Verdict::Jump(next))])
                .unwrap();
            prev = next;
        }
        // 검증을 거치면 거부되는 깊이
        tx.commit_unchecked();

        let eval = Evaluator::new(Arc::clone(&table));
        let err = eval.try_evaluate(&tcp_packet(), input).unwrap_err();
        assert!(matches!(err, EvalError::StackOverflow { depth: 16, .. }));
        assert_eq!(err.reason(), "stack_overflow");
        assert_eq!(eval.evaluate(&tcp_packet(), input), Disposition::Drop);
    }

    #[test]
    fn goto_cycle_is_bounded_by_step_budget() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Accept)).unwrap();
        let a = tx.add_chain("a", None).unwrap();
        let b = tx.add_chain("b", None).unwrap();
        tx.add_rule(input, vec![Expr::verdict(Verdict::Goto(a))])
            .unwrap();
        tx.add_rule(a, vec![Expr::verdict(Verdict::Goto(b))]).unwrap();
        tx.add_rule(b, vec![Expr::verdict(Verdict::Goto(a))]).unwrap();
        tx.commit_unchecked();

        let eval = Evaluator::new(Arc::clone(&table));
        let err = eval.try_evaluate(&tcp_packet(), input).unwrap_err();
        assert_eq!(err.reason(), "step_budget");
    }

    #[test]
    fn unmarked_packet_emits_no_trace() {
        let table = table();
        let mut tx = table.begin();
        let input = tx.add_chain("input", Some(Policy::Accept)).unwrap();
        tx.add_rule(input, match_tcp()).unwrap();
        tx.commit().unwrap();

        let sink = Arc::new(Collect::default());
        let settings = EngineSettings {
            trace_enabled: true,
            ..EngineSettings::default()
        };
        let eval = Evaluator::with_settings(Arc::clone(&table), &settings, sink.clone());
        eval.evaluate(&tcp_packet(), input);
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
