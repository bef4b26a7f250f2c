#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ironwall_core::types::{Disposition, NamespaceId, Policy};
use ironwall_engine::expr::{CmpOp, Expr, PayloadBase};
use ironwall_engine::{ChainId, EvalError, Evaluator, Packet, Table, Verdict};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 체인별 룰 목록 (체인 0은 베이스 체인)
    chains: Vec<Vec<Vec<FuzzExpr>>>,
    policy_drop: bool,
    packet: Vec<u8>,
    transport_offset: Option<u8>,
}

#[derive(Arbitrary, Debug)]
enum FuzzExpr {
    Payload {
        transport: bool,
        offset: u8,
        len: u8,
        dreg: u8,
    },
    Cmp {
        sreg: u8,
        op: FuzzOp,
        data: Vec<u8>,
    },
    CmpMasked {
        sreg: u8,
        mask: [u8; 4],
        data: [u8; 4],
    },
    Immediate {
        dreg: u8,
        data: Vec<u8>,
    },
    Verdict(FuzzVerdict),
}

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Arbitrary, Debug)]
enum FuzzVerdict {
    Accept,
    Drop,
    Queue(u16),
    Stolen,
    Continue,
    Return,
    Jump(u8),
    Goto(u8),
}

impl FuzzOp {
    fn to_cmp_op(&self) -> CmpOp {
        match self {
            FuzzOp::Eq => CmpOp::Eq,
            FuzzOp::Neq => CmpOp::Neq,
            FuzzOp::Lt => CmpOp::Lt,
            FuzzOp::Lte => CmpOp::Lte,
            FuzzOp::Gt => CmpOp::Gt,
            FuzzOp::Gte => CmpOp::Gte,
        }
    }
}

impl FuzzExpr {
    /// 잘못된 표현식은 생성자가 거부하므로 `None`
    fn build(&self, ids: &[ChainId]) -> Option<Expr> {
        match self {
            FuzzExpr::Payload {
                transport,
                offset,
                len,
                dreg,
            } => {
                let base = if *transport {
                    PayloadBase::Transport
                } else {
                    PayloadBase::Network
                };
                Expr::payload(base, u32::from(*offset), *len, *dreg).ok()
            }
            FuzzExpr::Cmp { sreg, op, data } => Expr::cmp(*sreg, op.to_cmp_op(), data).ok(),
            FuzzExpr::CmpMasked { sreg, mask, data } => Expr::cmp_masked(*sreg, mask, data).ok(),
            FuzzExpr::Immediate { dreg, data } => Expr::immediate(*dreg, data).ok(),
            FuzzExpr::Verdict(v) => {
                let verdict = match v {
                    FuzzVerdict::Accept => Verdict::Accept,
                    FuzzVerdict::Drop => Verdict::Drop,
                    FuzzVerdict::Queue(num) => Verdict::Queue(*num),
                    FuzzVerdict::Stolen => Verdict::Stolen,
                    FuzzVerdict::Continue => Verdict::Continue,
                    FuzzVerdict::Return => Verdict::Return,
                    FuzzVerdict::Jump(i) => Verdict::Jump(*ids.get(usize::from(*i) % ids.len())?),
                    FuzzVerdict::Goto(i) => Verdict::Goto(*ids.get(usize::from(*i) % ids.len())?),
                };
                Some(Expr::verdict(verdict))
            }
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    // 체인/룰 수 제한 (성능)
    if input.chains.is_empty() {
        return;
    }

    let table = Table::new("fuzz", NamespaceId::INIT).with_stats_shards(1);
    let mut tx = table.begin();
    let policy = if input.policy_drop {
        Policy::Drop
    } else {
        Policy::Accept
    };

    let mut ids = Vec::new();
    for i in 0..input.chains.len().min(8) {
        let policy = (i == 0).then_some(policy);
        let Ok(id) = tx.add_chain(&format!("c{i}"), policy) else {
            return;
        };
        ids.push(id);
    }
    let base = ids[0];
    // 베이스 체인으로의 점프는 커밋에서 거부되므로 일반 체인만 대상
    let targets = if ids.len() > 1 { &ids[1..] } else { &ids[..] };

    for (id, rules) in ids.iter().zip(&input.chains) {
        for rule in rules.iter().take(16) {
            let exprs: Vec<Expr> = rule
                .iter()
                .take(8)
                .filter_map(|e| e.build(targets))
                .collect();
            if tx.add_rule(*id, exprs).is_err() {
                return;
            }
        }
    }

    // 순환/깊이 위반은 커밋이 거부해야 함
    if tx.commit().is_err() {
        return;
    }

    let mut packet = Packet::ipv4(input.packet);
    if let Some(offset) = input.transport_offset {
        packet = packet.with_transport_offset(usize::from(offset));
    }

    let eval = Evaluator::new(Arc::new(table));
    let first = match eval.try_evaluate(&packet, base) {
        Ok(result) => result,
        // 경로 수가 많은 DAG는 평가 상한에 걸릴 수 있음
        Err(EvalError::StepBudgetExhausted { .. }) => return,
        // 커밋을 통과한 룰셋에서 스택 초과나 대상 누락은 없어야 함
        Err(e) => panic!("traversal aborted on a validated ruleset: {e}"),
    };

    // 같은 세대에서 같은 결과 (멱등성)
    let second = eval.evaluate(&packet, base);
    assert_eq!(first.disposition, second);
    if !input.policy_drop && first.disposition == Disposition::Drop {
        // Drop은 룰 판정에서만 나올 수 있음
        assert!(first.rules_evaluated > 0);
    }
});
