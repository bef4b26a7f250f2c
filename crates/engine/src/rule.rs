//! 룰 — 표현식 시퀀스와 세대 마스크
//!
//! 룰은 생성 후 표현식이 바뀌지 않습니다. 세대 마스크만 제어 평면이
//! 원자적으로 수정하며, 순회는 고정한 세대의 비트로 룰의 가시성을 판단합니다.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::chain::ChainId;
use crate::expr::{Expr, JumpKind};
use crate::generation::Generation;

/// 테이블 안에서 유일한 룰 식별자
pub type RuleHandle = u64;

/// 룰
#[derive(Debug)]
pub struct Rule {
    handle: RuleHandle,
    exprs: Box<[Expr]>,
    genmask: AtomicU8,
}

impl Rule {
    pub(crate) fn new(handle: RuleHandle, exprs: Vec<Expr>, genmask: u8) -> Self {
        Self {
            handle,
            exprs: exprs.into_boxed_slice(),
            genmask: AtomicU8::new(genmask),
        }
    }

    #[inline]
    pub fn handle(&self) -> RuleHandle {
        self.handle
    }

    #[inline]
    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    /// 현재 세대 마스크 (비트 n = 세대 n에서 활성)
    pub fn genmask(&self) -> u8 {
        self.genmask.load(Ordering::Acquire)
    }

    /// 세대 `generation`에서 보이는지 여부
    #[inline]
    pub fn is_active(&self, generation: Generation) -> bool {
        self.genmask.load(Ordering::Acquire) & generation.bit() != 0
    }

    pub(crate) fn activate(&self, generation: Generation) {
        self.genmask.fetch_or(generation.bit(), Ordering::AcqRel);
    }

    pub(crate) fn deactivate(&self, generation: Generation) {
        self.genmask.fetch_and(!generation.bit(), Ordering::AcqRel);
    }

    /// 이 룰이 내는 점프/이동 대상
    pub fn chain_targets(&self) -> impl Iterator<Item = (ChainId, JumpKind)> + '_ {
        self.exprs.iter().filter_map(Expr::chain_target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GENMASK_ALL, GenerationGate};
    use crate::register::Verdict;

    #[test]
    fn genmask_controls_visibility() {
        let gen0 = GenerationGate::new().current();
        let rule = Rule::new(1, vec![Expr::verdict(Verdict::Accept)], gen0.next().bit());
        assert!(!rule.is_active(gen0));
        assert!(rule.is_active(gen0.next()));

        rule.activate(gen0);
        assert_eq!(rule.genmask(), GENMASK_ALL);

        rule.deactivate(gen0.next());
        assert!(rule.is_active(gen0));
        assert!(!rule.is_active(gen0.next()));
    }

    #[test]
    fn chain_targets_lists_jumps() {
        let rule = Rule::new(
            7,
            vec![
                Expr::verdict(Verdict::Jump(ChainId(2))),
                Expr::verdict(Verdict::Goto(ChainId(3))),
                Expr::verdict(Verdict::Drop),
            ],
            GENMASK_ALL,
        );
        let targets: Vec<_> = rule.chain_targets().collect();
        assert_eq!(
            targets,
            vec![(ChainId(2), JumpKind::Jump), (ChainId(3), JumpKind::Goto)]
        );
        assert_eq!(rule.handle(), 7);
        assert_eq!(rule.exprs().len(), 3);
    }
}
