//! 룰 추적 — 순회 경로를 이벤트로 내보냅니다.
//!
//! 추적은 두 조건이 모두 참일 때만 동작합니다.
//! [`Tracer`]의 토글이 켜져 있고, 패킷에 추적 표시가 있어야 합니다.
//! 두 조건은 순회 시작 시 한 번만 검사되며, 조건이 거짓이면 이벤트 데이터를
//! 만들지 않습니다.
//!
//! 이벤트 종류:
//! - `rule`: 룰이 판정을 냈거나 다음 룰로 넘어감
//! - `return`: 체인 끝에 도달했거나 `Return` 판정
//! - `policy`: 베이스 체인 정책 적용 (룰 없음, 룰 번호 없음)

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::info;

use ironwall_core::metrics as m;

use crate::chain::ChainId;
use crate::packet::Packet;
use crate::register::Verdict;
use crate::rule::RuleHandle;

/// 추적 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Rule,
    Return,
    Policy,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule => f.write_str("rule"),
            Self::Return => f.write_str("return"),
            Self::Policy => f.write_str("policy"),
        }
    }
}

/// 추적 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    /// 테이블 이름
    pub table: String,
    /// 체인 이름
    pub chain: String,
    /// 체인 ID
    pub chain_id: ChainId,
    /// 룰 핸들 (정책/체인 끝 이벤트는 `None`)
    pub rule: Option<RuleHandle>,
    /// 체인 안에서 1부터 센 룰 번호 (정책 이벤트는 `None`)
    pub rulenum: Option<u32>,
    /// 이벤트 종류
    pub kind: TraceKind,
    /// 이 시점의 판정
    pub verdict: Verdict,
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TRACE: {}:{}:{}:", self.table, self.chain, self.kind)?;
        match self.rulenum {
            Some(num) => write!(f, "{num}"),
            None => f.write_str("-"),
        }
    }
}

/// 추적 이벤트 수신자
pub trait TraceSink: Send + Sync {
    /// 이벤트 하나를 전달합니다. 패킷 경로에서 호출되므로 블록하면 안 됩니다.
    fn emit(&self, event: TraceEvent);
}

/// `tracing` 로그로 내보내는 싱크
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn emit(&self, event: TraceEvent) {
        info!(
            table = %event.table,
            chain = %event.chain,
            rule = ?event.rule,
            verdict = ?event.verdict,
            "{event}"
        );
    }
}

/// 바운디드 채널로 내보내는 싱크
///
/// 버퍼가 가득 차면 이벤트를 버리고 카운터를 올립니다.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TraceEvent>,
}

impl ChannelSink {
    /// 버퍼 크기 `capacity`의 싱크와 수신 측을 생성합니다.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TraceEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl TraceSink for ChannelSink {
    fn emit(&self, event: TraceEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::counter!(m::ENGINE_TRACE_DROPPED_TOTAL).increment(1);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// 추적 토글과 싱크
pub struct Tracer {
    enabled: AtomicBool,
    sink: Arc<dyn TraceSink>,
}

impl Tracer {
    /// 꺼진 상태의 추적기를 생성합니다.
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            sink,
        }
    }

    /// 로그 싱크를 쓰는 추적기
    pub fn log() -> Self {
        Self::new(Arc::new(LogSink))
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// 이 패킷을 추적해야 하면 싱크를 반환합니다.
    #[inline]
    pub(crate) fn for_packet(&self, pkt: &Packet) -> Option<&dyn TraceSink> {
        if pkt.is_traced() && self.enabled.load(Ordering::Relaxed) {
            Some(self.sink.as_ref())
        } else {
            None
        }
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: TraceKind, rulenum: Option<u32>) -> TraceEvent {
        TraceEvent {
            table: "filter".to_owned(),
            chain: "input".to_owned(),
            chain_id: ChainId(0),
            rule: rulenum.map(u64::from),
            rulenum,
            kind,
            verdict: Verdict::Accept,
        }
    }

    #[test]
    fn event_display_matches_trace_format() {
        assert_eq!(
            event(TraceKind::Rule, Some(2)).to_string(),
            "TRACE: filter:input:rule:2"
        );
        assert_eq!(
            event(TraceKind::Policy, None).to_string(),
            "TRACE: filter:input:policy:-"
        );
    }

    #[test]
    fn event_serializes_kind_lowercase() {
        let json = serde_json::to_string(&event(TraceKind::Return, Some(1))).unwrap();
        assert!(json.contains("\"kind\":\"return\""));
        assert!(json.contains("\"rulenum\":1"));
    }

    #[test]
    fn tracer_requires_toggle_and_mark() {
        let tracer = Tracer::log();
        let marked = Packet::new(vec![0u8; 4]).with_trace(true);
        let unmarked = Packet::new(vec![0u8; 4]);

        assert!(tracer.for_packet(&marked).is_none());
        tracer.set_enabled(true);
        assert!(tracer.for_packet(&marked).is_some());
        assert!(tracer.for_packet(&unmarked).is_none());
    }

    #[tokio::test]
    async fn channel_sink_delivers_events() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.emit(event(TraceKind::Rule, Some(1)));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.kind, TraceKind::Rule);
    }

    #[tokio::test]
    async fn channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.emit(event(TraceKind::Rule, Some(1)));
        sink.emit(event(TraceKind::Rule, Some(2)));
        assert_eq!(rx.recv().await.unwrap().rulenum, Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_sink_ignores_closed_receiver() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        sink.emit(event(TraceKind::Rule, Some(1)));
    }
}
