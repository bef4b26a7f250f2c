//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 엔진은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironwall_`
//! - 모듈명: `engine_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! 패킷 평가 경로에서는 메트릭을 갱신하지 않습니다. 체인 통계는 읽는 쪽에서
//! 코어별 카운터를 합산할 때 발행되고, 평가 중단처럼 드문 이벤트만
//! 발생 시점에 카운트됩니다.

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 체인 레이블 키
pub const LABEL_CHAIN: &str = "chain";

/// 테이블 레이블 키
pub const LABEL_TABLE: &str = "table";

/// 평가 중단 사유 레이블 키 (stack_overflow, unknown_chain, step_budget, not_base_chain)
pub const LABEL_REASON: &str = "reason";

// ─── Engine 메트릭 ─────────────────────────────────────────────────

/// Engine: 베이스 체인 정책까지 도달한 패킷 수 (counter, labels: table, chain)
pub const ENGINE_CHAIN_PACKETS_TOTAL: &str = "ironwall_engine_chain_packets_total";

/// Engine: 베이스 체인 정책까지 도달한 바이트 수 (counter, labels: table, chain)
pub const ENGINE_CHAIN_BYTES_TOTAL: &str = "ironwall_engine_chain_bytes_total";

/// Engine: 비정상 중단된 순회 수 (counter, label: reason)
pub const ENGINE_EVALUATION_ABORTS_TOTAL: &str = "ironwall_engine_evaluation_aborts_total";

/// Engine: 버퍼가 가득 차 버려진 추적 이벤트 수 (counter)
pub const ENGINE_TRACE_DROPPED_TOTAL: &str = "ironwall_engine_trace_dropped_total";

/// Engine: 커밋된 룰셋 세대 수 (counter, label: table)
pub const ENGINE_GENERATIONS_COMMITTED_TOTAL: &str =
    "ironwall_engine_generations_committed_total";

/// Engine: 현재 활성 룰 수 (gauge, label: table)
pub const ENGINE_ACTIVE_RULES: &str = "ironwall_engine_active_rules";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        ENGINE_CHAIN_PACKETS_TOTAL,
        "Packets that reached a base chain policy"
    );
    describe_counter!(
        ENGINE_CHAIN_BYTES_TOTAL,
        "Bytes of packets that reached a base chain policy"
    );
    describe_counter!(
        ENGINE_EVALUATION_ABORTS_TOTAL,
        "Traversals aborted on an invariant violation (packet dropped)"
    );
    describe_counter!(
        ENGINE_TRACE_DROPPED_TOTAL,
        "Trace events dropped because the sink buffer was full"
    );
    describe_counter!(
        ENGINE_GENERATIONS_COMMITTED_TOTAL,
        "Ruleset generations committed by the control plane"
    );
    describe_gauge!(ENGINE_ACTIVE_RULES, "Rules visible in the current generation");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_have_prefix() {
        for name in [
            ENGINE_CHAIN_PACKETS_TOTAL,
            ENGINE_CHAIN_BYTES_TOTAL,
            ENGINE_EVALUATION_ABORTS_TOTAL,
            ENGINE_TRACE_DROPPED_TOTAL,
            ENGINE_GENERATIONS_COMMITTED_TOTAL,
            ENGINE_ACTIVE_RULES,
        ] {
            assert!(name.starts_with("ironwall_engine_"), "{name}");
        }
    }

    #[test]
    fn describe_all_without_recorder_does_not_panic() {
        describe_all();
    }
}
