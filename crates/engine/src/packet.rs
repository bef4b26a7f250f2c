//! 패킷 뷰 — 평가 대상 패킷의 읽기 전용 표현
//!
//! [`Packet`]은 원시 버퍼([`Bytes`])와 네트워크/전송 계층 헤더 오프셋,
//! 패킷이 속한 네임스페이스, 추적 표시를 담습니다.
//! 버퍼 파싱은 페이로드 표현식의 몫이며 평가기는 버퍼 내용을 해석하지 않습니다.

use bytes::Bytes;

use ironwall_core::types::NamespaceId;

use crate::expr::PayloadBase;

/// IPv4 최소 헤더 길이
const IPV4_MIN_HEADER_LEN: usize = 20;

/// 평가 대상 패킷
#[derive(Debug, Clone)]
pub struct Packet {
    data: Bytes,
    network_offset: usize,
    transport_offset: Option<usize>,
    namespace: NamespaceId,
    trace: bool,
}

impl Packet {
    /// 버퍼 시작이 네트워크 헤더인 패킷을 생성합니다.
    ///
    /// 전송 계층 오프셋은 없고, 초기 네임스페이스에 속하며, 추적 표시가 없습니다.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            network_offset: 0,
            transport_offset: None,
            namespace: NamespaceId::INIT,
            trace: false,
        }
    }

    /// IPv4 패킷으로 해석하여 전송 계층 오프셋을 IHL에서 계산합니다.
    ///
    /// 버전 필드가 4가 아니거나 헤더가 잘린 경우 전송 계층 오프셋 없이 생성합니다.
    pub fn ipv4(data: impl Into<Bytes>) -> Self {
        let packet = Self::new(data);
        let Some(&first) = packet.data.first() else {
            return packet;
        };
        if first >> 4 != 4 {
            return packet;
        }
        let ihl = usize::from(first & 0x0f) * 4;
        if ihl < IPV4_MIN_HEADER_LEN || ihl > packet.data.len() {
            return packet;
        }
        packet.with_transport_offset(ihl)
    }

    /// 네트워크 헤더 오프셋(버퍼 시작 기준)을 지정합니다.
    pub fn with_network_offset(mut self, offset: usize) -> Self {
        self.network_offset = offset;
        self
    }

    /// 전송 계층 헤더 오프셋(버퍼 시작 기준)을 지정합니다.
    pub fn with_transport_offset(mut self, offset: usize) -> Self {
        self.transport_offset = Some(offset);
        self
    }

    /// 패킷이 속한 네임스페이스를 지정합니다.
    pub fn with_namespace(mut self, namespace: NamespaceId) -> Self {
        self.namespace = namespace;
        self
    }

    /// 추적 표시를 설정합니다.
    ///
    /// 평가기의 추적 토글이 켜져 있고 패킷에 표시가 있을 때만 추적 이벤트가 나갑니다.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// 원시 버퍼
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 패킷 길이 (바이트)
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 빈 패킷인지 여부
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 네트워크 헤더 오프셋
    #[inline]
    pub fn network_offset(&self) -> usize {
        self.network_offset
    }

    /// 전송 계층 헤더 오프셋 (없으면 `None`)
    #[inline]
    pub fn transport_offset(&self) -> Option<usize> {
        self.transport_offset
    }

    /// 패킷이 속한 네임스페이스
    #[inline]
    pub fn namespace(&self) -> NamespaceId {
        self.namespace
    }

    /// 추적 표시 여부
    #[inline]
    pub fn is_traced(&self) -> bool {
        self.trace
    }

    /// 페이로드 기준점의 버퍼 오프셋
    #[inline]
    pub fn header_offset(&self, base: PayloadBase) -> Option<usize> {
        match base {
            PayloadBase::Network => Some(self.network_offset),
            PayloadBase::Transport => self.transport_offset,
        }
    }
}
