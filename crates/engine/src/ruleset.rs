//! 룰셋 파일 — TOML로 기술한 테이블을 로드하여 트랜잭션으로 구성합니다.
//!
//! CLI, 벤치마크, 퍼즈 타깃, 통합 테스트가 같은 형식을 사용합니다.
//! 파일의 체인/룰은 [`Transaction`](crate::table::Transaction) API를 거쳐
//! 커밋되므로 커밋 검증(순환, 점프 깊이, 대상 체인)이 그대로 적용됩니다.
//!
//! # 형식
//! ```toml
//! [table]
//! name = "filter"
//! namespace = 0
//!
//! [[chain]]
//! name = "input"
//! policy = "drop"          # 있으면 베이스 체인
//!
//! [[chain.rule]]
//! comment = "tcp to tcp_in"
//! expr = [
//!   { type = "payload", base = "network", offset = 9, len = 1, dreg = 0 },
//!   { type = "cmp", sreg = 0, op = "eq", data = "06" },
//!   { type = "verdict", verdict = "jump", target = "tcp_in" },
//! ]
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use ironwall_core::config::EngineSettings;
use ironwall_core::types::{NamespaceId, Policy};

use crate::chain::ChainId;
use crate::error::EngineError;
use crate::expr::{CmpOp, Expr, PayloadBase};
use crate::register::Verdict;
use crate::table::Table;

/// 룰셋 파일 최대 크기
const MAX_RULESET_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB
/// 룰셋 하나의 최대 룰 수
const MAX_RULES_COUNT: usize = 100_000;

/// 룰셋 파일
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ruleset {
    /// 테이블 속성
    pub table: TableSpec,
    /// 체인 목록 (파일 순서대로 생성)
    #[serde(default, rename = "chain")]
    pub chains: Vec<ChainSpec>,
}

/// 테이블 속성
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub name: String,
    #[serde(default)]
    pub namespace: NamespaceId,
}

/// 체인 정의
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSpec {
    pub name: String,
    /// 베이스 체인 정책. 없으면 일반 체인
    #[serde(default)]
    pub policy: Option<Policy>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleSpec>,
}

/// 룰 정의
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(rename = "expr")]
    pub exprs: Vec<ExprSpec>,
}

/// 표현식 정의
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExprSpec {
    /// 페이로드 로드
    Payload {
        base: PayloadBase,
        offset: u32,
        len: u8,
        dreg: u8,
    },
    /// 비교 (`data`, `mask`는 16진 문자열)
    Cmp {
        sreg: u8,
        #[serde(default)]
        op: CmpOp,
        data: String,
        #[serde(default)]
        mask: Option<String>,
    },
    /// 상수 데이터 적재
    Immediate { dreg: u8, data: String },
    /// 판정
    Verdict {
        verdict: VerdictSpec,
        /// `jump`/`goto` 대상 체인 이름
        #[serde(default)]
        target: Option<String>,
        /// `queue` 번호
        #[serde(default)]
        queue: Option<u16>,
    },
}

/// 판정 이름
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSpec {
    Accept,
    Drop,
    Queue,
    Stolen,
    Continue,
    Return,
    Jump,
    Goto,
}

impl Ruleset {
    /// 파일에서 룰셋을 로드합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| EngineError::RulesetLoad {
                path: source.clone(),
                reason: format!("failed to read file metadata: {e}"),
            })?;
        if metadata.len() > MAX_RULESET_FILE_SIZE {
            return Err(EngineError::RulesetLoad {
                path: source,
                reason: format!(
                    "file too large: {} bytes (max: {MAX_RULESET_FILE_SIZE})",
                    metadata.len()
                ),
            });
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| EngineError::RulesetLoad {
                    path: source.clone(),
                    reason: format!("failed to read file: {e}"),
                })?;

        Self::parse(&content, &source)
    }

    /// TOML 문자열을 파싱합니다. `source`는 에러 메시지에 쓰입니다.
    pub fn parse(toml_str: &str, source: &str) -> Result<Self, EngineError> {
        let ruleset: Ruleset = toml::from_str(toml_str).map_err(|e| EngineError::RulesetLoad {
            path: source.to_owned(),
            reason: format!("TOML parse error: {e}"),
        })?;

        if ruleset.rule_count() > MAX_RULES_COUNT {
            return Err(EngineError::RulesetLoad {
                path: source.to_owned(),
                reason: format!("too many rules: max {MAX_RULES_COUNT}"),
            });
        }
        Ok(ruleset)
    }

    /// 전체 룰 수
    pub fn rule_count(&self) -> usize {
        self.chains.iter().map(|c| c.rules.len()).sum()
    }

    /// 새 테이블을 만들고 룰셋을 커밋합니다.
    pub fn build(&self, settings: &EngineSettings) -> Result<Table, EngineError> {
        let table = Table::new(&self.table.name, self.table.namespace)
            .with_stats_shards(settings.effective_shards());
        self.apply(&table)?;
        Ok(table)
    }

    /// 기존 테이블에 체인과 룰을 추가하는 트랜잭션 하나를 커밋합니다.
    ///
    /// 실패하면 테이블은 바뀌지 않습니다.
    pub fn apply(&self, table: &Table) -> Result<u64, EngineError> {
        let mut tx = table.begin();

        let mut ids: HashMap<&str, ChainId> = HashMap::new();
        let mut order = Vec::with_capacity(self.chains.len());
        for chain in &self.chains {
            let id = tx.add_chain(&chain.name, chain.policy)?;
            ids.insert(chain.name.as_str(), id);
            order.push(id);
        }

        for (chain, &id) in self.chains.iter().zip(&order) {
            for rule in &chain.rules {
                let exprs = rule
                    .exprs
                    .iter()
                    .map(|spec| spec.to_expr(&ids))
                    .collect::<Result<Vec<_>, _>>()?;
                tx.add_rule(id, exprs)?;
            }
        }

        let generation = tx.commit()?;
        info!(
            table = %self.table.name,
            chains = self.chains.len(),
            rules = self.rule_count(),
            "ruleset applied"
        );
        Ok(generation)
    }
}

impl ExprSpec {
    /// 표현식으로 변환합니다. 체인 이름은 `chains`에서 ID로 바꿉니다.
    pub fn to_expr(&self, chains: &HashMap<&str, ChainId>) -> Result<Expr, EngineError> {
        match self {
            Self::Payload {
                base,
                offset,
                len,
                dreg,
            } => Expr::payload(*base, *offset, *len, *dreg),
            Self::Cmp {
                sreg,
                op,
                data,
                mask,
            } => {
                let data = decode_hex("cmp", data)?;
                match mask {
                    Some(mask) if *op == CmpOp::Eq => {
                        Expr::cmp_masked(*sreg, &decode_hex("cmp", mask)?, &data)
                    }
                    Some(_) => Err(EngineError::InvalidExpression {
                        kind: "cmp",
                        reason: "mask is only supported with op = \"eq\"".to_owned(),
                    }),
                    None => Expr::cmp(*sreg, *op, &data),
                }
            }
            Self::Immediate { dreg, data } => Expr::immediate(*dreg, &decode_hex("immediate", data)?),
            Self::Verdict {
                verdict,
                target,
                queue,
            } => {
                let verdict = match verdict {
                    VerdictSpec::Accept => Verdict::Accept,
                    VerdictSpec::Drop => Verdict::Drop,
                    VerdictSpec::Stolen => Verdict::Stolen,
                    VerdictSpec::Continue => Verdict::Continue,
                    VerdictSpec::Return => Verdict::Return,
                    VerdictSpec::Queue => Verdict::Queue(queue.unwrap_or(0)),
                    VerdictSpec::Jump => Verdict::Jump(resolve_target(target, chains)?),
                    VerdictSpec::Goto => Verdict::Goto(resolve_target(target, chains)?),
                };
                Ok(Expr::verdict(verdict))
            }
        }
    }
}

fn resolve_target(
    target: &Option<String>,
    chains: &HashMap<&str, ChainId>,
) -> Result<ChainId, EngineError> {
    let name = target.as_deref().ok_or_else(|| EngineError::InvalidExpression {
        kind: "verdict",
        reason: "jump/goto requires a target chain".to_owned(),
    })?;
    chains
        .get(name)
        .copied()
        .ok_or_else(|| EngineError::UnknownChain(name.to_owned()))
}

fn decode_hex(kind: &'static str, s: &str) -> Result<Vec<u8>, EngineError> {
    let digits = s.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    hex::decode(digits).map_err(|e| EngineError::InvalidExpression {
        kind,
        reason: format!("invalid hex '{s}': {e}"),
    })
}
