//! `ironwall check` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use ironwall_core::config::EngineSettings;
use ironwall_core::types::Policy;
use ironwall_engine::{EngineError, Ruleset, Table};

use crate::cli::CheckArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `check` command.
///
/// The ruleset is built into a fresh table, so every commit-time check
/// (dangling targets, jumps to base chains, loops, nesting depth) runs.
pub async fn execute(
    args: CheckArgs,
    settings: &EngineSettings,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %args.ruleset.display(), "checking ruleset");
    let source = args.ruleset.display().to_string();

    match build(&args, settings).await {
        Ok(table) => {
            writer.render(&RulesetReport::from_table(source, &table))?;
            Ok(())
        }
        Err(e) => {
            writer.render(&RulesetReport::invalid(source, &e))?;
            Err(e.into())
        }
    }
}

async fn build(args: &CheckArgs, settings: &EngineSettings) -> Result<Table, EngineError> {
    let ruleset = Ruleset::load(&args.ruleset).await?;
    ruleset.build(settings)
}

#[derive(Debug, Serialize)]
pub struct RulesetReport {
    pub source: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub total_rules: usize,
    pub chains: Vec<ChainEntry>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChainEntry {
    pub id: u32,
    pub name: String,
    pub base: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
    pub rules: usize,
}

impl RulesetReport {
    fn from_table(source: String, table: &Table) -> Self {
        let generation = table.generation();
        let chains: Vec<ChainEntry> = table
            .chains()
            .iter()
            .map(|chain| ChainEntry {
                id: chain.id().0,
                name: chain.name().to_owned(),
                base: chain.is_base(),
                policy: chain.base().map(|b| b.policy()),
                rules: chain.visible_rules(generation).len(),
            })
            .collect();

        Self {
            source,
            valid: true,
            table: Some(table.name().to_owned()),
            total_rules: chains.iter().map(|c| c.rules).sum(),
            chains,
            errors: Vec::new(),
        }
    }

    fn invalid(source: String, error: &EngineError) -> Self {
        Self {
            source,
            valid: false,
            table: None,
            total_rules: 0,
            chains: Vec::new(),
            errors: vec![error.to_string()],
        }
    }
}

impl Render for RulesetReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Ruleset Check: {}", self.source.bold())?;

        if !self.valid {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
            return Ok(());
        }

        writeln!(w, "  Result: {}", "VALID".green().bold())?;
        if let Some(ref table) = self.table {
            writeln!(
                w,
                "  Table:  {} ({} chains, {} rules)",
                table,
                self.chains.len(),
                self.total_rules
            )?;
        }
        writeln!(w)?;
        writeln!(w, "{:<6} {:<24} {:<8} {:<8} Rules", "ID", "Chain", "Type", "Policy")?;
        writeln!(w, "{}", "-".repeat(56))?;

        for c in &self.chains {
            let kind = if c.base { "base" } else { "regular" };
            let policy = match c.policy {
                Some(Policy::Accept) => "accept".green(),
                Some(Policy::Drop) => "drop".red(),
                None => "-".normal(),
            };
            writeln!(
                w,
                "{:<6} {:<24} {:<8} {:<8} {}",
                c.id, c.name, kind, policy, c.rules
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULESET: &str = r#"
[table]
name = "filter"

[[chain]]
name = "input"
policy = "drop"

[[chain.rule]]
expr = [{ type = "verdict", verdict = "jump", target = "sub" }]

[[chain]]
name = "sub"

[[chain.rule]]
expr = [{ type = "verdict", verdict = "accept" }]

[[chain.rule]]
expr = [{ type = "verdict", verdict = "return" }]
"#;

    fn table() -> Table {
        Ruleset::parse(RULESET, "test.toml")
            .unwrap()
            .build(&EngineSettings::default())
            .unwrap()
    }

    #[test]
    fn test_report_from_table() {
        let report = RulesetReport::from_table("test.toml".to_owned(), &table());
        assert!(report.valid);
        assert_eq!(report.table.as_deref(), Some("filter"));
        assert_eq!(report.total_rules, 3);
        assert_eq!(report.chains.len(), 2);

        let input = report.chains.iter().find(|c| c.name == "input").unwrap();
        assert!(input.base);
        assert_eq!(input.policy, Some(Policy::Drop));
        let sub = report.chains.iter().find(|c| c.name == "sub").unwrap();
        assert!(!sub.base);
        assert_eq!(sub.rules, 2);
    }

    #[test]
    fn test_report_render_text_valid() {
        let report = RulesetReport::from_table("test.toml".to_owned(), &table());
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("VALID"));
        assert!(output.contains("input"));
        assert!(output.contains("regular"));
    }

    #[test]
    fn test_report_invalid() {
        let err = EngineError::UnknownChain("missing".to_owned());
        let report = RulesetReport::invalid("bad.toml".to_owned(), &err);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["valid"], false);
        assert!(json.get("table").is_none());
    }
}
