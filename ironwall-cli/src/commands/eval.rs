//! `ironwall eval` command handler

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use ironwall_core::config::EngineSettings;
use ironwall_core::types::{Disposition, NamespaceId};
use ironwall_engine::{ChannelSink, Evaluator, Packet, Ruleset, TraceEvent};

use crate::cli::EvalArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `eval` command.
pub async fn execute(
    args: EvalArgs,
    settings: &EngineSettings,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let report = evaluate(&args, settings).await?;
    writer.render(&report)?;
    Ok(())
}

/// Load the ruleset, evaluate the packet and collect the trace.
pub async fn evaluate(args: &EvalArgs, settings: &EngineSettings) -> Result<EvalReport, CliError> {
    let packet = build_packet(args)?;

    info!(path = %args.ruleset.display(), "loading ruleset");
    let ruleset = Ruleset::load(&args.ruleset).await?;
    let table = Arc::new(ruleset.build(settings)?);

    let base = table
        .chain(&args.chain)
        .filter(|chain| chain.is_base())
        .map(|chain| chain.id())
        .ok_or_else(|| {
            CliError::Command(format!(
                "'{}' is not a base chain in {}",
                args.chain,
                args.ruleset.display()
            ))
        })?;

    let mut settings = settings.clone();
    settings.trace_enabled |= args.trace;
    let (sink, mut rx) = ChannelSink::new(settings.trace_buffer);
    let evaluator = Evaluator::with_settings(Arc::clone(&table), &settings, Arc::new(sink));

    let (disposition, rules_evaluated, aborted) = match evaluator.try_evaluate(&packet, base) {
        Ok(result) => (result.disposition, result.rules_evaluated, None),
        Err(e) => {
            warn!(chain = %args.chain, reason = e.reason(), error = %e, "traversal aborted");
            (Disposition::Drop, 0, Some(e.to_string()))
        }
    };

    table.publish_stats();

    let mut trace = Vec::new();
    while let Ok(event) = rx.try_recv() {
        trace.push(event);
    }

    Ok(EvalReport {
        ruleset: args.ruleset.display().to_string(),
        chain: args.chain.clone(),
        packet_len: packet.len(),
        disposition,
        rules_evaluated,
        aborted,
        trace,
    })
}

/// Decode the hex packet and apply header offsets.
fn build_packet(args: &EvalArgs) -> Result<Packet, CliError> {
    let data = decode_packet_hex(&args.packet)?;
    if data.is_empty() {
        return Err(CliError::Packet("packet is empty".to_owned()));
    }

    let mut packet = match args.network_offset {
        None | Some(0) => Packet::ipv4(data),
        Some(offset) if offset < data.len() => Packet::new(data).with_network_offset(offset),
        Some(offset) => {
            return Err(CliError::Packet(format!(
                "network offset {offset} is beyond the packet ({} bytes)",
                data.len()
            )));
        }
    };
    if let Some(offset) = args.transport_offset {
        if offset > packet.len() {
            return Err(CliError::Packet(format!(
                "transport offset {offset} is beyond the packet ({} bytes)",
                packet.len()
            )));
        }
        packet = packet.with_transport_offset(offset);
    }

    Ok(packet
        .with_namespace(NamespaceId(args.namespace))
        .with_trace(args.trace))
}

/// Accepts `0x` prefixes and whitespace/colon separators (`45 00 00 14`, `45:00`).
fn decode_packet_hex(input: &str) -> Result<Vec<u8>, CliError> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&digits).map_err(|e| CliError::Packet(format!("invalid hex: {e}")))
}

#[derive(Debug, Serialize)]
pub struct EvalReport {
    pub ruleset: String,
    pub chain: String,
    pub packet_len: usize,
    pub disposition: Disposition,
    pub rules_evaluated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub trace: Vec<TraceEvent>,
}

impl Render for EvalReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let disposition = self.disposition.to_string().to_uppercase();
        let disposition = match self.disposition {
            Disposition::Accept => disposition.green(),
            Disposition::Drop => disposition.red(),
            Disposition::Queue(_) => disposition.yellow(),
            Disposition::Stolen => disposition.cyan(),
        };

        writeln!(
            w,
            "Evaluation: {} ({} bytes, ruleset {})",
            self.chain.bold(),
            self.packet_len,
            self.ruleset
        )?;
        writeln!(w, "  Disposition:     {}", disposition.bold())?;
        writeln!(w, "  Rules evaluated: {}", self.rules_evaluated)?;
        if let Some(ref reason) = self.aborted {
            writeln!(w, "  Aborted:         {}", reason.red())?;
        }

        if !self.trace.is_empty() {
            writeln!(w)?;
            writeln!(w, "Trace:")?;
            for event in &self.trace {
                let rule = event
                    .rule
                    .map(|handle| format!("handle {handle}"))
                    .unwrap_or_default();
                writeln!(w, "  {:<40} {:<12} {:?}", event.to_string(), rule, event.verdict)?;
            }
        }

        Ok(())
    }
}
