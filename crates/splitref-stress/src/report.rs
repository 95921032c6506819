use clap::ValueEnum;
use colored::Colorize;

use crate::runner::StressReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

pub fn render(report: &StressReport, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report),
        OutputFormat::Pretty => Ok(render_pretty(report)),
    }
}

fn render_pretty(report: &StressReport) -> String {
    let c = &report.config;
    let mut out = format!(
        "{} {} producers x {} items, {} consumers, {} round(s)\n",
        "splitref stress".bold(),
        c.producers,
        c.items_per_producer,
        c.consumers,
        c.rounds
    );
    for r in &report.rounds {
        out.push_str(&format!(
            "  {} round {:>3}: popped {}/{}  empty polls {}  reclaimed {} (+{} on drop)  {:.1} ms\n",
            "✓".green(),
            r.round,
            r.popped,
            r.pushed,
            r.empty_polls,
            r.reclaimed_after_join,
            r.reclaimed_after_drop - r.reclaimed_after_join,
            r.elapsed_ms
        ));
    }
    out.push_str(&format!(
        "{} in {:.1} ms\n",
        "all rounds verified".green().bold(),
        report.elapsed_ms
    ));
    out
}
