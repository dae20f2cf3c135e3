use std::path::{Path, PathBuf};

use clap::Args;

use crate::aggregate::{ModelStats, Statistics};
use crate::error::{BenchError, Result};
use crate::severity::Severity;
use crate::util::{OutputIntegration, output_for, relative_to, write_string};

pub const DEFAULT_TITLE: &str = "Smart Contract Generation Benchmark";

#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    #[arg(long, default_value = "output/stats.json")]
    pub stats: PathBuf,

    #[arg(long = "output-html")]
    pub output_html: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_TITLE)]
    pub title: String,
}

fn html_escape(value: &str) -> String {
    v_htmlescape::escape(value).to_string()
}

fn link_row(label: &str, base: &Path, target: &Path) -> String {
    let rel = relative_to(base, target).unwrap_or_else(|| target.to_path_buf());
    format!(
        "<div class=\"row\"><span class=\"label\">{}</span><a href=\"{}\">{}</a></div>\n",
        html_escape(label),
        html_escape(&rel.display().to_string()),
        html_escape(&rel.display().to_string())
    )
}

fn severity_cells(counts: &crate::aggregate::SeverityCounts) -> String {
    Severity::ALL
        .iter()
        .map(|severity| format!("<td>{}</td>", counts.get(*severity)))
        .collect()
}

fn render_model_card(name: &str, model: &ModelStats) -> String {
    let mut html = String::new();
    let healthy = model.compilation.ok > 0 && model.generation.errors == 0;
    let class_name = if healthy { "ok" } else { "fail" };

    html.push_str(&format!("<section class=\"card {class_name}\">\n"));
    html.push_str(&format!(
        "<h2>{} <span class=\"pill\">{:.1}% compiled</span></h2>\n",
        html_escape(name),
        model.compilation.ratio
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">compiled</span>{} ok / {} ko</div>\n",
        model.compilation.ok, model.compilation.ko
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">zero vulnerability</span>{}</div>\n",
        model.zero_vulnerability
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">perfect tests</span>{}</div>\n",
        model.perfect_tests
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">average pass ratio</span>{:.1}%</div>\n",
        model.total_ratio
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">perfect contracts</span>{}</div>\n",
        model.perfect_contract
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">generation errors</span>{}</div>\n",
        model.generation.errors
    ));
    html.push_str(&format!(
        "<div class=\"row\"><span class=\"label\">generation time</span>{:.1}s</div>\n",
        model.generation.total_duration_seconds
    ));

    let severity_headers = Severity::ALL
        .iter()
        .map(|severity| format!("<th>{severity}</th>"))
        .collect::<String>();
    html.push_str(&format!(
        "<table>\n<tr><th>prompt</th><th>ok</th><th>ko</th><th>zero vuln</th>{severity_headers}<th>perfect tests</th><th>pass %</th><th>perfect</th></tr>\n"
    ));
    html.push_str(&format!(
        "<tr class=\"total\"><td>all</td><td>{}</td><td>{}</td><td>{}</td>{}<td>{}</td><td>{:.1}</td><td>{}</td></tr>\n",
        model.compilation.ok,
        model.compilation.ko,
        model.zero_vulnerability,
        severity_cells(&model.vulnerability),
        model.perfect_tests,
        model.total_ratio,
        model.perfect_contract
    ));
    for (prompt, stats) in &model.details {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>{}<td>{}</td><td>{:.1}</td><td>{}</td></tr>\n",
            html_escape(prompt),
            stats.compilation.ok,
            stats.compilation.ko,
            stats.zero_vulnerability,
            severity_cells(&stats.vulnerability),
            stats.perfect_tests,
            stats.total_ratio,
            stats.perfect_contract
        ));
    }
    html.push_str("</table>\n</section>\n");
    html
}

/// Renders the statistics page; `stats_path` and the sibling `data.json`
/// are linked relative to the page's directory.
#[must_use]
pub fn render_html(
    statistics: &Statistics,
    title: &str,
    generated_at: &str,
    html_dir: &Path,
    stats_path: &Path,
) -> String {
    let mut html = String::new();

    html.push_str(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"utf-8\">\n  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
    );
    html.push_str(&format!("  <title>{}</title>\n", html_escape(title)));
    html.push_str(
        "  <style>\n    body { font-family: ui-sans-serif, -apple-system, Segoe UI, Roboto, Arial, sans-serif; margin: 24px; background: #0f1115; color: #e7ebf3; }\n    h1, h2 { margin: 0 0 12px; }\n    .meta { margin-bottom: 20px; color: #a8b0c5; }\n    .grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(520px, 1fr)); gap: 16px; }\n    .card { border: 1px solid #2a3142; border-radius: 10px; padding: 14px; background: #171b24; }\n    .ok { border-left: 5px solid #2cb67d; }\n    .fail { border-left: 5px solid #ef4565; }\n    .row { margin: 4px 0; font-size: 13px; color: #c8d0e3; }\n    .label { color: #8a95b5; display: inline-block; min-width: 150px; }\n    table { width: 100%; border-collapse: collapse; margin-top: 10px; font-size: 12px; }\n    th, td { border-bottom: 1px solid #2a3142; padding: 4px 6px; text-align: right; }\n    th:first-child, td:first-child { text-align: left; }\n    .total td { font-weight: 600; }\n    a { color: #7da6ff; text-decoration: none; }\n    a:hover { text-decoration: underline; }\n    .pill { font-size: 11px; border: 1px solid #3a4460; border-radius: 999px; padding: 2px 8px; margin-left: 8px; color: #b9c6ee; }\n  </style>\n</head>\n<body>\n",
    );

    html.push_str(&format!("<h1>{}</h1>\n", html_escape(title)));
    html.push_str(&format!(
        "<div class=\"meta\">generated_at={} | models={}</div>\n",
        html_escape(generated_at),
        statistics.models.len()
    ));
    html.push_str(&link_row("stats.json", html_dir, stats_path));
    if let Some(data_path) = stats_path.parent().map(|dir| dir.join("data.json"))
        && data_path.exists()
    {
        html.push_str(&link_row("data.json", html_dir, &data_path));
    }

    html.push_str("<div class=\"grid\">\n");
    for (name, model) in &statistics.models {
        html.push_str(&render_model_card(name, model));
    }
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

/// Writes the page for `statistics` to `output_html`.
pub fn write_report(
    statistics: &Statistics,
    stats_path: &Path,
    output_html: &Path,
    title: &str,
) -> Result<()> {
    let html_dir = output_html
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let html = render_html(
        statistics,
        title,
        &crate::util::now_utc_iso(),
        &html_dir,
        stats_path,
    );
    write_string(output_html, &html)
}

pub fn run_report(args: ReportArgs) -> Result<()> {
    let integration = OutputIntegration::detect();
    run_report_with_integration(args, &integration)
}

pub(crate) fn run_report_with_integration(
    args: ReportArgs,
    integration: &OutputIntegration,
) -> Result<()> {
    let ui = output_for(integration);

    if !args.stats.exists() {
        return Err(BenchError::MissingPath { path: args.stats });
    }

    let output_html = args.output_html.unwrap_or_else(|| {
        args.stats
            .parent()
            .map_or_else(|| PathBuf::from("index.html"), |dir| dir.join("index.html"))
    });

    let statistics = Statistics::load(&args.stats)?;
    if statistics.models.is_empty() {
        return Err(BenchError::invalid(format!(
            "No model statistics found in {}",
            args.stats.display()
        )));
    }

    write_report(&statistics, &args.stats, &output_html, &args.title)?;
    ui.success(&format!("report HTML: {}", output_html.display()));

    if integration.should_emit_json() {
        println!(
            "{}",
            serde_json::json!({
                "command": "report",
                "status": "ok",
                "report_html": output_html.display().to_string(),
                "stats": args.stats.display().to_string(),
                "models": statistics.models.len(),
                "integration": integration,
            })
        );
    }

    Ok(())
}
