//! HTML rendering for the browser-facing pages.
//!
//! Every engine- or tenant-supplied string goes through `escape` before it
//! lands in markup.

use std::fmt::Write;

use tsgate_engine::Frame;
use tsgate_monitor::HealthReport;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 400.0;
const CHART_MARGIN: f64 = 40.0;

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn welcome_page() -> String {
    "<p>Welcome to the tsgate time-series gateway</p>\n".to_string()
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        body
    )
}

/// Line chart of `value` over `time`.
pub fn chart_page(tenant_id: &str, frame: &Frame) -> String {
    let title = format!("readings for {}", tenant_id);
    let mut body = format!("<h1>{}</h1>\n", escape(&title));

    if frame.is_empty() {
        body.push_str("<p>no data in the selected window</p>\n");
        return page(&title, &body);
    }

    let t0 = frame.time[0].timestamp_millis() as f64;
    let t1 = frame.time[frame.len() - 1].timestamp_millis() as f64;
    let (v0, v1) = frame
        .value
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let span_t = if t1 > t0 { t1 - t0 } else { 1.0 };
    let span_v = if v1 > v0 { v1 - v0 } else { 1.0 };
    let plot_w = CHART_WIDTH - 2.0 * CHART_MARGIN;
    let plot_h = CHART_HEIGHT - 2.0 * CHART_MARGIN;

    let mut points = String::new();
    for (t, v) in frame.time.iter().zip(&frame.value) {
        let x = CHART_MARGIN + (t.timestamp_millis() as f64 - t0) / span_t * plot_w;
        let y = CHART_HEIGHT - CHART_MARGIN - (v - v0) / span_v * plot_h;
        let _ = write!(points, "{:.1},{:.1} ", x, y);
    }

    let _ = write!(
        body,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n\
         <line x1=\"{m}\" y1=\"{b}\" x2=\"{r}\" y2=\"{b}\" stroke=\"#888\"/>\n\
         <line x1=\"{m}\" y1=\"{m}\" x2=\"{m}\" y2=\"{b}\" stroke=\"#888\"/>\n\
         <polyline fill=\"none\" stroke=\"#1f77b4\" stroke-width=\"2\" points=\"{points}\"/>\n\
         <text x=\"{m}\" y=\"{below}\" font-size=\"12\">{start}</text>\n\
         <text x=\"{r}\" y=\"{below}\" font-size=\"12\" text-anchor=\"end\">{end}</text>\n\
         <text x=\"4\" y=\"{m}\" font-size=\"12\">{vmax}</text>\n\
         <text x=\"4\" y=\"{b}\" font-size=\"12\">{vmin}</text>\n\
         </svg>\n",
        w = CHART_WIDTH,
        h = CHART_HEIGHT,
        m = CHART_MARGIN,
        b = CHART_HEIGHT - CHART_MARGIN,
        r = CHART_WIDTH - CHART_MARGIN,
        below = CHART_HEIGHT - CHART_MARGIN / 2.0,
        points = points.trim_end(),
        start = escape(&frame.time[0].format("%H:%M:%S").to_string()),
        end = escape(&frame.time[frame.len() - 1].format("%H:%M:%S").to_string()),
        vmax = v1,
        vmin = v0,
    );
    page(&title, &body)
}

pub fn monitor_page(report: &HealthReport) -> String {
    let mut body = String::from(
        "<h1>usage</h1>\n<table>\n<tr><th>usage type</th><th>value</th></tr>\n",
    );
    for usage in &report.usage {
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape(&usage.category),
            usage.value
        );
    }
    if report.usage.is_empty() {
        body.push_str("<tr><td colspan=\"2\">no usage</td></tr>\n");
    }
    body.push_str("</table>\n");

    body.push_str(
        "<h1>tasks</h1>\n<table>\n<tr><th>name</th><th>status</th><th>last run</th><th>last run status</th><th>health</th></tr>\n",
    );
    for task in &report.tasks {
        let started_at = task
            .last_run
            .as_ref()
            .and_then(|r| r.started_at)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let run_status = task
            .last_run
            .as_ref()
            .map(|r| r.status.to_string())
            .unwrap_or_default();
        let health = task.health.map(|h| h.as_str()).unwrap_or("");
        let _ = writeln!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&task.name),
            task.status,
            escape(&started_at),
            run_status,
            health
        );
    }
    if report.tasks.is_empty() {
        body.push_str("<tr><td colspan=\"5\">no tasks</td></tr>\n");
    }
    body.push_str("</table>\n");

    page("monitor", &body)
}
