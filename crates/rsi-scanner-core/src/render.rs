//! HTML rendering of a [`ScanReport`].

use std::borrow::Cow;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use rust_decimal::RoundingStrategy;

use crate::error::ScanError;
use crate::indicator::IndicatorResult;
use crate::report::ScanReport;
use crate::signal::{SIGNAL_THRESHOLD, Signal};

/// Browser auto-refresh interval declared in the document.
pub const REFRESH_SECS: u32 = 60;

const TITLE: &str = "Binance Futures 5m RSI & Volume Scanner";

const STYLE: &str = "\
body { font-family: Arial, sans-serif; margin: 20px; }
table { border-collapse: collapse; width: 100%; margin-top: 20px; }
th, td { border: 1px solid #ddd; padding: 12px; text-align: center; }
th { background-color: #f2f2f2; }
.long { background-color: #90EE90; font-weight: bold; }
.short { background-color: #FFB6C6; font-weight: bold; }
.neutral { background-color: #FFFFFF; }
.volume-up { color: #008000; }
.volume-down { color: #FF0000; }
.volume-na { color: #888888; }
.signal-count { margin: 20px 0; padding: 10px; background-color: #f8f9fa; border-radius: 5px; }
";

const HEADERS: [&str; 7] = [
    "Symbol",
    "Price",
    "RSI",
    "Previous RSI",
    "RSI Diff",
    "Volume Change %",
    "Signal",
];

/// Append-only HTML writer.
///
/// Tag names, classes, attribute names and raw markup must be `'static`, so
/// they can only come from this module. Everything passed to [`Html::text`]
/// or as an attribute value is escaped.
struct Html {
    out: String,
}

impl Html {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
        }
    }

    fn raw(&mut self, markup: &'static str) -> &mut Self {
        self.out.push_str(markup);
        self
    }

    fn newline(&mut self) -> &mut Self {
        self.out.push('\n');
        self
    }

    fn start(&mut self, tag: &'static str) -> &mut Self {
        self.tag(tag, &[])
    }

    fn start_class(&mut self, tag: &'static str, class: &'static str) -> &mut Self {
        self.tag(tag, &[("class", class)])
    }

    /// Opening tag with attributes. Also used for void elements like `meta`.
    fn tag(&mut self, tag: &'static str, attrs: &[(&'static str, &str)]) -> &mut Self {
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attrs {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape_html(value));
            self.out.push('"');
        }
        self.out.push('>');
        self
    }

    fn end(&mut self, tag: &'static str) -> &mut Self {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
        self
    }

    fn text(&mut self, value: impl Display) -> &mut Self {
        let text = value.to_string();
        self.out.push_str(&escape_html(&text));
        self
    }

    /// `<tag>text</tag>` followed by a newline.
    fn line(&mut self, tag: &'static str, value: impl Display) -> &mut Self {
        self.start(tag).text(value).end(tag).newline()
    }

    fn line_class(
        &mut self,
        tag: &'static str,
        class: &'static str,
        value: impl Display,
    ) -> &mut Self {
        self.start_class(tag, class).text(value).end(tag).newline()
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Render a report as a standalone HTML document.
/// Output depends only on `report`.
pub fn render_html(report: &ScanReport) -> String {
    let counts = report.counts();
    let mut html = Html::with_capacity(2048 + report.results().len() * 320);

    html.raw("<!DOCTYPE html>").newline();
    html.start("html").newline().start("head").newline();
    html.tag("meta", &[("charset", "UTF-8")]).newline();
    html.tag(
        "meta",
        &[
            ("http-equiv", "refresh"),
            ("content", REFRESH_SECS.to_string().as_str()),
        ],
    )
    .newline();
    html.line("title", TITLE);
    html.start("style").newline().raw(STYLE).end("style").newline();
    html.end("head").newline().start("body").newline();

    html.line(
        "h2",
        format_args!(
            "{TITLE} - Last update: {}",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    );
    html.line(
        "p",
        format_args!("This page refreshes automatically every {REFRESH_SECS} seconds."),
    );

    html.start_class("div", "signal-count").newline();
    html.line("strong", "Signal summary:");
    html.start("ul").newline();
    html.line(
        "li",
        format_args!(
            "LONG (RSI change \u{2265} +{SIGNAL_THRESHOLD}): {} symbol(s)",
            counts.long
        ),
    );
    html.line(
        "li",
        format_args!(
            "SHORT (RSI change \u{2264} -{SIGNAL_THRESHOLD}): {} symbol(s)",
            counts.short
        ),
    );
    html.line("li", format_args!("Total scanned: {} symbol(s)", counts.total));
    html.end("ul").newline().end("div").newline();

    html.start("table").newline().start("tr").newline();
    for header in HEADERS {
        html.line("th", header);
    }
    html.end("tr").newline();

    for result in report.results() {
        push_row(&mut html, result);
    }

    html.end("table").newline();
    html.end("body").newline().end("html").newline();
    html.finish()
}

fn push_row(html: &mut Html, result: &IndicatorResult) {
    html.start("tr").newline();
    html.start("td")
        .start("strong")
        .text(&result.symbol)
        .end("strong")
        .end("td")
        .newline();

    let price = result
        .current_price
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    html.line("td", format_args!("{price:.4}"));
    html.line("td", format_args!("{:.2}", result.current_rsi));
    html.line("td", format_args!("{:.2}", result.previous_rsi));
    html.line("td", format_args!("{:.2}", result.rsi_diff));
    match result.volume_change {
        Some(change) => {
            let class = if change > 0.0 { "volume-up" } else { "volume-down" };
            html.line_class("td", class, format_args!("{change:.2}%"));
        }
        None => {
            html.line_class("td", "volume-na", "n/a");
        }
    }
    html.line_class("td", signal_class(result.signal), result.signal);
    html.end("tr").newline();
}

fn signal_class(signal: Signal) -> &'static str {
    match signal {
        Signal::Long => "long",
        Signal::Short => "short",
        Signal::Neutral => "neutral",
    }
}

/// Escape the characters that are significant in HTML text and attribute values.
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }

    let mut escaped = String::with_capacity(input.len() + 16);
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    Cow::Owned(escaped)
}

/// Render `report` and replace the file at `path` with it.
///
/// The document is written to a sibling temporary file first and renamed over
/// `path`, so readers never see a partially written report. Parent
/// directories are created as needed.
pub fn write_report(path: &Path, report: &ScanReport) -> Result<(), ScanError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let written =
        std::fs::write(&tmp, render_html(report)).and_then(|()| std::fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "report.html".into());
    name.push(".tmp");
    path.with_file_name(name)
}
