//! Snapshot-to-text rendering: bars, intervals, rates, and templates.

use super::Snapshot;

/// Cells used to render a partially filled bar segment, coarsest first.
const PARTIAL_BLOCKS: [char; 7] = ['\u{258f}', '\u{258e}', '\u{258d}', '\u{258c}', '\u{258b}', '\u{258a}', '\u{2589}'];
const FULL_BLOCK: char = '\u{2588}';

/// Render a bar at `width` character cells for the given fill fraction.
pub(crate) fn render_bar(fraction: f64, width: usize) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let eighths = (fraction * (width * 8) as f64).round() as usize;
    let full = eighths / 8;
    let rem = eighths % 8;
    let mut bar = String::with_capacity(width * 3);
    for _ in 0..full {
        bar.push(FULL_BLOCK);
    }
    if rem > 0 && full < width {
        bar.push(PARTIAL_BLOCKS[rem - 1]);
    }
    while bar.chars().count() < width {
        bar.push(' ');
    }
    bar
}

/// `MM:SS`, or `H:MM:SS` once an hour is exceeded.
pub(crate) fn format_interval(total_secs: u64) -> String {
    let (hours, rem) = (total_secs / 3600, total_secs % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Iterations per second, flipping to seconds per iteration below 1.
pub(crate) fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) if rate >= 1.0 => format!("{rate:.2}it/s"),
        Some(rate) if rate > 0.0 => format!("{:.2}s/it", 1.0 / rate),
        _ => "?it/s".to_string(),
    }
}

/// Render the one-line meter text with the bar at `bar_width` cells.
pub(crate) fn format_meter(snapshot: &Snapshot, bar_width: usize) -> String {
    match &snapshot.bar_format {
        Some(template) => expand_template(template, snapshot, bar_width),
        None => default_format(snapshot, bar_width),
    }
}

fn percent(snapshot: &Snapshot) -> Option<u64> {
    let total = snapshot.total.filter(|&t| t > 0)?;
    Some(snapshot.n.min(total).saturating_mul(100) / total)
}

fn fraction(snapshot: &Snapshot) -> f64 {
    match snapshot.total.filter(|&t| t > 0) {
        #[allow(clippy::cast_precision_loss)]
        Some(total) => snapshot.n as f64 / total as f64,
        None => 0.0,
    }
}

fn default_format(snapshot: &Snapshot, bar_width: usize) -> String {
    let desc = snapshot
        .desc
        .as_ref()
        .map(|d| format!("{d}: "))
        .unwrap_or_default();
    let elapsed = format_interval(snapshot.elapsed.as_secs());
    let rate = format_rate(snapshot.rate);
    match (snapshot.total, percent(snapshot)) {
        (Some(total), Some(pct)) => {
            let bar = render_bar(fraction(snapshot), bar_width);
            let eta = snapshot
                .eta()
                .map_or_else(|| "?".to_string(), |d| format_interval(d.as_secs()));
            format!(
                "{desc}{pct:3}%|{bar}| {}/{total} [{elapsed}<{eta}, {rate}]",
                snapshot.n
            )
        }
        _ => format!("{desc}{} [{elapsed}, {rate}]", snapshot.n),
    }
}

/// Substitute `{desc} {percent} {bar} {n} {total} {elapsed} {eta} {rate}`
/// tokens in a user template. The `{bar}` token always renders at the width
/// this renderer was given, so remote media get a fixed-width bar no matter
/// what the local template asked for.
fn expand_template(template: &str, snapshot: &Snapshot, bar_width: usize) -> String {
    let eta = snapshot
        .eta()
        .map_or_else(|| "?".to_string(), |d| format_interval(d.as_secs()));
    template
        .replace("{desc}", snapshot.desc.as_deref().unwrap_or(""))
        .replace(
            "{percent}",
            &percent(snapshot).map_or_else(|| "?".to_string(), |p| p.to_string()),
        )
        .replace("{bar}", &render_bar(fraction(snapshot), bar_width))
        .replace("{n}", &snapshot.n.to_string())
        .replace(
            "{total}",
            &snapshot
                .total
                .map_or_else(|| "?".to_string(), |t| t.to_string()),
        )
        .replace("{elapsed}", &format_interval(snapshot.elapsed.as_secs()))
        .replace("{eta}", &eta)
        .replace("{rate}", &format_rate(snapshot.rate))
}
