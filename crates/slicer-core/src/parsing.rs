//! Extraction of print-time and filament-usage estimates from slicer output.

use once_cell::sync::Lazy;
use regex::Regex;
use slicer_types::Technology;

static M73_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"M73\s+P0\s+R(\d+)").unwrap());
static ESTIMATED_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i);\s*estimated printing time\s*=\s*(.+)").unwrap());
static FILAMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i);\s*filament used \[mm\]\s*=\s*([0-9]+(?:\.[0-9]+)?)").unwrap());
static DURATION_TERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*([dhms])?").unwrap());

/// Result of parsing one slicer output artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceOutcome {
    pub print_time_seconds: u64,
    pub print_time_readable: String,
    pub material_used_m: f64,
    pub estimated: bool,
}

/// Parse FDM `.gcode` text for print time and filament length.
///
/// Print time prefers the first `M73 P0 R<minutes>` directive; if absent,
/// falls back to the `; estimated printing time = <expr>` comment parsed
/// with the `<int>d? <int>h? <int>m? <int>s?` grammar (a bare integer is
/// seconds). Filament length comes from `; filament used [mm] = <float>`,
/// converted from millimeters to meters.
pub fn parse_fdm_gcode(gcode: &str) -> SliceOutcome {
    let print_time_seconds = M73_RE
        .captures(gcode)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|minutes| minutes * 60)
        .or_else(|| {
            ESTIMATED_TIME_RE
                .captures(gcode)
                .and_then(|caps| caps.get(1))
                .map(|m| parse_duration_expr(m.as_str()))
        })
        .unwrap_or(0);

    let material_used_m = FILAMENT_RE
        .captures(gcode)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|mm| mm / 1000.0)
        .unwrap_or(0.0);

    SliceOutcome {
        print_time_seconds,
        print_time_readable: readable_duration(print_time_seconds),
        material_used_m,
        estimated: false,
    }
}

/// Parse the `<int>d? <int>h? <int>m? <int>s?` grammar. Whitespace-tolerant;
/// a bare integer with no suffix is interpreted as seconds.
fn parse_duration_expr(expr: &str) -> u64 {
    let trimmed = expr.trim();
    if let Ok(bare_seconds) = trimmed.parse::<u64>() {
        return bare_seconds;
    }

    let mut total = 0u64;
    for caps in DURATION_TERM_RE.captures_iter(trimmed) {
        let value: u64 = match caps.get(1).and_then(|m| m.as_str().parse().ok()) {
            Some(v) => v,
            None => continue,
        };
        let unit = caps.get(2).map(|m| m.as_str());
        total += match unit {
            Some("d") => value * 86_400,
            Some("h") => value * 3_600,
            Some("m") => value * 60,
            Some("s") | None => value,
        };
    }
    total
}

/// Estimate SLA print time when the slicer itself did not report a usable
/// time. `layer_height` is floored at 0.025mm to avoid division blowups.
pub fn estimate_sla_time(object_height_mm: f64, layer_height: f64) -> SliceOutcome {
    let effective_layer_height = layer_height.max(0.025);
    let layers = (object_height_mm / effective_layer_height).ceil().max(0.0);
    let seconds = 120.0 + layers * 11.0;
    let print_time_seconds = seconds.round() as u64;

    SliceOutcome {
        print_time_seconds,
        print_time_readable: format!("{}(Est.)", readable_duration(print_time_seconds)),
        material_used_m: 0.0,
        estimated: true,
    }
}

/// Render seconds as `"{h}h {m}m "`, integer floor division, per the
/// service's readable-time contract.
pub fn readable_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    format!("{hours}h {minutes}m ")
}

/// Whether a technology's gcode output is expected to carry a usable
/// machine-reported time at all (SLA's `.sl1` artifacts never do).
pub fn reports_native_time(tech: Technology) -> bool {
    matches!(tech, Technology::Fdm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_m73_directive_over_comment() {
        let gcode = "M73 P0 R90\n; estimated printing time = 2h 0m\n";
        let outcome = parse_fdm_gcode(gcode);
        assert_eq!(outcome.print_time_seconds, 5400);
    }

    #[test]
    fn falls_back_to_estimated_comment_grammar() {
        let gcode = "; estimated printing time = 1h 30m\n; filament used [mm] = 12450\n";
        let outcome = parse_fdm_gcode(gcode);
        assert_eq!(outcome.print_time_seconds, 5400);
        assert_eq!(outcome.print_time_readable, "1h 30m ");
        assert_eq!(outcome.material_used_m, 12.45);
    }

    #[test]
    fn bare_integer_comment_is_seconds() {
        let gcode = "; estimated printing time = 42\n";
        assert_eq!(parse_fdm_gcode(gcode).print_time_seconds, 42);
    }

    #[test]
    fn handles_days_and_seconds_terms() {
        assert_eq!(parse_duration_expr("1d 2h 3m 4s"), 86_400 + 7_200 + 180 + 4);
    }

    #[test]
    fn missing_gcode_markers_yield_zero() {
        let outcome = parse_fdm_gcode("G1 X10 Y10\n");
        assert_eq!(outcome.print_time_seconds, 0);
        assert_eq!(outcome.material_used_m, 0.0);
    }

    #[test]
    fn sla_estimate_uses_the_layer_count_formula() {
        let outcome = estimate_sla_time(50.0, 0.05);
        // layers = ceil(50 / 0.05) = 1000; seconds = 120 + 1000*11 = 11120
        assert_eq!(outcome.print_time_seconds, 11_120);
        assert!(outcome.print_time_readable.ends_with("(Est.)"));
        assert!(outcome.estimated);
    }

    #[test]
    fn sla_estimate_floors_layer_height_at_0_025() {
        let a = estimate_sla_time(30.0, 0.0);
        let b = estimate_sla_time(30.0, 0.025);
        assert_eq!(a, b);
    }

    #[test]
    fn readable_duration_floors_minutes() {
        assert_eq!(readable_duration(3601), "1h 0m ");
        assert_eq!(readable_duration(59), "0h 0m ");
    }
}
