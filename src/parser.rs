use crate::types::Sample;

/// Every device line carrying a reading starts with this.
pub const LINE_PREFIX: &str = "x:";

/// Parse one line from the sensor stream.
///
/// Accepts `x: <int> y: <int> z: <int>` (line ending optional). The line is
/// normalized to `A,B,C` by stripping the axis labels and must then split into
/// exactly three integer fields. Anything else is discarded by returning `None`;
/// a noisy serial line is never an error.
pub fn parse_line(line: &str) -> Option<Sample> {
    let line = line.trim();
    if !line.starts_with(LINE_PREFIX) {
        return None;
    }

    let normalized = line
        .replace("x: ", "")
        .replace(" y: ", ",")
        .replace(" z: ", ",");

    let fields: Vec<&str> = normalized.split(',').collect();
    if fields.len() != 3 {
        return None;
    }

    let x = parse_axis(fields[0])?;
    let y = parse_axis(fields[1])?;
    let z = parse_axis(fields[2])?;

    Some(Sample::new(x as f64, y as f64, z as f64))
}

fn parse_axis(field: &str) -> Option<i64> {
    field.trim().parse().ok()
}
