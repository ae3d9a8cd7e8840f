use std::io::BufRead;

use crate::history::RollingHistory;
use crate::parser::parse_line;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub accepted: usize,
    pub discarded: usize,
}

/// Push every parseable line of a captured serial log into `history`.
///
/// Lines that are not valid UTF-8 are counted as discarded like any other
/// noise; only an I/O error from `reader` stops the replay.
pub fn replay_lines<R: BufRead>(reader: R, history: &mut RollingHistory) -> std::io::Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for line in reader.split(b'\n') {
        let line = line?;
        match std::str::from_utf8(&line).ok().and_then(parse_line) {
            Some(sample) => {
                history.push(sample);
                summary.accepted += 1;
            }
            None => summary.discarded += 1,
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;
    use std::io::Cursor;

    #[test]
    fn test_counts_accepted_and_discarded() {
        let input = "HMC5883L ready\r\nx: 1 y: 0 z: 0\r\nx: 2 y: nope z: 0\r\nx: 0 y: 1 z: 0\r\n";
        let mut history = RollingHistory::new(10);
        let summary = replay_lines(Cursor::new(input), &mut history).unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                accepted: 2,
                discarded: 2
            }
        );
        let samples: Vec<Sample> = history.iter().map(|e| e.sample).collect();
        assert_eq!(samples, vec![Sample::new(1.0, 0.0, 0.0), Sample::new(0.0, 1.0, 0.0)]);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut input = b"x: 1 y: 1 z: 1\n".to_vec();
        input.extend_from_slice(&[b'x', b':', 0xff, b'\n']);
        input.extend_from_slice(b"x: 2 y: 2 z: 2");

        let mut history = RollingHistory::new(10);
        let summary = replay_lines(Cursor::new(input), &mut history).unwrap();

        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.discarded, 1);
        assert_eq!(history.latest().map(|e| e.sample), Some(Sample::new(2.0, 2.0, 2.0)));
    }

    #[test]
    fn test_history_keeps_only_the_tail() {
        let input: String = (0..10).map(|i| format!("x: {} y: 0 z: 0\n", i)).collect();
        let mut history = RollingHistory::new(3);
        let summary = replay_lines(Cursor::new(input), &mut history).unwrap();

        assert_eq!(summary.accepted, 10);
        let xs: Vec<f64> = history.iter().map(|e| e.sample.x).collect();
        assert_eq!(xs, vec![7.0, 8.0, 9.0]);
    }
}
