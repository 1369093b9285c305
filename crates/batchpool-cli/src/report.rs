use crate::telemetry::RunCounts;
use batchpool::{JobResult, abandoned_indices};
use core::fmt::Display;
use std::io::{self, Write};

/// Tallies a run's results against the number of jobs submitted.
pub fn summarize<R, E>(job_count: usize, results: &[JobResult<R, E>]) -> RunCounts {
    let failed = results.iter().filter(|r| r.is_err()).count();
    RunCounts {
        submitted: job_count as u64,
        succeeded: (results.len() - failed) as u64,
        failed: failed as u64,
        abandoned: job_count.saturating_sub(results.len()) as u64,
    }
}

/// Writes one line per result, in arrival order, followed by the list of
/// abandoned job numbers when the run was cut short.
///
/// Job numbers are 1-based to match the values the sample job squares.
pub fn print_results<W, R, E>(
    mut out: W,
    job_count: usize,
    results: &[JobResult<R, E>],
) -> io::Result<()>
where
    W: Write,
    R: Display,
    E: Display,
{
    for result in results {
        match &result.outcome {
            Ok(value) => writeln!(out, "result: {value}")?,
            Err(err) => writeln!(out, "error: {err}")?,
        }
    }

    let abandoned = abandoned_indices(job_count, results);
    if !abandoned.is_empty() {
        let numbers: Vec<String> = abandoned.iter().map(|i| (i + 1).to_string()).collect();
        writeln!(out, "abandoned: {}", numbers.join(", "))?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, outcome: Result<u64, &'static str>) -> JobResult<u64, &'static str> {
        JobResult {
            index,
            attempts: 1,
            outcome,
        }
    }

    #[test]
    fn counts_each_category() {
        let results = vec![result(2, Ok(9)), result(0, Err("boom")), result(1, Ok(4))];
        assert_eq!(
            summarize(5, &results),
            RunCounts {
                submitted: 5,
                succeeded: 2,
                failed: 1,
                abandoned: 2,
            }
        );
    }

    #[test]
    fn prints_in_arrival_order_with_abandoned_jobs() {
        let results = vec![result(1, Ok(4)), result(0, Err("boom"))];
        let mut out = Vec::new();
        print_results(&mut out, 4, &results).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "result: 4\nerror: boom\nabandoned: 3, 4\n"
        );
    }

    #[test]
    fn omits_abandoned_line_for_complete_runs() {
        let results = vec![result(0, Ok(1))];
        let mut out = Vec::new();
        print_results(&mut out, 1, &results).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "result: 1\n");
    }
}
