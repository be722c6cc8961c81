//! Delivery logs and agreement checking.
//!
//! A delivery log lists the identity keys a process delivered, one
//! `{sender}-{timestamp}` per line, in delivery order.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use ordcast_core::{MessageId, ProcessId};
use tracing::debug;

use crate::error::{Error, Result};

/// Write a delivery log, replacing any existing file.
pub fn write_log(path: impl AsRef<Path>, delivered: &[MessageId]) -> Result<()> {
    let mut out = String::with_capacity(delivered.len() * 8);
    for id in delivered {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{id}");
    }
    std::fs::write(path.as_ref(), out)?;
    debug!(path = %path.as_ref().display(), entries = delivered.len(), "delivery log written");
    Ok(())
}

/// Read a delivery log. Blank lines are ignored.
pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<MessageId>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            line.trim().parse::<MessageId>().map_err(|_| Error::DeliveryLog {
                path: path.to_path_buf(),
                line: n + 1,
                entry: line.to_string(),
            })
        })
        .collect()
}

/// Outcome of a successful agreement check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agreement {
    /// Number of logs compared
    pub processes: usize,
    /// Length of the common sequence
    pub delivered: usize,
}

/// Check that every process delivered the same sequence, and that each
/// sequence follows the message order.
pub fn verify_agreement(logs: &BTreeMap<ProcessId, Vec<MessageId>>) -> Result<Agreement> {
    for (&process, log) in logs {
        if let Some(pair) = log.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(Error::OutOfOrder {
                process,
                earlier: pair[0],
                later: pair[1],
            });
        }
    }

    let mut iter = logs.iter();
    let Some((&reference, expected)) = iter.next() else {
        return Ok(Agreement {
            processes: 0,
            delivered: 0,
        });
    };

    for (&other, log) in iter {
        if log == expected {
            continue;
        }
        let position = expected
            .iter()
            .zip(log)
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| expected.len().min(log.len()));
        let entry = |seq: &[MessageId]| {
            seq.get(position)
                .map_or_else(|| "<end of log>".to_string(), ToString::to_string)
        };
        return Err(Error::Disagreement {
            left: reference,
            right: other,
            position,
            left_entry: entry(expected),
            right_entry: entry(log),
        });
    }

    Ok(Agreement {
        processes: logs.len(),
        delivered: expected.len(),
    })
}

/// Judge a finished group run in which every member's driver submitted
/// `per_process` payloads.
///
/// Disagreement is reported first, then any failed child by name, then a
/// common sequence shorter than everything that was submitted.
pub fn verify_run(
    logs: &BTreeMap<ProcessId, Vec<MessageId>>,
    failed: &[String],
    per_process: usize,
) -> Result<Agreement> {
    let agreement = verify_agreement(logs)?;
    if !failed.is_empty() {
        return Err(Error::ChildrenFailed(failed.to_vec()));
    }
    let expected = logs.len() * per_process;
    if agreement.delivered != expected {
        return Err(Error::MissingDeliveries {
            expected,
            delivered: agreement.delivered,
        });
    }
    Ok(agreement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(sender: u64, timestamp: u64) -> MessageId {
        MessageId::new(ProcessId(sender), timestamp)
    }

    #[test]
    fn log_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.log");
        let delivered = vec![id(1, 1), id(2, 1), id(1, 4)];

        write_log(&path, &delivered).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1-1\n2-1\n1-4\n");
        assert_eq!(read_log(&path).unwrap(), delivered);
    }

    #[test]
    fn malformed_line_is_located() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.log");
        std::fs::write(&path, "1-1\n\nnope\n").unwrap();

        match read_log(&path) {
            Err(Error::DeliveryLog { line, entry, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(entry, "nope");
            }
            other => panic!("expected delivery log error, got {other:?}"),
        }
    }

    #[test]
    fn identical_logs_agree() {
        let seq = vec![id(1, 1), id(2, 1), id(3, 2)];
        let logs = BTreeMap::from([
            (ProcessId(1), seq.clone()),
            (ProcessId(2), seq.clone()),
            (ProcessId(3), seq),
        ]);
        assert_eq!(
            verify_agreement(&logs).unwrap(),
            Agreement {
                processes: 3,
                delivered: 3
            }
        );
    }

    #[test]
    fn divergence_is_reported_with_position() {
        let logs = BTreeMap::from([
            (ProcessId(1), vec![id(1, 1), id(2, 1)]),
            (ProcessId(2), vec![id(1, 1), id(3, 1)]),
        ]);
        match verify_agreement(&logs) {
            Err(Error::Disagreement {
                left,
                right,
                position,
                ..
            }) => {
                assert_eq!((left, right, position), (ProcessId(1), ProcessId(2), 1));
            }
            other => panic!("expected disagreement, got {other:?}"),
        }
    }

    #[test]
    fn shorter_log_disagrees() {
        let logs = BTreeMap::from([
            (ProcessId(1), vec![id(1, 1), id(2, 1)]),
            (ProcessId(2), vec![id(1, 1)]),
        ]);
        match verify_agreement(&logs) {
            Err(Error::Disagreement {
                position,
                right_entry,
                ..
            }) => {
                assert_eq!(position, 1);
                assert_eq!(right_entry, "<end of log>");
            }
            other => panic!("expected disagreement, got {other:?}"),
        }
    }

    #[test]
    fn out_of_order_log_is_rejected() {
        let logs = BTreeMap::from([(ProcessId(1), vec![id(2, 3), id(1, 3)])]);
        assert!(matches!(
            verify_agreement(&logs),
            Err(Error::OutOfOrder {
                process: ProcessId(1),
                ..
            })
        ));
    }

    fn complete_run() -> BTreeMap<ProcessId, Vec<MessageId>> {
        let seq = vec![id(1, 1), id(2, 1), id(1, 3), id(2, 3)];
        BTreeMap::from([(ProcessId(1), seq.clone()), (ProcessId(2), seq)])
    }

    #[test]
    fn complete_run_passes() {
        assert_eq!(
            verify_run(&complete_run(), &[], 2).unwrap(),
            Agreement {
                processes: 2,
                delivered: 4
            }
        );
    }

    #[test]
    fn disagreement_fails_run_before_child_status() {
        let mut logs = complete_run();
        logs.insert(ProcessId(2), vec![id(2, 1), id(1, 3)]);
        let failed = vec!["node 2".to_string()];
        assert!(matches!(
            verify_run(&logs, &failed, 2),
            Err(Error::Disagreement { .. })
        ));
    }

    #[test]
    fn failed_child_fails_run() {
        let failed = vec!["app 1".to_string(), "node 2".to_string()];
        match verify_run(&complete_run(), &failed, 2) {
            Err(e @ Error::ChildrenFailed(_)) => {
                assert_eq!(e.to_string(), "children failed: app 1, node 2");
            }
            other => panic!("expected failed children, got {other:?}"),
        }
    }

    #[test]
    fn agreeing_on_too_few_fails_run() {
        assert!(matches!(
            verify_run(&complete_run(), &[], 3),
            Err(Error::MissingDeliveries {
                expected: 6,
                delivered: 4
            })
        ));
    }
}
