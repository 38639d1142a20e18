//! Delivery verifier — reconciles what containers emitted with what the
//! Docker log store and the listener saw.
//!
//! Each container is checked twice: its driver log against the expected
//! sequence (order matters), and its expected lines against the listener
//! (membership only). The two checks are independent views of the same
//! delivery; when exactly one of them fails the verdict is `Disagreement`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

use crate::docker::spool::SpoolLookup;
use crate::facade::ListenerFacade;
use crate::line::{ExpectedSequence, Line};

/// First point where a driver log departs from its expected sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub index: usize,
    /// `None` when the driver log is longer than expected.
    pub expected: Option<String>,
    /// `None` when the driver log ended early.
    pub actual: Option<String>,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.expected, &self.actual) {
            (Some(e), Some(a)) => write!(f, "index {}: expected {:?}, got {:?}", self.index, e, a),
            (Some(e), None) => write!(f, "index {}: expected {:?}, log ended", self.index, e),
            (None, Some(a)) => write!(f, "index {}: unexpected extra line {:?}", self.index, a),
            (None, None) => write!(f, "index {}", self.index),
        }
    }
}

/// First expected line the listener never received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Missing {
    pub index: u64,
    pub line: String,
    /// How many expected lines are missing in total.
    pub total_missing: u64,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} (index {}) not received, {} missing in total",
            self.line, self.index, self.total_missing
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    #[error("{prefix}: driver log diverges at {driver}; listener: {listener}")]
    Delivery {
        prefix: String,
        driver: Divergence,
        listener: Missing,
    },
    #[error("{prefix}: driver log and listener disagree ({})", disagreement(.driver, .listener))]
    Disagreement {
        prefix: String,
        driver: Option<Divergence>,
        listener: Option<Missing>,
    },
    #[error("{prefix}: {missing} before the last delivered line")]
    Lost { prefix: String, missing: Missing },
    #[error("{prefix}: received {line:?} which the container was not configured to emit")]
    ForeignLine { prefix: String, line: String },
    #[error("{line:?} received {count} times")]
    Duplicate { line: String, count: u64 },
    #[error("expected {expected} lines across {prefixes} prefixes, listener holds {actual}")]
    UnionCount {
        prefixes: usize,
        expected: u64,
        actual: u64,
    },
    #[error("{line:?} arrived under token {token:?}, expected {expected_token:?}")]
    Misattributed {
        line: String,
        token: String,
        expected_token: String,
    },
    #[error("listener recorded an ingestion error: {0}")]
    ListenerError(String),
    #[error("queue directory {0:?} not found under the plugin state root")]
    SpoolMissing(String),
}

fn disagreement(driver: &Option<Divergence>, listener: &Option<Missing>) -> String {
    match (driver, listener) {
        (Some(d), None) => format!("driver log diverges at {}, listener received every line", d),
        (None, Some(m)) => format!("driver log matches, listener: {}", m),
        _ => "both views agree".to_string(),
    }
}

impl Failure {
    /// The step name reported for this failure.
    pub fn step(&self) -> &'static str {
        match self {
            Failure::SpoolMissing(_) => "queue-directory",
            _ => "line-match",
        }
    }
}

/// Driver log vs. expected sequence: element for element.
pub fn check_driver_log(expected: &ExpectedSequence, driver: &[String]) -> Result<(), Divergence> {
    let expected_len = usize::try_from(expected.len()).unwrap_or(usize::MAX);
    let mut lines = expected.lines();

    for (index, actual) in driver.iter().enumerate() {
        match lines.next() {
            Some(want) if &want == actual => continue,
            Some(want) => {
                return Err(Divergence {
                    index,
                    expected: Some(want),
                    actual: Some(actual.clone()),
                })
            }
            None => {
                return Err(Divergence {
                    index,
                    expected: None,
                    actual: Some(actual.clone()),
                })
            }
        }
    }

    if driver.len() < expected_len {
        return Err(Divergence {
            index: driver.len(),
            expected: lines.next(),
            actual: None,
        });
    }
    Ok(())
}

/// Every expected line must have reached the listener.
pub fn check_listener(
    expected: &ExpectedSequence,
    listener: &dyn ListenerFacade,
) -> Result<(), Missing> {
    let mut first = None;
    let mut total_missing = 0;
    for (index, line) in expected.lines().enumerate() {
        if !listener.has_received(&line) {
            total_missing += 1;
            if first.is_none() {
                first = Some((index as u64, line));
            }
        }
    }

    match first {
        None => Ok(()),
        Some((index, line)) => Err(Missing {
            index,
            line,
            total_missing,
        }),
    }
}

/// Run both per-container checks and combine them.
pub fn check_container(
    expected: &ExpectedSequence,
    driver: &[String],
    listener: &dyn ListenerFacade,
) -> Result<(), Failure> {
    let prefix = expected.prefix().to_string();
    match (check_driver_log(expected, driver), check_listener(expected, listener)) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(driver), Err(listener)) => Err(Failure::Delivery {
            prefix,
            driver,
            listener,
        }),
        (Err(driver), Ok(())) => Err(Failure::Disagreement {
            prefix,
            driver: Some(driver),
            listener: None,
        }),
        (Ok(()), Err(listener)) => Err(Failure::Disagreement {
            prefix,
            driver: None,
            listener: Some(listener),
        }),
    }
}

/// Check for a container that was killed mid-emission.
///
/// Whatever made it into the driver log must be a leading run of the
/// expected sequence and must have been delivered. The driver log is often
/// gone with the container (`None`). Either way, the listener's lines for
/// this prefix must form a gap-free run `p_0..p_m`, each received once: the
/// generator writes in order, so everything below the highest index seen
/// was emitted.
pub fn check_killed(
    expected: &ExpectedSequence,
    driver: Option<&[String]>,
    received: &[String],
    listener: &dyn ListenerFacade,
) -> Result<(), Failure> {
    let prefix = expected.prefix().to_string();

    if let Some(driver) = driver {
        for (index, actual) in driver.iter().enumerate() {
            let want = expected.line(index as u64);
            if want.as_deref() != Some(actual.as_str()) {
                return Err(Failure::Disagreement {
                    prefix,
                    driver: Some(Divergence {
                        index,
                        expected: want,
                        actual: Some(actual.clone()),
                    }),
                    listener: None,
                });
            }
            if !listener.has_received(actual) {
                return Err(Failure::Disagreement {
                    prefix,
                    driver: None,
                    listener: Some(Missing {
                        index: index as u64,
                        line: actual.clone(),
                        total_missing: driver.iter().filter(|l| !listener.has_received(l)).count()
                            as u64,
                    }),
                });
            }
        }
    }

    let mut seen = HashSet::new();
    for line in received {
        let Some(parsed) = Line::parse(line) else {
            continue;
        };
        if parsed.prefix != prefix {
            continue;
        }
        if !expected.contains(line) {
            return Err(Failure::ForeignLine {
                prefix,
                line: line.clone(),
            });
        }
        let count = listener.count_of(line);
        if count > 1 {
            return Err(Failure::Duplicate {
                line: line.clone(),
                count,
            });
        }
        seen.insert(parsed.index);
    }

    let Some(&highest) = seen.iter().max() else {
        return Ok(());
    };
    let gaps: Vec<u64> = (0..highest).filter(|i| !seen.contains(i)).collect();
    if let Some(&first) = gaps.first() {
        return Err(Failure::Lost {
            prefix: prefix.clone(),
            missing: Missing {
                index: first,
                line: format!("{}_{}", prefix, first),
                total_missing: gaps.len() as u64,
            },
        });
    }
    Ok(())
}

/// The union over several containers that share the listener: exactly
/// `sum(n_i)` lines carry one of their prefixes and none arrived twice.
pub fn check_union(expected: &[ExpectedSequence], received: &[String]) -> Result<(), Failure> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for line in received {
        if expected.iter().any(|seq| seq.contains(line)) {
            *counts.entry(line.as_str()).or_insert(0) += 1;
        } else if let Some(parsed) = Line::parse(line) {
            // Right prefix, index out of range
            if let Some(seq) = expected.iter().find(|s| s.prefix() == parsed.prefix) {
                return Err(Failure::ForeignLine {
                    prefix: seq.prefix().to_string(),
                    line: line.clone(),
                });
            }
        }
    }

    let mut duplicates: Vec<_> = counts.iter().filter(|(_, c)| **c > 1).collect();
    duplicates.sort();
    if let Some((line, count)) = duplicates.first() {
        return Err(Failure::Duplicate {
            line: line.to_string(),
            count: **count,
        });
    }

    let expected_total: u64 = expected.iter().map(ExpectedSequence::len).sum();
    let actual: u64 = counts.values().sum();
    if actual != expected_total {
        return Err(Failure::UnionCount {
            prefixes: expected.len(),
            expected: expected_total,
            actual,
        });
    }
    Ok(())
}

/// Lines received under `token` must all belong to `expected`; any other
/// prefix from the same run means the driver crossed tokens.
pub fn check_attribution(
    token: &str,
    expected: &ExpectedSequence,
    others: &[(&str, &ExpectedSequence)],
    received_for_token: &[String],
) -> Result<(), Failure> {
    for line in received_for_token {
        if expected.contains(line) {
            continue;
        }
        if let Some((owner, _)) = others.iter().find(|(_, seq)| seq.contains(line)) {
            return Err(Failure::Misattributed {
                line: line.clone(),
                token: token.to_string(),
                expected_token: owner.to_string(),
            });
        }
    }
    Ok(())
}

pub fn check_listener_error(listener: &dyn ListenerFacade) -> Result<(), Failure> {
    match listener.last_error() {
        Some(err) => Err(Failure::ListenerError(err)),
        None => Ok(()),
    }
}

pub fn check_spool(dir_path: &str, lookup: &SpoolLookup) -> Result<(), Failure> {
    match lookup {
        SpoolLookup::Found(_) => Ok(()),
        SpoolLookup::NotFound => Err(Failure::SpoolMissing(dir_path.to_string())),
    }
}
