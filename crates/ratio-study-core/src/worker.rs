//! Message framing for hosts that run the ratio study off their main thread.
//!
//! A host posts one [`WorkerRequest`] and receives zero or more
//! [`WorkerEvent::Progress`] events followed by exactly one terminal
//! [`WorkerEvent::Done`] or [`WorkerEvent::Error`]. This is the single
//! place where computation faults, including panics, become an error
//! string instead of a report.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::RatioStudyError;
use crate::ratio_study::median_ci::DEFAULT_CONFIDENCE;
use crate::ratio_study::preprocess::RawPair;
use crate::ratio_study::report::{compute_with_progress, MetricsReport, RatioStudyOptions};

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerRequest {
    Compute {
        pairs: Vec<RawPair>,
        #[serde(default = "default_confidence")]
        confidence: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerEvent {
    Progress {
        p: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    Done {
        result: Box<MetricsReport>,
    },
    Error {
        error: String,
    },
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Progress { .. })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected computation failure".to_string()
    }
}

/// Serve one request, emitting progress and then exactly one terminal event.
pub fn handle_request<F>(request: WorkerRequest, mut emit: F)
where
    F: FnMut(WorkerEvent),
{
    let terminal = match request {
        WorkerRequest::Compute { pairs, confidence } => {
            let options = RatioStudyOptions { confidence };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                compute_with_progress(&pairs, &options, |progress| {
                    emit(WorkerEvent::Progress {
                        p: progress.fraction,
                        msg: Some(progress.message),
                    })
                })
            }));
            match outcome {
                Ok(Ok(report)) => WorkerEvent::Done {
                    result: Box::new(report),
                },
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "ratio study failed");
                    WorkerEvent::Error {
                        error: e.to_string(),
                    }
                }
                Err(payload) => {
                    let error = panic_message(payload.as_ref());
                    tracing::warn!(%error, "ratio study panicked");
                    WorkerEvent::Error { error }
                }
            }
        }
    };
    emit(terminal);
}

/// [`handle_request`] for a JSON-encoded request. A request that does not
/// parse is answered with a single error event.
pub fn handle_request_json<F>(request_json: &str, mut emit: F)
where
    F: FnMut(WorkerEvent),
{
    match serde_json::from_str::<WorkerRequest>(request_json) {
        Ok(request) => handle_request(request, emit),
        Err(e) => emit(WorkerEvent::Error {
            error: RatioStudyError::from(e).to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(json: &str) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        handle_request_json(json, |e| events.push(e));
        events
    }

    #[test]
    fn test_compute_emits_progress_then_done() {
        let events = collect(
            r#"{"type": "compute", "pairs": [[100000, 95000], [200000, 210000], [300000, 280000]]}"#,
        );
        let (last, rest) = events.split_last().unwrap();
        assert!(!rest.is_empty());
        assert!(rest.iter().all(|e| !e.is_terminal()));
        match last {
            WorkerEvent::Done { result } => assert_eq!(result.n, 3),
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn test_boolean_field_is_ignored_not_fatal() {
        let events = collect(
            r#"{"type": "compute", "pairs": [[true, 5], [100000, 90000], [200000, 190000], [300000, 310000]]}"#,
        );
        match events.last().unwrap() {
            WorkerEvent::Done { result } => {
                assert_eq!(result.n, 3);
                assert_eq!(result.ignored, 1);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_dataset_is_still_done() {
        let events = collect(r#"{"type": "compute", "pairs": [["", 1]]}"#);
        match events.last().unwrap() {
            WorkerEvent::Done { result } => assert!(result.error.is_some()),
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_request_is_single_error() {
        let events = collect("{not json");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], WorkerEvent::Error { error } if error.contains("Serialization")));

        let events = collect(r#"{"type": "shutdown"}"#);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_terminal());
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(WorkerEvent::Progress {
            p: 0.05,
            msg: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "progress", "p": 0.05}));

        let json = serde_json::to_value(WorkerEvent::Error {
            error: "boom".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "error": "boom"}));
    }

    #[test]
    fn test_panic_payloads_become_messages() {
        let payload = panic::catch_unwind(|| panic!("bad ratio")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad ratio");
        let payload = panic::catch_unwind(|| panic!("{} rows", 3)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "3 rows");
    }
}
