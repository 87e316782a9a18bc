//! Request loop over a line-delimited byte stream.
//!
//! Each line is parsed, dispatched and answered before the next one is read.
//! Bad requests become error lines; only I/O failures on the streams end the
//! loop early.

use crate::error::ProtocolError;
use crate::oracle::Oracle;
use crate::predictor::Predictor;
use crate::protocol::{Request, Response};
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

/// Counters reported when the input stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Lines read
    pub lines: u64,

    /// Prediction responses written
    pub predictions: u64,

    /// Lines with an action other than `predict`
    pub ignored: u64,

    /// Top-level error responses written
    pub protocol_errors: u64,
}

/// Parse one raw input line.
pub fn parse_line(line: &[u8]) -> Result<Request, ProtocolError> {
    Request::from_line(line)
}

/// Route a parsed request. Returns `None` when no response is due.
pub fn dispatch<O: Oracle + ?Sized>(
    predictor: &mut Predictor<'_, O>,
    request: Request,
) -> Option<Response> {
    if !request.is_predict() {
        debug!(action = %request.action, "ignoring non-predict request");
        return None;
    }
    let Some(data) = request.data else {
        warn!(id = %request.id, "predict request without data");
        return Some(Response::request_error(request.id, &ProtocolError::MissingData));
    };
    let prediction = predictor.predict(&data);
    Some(Response::prediction(request.id, prediction))
}

/// Serve requests from `reader` until end of input, writing one response line
/// per answered request to `writer`.
pub fn serve<O, R, W>(
    predictor: &mut Predictor<'_, O>,
    mut reader: R,
    mut writer: W,
) -> io::Result<LoopStats>
where
    O: Oracle + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut stats = LoopStats::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        stats.lines += 1;

        let response = match parse_line(&line) {
            Ok(request) => dispatch(predictor, request),
            Err(err) => {
                warn!(error = %err, "malformed request line");
                Some(Response::protocol_error(&err))
            }
        };

        match response {
            Some(response) => {
                match response {
                    Response::Prediction { .. } => stats.predictions += 1,
                    Response::Error { .. } => stats.protocol_errors += 1,
                }
                write_response(&mut writer, &response)?;
            }
            None => stats.ignored += 1,
        }
    }

    info!(
        lines = stats.lines,
        predictions = stats.predictions,
        ignored = stats.ignored,
        protocol_errors = stats.protocol_errors,
        "input closed, shutting down"
    );
    Ok(stats)
}

/// Write one response line and flush it so the caller sees it immediately.
fn write_response<W: Write>(writer: &mut W, response: &Response) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, response)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;
    use crate::oracle::StaticOracle;
    use serde_json::json;

    #[test]
    fn test_dispatch_ignores_other_actions() {
        let mut oracle = StaticOracle::new(vec![1.0, 0.0]);
        let mut predictor = Predictor::new(Some(&mut oracle), Normalizer::new(None));
        let request = parse_line(br#"{"id":1,"action":"status","data":[]}"#).unwrap();
        assert!(dispatch(&mut predictor, request).is_none());

        let request = parse_line(br#"{"id":2}"#).unwrap();
        assert!(dispatch(&mut predictor, request).is_none());
    }

    #[test]
    fn test_dispatch_echoes_id() {
        let mut predictor: Predictor<StaticOracle> = Predictor::new(None, Normalizer::new(None));
        let request = parse_line(br#"{"id":{"k":[1,2]},"action":"predict","data":[]}"#).unwrap();
        let response = dispatch(&mut predictor, request).unwrap();
        assert_eq!(response.id(), &json!({"k": [1, 2]}));
    }

    #[test]
    fn test_dispatch_missing_data_is_top_level_error() {
        let mut oracle = StaticOracle::new(vec![1.0, 0.0]);
        let mut predictor = Predictor::new(Some(&mut oracle), Normalizer::new(None));
        let request = parse_line(br#"{"id":5,"action":"predict"}"#).unwrap();
        assert_eq!(
            dispatch(&mut predictor, request),
            Some(Response::Error {
                id: json!(5),
                error: "missing field `data`".to_string(),
            })
        );
    }

    #[test]
    fn test_serve_answers_blank_lines() {
        let mut predictor: Predictor<StaticOracle> = Predictor::new(None, Normalizer::new(None));
        let input = b"\n   \n\r\n".to_vec();
        let mut output = Vec::new();
        let stats = serve(&mut predictor, &input[..], &mut output).unwrap();
        assert_eq!(
            stats,
            LoopStats {
                lines: 3,
                predictions: 0,
                ignored: 0,
                protocol_errors: 3,
            }
        );
        let lines: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            assert_eq!(line["id"], json!("unknown"));
            assert!(line["error"].is_string());
        }
    }

    #[test]
    fn test_serve_counts() {
        let mut predictor: Predictor<StaticOracle> = Predictor::new(None, Normalizer::new(None));
        let input = concat!(
            r#"{"id":1,"action":"predict","data":[]}"#,
            "\n",
            "garbage\n",
            r#"{"id":3,"action":"noop"}"#,
            "\n",
        );
        let mut output = Vec::new();
        let stats = serve(&mut predictor, input.as_bytes(), &mut output).unwrap();
        assert_eq!(
            stats,
            LoopStats {
                lines: 3,
                predictions: 1,
                ignored: 1,
                protocol_errors: 1,
            }
        );
        assert_eq!(output.iter().filter(|&&b| b == b'\n').count(), 2);
    }

    #[test]
    fn test_serve_last_line_without_newline() {
        let mut predictor: Predictor<StaticOracle> = Predictor::new(None, Normalizer::new(None));
        let input = br#"{"id":"tail","action":"predict","data":[]}"#;
        let mut output = Vec::new();
        serve(&mut predictor, &input[..], &mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "{\"id\":\"tail\",\"prediction\":{\"error\":\"model not loaded\"}}\n"
        );
    }
}
