//! Sorting transport outcomes into the error taxonomy.

use crate::{
    api,
    error::{ClientError, Error, Result, ServerError},
    trans::{Response, TransportError},
};

const PROBLEM_JSON: &str = "application/problem+json";

/// Passes successful responses through and turns every other outcome into an [`Error`].
///
/// - transport failures become a [`ClientError`] carrying the cause;
/// - non-success responses with a problem document become a [`ServerError`] of the matching
///   [`ProblemKind`](crate::ProblemKind);
/// - non-success responses without one become a generic [`ServerError`] carrying the status and
///   raw body.
///
/// Never produces [`Error::Timeout`].
pub fn classify(outcome: Result<Response, TransportError>) -> Result<Response> {
    let res = outcome.map_err(|err| ClientError::with_source(err.to_string(), err))?;

    // ok responses pass through
    if res.is_success() {
        return Ok(res);
    }

    Err(Error::Server(server_error(&res)))
}

fn server_error(res: &Response) -> ServerError {
    let is_problem_json = res
        .content_type
        .as_deref()
        .is_some_and(|content_type| content_type.starts_with(PROBLEM_JSON));

    match serde_json::from_str::<api::Problem>(&res.body) {
        Ok(problem) if is_problem_json || has_type(&res.body) => {
            ServerError::from_problem(problem, Some(res.status))
        }

        Err(err) if is_problem_json => ServerError::unstructured(
            Some(res.status),
            format!(
                "Failed to deserialize application/problem+json ({err}) body: {}",
                res.body
            ),
        ),

        _ => ServerError::unstructured(
            Some(res.status),
            format!("HTTP {} body: {}", res.status, res.body),
        ),
    }
}

/// Some CAs send problem documents as plain `application/json`; accept those only when they
/// name a problem type.
fn has_type(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .is_ok_and(|value| value.get("type").is_some_and(serde_json::Value::is_string))
}
