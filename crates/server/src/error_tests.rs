// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ErrorCode;

#[yare::parameterized(
    input_too_large = { ErrorCode::InputTooLarge, 413, "INPUT_TOO_LARGE" },
    invalid_message = { ErrorCode::InvalidMessage, 400, "INVALID_MESSAGE" },
    auth_required = { ErrorCode::AuthRequired, 401, "AUTH_REQUIRED" },
    agent_unavailable = { ErrorCode::AgentUnavailable, 503, "AGENT_UNAVAILABLE" },
    agent_timeout = { ErrorCode::AgentTimeout, 504, "AGENT_TIMEOUT" },
    agent_stream_failed = { ErrorCode::AgentStreamFailed, 502, "AGENT_STREAM_FAILED" },
    session_not_found = { ErrorCode::SessionNotFound, 404, "SESSION_NOT_FOUND" },
    sandbox_failure = { ErrorCode::SandboxFailure, 500, "SANDBOX_FAILURE" },
    catalog_error = { ErrorCode::CatalogError, 500, "CATALOG_ERROR" },
    internal = { ErrorCode::Internal, 500, "INTERNAL" },
)]
fn status_and_wire_form(code: ErrorCode, status: u16, wire: &str) {
    assert_eq!(code.http_status(), status);
    assert_eq!(code.as_str(), wire);
    assert_eq!(code.to_string(), wire);
}

#[test]
fn http_response_carries_detail() {
    let (status, body) = ErrorCode::SessionNotFound.to_http_response("no such session");
    assert_eq!(status.as_u16(), 404);
    assert_eq!(body.detail, "no such session");
}
