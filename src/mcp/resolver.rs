use actix_web::HttpRequest;

/// Header carrying the caller's session identity.
pub const SESSION_ID_HEADER: &str = "x-mcp-session-id";

/// Query-parameter fallback for callers that cannot set headers.
pub const SESSION_ID_QUERY_PARAM: &str = "sessionId";

/// Extract the caller-presented session id from a request.
///
/// Precedence: explicit session header, then the `sessionId` query
/// parameter, else absent. Pure inspection, no I/O.
pub fn resolve_session_id(req: &HttpRequest) -> Option<String> {
    if let Some(value) = req.headers().get(SESSION_ID_HEADER) {
        if let Ok(id) = value.to_str() {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }

    session_id_from_query(req.query_string())
}

/// Query-string half of [`resolve_session_id`], split out so transports
/// without an `HttpRequest` can reuse it.
pub fn session_id_from_query(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == SESSION_ID_QUERY_PARAM && !value.is_empty() {
            urlencoding::decode(value).ok().map(|decoded| decoded.into_owned())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn header_wins_over_query_parameter() {
        let req = TestRequest::default()
            .insert_header((SESSION_ID_HEADER, "header-id"))
            .uri("/mcp?sessionId=query-id")
            .to_http_request();

        assert_eq!(resolve_session_id(&req), Some("header-id".to_string()));
    }

    #[test]
    fn falls_back_to_query_parameter() {
        let req = TestRequest::default()
            .uri("/mcp?foo=bar&sessionId=query-id")
            .to_http_request();

        assert_eq!(resolve_session_id(&req), Some("query-id".to_string()));
    }

    #[test]
    fn query_parameter_is_percent_decoded() {
        assert_eq!(
            session_id_from_query("sessionId=abc%2Ddef"),
            Some("abc-def".to_string())
        );
    }

    #[test]
    fn absent_everywhere_resolves_to_none() {
        let req = TestRequest::default().uri("/mcp").to_http_request();
        assert_eq!(resolve_session_id(&req), None);
    }

    #[test]
    fn empty_values_do_not_count() {
        let req = TestRequest::default()
            .insert_header((SESSION_ID_HEADER, ""))
            .uri("/mcp?sessionId=")
            .to_http_request();

        assert_eq!(resolve_session_id(&req), None);
    }
}
