//! ListObjectsV2: one backend page per request

use crate::backend::ListObjectsRequest;
use crate::error::GatewayError;
use crate::handlers::{xml_response, S3State};
use crate::routing::QueryParams;
use crate::xml::{format_list_objects, ListEcho};
use axum::response::Response;
use tracing::debug;

pub async fn list_objects(state: &S3State, query: &QueryParams) -> Result<Response, GatewayError> {
    let echo = ListEcho {
        prefix: query.non_empty("prefix"),
        delimiter: query.non_empty("delimiter"),
        start_after: query.non_empty("start-after"),
        continuation_token: query.non_empty("continuation-token"),
        max_keys: query.page_size("max-keys"),
    };

    let request = ListObjectsRequest {
        prefix: echo.prefix.map(str::to_string),
        delimiter: echo.delimiter.map(str::to_string),
        max_keys: Some(echo.max_keys),
        continuation_token: echo.continuation_token.map(str::to_string),
        start_after: echo.start_after.map(str::to_string),
    };
    debug!(bucket = %state.backend.bucket(), ?request, "ListObjectsV2");

    let page = state.backend.list_objects(request).await?;
    Ok(xml_response(format_list_objects(
        state.backend.bucket(),
        &echo,
        &page,
    )))
}
