//! Operation classification and key derivation

use axum::http::Method;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;

/// Default page size for listings when the client sends none or garbage
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

/// Decoded query string.
///
/// Flags such as `?uploads` are present with an empty value. When a name is
/// repeated the first value wins.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    params: HashMap<String, String>,
}

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let mut params = HashMap::new();
        for (name, value) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            params.entry(name.into_owned()).or_insert_with(|| value.into_owned());
        }
        Self { params }
    }

    pub fn has(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Value of a parameter, `None` when absent or empty
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// Page size parameter; missing or unparseable values fall back silently
    pub fn page_size(&self, name: &str) -> i32 {
        self.get(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

/// The single operation a request resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListObjects,
    CreateMultipartUpload,
    ListMultipartUploads,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    UploadPart,
    GetObject,
    HeadObject,
    PutObject,
    DeleteObject,
}

impl Operation {
    /// Classify a request; first matching rule wins.
    ///
    /// Returns `None` for methods the gateway does not serve.
    pub fn classify(method: &Method, query: &QueryParams) -> Option<Self> {
        let upload_id = query.non_empty("uploadId").is_some();

        if *method == Method::GET && query.get("list-type") == Some("2") {
            return Some(Self::ListObjects);
        }
        if query.has("uploads") {
            if *method == Method::POST {
                return Some(Self::CreateMultipartUpload);
            }
            if *method == Method::GET {
                return Some(Self::ListMultipartUploads);
            }
        }
        if upload_id {
            if *method == Method::POST {
                return Some(Self::CompleteMultipartUpload);
            }
            if *method == Method::DELETE {
                return Some(Self::AbortMultipartUpload);
            }
            if *method == Method::PUT && query.non_empty("partNumber").is_some() {
                return Some(Self::UploadPart);
            }
        }

        match *method {
            Method::GET => Some(Self::GetObject),
            Method::HEAD => Some(Self::HeadObject),
            Method::PUT | Method::POST => Some(Self::PutObject),
            Method::DELETE => Some(Self::DeleteObject),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListObjects => "ListObjectsV2",
            Self::CreateMultipartUpload => "CreateMultipartUpload",
            Self::ListMultipartUploads => "ListMultipartUploads",
            Self::CompleteMultipartUpload => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::GetObject => "GetObject",
            Self::HeadObject => "HeadObject",
            Self::PutObject => "PutObject",
            Self::DeleteObject => "DeleteObject",
        }
    }
}

/// Map a request path to a backend key.
///
/// The path is percent-decoded and stripped of surrounding slashes. A leading
/// segment equal to the bucket name is dropped when more segments follow
/// (`/<bucket>/<key>` addressing). A configured prefix is joined in front.
pub fn derive_key(path: &str, bucket: &str, prefix: Option<&str>) -> String {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let trimmed = decoded.trim_matches('/');

    let key = match trimmed.split_once('/') {
        Some((first, rest)) if first == bucket && !rest.is_empty() => rest,
        _ => trimmed,
    };

    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{key}"),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(method: Method, query: &str) -> Option<Operation> {
        Operation::classify(&method, &QueryParams::parse(Some(query)))
    }

    #[test]
    fn test_list_type_wins_over_multipart_params() {
        assert_eq!(
            classify(Method::GET, "list-type=2&uploads&uploadId=abc"),
            Some(Operation::ListObjects)
        );
        // list-type only applies to GET
        assert_eq!(classify(Method::POST, "list-type=2"), Some(Operation::PutObject));
    }

    #[test]
    fn test_multipart_classification() {
        assert_eq!(classify(Method::POST, "uploads"), Some(Operation::CreateMultipartUpload));
        assert_eq!(classify(Method::GET, "uploads="), Some(Operation::ListMultipartUploads));
        assert_eq!(
            classify(Method::POST, "uploadId=u1"),
            Some(Operation::CompleteMultipartUpload)
        );
        assert_eq!(
            classify(Method::DELETE, "uploadId=u1"),
            Some(Operation::AbortMultipartUpload)
        );
        assert_eq!(
            classify(Method::PUT, "uploadId=u1&partNumber=3"),
            Some(Operation::UploadPart)
        );
    }

    #[test]
    fn test_incomplete_multipart_params_fall_through() {
        assert_eq!(classify(Method::PUT, "uploadId=u1"), Some(Operation::PutObject));
        assert_eq!(classify(Method::PUT, "partNumber=1"), Some(Operation::PutObject));
        assert_eq!(classify(Method::DELETE, "uploadId="), Some(Operation::DeleteObject));
    }

    #[test]
    fn test_method_fallback() {
        assert_eq!(classify(Method::GET, ""), Some(Operation::GetObject));
        assert_eq!(classify(Method::HEAD, ""), Some(Operation::HeadObject));
        assert_eq!(classify(Method::PUT, ""), Some(Operation::PutObject));
        assert_eq!(classify(Method::POST, ""), Some(Operation::PutObject));
        assert_eq!(classify(Method::DELETE, ""), Some(Operation::DeleteObject));
        assert_eq!(classify(Method::PATCH, ""), None);
        assert_eq!(classify(Method::OPTIONS, ""), None);
    }

    #[test]
    fn test_page_size_is_lenient() {
        let q = QueryParams::parse(Some("max-keys=25&max-uploads=lots"));
        assert_eq!(q.page_size("max-keys"), 25);
        assert_eq!(q.page_size("max-uploads"), DEFAULT_PAGE_SIZE);
        assert_eq!(QueryParams::parse(None).page_size("max-keys"), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_query_decoding() {
        let q = QueryParams::parse(Some("prefix=photos%2F2024&delimiter=%2F&prefix=ignored"));
        assert_eq!(q.get("prefix"), Some("photos/2024"));
        assert_eq!(q.get("delimiter"), Some("/"));
        assert!(!q.has("uploads"));
    }

    #[test]
    fn test_derive_key() {
        assert_eq!(derive_key("/docs/readme.md", "assets", None), "docs/readme.md");
        assert_eq!(derive_key("/assets/docs/readme.md", "assets", None), "docs/readme.md");
        assert_eq!(derive_key("/hello%20world.txt", "assets", None), "hello world.txt");
        assert_eq!(derive_key("/dir/", "assets", None), "dir");
        assert_eq!(derive_key("/", "assets", None), "");
    }

    #[test]
    fn test_bucket_segment_alone_is_a_key() {
        // A lone segment named like the bucket is an object, not the bucket
        assert_eq!(derive_key("/assets", "assets", None), "assets");
        assert_eq!(derive_key("/assets/", "assets", None), "assets");
    }

    #[test]
    fn test_derive_key_with_prefix() {
        assert_eq!(derive_key("/a/b.txt", "assets", Some("tenant")), "tenant/a/b.txt");
        assert_eq!(derive_key("/a/b.txt", "assets", Some("/tenant/")), "tenant/a/b.txt");
        assert_eq!(derive_key("/assets/a.txt", "assets", Some("t")), "t/a.txt");
        assert_eq!(derive_key("/", "assets", Some("t")), "t/");
        assert_eq!(derive_key("/a.txt", "assets", Some("")), "a.txt");
    }
}
