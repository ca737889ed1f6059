use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use kernel::StoredObject;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Object payload sent back as an attachment.
pub struct FileReply {
    data: Vec<u8>,
    object: StoredObject,
}

impl FileReply {
    #[must_use]
    pub fn new(data: Vec<u8>, object: StoredObject) -> Self {
        Self { data, object }
    }

    fn content_type(&self) -> HeaderValue {
        let content_type = self.object.content_type.as_str();
        if content_type.is_empty() {
            return HeaderValue::from_static(FALLBACK_CONTENT_TYPE);
        }
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE))
    }

    fn disposition(&self) -> String {
        // quotes would terminate the quoted file name early
        let file_name = self.object.file_name().replace('"', "");
        format!(r#"attachment; filename="{file_name}""#)
    }
}

impl IntoResponse for FileReply {
    fn into_response(self) -> Response {
        let content_type = self.content_type();
        let attachment = self.disposition();
        let len = self.data.len().to_string();

        let mut res = Body::from(self.data).into_response();
        res.headers_mut().insert(header::CONTENT_TYPE, content_type);
        if let Ok(val) = HeaderValue::from_str(attachment.as_str()) {
            res.headers_mut().insert(header::CONTENT_DISPOSITION, val);
        }
        if let Ok(val) = HeaderValue::from_str(len.as_str()) {
            res.headers_mut().insert(header::CONTENT_LENGTH, val);
        }

        res
    }
}
