//! Multipart/form-data decomposition for upload bindings: parses the body with `multer`,
//! separates file parts from plain fields, and enforces per-binding size and content-type
//! constraints.

use crate::error::RequestError;
use crate::route::FileConstraints;
use axum::body::Bytes;
use fxhash::FxHashMap;
use mitsuki_di::instance_provider::{convert_error, ErrorPtr};
use std::convert::Infallible;
use std::path::Path;

/// An uploaded file bound from a multipart request. The content is fully buffered; `save`
/// persists it to disk.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ErrorPtr> {
        tokio::fs::write(path, &self.data)
            .await
            .map_err(convert_error)
    }
}

/// A decomposed multipart body: file parts by field name, plus plain text fields.
#[derive(Default, Debug)]
pub(crate) struct MultipartBody {
    pub files: FxHashMap<String, UploadedFile>,
    pub fields: FxHashMap<String, String>,
}

pub(crate) async fn parse_multipart(
    content_type: &str,
    body: Bytes,
) -> Result<MultipartBody, RequestError> {
    let boundary = multer::parse_boundary(content_type).map_err(|_| {
        RequestError::InvalidContentType {
            expected: "multipart/form-data".to_string(),
        }
    })?;

    let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut parsed = MultipartBody::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(|mime| mime.to_string());
        let data = field.bytes().await.map_err(multipart_error)?;

        if file_name.is_some() {
            parsed.files.insert(
                name,
                UploadedFile {
                    file_name,
                    content_type,
                    data,
                },
            );
        } else {
            let text = String::from_utf8_lossy(&data).into_owned();
            parsed.fields.insert(name, text);
        }
    }

    Ok(parsed)
}

fn multipart_error(error: multer::Error) -> RequestError {
    RequestError::Binding {
        parameter: "body".to_string(),
        message: format!("malformed multipart body: {error}"),
    }
}

/// Applies a file binding's constraints; `total_size` is the sum of all file parts in the
/// request.
pub(crate) fn enforce_constraints(
    parameter: &str,
    file: &UploadedFile,
    total_size: usize,
    constraints: &FileConstraints,
) -> Result<(), RequestError> {
    if let Some(limit) = constraints.max_file_size {
        if file.size() > limit {
            return Err(RequestError::FileTooLarge {
                parameter: parameter.to_string(),
                size: file.size(),
                limit,
            });
        }
    }

    if let Some(limit) = constraints.max_total_size {
        if total_size > limit {
            return Err(RequestError::FileTooLarge {
                parameter: parameter.to_string(),
                size: total_size,
                limit,
            });
        }
    }

    if !constraints.allowed_content_types.is_empty() {
        let content_type = file.content_type.as_deref().unwrap_or("");
        let allowed = constraints.allowed_content_types.iter().any(|candidate| {
            match candidate.strip_suffix("/*") {
                Some(prefix) => content_type.starts_with(prefix),
                None => content_type == candidate,
            }
        });
        if !allowed {
            return Err(RequestError::InvalidFileType {
                parameter: parameter.to_string(),
                content_type: content_type.to_string(),
            });
        }
    }

    Ok(())
}
