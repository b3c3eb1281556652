use actix_multipart::Multipart;
use actix_web::{web, HttpRequest};
use futures::StreamExt;
use uuid::Uuid;

use crate::error::ApiError;

pub const STORAGE_DESTINATION: &str = "public/uploads";

const ALLOWED_EXTENSIONS: &str = "png, jpeg, jpg";

fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpeg"),
        "image/jpg" => Some("jpg"),
        _ => None,
    }
}

/// Stored names keep a sanitized stem of the upload and are uniquified, so
/// clients can neither collide with nor overwrite each other's files.
fn stored_file_name(original: Option<&str>, extension: &str) -> String {
    let stem = original
        .and_then(|name| std::path::Path::new(name).file_stem())
        .and_then(|stem| stem.to_str())
        .unwrap_or("upload")
        .replace(' ', "_");

    format!("{}-{}.{}", stem, Uuid::new_v4(), extension)
}

pub fn public_file_url(req: &HttpRequest, file_name: &str) -> String {
    let info = req.connection_info();
    format!(
        "{}://{}/{}/{}",
        info.scheme(),
        info.host(),
        STORAGE_DESTINATION,
        file_name
    )
}

/// Drains a multipart payload of image files into the upload directory and
/// returns their public URLs. Rejects anything outside the image allow-list
/// before writing a byte.
pub async fn save_images(
    mut payload: Multipart,
    req: &HttpRequest,
    max_files: usize,
) -> Result<Vec<String>, ApiError> {
    std::fs::create_dir_all(STORAGE_DESTINATION)
        .map_err(|err| ApiError::Persistence(err.to_string()))?;

    let mut urls = Vec::new();

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|err| ApiError::Validation(err.to_string()))?;

        if urls.len() >= max_files {
            return Err(ApiError::Validation(format!(
                "At most {} images can be uploaded at once.",
                max_files
            )));
        }

        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();

        let extension = extension_for(&content_type).ok_or_else(|| {
            ApiError::Validation(format!(
                "Invalid file type, must be one of {}",
                ALLOWED_EXTENSIONS
            ))
        })?;

        let file_name = stored_file_name(field.content_disposition().get_filename(), extension);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|err| ApiError::Validation(err.to_string()))?;
            bytes.extend_from_slice(&chunk);
        }

        let path = format!("{}/{}", STORAGE_DESTINATION, file_name);
        web::block(move || std::fs::write(path, bytes))
            .await
            .map_err(|err| ApiError::Persistence(err.to_string()))?
            .map_err(|err| ApiError::Persistence(err.to_string()))?;

        urls.push(public_file_url(req, &file_name));
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn only_image_content_types_are_allowed() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/jpeg"), Some("jpeg"));
        assert_eq!(extension_for("image/jpg"), Some("jpg"));
        assert_eq!(extension_for("image/gif"), None);
        assert_eq!(extension_for("application/pdf"), None);
    }

    #[test]
    fn stored_names_are_sanitized_and_unique() {
        let first = stored_file_name(Some("my shoe photo.png"), "png");
        let second = stored_file_name(Some("my shoe photo.png"), "png");

        assert!(first.starts_with("my_shoe_photo-"));
        assert!(first.ends_with(".png"));
        assert_ne!(first, second);

        let pathy = stored_file_name(Some("../../etc/passwd"), "jpg");
        assert!(!pathy.contains('/'));
    }

    #[test]
    fn missing_original_name_still_produces_a_name() {
        let name = stored_file_name(None, "jpeg");
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".jpeg"));
    }

    #[test]
    fn public_urls_point_into_the_upload_directory() {
        let req = TestRequest::default().to_http_request();
        let url = public_file_url(&req, "shoe.png");

        assert!(url.starts_with("http://"));
        assert!(url.ends_with(&format!("{}/shoe.png", STORAGE_DESTINATION)));
    }
}
