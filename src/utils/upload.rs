use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use axum::extract::Multipart;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// URL prefix uploaded files are served under
pub const PUBLIC_PREFIX: &str = "uploads";

/// Text fields of a multipart form plus the stored path of its image, if any
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub image: Option<String>,
}

impl FormData {
    pub fn text(&self, name: &str) -> AppResult<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AppError::BadRequest(format!("Missing field '{}'", name)))
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> AppResult<T> {
        self.text(name)?
            .trim()
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Field '{}' has an invalid value", name)))
    }
}

/// Drain a multipart body, saving the field named `image_field` under `upload_dir`.
/// On error any file already written for this form is removed.
pub async fn read_form(
    multipart: &mut Multipart,
    upload_dir: &str,
    image_field: &str,
) -> AppResult<FormData> {
    let mut form = FormData::default();

    match collect_fields(multipart, upload_dir, image_field, &mut form).await {
        Ok(()) => Ok(form),
        Err(e) => {
            if let Some(image) = &form.image {
                remove_file(upload_dir, image).await;
            }
            Err(e)
        }
    }
}

async fn collect_fields(
    multipart: &mut Multipart,
    upload_dir: &str,
    image_field: &str,
    form: &mut FormData,
) -> AppResult<()> {
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == image_field {
            if form.image.is_some() {
                return Err(AppError::BadRequest("Only one image may be uploaded".to_string()));
            }
            let content_type = field.content_type().unwrap_or_default().to_string();
            if !content_type.starts_with("image/") {
                return Err(AppError::BadRequest(
                    "Uploaded file must be an image".to_string(),
                ));
            }
            let extension = extension_for(field.file_name(), &content_type);
            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                continue;
            }
            form.image = Some(save_file(upload_dir, extension, &bytes).await?);
        } else {
            form.fields.insert(name, field.text().await?);
        }
    }

    Ok(())
}

async fn save_file(upload_dir: &str, extension: &str, bytes: &[u8]) -> AppResult<String> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {}", e)))?;

    let file_name = format!("{}.{}", Uuid::new_v4(), extension);
    let path = Path::new(upload_dir).join(&file_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;

    tracing::debug!(path = %path.display(), size = bytes.len(), "Stored upload");
    Ok(format!("{}/{}", PUBLIC_PREFIX, file_name))
}

/// Best effort removal of a previously stored upload
pub async fn remove_file(upload_dir: &str, stored_path: &str) {
    let Some(file_name) = stored_path.strip_prefix(&format!("{}/", PUBLIC_PREFIX)) else {
        return;
    };
    let path = Path::new(upload_dir).join(file_name);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove old upload");
    }
}

/// Extensions ServeDir may hand back; anything else could be served as markup or script
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

fn extension_for(file_name: Option<&str>, content_type: &str) -> &'static str {
    let from_name = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .and_then(|e| {
            IMAGE_EXTENSIONS
                .iter()
                .find(|allowed| allowed.eq_ignore_ascii_case(e))
                .copied()
        });

    from_name.unwrap_or(match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_prefers_file_name() {
        assert_eq!(extension_for(Some("Court.PNG"), "image/jpeg"), "png");
        assert_eq!(extension_for(Some("court"), "image/webp"), "webp");
        assert_eq!(extension_for(Some("../../etc/x.p/hp"), "image/jpeg"), "jpg");
        assert_eq!(extension_for(None, "image/unknown"), "jpg");
    }

    #[test]
    fn test_extension_rejects_non_image_names() {
        assert_eq!(extension_for(Some("x.html"), "image/png"), "png");
        assert_eq!(extension_for(Some("pwn.svg"), "image/gif"), "gif");
        assert_eq!(extension_for(Some("page.htm"), "image/jpeg"), "jpg");
        assert_eq!(extension_for(Some("photo.JPEG"), "image/png"), "jpeg");
    }

    #[test]
    fn test_form_parsing() {
        let mut form = FormData::default();
        form.fields.insert("price_per_hour".into(), " 1200.5 ".into());
        form.fields.insert("latitude".into(), "north".into());

        assert_eq!(form.parse::<f64>("price_per_hour").unwrap(), 1200.5);
        assert!(form.parse::<f64>("latitude").is_err());
        assert!(form.text("name").is_err());
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = std::env::temp_dir().join(format!("futsal-upload-{}", Uuid::new_v4()));
        let dir = dir.to_str().unwrap().to_string();

        let stored = save_file(&dir, "png", b"\x89PNG").await.unwrap();
        assert!(stored.starts_with("uploads/"));

        let file_name = stored.trim_start_matches("uploads/");
        assert!(Path::new(&dir).join(file_name).exists());

        remove_file(&dir, &stored).await;
        assert!(!Path::new(&dir).join(file_name).exists());
    }

    async fn multipart(body: &'static str) -> Multipart {
        use axum::extract::{FromRequest, Request};

        let request = Request::builder()
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(axum::body::Body::from(body.replace('\n', "\r\n")))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    fn stored_files(dir: &str) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_read_form_keeps_single_image() {
        let dir = std::env::temp_dir().join(format!("futsal-upload-{}", Uuid::new_v4()));
        let dir = dir.to_str().unwrap().to_string();

        let mut body = multipart(
            "--XBOUNDARY
Content-Disposition: form-data; name=\"name\"

Kick Off Arena
--XBOUNDARY
Content-Disposition: form-data; name=\"image\"; filename=\"court.png\"
Content-Type: image/png

PNGDATA
--XBOUNDARY--
",
        )
        .await;

        let form = read_form(&mut body, &dir, "image").await.unwrap();
        assert_eq!(form.text("name").unwrap(), "Kick Off Arena");
        assert!(form.image.as_deref().unwrap().ends_with(".png"));
        assert_eq!(stored_files(&dir), 1);
    }

    #[tokio::test]
    async fn test_read_form_removes_saved_image_on_error() {
        let dir = std::env::temp_dir().join(format!("futsal-upload-{}", Uuid::new_v4()));
        let dir = dir.to_str().unwrap().to_string();

        let mut second_image = multipart(
            "--XBOUNDARY
Content-Disposition: form-data; name=\"image\"; filename=\"a.png\"
Content-Type: image/png

FIRST
--XBOUNDARY
Content-Disposition: form-data; name=\"image\"; filename=\"b.png\"
Content-Type: image/png

SECOND
--XBOUNDARY--
",
        )
        .await;
        assert!(read_form(&mut second_image, &dir, "image").await.is_err());
        assert_eq!(stored_files(&dir), 0);

        let mut truncated_after_image = multipart(
            "--XBOUNDARY
Content-Disposition: form-data; name=\"image\"; filename=\"a.png\"
Content-Type: image/png

FIRST
--XBOUNDARY
Content-Disposition: form-data; name=\"name\"

no closing boundary",
        )
        .await;
        assert!(read_form(&mut truncated_after_image, &dir, "image").await.is_err());
        assert_eq!(stored_files(&dir), 0);
    }
}
