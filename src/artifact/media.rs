use serde::{Deserialize, Serialize};
use std::path::Path;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "webm", "mkv"];
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Capitalised noun used in status messages.
    pub fn noun(self) -> &'static str {
        match self {
            MediaKind::Video => "Video",
            MediaKind::Image => "Image",
        }
    }

    fn default_extension(self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Image => "png",
        }
    }

    /// MIME type for an artifact, falling back to the kind's usual format
    /// for anything outside the table.
    pub fn content_type(self, path: &Path) -> &'static str {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

        match extension.as_deref() {
            Some("mp4") => "video/mp4",
            Some("avi") => "video/x-msvideo",
            Some("mov") => "video/quicktime",
            Some("webm") => "video/webm",
            Some("mkv") => "video/x-matroska",
            Some("gif") => "image/gif",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("bmp") => "image/bmp",
            _ => match self {
                MediaKind::Video => "video/mp4",
                MediaKind::Image => "image/png",
            },
        }
    }

    /// File name offered to clients downloading the artifact of `job_id`.
    pub fn download_name(self, job_id: &str, path: &Path) -> String {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_else(|| self.default_extension().to_string());

        match self {
            MediaKind::Video => format!("generated_video_{}.{}", job_id, extension),
            MediaKind::Image => format!("edited_image_{}.{}", job_id, extension),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        let video = MediaKind::Video;
        assert_eq!(video.content_type(Path::new("a.mp4")), "video/mp4");
        assert_eq!(video.content_type(Path::new("a.MOV")), "video/quicktime");
        assert_eq!(video.content_type(Path::new("a.mkv")), "video/x-matroska");
        assert_eq!(MediaKind::Image.content_type(Path::new("a.jpeg")), "image/jpeg");
    }

    #[test]
    fn unknown_extensions_use_the_kind_default() {
        assert_eq!(MediaKind::Video.content_type(Path::new("a.bin")), "video/mp4");
        assert_eq!(MediaKind::Image.content_type(Path::new("noext")), "image/png");
    }

    #[test]
    fn download_name_keeps_the_real_extension() {
        assert_eq!(
            MediaKind::Video.download_name("abc", Path::new("/out/abc_00001-audio.webm")),
            "generated_video_abc.webm"
        );
        assert_eq!(
            MediaKind::Image.download_name("abc", Path::new("/out/api_abc")),
            "edited_image_abc.png"
        );
    }
}
