use std::path::Path;

use base64::{engine::general_purpose, Engine as _};

use crate::error::{PosterError, PosterResult};
use crate::poster::types::SourceImage;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

// Multiple of 4 so the prefix decodes on its own; 48 bytes cover every signature.
const SNIFF_BASE64_LEN: usize = 64;

const BASE64_SIGNATURES: [(&str, &str); 5] = [
    ("/9j/", "image/jpeg"),
    ("iVBORw0KGgo", "image/png"),
    ("R0lGODdh", "image/gif"),
    ("R0lGODlh", "image/gif"),
    ("Qk02U", "image/bmp"),
];

pub async fn encode_file(path: &Path) -> PosterResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| PosterError::FileRead(format!("{}: {}", path.display(), err)))?;
    Ok(encode_bytes(&bytes))
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn strip_data_url_prefix(payload: &str) -> &str {
    let trimmed = payload.trim();
    if !trimmed.starts_with("data:") {
        return trimmed;
    }
    match trimmed.split_once(',') {
        Some((_, data)) => data,
        None => "",
    }
}

pub fn mime_type_from_base64(payload: &str) -> &'static str {
    let payload = strip_data_url_prefix(payload);
    BASE64_SIGNATURES
        .iter()
        .find(|(signature, _)| payload.starts_with(signature))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_IMAGE_MIME)
}

pub fn to_data_uri(payload: &str, mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, strip_data_url_prefix(payload))
}

pub fn decode_data_uri(uri: &str) -> PosterResult<Vec<u8>> {
    general_purpose::STANDARD
        .decode(strip_data_url_prefix(uri))
        .map_err(|err| PosterError::FileRead(format!("invalid base64 image: {err}")))
}

pub fn detect_mime_type(data: &[u8]) -> Option<&'static str> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic");
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type())
}

/// Upload filter: only byte-sniffed image types are accepted into a slot.
pub fn is_supported_upload(data: &[u8]) -> bool {
    detect_mime_type(data)
        .map(|mime| mime.starts_with("image/"))
        .unwrap_or(false)
}

fn sniffed_source_image(head: &[u8], data: String) -> PosterResult<SourceImage> {
    if !is_supported_upload(head) {
        return Err(PosterError::FileRead("unsupported file type".to_string()));
    }
    let mime_type = detect_mime_type(head).unwrap_or(DEFAULT_IMAGE_MIME);
    Ok(SourceImage { data, mime_type })
}

/// Filters and encodes an uploaded file for one upload slot.
pub fn source_image(bytes: &[u8]) -> PosterResult<SourceImage> {
    sniffed_source_image(bytes, encode_bytes(bytes))
}

/// Same filter for an upload that is already base64, such as the output of
/// [`encode_file`]. Only the leading bytes are decoded for sniffing.
pub fn source_image_from_base64(data: String) -> PosterResult<SourceImage> {
    let payload = strip_data_url_prefix(&data);
    let head_len = payload.len().min(SNIFF_BASE64_LEN);
    let head = general_purpose::STANDARD
        .decode(&payload[..head_len])
        .map_err(|err| PosterError::FileRead(format!("invalid base64 image: {err}")))?;
    let payload = payload.to_string();
    sniffed_source_image(&head, payload)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const PNG_HEADER: [u8; 16] = [
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D',
        b'R',
    ];

    const WEBP_HEADER: [u8; 16] = [
        b'R', b'I', b'F', b'F', 0x24, 0x00, 0x00, 0x00, b'W', b'E', b'B', b'P', b'V', b'P', b'8',
        b' ',
    ];

    #[test]
    fn strips_data_url_prefix() {
        assert_eq!(strip_data_url_prefix("data:image/png;base64,iVBORw0KGgo"), "iVBORw0KGgo");
        assert_eq!(strip_data_url_prefix("iVBORw0KGgo"), "iVBORw0KGgo");
        assert_eq!(strip_data_url_prefix("data:broken"), "");
    }

    #[test]
    fn mime_lookup_uses_known_signatures() {
        assert_eq!(mime_type_from_base64("/9j/4AAQSkZJRg"), "image/jpeg");
        assert_eq!(mime_type_from_base64("iVBORw0KGgoAAAANSUhEUg"), "image/png");
        assert_eq!(mime_type_from_base64("R0lGODlhAQABAAAAACw="), "image/gif");
        assert_eq!(mime_type_from_base64("R0lGODdhAQAB"), "image/gif");
        assert_eq!(mime_type_from_base64("Qk02UAAAAAAA"), "image/bmp");
        assert_eq!(mime_type_from_base64("UklGRiQAAABXRUJQ"), DEFAULT_IMAGE_MIME);
        assert_eq!(
            mime_type_from_base64("data:image/jpeg;base64,/9j/4AAQ"),
            "image/jpeg"
        );
    }

    #[test]
    fn encoded_png_is_recognised() {
        let encoded = encode_bytes(&PNG_HEADER);
        assert!(encoded.starts_with("iVBORw0KGgo"));
        assert_eq!(mime_type_from_base64(&encoded), "image/png");
    }

    #[test]
    fn data_uri_helpers() {
        let encoded = encode_bytes(&PNG_HEADER);
        let uri = to_data_uri(&encoded, "image/png");
        assert!(uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
        assert_eq!(decode_data_uri(&uri).unwrap(), PNG_HEADER.to_vec());
        assert!(matches!(decode_data_uri("data:image/png;base64,@@@"), Err(PosterError::FileRead(_))));
    }

    #[test]
    fn upload_filter_accepts_images_only() {
        assert!(is_supported_upload(&PNG_HEADER));
        assert!(!is_supported_upload(b"%PDF-1.7 not an image at all"));
        assert!(!is_supported_upload(b"plain text"));
    }

    #[test]
    fn source_image_carries_detected_mime() {
        let image = source_image(&PNG_HEADER).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert!(image.data.starts_with("iVBORw0KGgo"));

        let webp = source_image(&WEBP_HEADER).unwrap();
        assert_eq!(webp.mime_type, "image/webp");
        assert!(webp.data.starts_with("UklGR"));

        let err = source_image(b"just some notes").unwrap_err();
        assert_eq!(err, PosterError::FileRead("unsupported file type".to_string()));
    }

    #[tokio::test]
    async fn local_file_becomes_source_image() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&WEBP_HEADER).unwrap();
        let image = source_image_from_base64(encode_file(file.path()).await.unwrap()).unwrap();
        assert_eq!(image.mime_type, "image/webp");
        assert_eq!(image.data, encode_bytes(&WEBP_HEADER));

        let text = encode_bytes(b"meeting notes, not a picture");
        assert!(matches!(
            source_image_from_base64(text),
            Err(PosterError::FileRead(_))
        ));
        assert!(matches!(
            source_image_from_base64("%%%%".to_string()),
            Err(PosterError::FileRead(_))
        ));
    }

    #[tokio::test]
    async fn encode_file_reads_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&PNG_HEADER).unwrap();
        let encoded = encode_file(file.path()).await.unwrap();
        assert_eq!(encoded, encode_bytes(&PNG_HEADER));
        assert!(!encoded.starts_with("data:"));
    }

    #[tokio::test]
    async fn encode_file_reports_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        let err = encode_file(&missing).await.unwrap_err();
        assert!(matches!(err, PosterError::FileRead(_)));
    }
}
