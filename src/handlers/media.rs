use std::path::Path;

use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::warn;

use crate::config::CONFIG;
use crate::error::{PosterError, PosterResult};
use crate::poster::encoder::{encode_file, source_image, source_image_from_base64};
use crate::poster::SourceImage;
use crate::utils::http::{download_bytes, get_http_client};

/// Where Telegram stores an uploaded file. A local Bot API server started with
/// `--local` reports absolute paths on its own disk instead of download paths.
pub enum FileLocation {
    Remote(String),
    Local(String),
}

pub fn file_location(api_url: &str, bot_token: &str, file_path: &str) -> FileLocation {
    if Path::new(file_path).is_absolute() {
        FileLocation::Local(file_path.to_string())
    } else {
        FileLocation::Remote(format!("{api_url}/file/bot{bot_token}/{file_path}"))
    }
}

pub async fn get_file_location(bot: &Bot, file_id: &FileId) -> PosterResult<FileLocation> {
    let file = bot
        .get_file(file_id.clone())
        .await
        .map_err(|err| PosterError::FileRead(format!("get_file failed: {err}")))?;
    Ok(file_location(
        &CONFIG.telegram_api_url,
        &CONFIG.bot_token,
        &file.path,
    ))
}

/// Largest photo size, or the document when an image is sent as a file.
pub fn image_file_id(message: &Message) -> Option<FileId> {
    if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
        return Some(photo.file.id.clone());
    }
    message.document().map(|document| document.file.id.clone())
}

pub fn message_has_image(message: &Message) -> bool {
    image_file_id(message).is_some()
}

/// Downloads the image attached to `message` once and encodes it.
pub async fn load_source_image(bot: &Bot, message: &Message) -> PosterResult<Option<SourceImage>> {
    let Some(file_id) = image_file_id(message) else {
        return Ok(None);
    };
    let image = match get_file_location(bot, &file_id).await? {
        FileLocation::Remote(url) => {
            let bytes = download_bytes(get_http_client(), &url).await.map_err(|err| {
                warn!("Upload download failed for chat {}: {}", message.chat.id, err);
                err
            })?;
            source_image(&bytes)?
        }
        FileLocation::Local(path) => {
            let data = encode_file(Path::new(&path)).await.map_err(|err| {
                warn!("Local upload read failed for chat {}: {}", message.chat.id, err);
                err
            })?;
            source_image_from_base64(data)?
        }
    };
    Ok(Some(image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_downloaded_from_the_api() {
        match file_location("https://api.telegram.org", "123:abc", "photos/file_7.jpg") {
            FileLocation::Remote(url) => assert_eq!(
                url,
                "https://api.telegram.org/file/bot123:abc/photos/file_7.jpg"
            ),
            FileLocation::Local(path) => panic!("unexpected local path {path}"),
        }
    }

    #[test]
    fn absolute_paths_are_read_from_disk() {
        match file_location(
            "http://localhost:8081",
            "123:abc",
            "/var/lib/telegram-bot-api/123:abc/photos/file_7.jpg",
        ) {
            FileLocation::Local(path) => {
                assert_eq!(path, "/var/lib/telegram-bot-api/123:abc/photos/file_7.jpg")
            }
            FileLocation::Remote(url) => panic!("unexpected download url {url}"),
        }
    }
}
