use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, MessageId, ParseMode, ReplyParameters};
use tracing::{debug, error, info, warn};

use crate::config::CONFIG;
use crate::error::PosterError;
use crate::handlers::media::{load_source_image, message_has_image};
use crate::handlers::panel::{
    apply_selection, panel_keyboard, panel_text, result_caption, result_keyboard, PanelAction,
};
use crate::poster::encoder::decode_data_uri;
use crate::poster::types::artifact_file_name;
use crate::poster::{GeneratedArtifact, Side};
use crate::state::{AppState, SessionKey};
use crate::utils::telegram::{escape_html, start_chat_action_heartbeat, truncate_chars};
use crate::utils::timing::{complete_command_timer, start_command_timer};

const GENERATE_FAILED: &str =
    "Failed to generate image. Please ensure you have selected a valid API Key with billing enabled.";
const EDIT_FAILED: &str = "Failed to edit image. Try again.";
const REQUEST_BUSY: &str = "A poster request is already running. Please wait for it to finish.";
const SESSION_RESET: &str = "The session was reset, so the finished poster was discarded.";
const NO_ARTIFACT: &str = "Generate a poster first, then refine it with /edit <instruction>.";
const EDIT_USAGE: &str = "Usage: /edit <instruction>\nExample: /edit make the background rainy";
const SLOTS_FULL: &str =
    "Both photo slots are filled. Caption the photo with home or away to replace one.";
const PROMPT_PREVIEW_LIMIT: usize = 3500;

const HELP_TEXT: &str = "<b>VS Cover Bot</b>

Build a matchday \"VS\" poster from two photos, two names and a few choices.

/vs [details] - open the settings panel
/home [name] - set the home side name; reply to a photo to use it as the home image (without a name the current one is kept)
/away [name] - set the away side name; reply to a photo to use it as the away image (without a name the current one is kept)
/details [text] - extra instructions appended to the prompt
/prompt - preview the prompt that will be sent
/generate - create the poster
/edit &lt;instruction&gt; - refine the current poster
/key - select the API key again
/reset - start over

Send a photo captioned <code>home</code> or <code>away</code> (optionally followed by a name) to fill a slot. Photos without a caption fill the first empty slot.";

fn session_key(message: &Message) -> Option<SessionKey> {
    message
        .from
        .as_ref()
        .map(|user| SessionKey::new(message.chat.id.0, user.id.0))
}

fn key_missing_text() -> String {
    format!(
        "No API key is selected. Set {} in the .env file and run /key.",
        CONFIG.gemini_api_key_env
    )
}

pub fn generation_failure_text(err: &PosterError) -> String {
    match err {
        PosterError::MissingCredential => key_missing_text(),
        PosterError::RequestInFlight => REQUEST_BUSY.to_string(),
        PosterError::NoArtifact => NO_ARTIFACT.to_string(),
        PosterError::SessionReset => SESSION_RESET.to_string(),
        err if err.is_transport_or_auth() => GENERATE_FAILED.to_string(),
        _ => err.to_string(),
    }
}

pub fn edit_failure_text(err: &PosterError) -> String {
    match err {
        PosterError::MissingCredential => key_missing_text(),
        PosterError::RequestInFlight => REQUEST_BUSY.to_string(),
        PosterError::NoArtifact => NO_ARTIFACT.to_string(),
        PosterError::EmptyInput => EDIT_USAGE.to_string(),
        PosterError::SessionReset => SESSION_RESET.to_string(),
        _ => EDIT_FAILED.to_string(),
    }
}

/// New name for a side, or `None` to keep it: a bare `/home` sent as a reply to
/// a photo only takes the photo.
fn side_name_update(raw: &str, replying_to_photo: bool) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() && replying_to_photo {
        None
    } else {
        Some(name.to_string())
    }
}

/// Splits an upload caption such as `home Chelsea` or `/away@VsBot` into a
/// side and an optional name.
pub fn parse_upload_caption(caption: &str) -> Option<(Side, Option<String>)> {
    let caption = caption.trim();
    let (keyword, rest) = match caption.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (caption, ""),
    };
    let keyword = keyword.split('@').next().unwrap_or(keyword);
    let side = Side::from_keyword(keyword)?;
    let name = if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    };
    Some((side, name))
}

async fn reply_text(bot: &Bot, message: &Message, text: impl Into<String>) -> Result<()> {
    bot.send_message(message.chat.id, text)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}

async fn render_panel(
    bot: &Bot,
    state: &AppState,
    key: SessionKey,
    chat_id: ChatId,
    message_id: MessageId,
) {
    let Some((text, keyboard)) =
        state.read_session(key, |session| (panel_text(session), panel_keyboard(session)))
    else {
        return;
    };
    if let Err(err) = bot
        .edit_message_text(chat_id, message_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await
    {
        // Telegram rejects edits that leave the message unchanged.
        debug!("Panel refresh skipped: {err}");
    }
}

async fn refresh_panel(bot: &Bot, state: &AppState, key: SessionKey, chat_id: ChatId) {
    let panel_id = state
        .read_session(key, |session| session.panel_message_id)
        .flatten();
    if let Some(panel_id) = panel_id {
        render_panel(bot, state, key, chat_id, MessageId(panel_id)).await;
    }
}

async fn send_panel(bot: &Bot, state: &AppState, key: SessionKey, chat_id: ChatId) -> Result<()> {
    let (text, keyboard, previous) = state.with_session(key, |session| {
        (
            panel_text(session),
            panel_keyboard(session),
            session.panel_message_id,
        )
    });
    let sent = bot
        .send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    state.with_session(key, |session| session.panel_message_id = Some(sent.id.0));

    if let Some(previous) = previous {
        if let Err(err) = bot.delete_message(chat_id, MessageId(previous)).await {
            debug!("Old panel could not be removed: {err}");
        }
    }
    Ok(())
}

async fn send_result(
    bot: &Bot,
    state: &AppState,
    key: SessionKey,
    chat_id: ChatId,
    artifact: &GeneratedArtifact,
) -> Result<()> {
    let bytes = decode_data_uri(&artifact.image_uri)?;
    let caption = result_caption(artifact);

    let sent = match bot
        .send_photo(chat_id, InputFile::memory(bytes.clone()).file_name("vs-cover.png"))
        .caption(caption.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(result_keyboard())
        .await
    {
        Ok(sent) => sent,
        Err(err) => {
            // Large 4K renders can exceed the photo limits; documents are accepted.
            warn!("send_photo failed, sending poster as document: {err}");
            bot.send_document(
                chat_id,
                InputFile::memory(bytes).file_name(artifact_file_name(artifact.created_at)),
            )
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(result_keyboard())
            .await?
        }
    };

    let previous = state.with_session(key, |session| session.result_message_id.replace(sent.id.0));
    if let Some(previous) = previous {
        if let Err(err) = bot
            .edit_message_reply_markup(chat_id, MessageId(previous))
            .await
        {
            debug!("Old result buttons could not be removed: {err}");
        }
    }
    Ok(())
}

async fn send_notice(bot: &Bot, chat_id: ChatId, reply_to: Option<MessageId>, text: String) {
    let mut request = bot.send_message(chat_id, text);
    if let Some(reply_to) = reply_to {
        request = request.reply_parameters(ReplyParameters::new(reply_to));
    }
    if let Err(err) = request.await {
        warn!("Failed to send notice: {err}");
    }
}

async fn send_status(bot: &Bot, chat_id: ChatId, text: &str) -> Option<MessageId> {
    match bot.send_message(chat_id, text).await {
        Ok(sent) => Some(sent.id),
        Err(err) => {
            warn!("Failed to send status message: {err}");
            None
        }
    }
}

async fn clear_status(bot: &Bot, chat_id: ChatId, status: Option<MessageId>) {
    if let Some(status) = status {
        if let Err(err) = bot.delete_message(chat_id, status).await {
            debug!("Status message could not be removed: {err}");
        }
    }
}

/// Returns whether a poster was produced.
async fn generate_and_send(
    bot: &Bot,
    state: &AppState,
    key: SessionKey,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
) -> Result<bool> {
    let prepared = match state.prepare_generation(key).await {
        Ok(prepared) => prepared,
        Err(err) => {
            info!(chat_id = key.chat_id, "Generation refused: {err}");
            send_notice(bot, chat_id, reply_to, generation_failure_text(&err)).await;
            return Ok(false);
        }
    };

    let status = send_status(bot, chat_id, "Creating your VS cover...").await;
    let outcome = {
        let _chat_action =
            start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::UploadPhoto);
        state.run_generation(key, prepared).await
    };
    clear_status(bot, chat_id, status).await;

    match outcome {
        Ok(artifact) => {
            send_result(bot, state, key, chat_id, &artifact).await?;
            Ok(true)
        }
        Err(err) => {
            error!(chat_id = key.chat_id, "Poster generation failed: {err}");
            send_notice(bot, chat_id, reply_to, generation_failure_text(&err)).await;
            Ok(false)
        }
    }
}

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    reply_text(
        &bot,
        &message,
        "Hello! I build \"VS\" matchup posters. Use /vs to open the panel or /help to see commands.",
    )
    .await
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(message.chat.id, HELP_TEXT)
        .reply_parameters(ReplyParameters::new(message.id))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

pub async fn vs_handler(bot: Bot, state: AppState, message: Message, details: String) -> Result<()> {
    let Some(key) = session_key(&message) else {
        return Ok(());
    };
    if !details.trim().is_empty() {
        state.with_session(key, |session| session.set_details(details.trim()));
    }
    send_panel(&bot, &state, key, message.chat.id).await
}

pub async fn side_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    side: Side,
    name: String,
) -> Result<()> {
    let Some(key) = session_key(&message) else {
        return Ok(());
    };

    let photo_reply = message.reply_to_message().filter(|reply| message_has_image(reply));
    let name_update = side_name_update(&name, photo_reply.is_some());
    if let Some(name) = &name_update {
        state.with_session(key, |session| session.set_name(side, name));
    }

    let mut photo_note = "";
    if let Some(reply) = photo_reply {
        match load_source_image(&bot, reply).await {
            Ok(Some(image)) => {
                state.with_session(key, |session| session.set_image(side, image));
                photo_note = " Photo set from the replied message.";
            }
            Ok(None) => {}
            Err(err) => {
                warn!("Could not use replied photo for {:?}: {err}", side);
                reply_text(&bot, &message, err.to_string()).await?;
            }
        }
    }

    let label = match name_update.as_deref() {
        Some("") => format!(
            "{} name cleared (shows as \"{}\").",
            side.title(),
            side.default_label()
        ),
        Some(name) => format!("{} name set to \"{}\".", side.title(), name),
        None => format!("{} name unchanged.", side.title()),
    };
    reply_text(&bot, &message, format!("{label}{photo_note}")).await?;
    refresh_panel(&bot, &state, key, message.chat.id).await;
    Ok(())
}

pub async fn details_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    details: String,
) -> Result<()> {
    let Some(key) = session_key(&message) else {
        return Ok(());
    };
    let details = details.trim().to_string();
    state.with_session(key, |session| session.set_details(&details));
    let text = if details.is_empty() {
        "Additional details cleared."
    } else {
        "Additional details saved."
    };
    reply_text(&bot, &message, text).await?;
    refresh_panel(&bot, &state, key, message.chat.id).await;
    Ok(())
}

pub async fn prompt_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(key) = session_key(&message) else {
        return Ok(());
    };
    let prompt = state.with_session(key, |session| session.prompt());
    bot.send_message(
        message.chat.id,
        format!(
            "<b>Prompt preview</b>\n<pre>{}</pre>",
            escape_html(&truncate_chars(&prompt, PROMPT_PREVIEW_LIMIT))
        ),
    )
    .reply_parameters(ReplyParameters::new(message.id))
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

pub async fn generate_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(key) = session_key(&message) else {
        return Ok(());
    };
    let mut timer = start_command_timer("generate", &message);
    let produced = generate_and_send(&bot, &state, key, message.chat.id, Some(message.id)).await;
    let status = match &produced {
        Ok(true) => "success",
        Ok(false) => "refused",
        Err(_) => "error",
    };
    complete_command_timer(&mut timer, status, None);
    produced.map(|_| ())
}

pub async fn edit_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    instruction: String,
) -> Result<()> {
    let Some(key) = session_key(&message) else {
        return Ok(());
    };
    let instruction = instruction.trim().to_string();
    if instruction.is_empty() {
        return reply_text(&bot, &message, EDIT_USAGE).await;
    }
    let has_artifact = state
        .read_session(key, |session| session.artifact().is_some())
        .unwrap_or(false);
    if !has_artifact {
        return reply_text(&bot, &message, NO_ARTIFACT).await;
    }

    let mut timer = start_command_timer("edit", &message);
    let chat_id = message.chat.id;
    let status = send_status(&bot, chat_id, "Editing your VS cover...").await;
    let outcome = {
        let _chat_action =
            start_chat_action_heartbeat(bot.clone(), chat_id, ChatAction::UploadPhoto);
        state.edit_poster(key, &instruction).await
    };
    clear_status(&bot, chat_id, status).await;

    match outcome {
        Ok(artifact) => {
            complete_command_timer(&mut timer, "success", None);
            send_result(&bot, &state, key, chat_id, &artifact).await
        }
        Err(err) => {
            error!(chat_id = key.chat_id, "Poster edit failed: {err}");
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            reply_text(&bot, &message, edit_failure_text(&err)).await
        }
    }
}

pub async fn key_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if !state.key_gate.has_host() {
        let text = if state.key_gate.has_credential().await {
            "Key selection is managed outside the bot; generation is unlocked."
        } else {
            "No credential host is configured, so no API key can be selected."
        };
        return reply_text(&bot, &message, text).await;
    }

    state.key_gate.request_credential().await;
    if state.key_gate.has_credential().await {
        info!("API key selected via /key");
        reply_text(&bot, &message, "API key selected. You can generate posters now.").await
    } else {
        reply_text(&bot, &message, key_missing_text()).await
    }
}

pub async fn reset_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(key) = session_key(&message) else {
        return Ok(());
    };
    let panel_id = state
        .read_session(key, |session| session.panel_message_id)
        .flatten();
    let text = if state.reset_session(key) {
        "Session cleared. Use /vs to start a new poster."
    } else {
        "Nothing to reset. Use /vs to start a new poster."
    };
    if let Some(panel_id) = panel_id {
        if let Err(err) = bot.delete_message(message.chat.id, MessageId(panel_id)).await {
            debug!("Panel could not be removed on reset: {err}");
        }
    }
    reply_text(&bot, &message, text).await
}

pub async fn upload_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(key) = session_key(&message) else {
        return Ok(());
    };

    let caption = message.caption().unwrap_or("").trim();
    let (side, name) = if caption.is_empty() {
        // Stray uncaptioned photos in groups only count for users building a poster.
        let has_session = state.read_session(key, |_| ()).is_some();
        if !message.chat.is_private() && !has_session {
            return Ok(());
        }
        match state.with_session(key, |session| session.first_empty_slot()) {
            Some(side) => (side, None),
            None => return reply_text(&bot, &message, SLOTS_FULL).await,
        }
    } else {
        match parse_upload_caption(caption) {
            Some(parsed) => parsed,
            None => return Ok(()),
        }
    };

    let image = match load_source_image(&bot, &message).await {
        Ok(Some(image)) => image,
        Ok(None) => return Ok(()),
        Err(err) => {
            warn!("Upload rejected for chat {}: {err}", message.chat.id);
            return reply_text(&bot, &message, err.to_string()).await;
        }
    };

    state.with_session(key, |session| {
        session.set_image(side, image);
        if let Some(name) = &name {
            session.set_name(side, name);
        }
    });
    let text = match &name {
        Some(name) => format!("{} photo set for \"{}\".", side.title(), name),
        None => format!("{} photo set.", side.title()),
    };
    reply_text(&bot, &message, text).await?;
    refresh_panel(&bot, &state, key, message.chat.id).await;
    Ok(())
}

async fn answer(bot: &Bot, query: &CallbackQuery, text: Option<&str>) {
    let mut request = bot.answer_callback_query(query.id.clone());
    if let Some(text) = text {
        request = request.text(text);
    }
    if let Err(err) = request.await {
        debug!("answer_callback_query failed: {err}");
    }
}

pub async fn panel_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    let Some(action) = query.data.as_deref().and_then(PanelAction::parse) else {
        answer(&bot, &query, None).await;
        return Ok(());
    };
    let Some(message) = &query.message else {
        answer(&bot, &query, None).await;
        return Ok(());
    };
    let chat_id = message.chat().id;
    let message_id = message.id();
    let key = SessionKey::new(chat_id.0, query.from.id.0);

    match action {
        PanelAction::Regenerate | PanelAction::Download | PanelAction::Close => {
            let owns_result = state
                .read_session(key, |session| session.result_message_id == Some(message_id.0))
                .unwrap_or(false);
            if !owns_result {
                answer(&bot, &query, Some("This poster belongs to another session.")).await;
                return Ok(());
            }
            result_action(&bot, &state, &query, key, chat_id, message_id, action).await
        }
        _ => {
            let owns_panel = state
                .read_session(key, |session| session.panel_message_id == Some(message_id.0))
                .unwrap_or(false);
            if !owns_panel {
                answer(&bot, &query, Some("This panel is not yours or has expired. Use /vs.")).await;
                return Ok(());
            }
            if state.with_session(key, |session| apply_selection(session, action)) {
                answer(&bot, &query, None).await;
                render_panel(&bot, &state, key, chat_id, message_id).await;
                return Ok(());
            }
            if state.is_busy(key) {
                answer(&bot, &query, Some(REQUEST_BUSY)).await;
                return Ok(());
            }
            answer(&bot, &query, None).await;
            generate_and_send(&bot, &state, key, chat_id, None).await.map(|_| ())
        }
    }
}

async fn result_action(
    bot: &Bot,
    state: &AppState,
    query: &CallbackQuery,
    key: SessionKey,
    chat_id: ChatId,
    message_id: MessageId,
    action: PanelAction,
) -> Result<()> {
    match action {
        PanelAction::Regenerate => {
            if state.is_busy(key) {
                answer(bot, query, Some(REQUEST_BUSY)).await;
                return Ok(());
            }
            answer(bot, query, None).await;
            generate_and_send(bot, state, key, chat_id, None).await?;
        }
        PanelAction::Download => {
            let artifact = state.read_session(key, |session| session.artifact().cloned()).flatten();
            let Some(artifact) = artifact else {
                answer(bot, query, Some("No poster to download.")).await;
                return Ok(());
            };
            answer(bot, query, None).await;
            let bytes = decode_data_uri(&artifact.image_uri)?;
            bot.send_document(
                chat_id,
                InputFile::memory(bytes).file_name(artifact_file_name(Utc::now())),
            )
            .reply_parameters(ReplyParameters::new(message_id))
            .await?;
        }
        PanelAction::Close => {
            state.with_session(key, |session| {
                session.dismiss_artifact();
                session.result_message_id = None;
            });
            answer(bot, query, None).await;
            if let Err(err) = bot.delete_message(chat_id, message_id).await {
                debug!("Result message could not be removed: {err}");
            }
        }
        _ => answer(bot, query, None).await,
    }
    Ok(())
}
