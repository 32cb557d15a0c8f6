use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod error;
mod handlers;
mod llm;
mod poster;
mod state;
mod utils;

use config::{CredentialHostKind, CONFIG};
use handlers::commands;
use handlers::media::message_has_image;
use handlers::panel::CALLBACK_NAMESPACE;
use llm::{ApiKeyCell, CredentialHost, EnvCredentialHost, GeminiImageClient, KeyGate};
use poster::Side;
use state::AppState;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show usage")]
    Help,
    #[command(description = "Open the poster settings panel")]
    Vs(String),
    #[command(description = "Set the home side name")]
    Home(String),
    #[command(description = "Set the away side name")]
    Away(String),
    #[command(description = "Set extra prompt details")]
    Details(String),
    #[command(description = "Preview the prompt")]
    Prompt,
    #[command(description = "Generate the poster")]
    Generate,
    #[command(description = "Refine the current poster")]
    Edit(String),
    #[command(description = "Select the API key")]
    Key,
    #[command(description = "Start over")]
    Reset,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

fn build_state() -> AppState {
    let api_key = ApiKeyCell::new(CONFIG.gemini_api_key.clone());
    let host: Option<Arc<dyn CredentialHost>> = match CONFIG.credential_host {
        CredentialHostKind::Env => Some(Arc::new(EnvCredentialHost::new(
            CONFIG.gemini_api_key_env.clone(),
            api_key.clone(),
        ))),
        CredentialHostKind::None => None,
    };
    let key_gate = KeyGate::new(host, CONFIG.missing_host_policy);
    let gemini = GeminiImageClient::new(CONFIG.gemini_settings(), api_key);
    AppState::new(gemini, key_gate, CONFIG.session_defaults())
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging(&CONFIG.log_level);

    if CONFIG.bot_token.trim().is_empty() {
        return Err("BOT_TOKEN is required".into());
    }

    let mut bot = Bot::new(CONFIG.bot_token.clone());
    if !CONFIG.uses_default_telegram_api() {
        let api_url = reqwest::Url::parse(&CONFIG.telegram_api_url)
            .map_err(|err| format!("invalid TELEGRAM_API_URL: {err}"))?;
        info!(api_url = %api_url, "Using custom Telegram Bot API server");
        bot = bot.set_api_url(api_url);
    }
    info!(
        image_model = %CONFIG.gemini_image_model,
        edit_model = %CONFIG.gemini_edit_model,
        "Starting VS Cover Bot"
    );

    let state = build_state();
    if !state.key_gate.has_credential().await {
        info!("No API key selected yet; generation will prompt for one");
    }

    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        error!("Failed to register bot commands: {err}");
    }

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(dptree::filter(|msg: Message| message_has_image(&msg)).endpoint(handle_upload))
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query()
        .filter(|query: CallbackQuery| {
            query
                .data
                .as_deref()
                .is_some_and(|data| data.starts_with(CALLBACK_NAMESPACE))
        })
        .endpoint(handle_callback_query);

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    match command {
        Command::Start => commands::start_handler(bot, message).await?,
        Command::Help => commands::help_handler(bot, message).await?,
        Command::Vs(details) => commands::vs_handler(bot, state, message, details).await?,
        Command::Home(name) => {
            tokio::spawn(async move {
                if let Err(err) = commands::side_handler(bot, state, message, Side::A, name).await
                {
                    error!("home handler failed: {err}");
                }
            });
        }
        Command::Away(name) => {
            tokio::spawn(async move {
                if let Err(err) = commands::side_handler(bot, state, message, Side::B, name).await
                {
                    error!("away handler failed: {err}");
                }
            });
        }
        Command::Details(details) => {
            commands::details_handler(bot, state, message, details).await?
        }
        Command::Prompt => commands::prompt_handler(bot, state, message).await?,
        Command::Generate => {
            tokio::spawn(async move {
                if let Err(err) = commands::generate_handler(bot, state, message).await {
                    error!("generate handler failed: {err}");
                }
            });
        }
        Command::Edit(instruction) => {
            tokio::spawn(async move {
                if let Err(err) = commands::edit_handler(bot, state, message, instruction).await {
                    error!("edit handler failed: {err}");
                }
            });
        }
        Command::Key => {
            tokio::spawn(async move {
                if let Err(err) = commands::key_handler(bot, state, message).await {
                    error!("key handler failed: {err}");
                }
            });
        }
        Command::Reset => commands::reset_handler(bot, state, message).await?,
    }
    Ok(())
}

async fn handle_upload(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = commands::upload_handler(bot, state, message).await {
            error!("upload handler failed: {err}");
        }
    });
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = commands::panel_callback(bot, state, query).await {
            error!("panel callback failed: {err}");
        }
    });
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
